//! Per-module handle passed into module init code.
//!
//! The context carries everything a module needs to participate in the
//! host's lifecycle: the shared listener registries, the auto-unload
//! registry its resources are tracked in, the loader it can pull its
//! own submodules through, and the host's download manager. The context
//! knows the module's dotted path, so every resource a module creates
//! through it is attributed to the right plugin for cleanup.

use crate::loader::{ModuleError, ModuleLoader};
use crate::namespace::ModuleNamespace;
use downloads::{DownloadManager, Downloadables};
use listener_system::{LifecycleRegistries, ListenerBinding, ListenerError, ListenerRegistry};
use script_core::{AutoUnloadRegistry, Unloadable};
use std::sync::Arc;

#[derive(Clone)]
pub struct ModuleContext {
    module_path: String,
    registries: Arc<LifecycleRegistries>,
    auto_unload: Arc<AutoUnloadRegistry>,
    loader: Arc<dyn ModuleLoader>,
    downloads: Arc<DownloadManager>,
}

impl ModuleContext {
    pub fn new(
        module_path: impl Into<String>,
        registries: Arc<LifecycleRegistries>,
        auto_unload: Arc<AutoUnloadRegistry>,
        loader: Arc<dyn ModuleLoader>,
        downloads: Arc<DownloadManager>,
    ) -> Self {
        Self {
            module_path: module_path.into(),
            registries,
            auto_unload,
            loader,
            downloads,
        }
    }

    /// Dotted path of the module this context was created for.
    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn registries(&self) -> &Arc<LifecycleRegistries> {
        &self.registries
    }

    pub fn auto_unload(&self) -> &Arc<AutoUnloadRegistry> {
        &self.auto_unload
    }

    pub fn loader(&self) -> &Arc<dyn ModuleLoader> {
        &self.loader
    }

    pub fn downloads(&self) -> &Arc<DownloadManager> {
        &self.downloads
    }

    /// Create a download set feeding the host's table, tracked for
    /// cleanup when this module's plugin unloads.
    pub fn downloadables(&self) -> Arc<Downloadables> {
        Downloadables::new(self.downloads.clone(), &self.auto_unload, &self.module_path)
    }

    /// Track a resource for automatic cleanup when this module's plugin
    /// unloads.
    pub fn track(&self, resource: Arc<dyn Unloadable>) {
        self.auto_unload.track(&self.module_path, resource);
    }

    /// Subscribe `callback` to `registry` and track the binding so it is
    /// released when this module's plugin unloads.
    pub async fn listen<E, F>(
        &self,
        registry: &Arc<ListenerRegistry<E>>,
        callback: F,
    ) -> Result<Arc<ListenerBinding<E>>, ListenerError>
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> listener_system::ListenerResult + Send + Sync + 'static,
    {
        let binding = ListenerBinding::bind(registry.clone(), callback).await?;
        self.track(binding.clone());
        Ok(binding)
    }

    /// Blocking variant of [`listen`](Self::listen) for synchronous
    /// module init entry points.
    pub fn listen_blocking<E, F>(
        &self,
        registry: &Arc<ListenerRegistry<E>>,
        callback: F,
    ) -> Result<Arc<ListenerBinding<E>>, ListenerError>
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> listener_system::ListenerResult + Send + Sync + 'static,
    {
        futures::executor::block_on(self.listen(registry, callback))
    }

    /// Import a submodule of this module.
    ///
    /// Only paths nested under this module's own dotted prefix are
    /// allowed; a plugin cannot reach into another plugin's namespace.
    pub async fn import(&self, sub_path: &str) -> Result<ModuleNamespace, ModuleError> {
        let prefix = format!("{}.", self.module_path);
        if !sub_path.starts_with(&prefix) {
            return Err(ModuleError::OutsideNamespace(sub_path.to_string()));
        }
        let child = self.child(sub_path);
        self.loader.import(sub_path, &child).await
    }

    /// Blocking variant of [`import`](Self::import) for synchronous
    /// module init entry points.
    pub fn import_blocking(&self, sub_path: &str) -> Result<ModuleNamespace, ModuleError> {
        futures::executor::block_on(self.import(sub_path))
    }

    /// Import this context's own module. Used by the manager for the
    /// top-level module of a plugin, where no prefix restriction applies.
    pub(crate) async fn import_root(&self) -> Result<ModuleNamespace, ModuleError> {
        self.loader.import(&self.module_path, self).await
    }

    pub(crate) fn child(&self, sub_path: &str) -> Self {
        Self {
            module_path: sub_path.to_string(),
            registries: self.registries.clone(),
            auto_unload: self.auto_unload.clone(),
            loader: self.loader.clone(),
            downloads: self.downloads.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InProcessModuleLoader;
    use downloads::LoggingDownloadTable;
    use listener_system::TickEvent;
    use script_core::RecordingReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn harness() -> (
        Arc<InProcessModuleLoader>,
        Arc<LifecycleRegistries>,
        Arc<AutoUnloadRegistry>,
        Arc<DownloadManager>,
    ) {
        let reporter = Arc::new(RecordingReporter::new());
        (
            Arc::new(InProcessModuleLoader::new()),
            Arc::new(LifecycleRegistries::new(reporter)),
            Arc::new(AutoUnloadRegistry::new()),
            DownloadManager::new(Arc::new(LoggingDownloadTable::new())),
        )
    }

    #[tokio::test]
    async fn listen_tracks_binding_under_module_path() {
        let (loader, registries, auto_unload, download_manager) = harness();
        let ctx = ModuleContext::new(
            "plugins.demo",
            registries.clone(),
            auto_unload.clone(),
            loader,
            download_manager,
        );

        let hits = Arc::new(AtomicUsize::new(0));
        let hit_counter = hits.clone();
        ctx.listen(&registries.tick, move |_: &TickEvent| {
            hit_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        registries.tick.notify(&TickEvent).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(auto_unload.tracked_modules(), vec!["plugins.demo"]);
    }

    #[tokio::test]
    async fn downloadables_are_tracked_under_module_path() {
        let (loader, registries, auto_unload, download_manager) = harness();
        let ctx = ModuleContext::new(
            "plugins.demo",
            registries,
            auto_unload.clone(),
            loader,
            download_manager.clone(),
        );

        let set = ctx.downloadables();
        set.add("sound/chime.wav");
        assert_eq!(download_manager.set_count(), 1);
        assert_eq!(auto_unload.tracked_count("plugins.demo"), 1);

        for resource in auto_unload.take("plugins.demo") {
            resource.unload().await.unwrap();
        }
        assert_eq!(download_manager.set_count(), 0);
    }

    #[tokio::test]
    async fn import_outside_own_prefix_is_rejected() {
        let (loader, registries, auto_unload, download_manager) = harness();
        loader.register_module("plugins.other.secrets", |_| Ok(ModuleNamespace::new()));
        let ctx = ModuleContext::new(
            "plugins.demo",
            registries,
            auto_unload,
            loader.clone(),
            download_manager,
        );

        let err = ctx.import("plugins.other.secrets").await.unwrap_err();
        assert!(matches!(err, ModuleError::OutsideNamespace(_)));
        assert!(loader.loaded_modules("plugins.other").await.is_empty());
    }

    #[tokio::test]
    async fn submodule_import_runs_with_its_own_path() {
        let (loader, registries, auto_unload, download_manager) = harness();
        loader.register_module("plugins.demo.helpers", |sub_ctx| {
            let mut ns = ModuleNamespace::new();
            ns.insert("path", sub_ctx.module_path().to_string());
            Ok(ns)
        });
        let ctx = ModuleContext::new(
            "plugins.demo",
            registries,
            auto_unload,
            loader,
            download_manager,
        );

        let ns = ctx.import("plugins.demo.helpers").await.unwrap();
        assert_eq!(
            ns.get_as::<String>("path").map(String::as_str),
            Some("plugins.demo.helpers")
        );
    }
}
