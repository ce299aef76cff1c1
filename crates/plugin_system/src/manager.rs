//! Ordered plugin lifecycle management.
//!
//! The manager owns the set of loaded plugins in load order, loads them
//! on demand, and tears them down module by module: every module the
//! loader cached under a plugin's dotted prefix has its tracked
//! resources released (with per-resource error isolation) before the
//! module itself is evicted. A plugin whose init fails gets the same
//! cleanup, so a failed load never leaks bindings or modules.

use crate::context::ModuleContext;
use crate::instance::{LoadedPlugin, PluginError};
use crate::loader::ModuleLoader;
use downloads::DownloadManager;
use listener_system::{LifecycleRegistries, PluginLoadedEvent, PluginUnloadedEvent};
use script_core::{AutoUnloadRegistry, ErrorReporter};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct PluginManager {
    base_import: String,
    loader: Arc<dyn ModuleLoader>,
    registries: Arc<LifecycleRegistries>,
    auto_unload: Arc<AutoUnloadRegistry>,
    downloads: Arc<DownloadManager>,
    reporter: Arc<dyn ErrorReporter>,
    plugins: RwLock<Vec<(String, Arc<LoadedPlugin>)>>,
}

impl PluginManager {
    /// `base_import` is the dotted prefix plugin modules live under, so
    /// plugin `foo` resolves to module `"{base_import}.foo"`.
    pub fn new(
        base_import: impl Into<String>,
        loader: Arc<dyn ModuleLoader>,
        registries: Arc<LifecycleRegistries>,
        auto_unload: Arc<AutoUnloadRegistry>,
        downloads: Arc<DownloadManager>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            base_import: base_import.into(),
            loader,
            registries,
            auto_unload,
            downloads,
            reporter,
            plugins: RwLock::new(Vec::new()),
        }
    }

    fn module_path(&self, plugin_name: &str) -> String {
        format!("{}.{}", self.base_import, plugin_name)
    }

    fn module_context(&self, plugin_name: &str) -> ModuleContext {
        ModuleContext::new(
            self.module_path(plugin_name),
            self.registries.clone(),
            self.auto_unload.clone(),
            self.loader.clone(),
            self.downloads.clone(),
        )
    }

    /// Return the plugin, loading it first if needed.
    ///
    /// `None` means the plugin is not available: it does not exist, its
    /// name is reserved, or its init failed. A failed init is reported
    /// through the error reporter and its partial state is cleaned up
    /// before returning.
    pub async fn get_or_load(&self, plugin_name: &str) -> Option<Arc<LoadedPlugin>> {
        let mut plugins = self.plugins.write().await;
        if let Some((_, plugin)) = plugins.iter().find(|(name, _)| name == plugin_name) {
            return Some(plugin.clone());
        }

        let ctx = self.module_context(plugin_name);
        match LoadedPlugin::load(plugin_name, &ctx).await {
            Ok(plugin) => {
                let plugin = Arc::new(plugin);
                plugins.push((plugin_name.to_string(), plugin.clone()));
                drop(plugins);
                self.registries
                    .plugin_loaded
                    .notify(&PluginLoadedEvent {
                        plugin_name: plugin_name.to_string(),
                    })
                    .await;
                info!("✅ Plugin '{}' loaded successfully", plugin_name);
                Some(plugin)
            }
            Err(PluginError::FileNotFound(_)) => None,
            Err(PluginError::ReservedName(_)) => {
                info!("Plugin '{}' cannot be loaded, its name is reserved", plugin_name);
                None
            }
            Err(err) => {
                drop(plugins);
                self.reporter
                    .report(&format!("loading plugin '{}'", plugin_name), &err);
                self.remove_modules(plugin_name).await;
                None
            }
        }
    }

    /// Unload the plugin and release everything its modules registered.
    /// Returns false when the plugin was not loaded.
    pub async fn unload(&self, plugin_name: &str) -> bool {
        {
            let plugins = self.plugins.read().await;
            if !plugins.iter().any(|(name, _)| name == plugin_name) {
                warn!("Plugin '{}' is not loaded", plugin_name);
                return false;
            }
        }

        info!("Unloading plugin '{}'...", plugin_name);
        self.registries
            .plugin_unloaded
            .notify(&PluginUnloadedEvent {
                plugin_name: plugin_name.to_string(),
            })
            .await;
        self.remove_modules(plugin_name).await;
        self.plugins
            .write()
            .await
            .retain(|(name, _)| name != plugin_name);
        info!("🗑 Plugin '{}' unloaded", plugin_name);
        true
    }

    /// Unload every plugin, newest first.
    pub async fn unload_all(&self) {
        let names: Vec<String> = {
            let plugins = self.plugins.read().await;
            plugins.iter().rev().map(|(name, _)| name.clone()).collect()
        };
        for name in names {
            self.unload(&name).await;
        }
    }

    pub async fn is_loaded(&self, plugin_name: &str) -> bool {
        self.plugins
            .read()
            .await
            .iter()
            .any(|(name, _)| name == plugin_name)
    }

    pub async fn get(&self, plugin_name: &str) -> Option<Arc<LoadedPlugin>> {
        self.plugins
            .read()
            .await
            .iter()
            .find(|(name, _)| name == plugin_name)
            .map(|(_, plugin)| plugin.clone())
    }

    /// Loaded plugins in load order.
    pub async fn loaded_plugins(&self) -> Vec<Arc<LoadedPlugin>> {
        self.plugins
            .read()
            .await
            .iter()
            .map(|(_, plugin)| plugin.clone())
            .collect()
    }

    pub async fn plugin_count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Release tracked resources and evict every module cached under the
    /// plugin's prefix. Resource unload failures (including resources
    /// without an unload hook) are reported and never stop the sweep.
    async fn remove_modules(&self, plugin_name: &str) {
        let prefix = self.module_path(plugin_name);
        for module_path in self.loader.loaded_modules(&prefix).await {
            for resource in self.auto_unload.take(&module_path) {
                if let Err(err) = resource.unload().await {
                    self.reporter
                        .report(&format!("unloading resource from '{}'", module_path), &err);
                }
            }
            self.loader.evict(&module_path).await;
        }
    }
}
