//! A single loaded plugin and its exported namespace.

use crate::context::ModuleContext;
use crate::loader::ModuleError;
use crate::namespace::{ModuleNamespace, PluginInfo};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// No loadable file exists for the plugin name.
    #[error("plugin '{0}' does not exist")]
    FileNotFound(String),
    /// The plugin name collides with a reserved framework module.
    #[error("plugin name '{0}' is reserved")]
    ReservedName(String),
    /// The plugin was found but failed while executing.
    #[error("plugin failed to load: {0}")]
    LoadFailed(#[source] ModuleError),
}

/// Snapshot of a plugin taken at load time: its name, the dotted path
/// of its top-level module, and everything that module exported.
#[derive(Debug)]
pub struct LoadedPlugin {
    name: String,
    module_path: String,
    namespace: ModuleNamespace,
}

impl LoadedPlugin {
    /// Import the plugin's top-level module and capture its exports.
    pub async fn load(plugin_name: &str, ctx: &ModuleContext) -> Result<Self, PluginError> {
        info!("Loading plugin '{}'...", plugin_name);
        let namespace = ctx.import_root().await.map_err(|e| match e {
            ModuleError::NotFound(_) => {
                info!("Plugin '{}' does not exist", plugin_name);
                PluginError::FileNotFound(plugin_name.to_string())
            }
            ModuleError::ReservedName(name) => PluginError::ReservedName(name),
            other => PluginError::LoadFailed(other),
        })?;

        Ok(Self {
            name: plugin_name.to_string(),
            module_path: ctx.module_path().to_string(),
            namespace,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn namespace(&self) -> &ModuleNamespace {
        &self.namespace
    }

    /// Metadata the plugin exported, if any. When a module exports more
    /// than one [`PluginInfo`] the earliest export wins.
    pub fn info(&self) -> Option<&PluginInfo> {
        self.namespace.find::<PluginInfo>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{InProcessModuleLoader, ModuleLoader};
    use downloads::{DownloadManager, LoggingDownloadTable};
    use listener_system::LifecycleRegistries;
    use script_core::{AutoUnloadRegistry, RecordingReporter};
    use std::sync::Arc;

    fn context_for(loader: Arc<dyn ModuleLoader>, module_path: &str) -> ModuleContext {
        let reporter = Arc::new(RecordingReporter::new());
        ModuleContext::new(
            module_path,
            Arc::new(LifecycleRegistries::new(reporter)),
            Arc::new(AutoUnloadRegistry::new()),
            loader,
            DownloadManager::new(Arc::new(LoggingDownloadTable::new())),
        )
    }

    #[tokio::test]
    async fn info_is_extracted_from_the_namespace() {
        let loader = Arc::new(InProcessModuleLoader::new());
        loader.register_module("plugins.greeter", |_| {
            let mut ns = ModuleNamespace::new();
            ns.insert(
                "info",
                PluginInfo::new("greeter")
                    .with_version("1.2.0")
                    .with_author("someone"),
            );
            Ok(ns)
        });
        let ctx = context_for(loader, "plugins.greeter");

        let plugin = LoadedPlugin::load("greeter", &ctx).await.unwrap();
        let info = plugin.info().unwrap();
        assert_eq!(info.name, "greeter");
        assert_eq!(info.version.as_deref(), Some("1.2.0"));
        assert_eq!(info.author.as_deref(), Some("someone"));
    }

    #[tokio::test]
    async fn earliest_exported_info_wins() {
        let loader = Arc::new(InProcessModuleLoader::new());
        loader.register_module("plugins.twins", |_| {
            let mut ns = ModuleNamespace::new();
            ns.insert("first", PluginInfo::new("first"));
            ns.insert("second", PluginInfo::new("second"));
            Ok(ns)
        });
        let ctx = context_for(loader, "plugins.twins");

        let plugin = LoadedPlugin::load("twins", &ctx).await.unwrap();
        assert_eq!(plugin.info().unwrap().name, "first");
    }

    #[tokio::test]
    async fn missing_module_maps_to_file_not_found() {
        let loader = Arc::new(InProcessModuleLoader::new());
        let ctx = context_for(loader, "plugins.ghost");

        let err = LoadedPlugin::load("ghost", &ctx).await.unwrap_err();
        assert!(matches!(err, PluginError::FileNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn plugin_without_info_reports_none() {
        let loader = Arc::new(InProcessModuleLoader::new());
        loader.register_module("plugins.plain", |_| Ok(ModuleNamespace::new()));
        let ctx = context_for(loader, "plugins.plain");

        let plugin = LoadedPlugin::load("plain", &ctx).await.unwrap();
        assert!(plugin.info().is_none());
        assert_eq!(plugin.module_path(), "plugins.plain");
    }
}
