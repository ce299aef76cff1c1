//! Auto-unload tracking for plugin-owned resources
//!
//! Any object created while a plugin module executes that must release
//! state when the plugin unloads implements `Unloadable` and is tracked
//! here under the dotted path of the module that created it. Plugin
//! unload drains the tracked resources for every module in the plugin's
//! namespace and invokes their unload hooks.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Raised by unload hooks.
#[derive(Debug, thiserror::Error)]
pub enum UnloadError {
    /// The resource type never provided an unload hook. Treated as an
    /// isolated, reported failure during cleanup, not a fatal one.
    #[error("unload hook is not implemented for this resource")]
    NotImplemented,
    #[error("unload hook failed: {0}")]
    Failed(String),
}

/// Capability for resources that must release state on plugin unload.
#[async_trait]
pub trait Unloadable: Send + Sync {
    /// Release whatever state this resource holds.
    ///
    /// Called at most once per tracked resource during module cleanup.
    /// The default signals a missing hook, which cleanup reports and
    /// skips past.
    async fn unload(&self) -> Result<(), UnloadError> {
        Err(UnloadError::NotImplemented)
    }
}

/// Process-wide mapping from module dotted path to the auto-unloadable
/// resources that module created.
///
/// Constructed once per host and shared by `Arc`; entries are added as
/// resources are constructed and drained during module cleanup.
#[derive(Default)]
pub struct AutoUnloadRegistry {
    resources: DashMap<String, Vec<Arc<dyn Unloadable>>>,
}

impl AutoUnloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a resource under the module that created it.
    pub fn track(&self, module_path: &str, resource: Arc<dyn Unloadable>) {
        debug!("tracking auto-unload resource for module '{}'", module_path);
        self.resources
            .entry(module_path.to_string())
            .or_default()
            .push(resource);
    }

    /// Remove and return every resource tracked for a module, in tracking
    /// order. Returns an empty vec when the module tracked nothing.
    pub fn take(&self, module_path: &str) -> Vec<Arc<dyn Unloadable>> {
        self.resources
            .remove(module_path)
            .map(|(_, resources)| resources)
            .unwrap_or_default()
    }

    /// Number of resources currently tracked for a module.
    pub fn tracked_count(&self, module_path: &str) -> usize {
        self.resources
            .get(module_path)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Dotted paths of every module with tracked resources.
    pub fn tracked_modules(&self) -> Vec<String> {
        self.resources.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted {
        unloads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Unloadable for Counted {
        async fn unload(&self) -> Result<(), UnloadError> {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoHook;

    #[async_trait]
    impl Unloadable for NoHook {}

    #[tokio::test]
    async fn take_drains_tracked_resources_in_order() {
        let registry = AutoUnloadRegistry::new();
        let unloads = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            registry.track(
                "plugins.demo",
                Arc::new(Counted {
                    unloads: unloads.clone(),
                }),
            );
        }
        assert_eq!(registry.tracked_count("plugins.demo"), 3);

        let resources = registry.take("plugins.demo");
        assert_eq!(resources.len(), 3);
        assert_eq!(registry.tracked_count("plugins.demo"), 0);
        assert!(registry.take("plugins.demo").is_empty());

        for resource in resources {
            resource.unload().await.unwrap();
        }
        assert_eq!(unloads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn default_unload_hook_reports_not_implemented() {
        let resource = NoHook;
        let err = resource.unload().await.unwrap_err();
        assert!(matches!(err, UnloadError::NotImplemented));
    }

    #[test]
    fn modules_are_tracked_independently() {
        let registry = AutoUnloadRegistry::new();
        registry.track("plugins.a", Arc::new(NoHook));
        registry.track("plugins.b", Arc::new(NoHook));

        let mut modules = registry.tracked_modules();
        modules.sort();
        assert_eq!(modules, vec!["plugins.a", "plugins.b"]);

        registry.take("plugins.a");
        assert_eq!(registry.tracked_modules(), vec!["plugins.b"]);
    }
}
