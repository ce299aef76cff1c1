//! Per-event listener registries

use script_core::ErrorReporter;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Result type returned by listener callbacks.
pub type ListenerResult = Result<(), ListenerError>;

/// Callback handle: invocable code plus `Arc` identity for removal.
pub type ListenerCallback<E> = Arc<dyn Fn(&E) -> ListenerResult + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The exact same callback instance was registered twice with one
    /// registry. Distinct instances wrapping equal closures are distinct
    /// listeners.
    #[error("callback is already registered with the '{0}' registry")]
    DuplicateRegistration(&'static str),
    /// A callback reported a failure while handling a notification.
    #[error("listener callback failed: {0}")]
    CallbackFailed(String),
}

/// Counters kept per registry.
#[derive(Debug, Default, Clone)]
pub struct RegistryStats {
    pub notifications: u64,
    pub callback_failures: u64,
}

/// Ordered collection of callbacks subscribed to one lifecycle event.
///
/// Registries share no state with one another; each is constructed once
/// at process start and shared by `Arc` with every plugin that registers
/// into it. `notify` invokes subscribers in registration order and routes
/// each failure to the error reporter without aborting the remainder.
pub struct ListenerRegistry<E> {
    name: &'static str,
    listeners: RwLock<Vec<ListenerCallback<E>>>,
    stats: RwLock<RegistryStats>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<E: Send + Sync> ListenerRegistry<E> {
    pub fn new(name: &'static str, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            name,
            listeners: RwLock::new(Vec::new()),
            stats: RwLock::new(RegistryStats::default()),
            reporter,
        }
    }

    /// Name of the lifecycle event this registry serves.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add a callback. Registering the same instance twice is an error.
    pub async fn register(&self, callback: ListenerCallback<E>) -> Result<(), ListenerError> {
        let mut listeners = self.listeners.write().await;
        if listeners.iter().any(|cb| Arc::ptr_eq(cb, &callback)) {
            return Err(ListenerError::DuplicateRegistration(self.name));
        }
        listeners.push(callback);
        debug!("📝 registered listener for '{}'", self.name);
        Ok(())
    }

    /// Remove a callback by identity. No-op when it was never registered
    /// or was already removed; returns whether anything was removed.
    pub async fn unregister(&self, callback: &ListenerCallback<E>) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|cb| !Arc::ptr_eq(cb, callback));
        let removed = listeners.len() != before;
        if removed {
            debug!("🗑 unregistered listener for '{}'", self.name);
        }
        removed
    }

    /// Invoke every current subscriber with the event, in registration
    /// order. Each callback failure is reported and does not prevent the
    /// callbacks after it from running. When this returns, every
    /// subscriber has run.
    pub async fn notify(&self, event: &E) {
        // Snapshot under the read lock so callbacks never observe the
        // registry mid-mutation.
        let listeners = self.listeners.read().await.clone();
        debug!(
            "📤 notifying {} listener(s) for '{}'",
            listeners.len(),
            self.name
        );

        let mut failures = 0u64;
        for callback in &listeners {
            if let Err(e) = callback(event) {
                failures += 1;
                self.reporter
                    .report(&format!("listener for '{}'", self.name), &e);
            }
        }

        let mut stats = self.stats.write().await;
        stats.notifications += 1;
        stats.callback_failures += failures;
    }

    /// Number of currently registered callbacks.
    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_core::RecordingReporter;
    use std::sync::Mutex;

    fn registry(reporter: Arc<RecordingReporter>) -> ListenerRegistry<u32> {
        ListenerRegistry::new("test_event", reporter)
    }

    fn callback(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> ListenerCallback<u32> {
        Arc::new(move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[tokio::test]
    async fn register_unregister_leaves_set_difference() {
        let reporter = Arc::new(RecordingReporter::new());
        let registry = registry(reporter);
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = callback(log.clone(), "a");
        let b = callback(log.clone(), "b");
        let c = callback(log.clone(), "c");

        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();
        registry.register(c.clone()).await.unwrap();
        registry.unregister(&b).await;
        // Idempotent: unregistering again is a no-op, not an error.
        assert!(!registry.unregister(&b).await);

        assert_eq!(registry.listener_count().await, 2);
        registry.notify(&1).await;
        assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let reporter = Arc::new(RecordingReporter::new());
        let registry = registry(reporter);
        let cb: ListenerCallback<u32> = Arc::new(|_| Ok(()));

        registry.register(cb.clone()).await.unwrap();
        let err = registry.register(cb.clone()).await.unwrap_err();
        assert!(matches!(err, ListenerError::DuplicateRegistration(_)));
        assert_eq!(registry.listener_count().await, 1);

        // A distinct instance of an identical closure is a new listener.
        let other: ListenerCallback<u32> = Arc::new(|_| Ok(()));
        registry.register(other).await.unwrap();
        assert_eq!(registry.listener_count().await, 2);
    }

    #[tokio::test]
    async fn failing_callback_is_isolated_and_reported() {
        let reporter = Arc::new(RecordingReporter::new());
        let registry = registry(reporter.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(callback(log.clone(), "first"))
            .await
            .unwrap();
        let failing_log = log.clone();
        registry
            .register(Arc::new(move |_| {
                failing_log.lock().unwrap().push("failing");
                Err(ListenerError::CallbackFailed("middle broke".into()))
            }))
            .await
            .unwrap();
        registry
            .register(callback(log.clone(), "last"))
            .await
            .unwrap();

        registry.notify(&7).await;

        // All three ran exactly once, in registration order.
        assert_eq!(*log.lock().unwrap(), vec!["first", "failing", "last"]);
        assert_eq!(reporter.report_count(), 1);
        assert!(reporter.reports()[0].contains("middle broke"));

        let stats = registry.stats().await;
        assert_eq!(stats.notifications, 1);
        assert_eq!(stats.callback_failures, 1);
    }

    #[tokio::test]
    async fn notify_with_no_listeners_is_harmless() {
        let reporter = Arc::new(RecordingReporter::new());
        let registry = registry(reporter.clone());

        registry.notify(&0).await;
        assert_eq!(reporter.report_count(), 0);
        assert_eq!(registry.stats().await.notifications, 1);
    }
}
