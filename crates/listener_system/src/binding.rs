//! Listener binding: register on construction, unregister on unload

use crate::registry::{ListenerCallback, ListenerError, ListenerRegistry, ListenerResult};
use async_trait::async_trait;
use script_core::{UnloadError, Unloadable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Construction-time binding of a callback to one lifecycle registry.
///
/// One generic type serves every lifecycle event; the target registry is
/// a constructor parameter rather than a subclass. The binding registers
/// its callback when built and, as an `Unloadable`, unregisters it
/// exactly once when the owning plugin unloads.
pub struct ListenerBinding<E> {
    registry: Arc<ListenerRegistry<E>>,
    callback: ListenerCallback<E>,
    unloaded: AtomicBool,
}

impl<E: Send + Sync + 'static> ListenerBinding<E> {
    /// Register `callback` with `registry` and return the binding.
    ///
    /// Fails only when the same callback instance is already registered.
    pub async fn bind<F>(
        registry: Arc<ListenerRegistry<E>>,
        callback: F,
    ) -> Result<Arc<Self>, ListenerError>
    where
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        let callback: ListenerCallback<E> = Arc::new(callback);
        registry.register(callback.clone()).await?;
        Ok(Arc::new(Self {
            registry,
            callback,
            unloaded: AtomicBool::new(false),
        }))
    }

    /// Call through to the wrapped callback with identical arguments.
    pub fn call(&self, event: &E) -> ListenerResult {
        (self.callback)(event)
    }

    /// Name of the registry this binding targets.
    pub fn registry_name(&self) -> &'static str {
        self.registry.name()
    }

    /// Whether the binding has already been unloaded.
    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: Send + Sync + 'static> Unloadable for ListenerBinding<E> {
    async fn unload(&self) -> Result<(), UnloadError> {
        // First unload signal wins; later ones are no-ops.
        if self.unloaded.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(
            "unregistering listener binding for '{}'",
            self.registry.name()
        );
        self.registry.unregister(&self.callback).await;
        Ok(())
    }
}
