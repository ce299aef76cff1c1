//! Lifecycle event payloads and the per-event registry set

use crate::registry::ListenerRegistry;
use script_core::ErrorReporter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A client finished connecting and is active in the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientActiveEvent {
    pub client_index: u32,
}

/// A client opened a connection to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConnectEvent {
    pub client_index: u32,
    pub name: String,
    pub address: String,
}

/// A client dropped its connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDisconnectEvent {
    pub client_index: u32,
}

/// A new map finished initializing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelInitEvent {
    pub map_name: String,
}

/// The current map is shutting down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelShutdownEvent;

/// The server activated a map and is ready for clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerActivateEvent {
    pub map_name: String,
    pub max_clients: u32,
}

/// An entity was created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCreatedEvent {
    pub entity_index: u32,
    pub class_name: String,
}

/// An entity was deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDeletedEvent {
    pub entity_index: u32,
}

/// One simulation frame elapsed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TickEvent;

/// A newer framework version is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionUpdateEvent {
    pub current_version: String,
    pub latest_version: String,
}

/// A plugin finished loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginLoadedEvent {
    pub plugin_name: String,
}

/// A plugin is about to be unloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginUnloadedEvent {
    pub plugin_name: String,
}

/// One registry per lifecycle event, constructed once at process start.
///
/// The host fires these via `notify`; plugins subscribe through
/// `ListenerBinding`. Registries live for the process lifetime and are
/// handed around by `Arc` reference, never reinitialized.
pub struct LifecycleRegistries {
    pub client_active: Arc<ListenerRegistry<ClientActiveEvent>>,
    pub client_connect: Arc<ListenerRegistry<ClientConnectEvent>>,
    pub client_disconnect: Arc<ListenerRegistry<ClientDisconnectEvent>>,
    pub level_init: Arc<ListenerRegistry<LevelInitEvent>>,
    pub level_shutdown: Arc<ListenerRegistry<LevelShutdownEvent>>,
    pub server_activate: Arc<ListenerRegistry<ServerActivateEvent>>,
    pub entity_created: Arc<ListenerRegistry<EntityCreatedEvent>>,
    pub entity_deleted: Arc<ListenerRegistry<EntityDeletedEvent>>,
    pub tick: Arc<ListenerRegistry<TickEvent>>,
    pub version_update: Arc<ListenerRegistry<VersionUpdateEvent>>,
    pub plugin_loaded: Arc<ListenerRegistry<PluginLoadedEvent>>,
    pub plugin_unloaded: Arc<ListenerRegistry<PluginUnloadedEvent>>,
}

impl LifecycleRegistries {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            client_active: Arc::new(ListenerRegistry::new("client_active", reporter.clone())),
            client_connect: Arc::new(ListenerRegistry::new("client_connect", reporter.clone())),
            client_disconnect: Arc::new(ListenerRegistry::new(
                "client_disconnect",
                reporter.clone(),
            )),
            level_init: Arc::new(ListenerRegistry::new("level_init", reporter.clone())),
            level_shutdown: Arc::new(ListenerRegistry::new("level_shutdown", reporter.clone())),
            server_activate: Arc::new(ListenerRegistry::new("server_activate", reporter.clone())),
            entity_created: Arc::new(ListenerRegistry::new("entity_created", reporter.clone())),
            entity_deleted: Arc::new(ListenerRegistry::new("entity_deleted", reporter.clone())),
            tick: Arc::new(ListenerRegistry::new("tick", reporter.clone())),
            version_update: Arc::new(ListenerRegistry::new("version_update", reporter.clone())),
            plugin_loaded: Arc::new(ListenerRegistry::new("plugin_loaded", reporter.clone())),
            plugin_unloaded: Arc::new(ListenerRegistry::new("plugin_unloaded", reporter)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_core::RecordingReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn registries_are_independent() {
        let reporter = Arc::new(RecordingReporter::new());
        let registries = LifecycleRegistries::new(reporter);
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        registries
            .tick
            .register(Arc::new(move |_: &TickEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .await
            .unwrap();

        // Firing a different registry never reaches the tick listener.
        registries
            .level_init
            .notify(&LevelInitEvent {
                map_name: "de_dust2".into(),
            })
            .await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        registries.tick.notify(&TickEvent).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(registries.level_init.listener_count().await, 0);
        assert_eq!(registries.tick.listener_count().await, 1);
    }
}
