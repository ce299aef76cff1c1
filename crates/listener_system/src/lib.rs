//! Listener based lifecycle notification
//!
//! One `ListenerRegistry` exists per named lifecycle event; callbacks are
//! registered with identity-based handles and notified in registration
//! order, with every callback failure isolated and reported so that the
//! remaining subscribers still run. `ListenerBinding` is the ergonomic
//! wrapper plugins use: it registers its callback on construction and
//! unregisters it when the owning plugin unloads.

mod binding;
mod events;
mod registry;

pub use binding::ListenerBinding;
pub use events::{
    ClientActiveEvent, ClientConnectEvent, ClientDisconnectEvent, EntityCreatedEvent,
    EntityDeletedEvent, LevelInitEvent, LevelShutdownEvent, LifecycleRegistries,
    PluginLoadedEvent, PluginUnloadedEvent, ServerActivateEvent, TickEvent, VersionUpdateEvent,
};
pub use registry::{
    ListenerCallback, ListenerError, ListenerRegistry, ListenerResult, RegistryStats,
};
