//! Plugin loading, unloading, and lifecycle bookkeeping
//!
//! A plugin is an independently loadable module resolved by name under a
//! configured base import path. Loading executes the module's init code,
//! which registers listeners and exports a namespace snapshot; unloading
//! walks every auto-unloadable resource the plugin's modules created,
//! invokes their cleanup, and evicts the modules from the loader cache so
//! no registration or cached state survives.

mod context;
mod instance;
mod loader;
mod manager;
mod namespace;

pub use context::ModuleContext;
pub use instance::{LoadedPlugin, PluginError};
pub use loader::{
    DylibModuleLoader, InProcessModuleLoader, ModuleError, ModuleInitFn, ModuleLoader,
    MODULE_INIT_SYMBOL, RESERVED_MODULES,
};
pub use manager::PluginManager;
pub use namespace::{ModuleNamespace, NamespaceValue, PluginInfo};
