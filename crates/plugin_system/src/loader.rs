//! Module loading collaborators
//!
//! A module loader resolves dotted module paths to loadable code units,
//! executes their init code, and keeps a cache of what is currently
//! loaded so the plugin manager can enumerate and evict a plugin's
//! modules during cleanup. Two implementations ship here: one backed by
//! dynamic libraries for out-of-tree plugins, and an in-process one for
//! embedded hosts and tests.

use crate::context::ModuleContext;
use crate::namespace::ModuleNamespace;
use async_trait::async_trait;
use dashmap::DashMap;
use libloading::Library;
use listener_system::ListenerError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Module names owned by the framework itself. Plugins must not shadow
/// them; the loaders reject the collision up front so the manager can
/// log a dedicated message instead of a raw load error.
pub const RESERVED_MODULES: &[&str] = &["core", "listeners", "plugins", "downloads", "config"];

/// Exported symbol every dylib plugin module must provide.
pub const MODULE_INIT_SYMBOL: &[u8] = b"sparkplug_module_init";

/// Signature of the exported module init function.
///
/// Returns the module's exported namespace, or null when init failed
/// (the module is expected to log its own failure before returning).
pub type ModuleInitFn = unsafe extern "C" fn(*const ModuleContext) -> *mut ModuleNamespace;

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// No loadable unit exists for the path. The expected "plugin does
    /// not exist" outcome, never reported as a failure.
    #[error("module not found: {0}")]
    NotFound(String),
    /// The module's name collides with a reserved framework module.
    #[error("'{0}' collides with a reserved module name")]
    ReservedName(String),
    /// The module was found but its init code failed.
    #[error("module execution failed: {0}")]
    ExecutionFailed(String),
    /// A module tried to import outside its own dotted prefix.
    #[error("module '{0}' is outside the importing plugin's namespace")]
    OutsideNamespace(String),
}

impl From<ListenerError> for ModuleError {
    fn from(e: ListenerError) -> Self {
        ModuleError::ExecutionFailed(e.to_string())
    }
}

/// Loads, enumerates, and evicts plugin modules.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Resolve and execute the module at `module_path`.
    ///
    /// A module that starts executing is cached immediately, even when
    /// its init code later fails; the caller is responsible for cleaning
    /// up that partial state via `loaded_modules` + `evict`.
    async fn import(
        &self,
        module_path: &str,
        ctx: &ModuleContext,
    ) -> Result<ModuleNamespace, ModuleError>;

    /// Drop a module from the loaded-module cache.
    async fn evict(&self, module_path: &str);

    /// Dotted paths of every cached module equal to `prefix` or nested
    /// under `prefix.`.
    async fn loaded_modules(&self, prefix: &str) -> Vec<String>;
}

/// Last segment of a dotted module path.
fn module_stem(module_path: &str) -> &str {
    module_path.rsplit('.').next().unwrap_or(module_path)
}

/// `plugins.foo` owns `plugins.foo` and `plugins.foo.*`, but never
/// `plugins.foobar`.
fn owned_by(module_path: &str, prefix: &str) -> bool {
    module_path == prefix
        || (module_path.len() > prefix.len()
            && module_path.starts_with(prefix)
            && module_path.as_bytes()[prefix.len()] == b'.')
}

fn check_reserved(module_path: &str) -> Result<(), ModuleError> {
    let stem = module_stem(module_path);
    if RESERVED_MODULES.contains(&stem) {
        return Err(ModuleError::ReservedName(stem.to_string()));
    }
    Ok(())
}

// ============================================================================
// Dylib-backed loader
// ============================================================================

/// Loader backed by `libloading`, resolving `<dir>/<stem>.{so,dll,dylib}`.
///
/// Each loaded `Library` stays alive in the cache until eviction so the
/// module's code (including any listener callbacks it registered) stays
/// mapped while the plugin is loaded.
pub struct DylibModuleLoader {
    plugin_dir: PathBuf,
    libraries: DashMap<String, Library>,
}

impl DylibModuleLoader {
    pub fn new(plugin_dir: impl AsRef<Path>) -> Self {
        Self {
            plugin_dir: plugin_dir.as_ref().to_path_buf(),
            libraries: DashMap::new(),
        }
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    fn resolve(&self, stem: &str) -> Result<PathBuf, ModuleError> {
        for ext in ["so", "dll", "dylib"] {
            let candidate = self.plugin_dir.join(format!("{stem}.{ext}"));
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        let expected = self
            .plugin_dir
            .join(format!("{stem}.{}", std::env::consts::DLL_EXTENSION));
        Err(ModuleError::NotFound(expected.display().to_string()))
    }
}

#[async_trait]
impl ModuleLoader for DylibModuleLoader {
    async fn import(
        &self,
        module_path: &str,
        ctx: &ModuleContext,
    ) -> Result<ModuleNamespace, ModuleError> {
        check_reserved(module_path)?;
        let file_path = self.resolve(module_stem(module_path))?;
        debug!(
            "loading module '{}' from {}",
            module_path,
            file_path.display()
        );

        let library = unsafe { Library::new(&file_path) }.map_err(|e| {
            ModuleError::ExecutionFailed(format!(
                "failed to load library {}: {}",
                file_path.display(),
                e
            ))
        })?;
        let init: ModuleInitFn = unsafe {
            *library.get::<ModuleInitFn>(MODULE_INIT_SYMBOL).map_err(|e| {
                ModuleError::ExecutionFailed(format!(
                    "missing module init symbol in {}: {}",
                    file_path.display(),
                    e
                ))
            })?
        };

        // Cache before running init so a failing module leaves the same
        // partial state an interpreter's module cache would, which the
        // manager's cleanup then purges.
        self.libraries.insert(module_path.to_string(), library);

        let namespace_ptr = unsafe { init(ctx as *const ModuleContext) };
        if namespace_ptr.is_null() {
            return Err(ModuleError::ExecutionFailed(format!(
                "module init for '{}' reported failure",
                module_path
            )));
        }
        Ok(unsafe { *Box::from_raw(namespace_ptr) })
    }

    async fn evict(&self, module_path: &str) {
        if self.libraries.remove(module_path).is_some() {
            info!("evicted module '{}'", module_path);
        }
    }

    async fn loaded_modules(&self, prefix: &str) -> Vec<String> {
        self.libraries
            .iter()
            .filter(|entry| owned_by(entry.key(), prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

// ============================================================================
// In-process loader
// ============================================================================

/// Init code for an in-process module.
pub type InProcessInit =
    Arc<dyn Fn(&ModuleContext) -> Result<ModuleNamespace, ModuleError> + Send + Sync>;

/// Loader whose modules are closures registered in the host process.
///
/// Importing runs the registered init; eviction forgets the import so a
/// later import re-executes it from scratch. This is the loader embedded
/// hosts and the test suites use.
#[derive(Default)]
pub struct InProcessModuleLoader {
    modules: DashMap<String, InProcessInit>,
    imported: DashMap<String, ()>,
}

impl InProcessModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a module available under `module_path`. Replaces any
    /// previous registration for the same path.
    pub fn register_module<F>(&self, module_path: &str, init: F)
    where
        F: Fn(&ModuleContext) -> Result<ModuleNamespace, ModuleError> + Send + Sync + 'static,
    {
        self.modules.insert(module_path.to_string(), Arc::new(init));
    }
}

#[async_trait]
impl ModuleLoader for InProcessModuleLoader {
    async fn import(
        &self,
        module_path: &str,
        ctx: &ModuleContext,
    ) -> Result<ModuleNamespace, ModuleError> {
        check_reserved(module_path)?;
        let init = self
            .modules
            .get(module_path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ModuleError::NotFound(module_path.to_string()))?;

        debug!("executing in-process module '{}'", module_path);
        // Mark as imported before running init; a failing module leaves
        // partial state for the manager's cleanup to purge.
        self.imported.insert(module_path.to_string(), ());
        init(ctx)
    }

    async fn evict(&self, module_path: &str) {
        if self.imported.remove(module_path).is_some() {
            info!("evicted module '{}'", module_path);
        }
    }

    async fn loaded_modules(&self, prefix: &str) -> Vec<String> {
        self.imported
            .iter()
            .filter(|entry| owned_by(entry.key(), prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
