//! Core building blocks shared by the scripting layer
//!
//! Provides the `Unloadable` capability for resources that must release
//! state when their owning plugin unloads, the registry that tracks those
//! resources per code unit, and the error reporting collaborator used to
//! isolate failures at lifecycle boundaries.

mod report;
mod unload;

pub use report::{ErrorReporter, RecordingReporter, TracingReporter};
pub use unload::{AutoUnloadRegistry, UnloadError, Unloadable};
