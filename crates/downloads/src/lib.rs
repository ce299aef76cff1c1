//! Client download bookkeeping.
//!
//! Plugins declare files clients must download through a
//! [`Downloadables`] set. The [`DownloadManager`] aggregates every
//! live set into the host's download table and re-publishes them each
//! time the server activates, since the engine-side table resets on
//! level change. Sets participate in automatic plugin cleanup: an
//! unloaded plugin's paths stop being published on the next refresh.

mod manager;
mod table;

pub use manager::{DownloadManager, Downloadables};
pub use table::{DownloadTable, LoggingDownloadTable};
