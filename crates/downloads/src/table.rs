//! Host-side download table sink.

use tracing::debug;

/// Destination the manager publishes download paths into. Hosts back
/// this with whatever their engine exposes as the downloadables table.
pub trait DownloadTable: Send + Sync {
    fn add_path(&self, path: &str);
}

/// Table that only logs what would be published. Used when the host
/// has no real engine table wired up.
#[derive(Default)]
pub struct LoggingDownloadTable;

impl LoggingDownloadTable {
    pub fn new() -> Self {
        Self
    }
}

impl DownloadTable for LoggingDownloadTable {
    fn add_path(&self, path: &str) {
        debug!("📤 download table entry: {}", path);
    }
}
