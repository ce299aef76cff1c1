use crate::table::DownloadTable;
use async_trait::async_trait;
use listener_system::{LifecycleRegistries, ServerActivateEvent};
use script_core::{AutoUnloadRegistry, UnloadError, Unloadable};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Aggregates every live download set into the host's download table.
pub struct DownloadManager {
    table: Arc<dyn DownloadTable>,
    sets: Mutex<Vec<Arc<Downloadables>>>,
    attached: AtomicBool,
}

impl DownloadManager {
    pub fn new(table: Arc<dyn DownloadTable>) -> Arc<Self> {
        Arc::new(Self {
            table,
            sets: Mutex::new(Vec::new()),
            attached: AtomicBool::new(false),
        })
    }

    /// Re-publish all sets whenever the server activates. The engine
    /// table is wiped on level change, so everything goes back in.
    /// Attaching more than once is a no-op; the refresh listener lives
    /// for the process lifetime.
    pub async fn attach(self: &Arc<Self>, registries: &LifecycleRegistries) {
        if self.attached.swap(true, Ordering::SeqCst) {
            warn!("download refresh listener is already attached");
            return;
        }
        let manager = self.clone();
        let result = registries
            .server_activate
            .register(Arc::new(move |_: &ServerActivateEvent| {
                manager.refresh();
                Ok(())
            }))
            .await;
        if let Err(e) = result {
            self.attached.store(false, Ordering::SeqCst);
            error!("failed to attach download refresh listener: {}", e);
        }
    }

    /// Push every path from every live set into the table.
    pub fn refresh(&self) {
        let sets = locked(&self.sets).clone();
        let mut published = 0usize;
        for set in &sets {
            for path in set.paths() {
                self.table.add_path(&path);
                published += 1;
            }
        }
        info!("published {} download paths from {} sets", published, sets.len());
    }

    pub fn set_count(&self) -> usize {
        locked(&self.sets).len()
    }

    fn adopt(&self, set: Arc<Downloadables>) {
        locked(&self.sets).push(set);
    }

    fn detach(&self, set: &Downloadables) {
        locked(&self.sets).retain(|s| !std::ptr::eq(Arc::as_ptr(s), set as *const Downloadables));
    }
}

/// One plugin's set of client download paths.
///
/// Paths are published to the table once when added and again on every
/// refresh while the set is live. Construction registers the set with
/// the manager and tracks it for cleanup under the owning module, so
/// unloading the plugin detaches it.
pub struct Downloadables {
    manager: Arc<DownloadManager>,
    paths: Mutex<HashSet<String>>,
}

impl Downloadables {
    pub fn new(
        manager: Arc<DownloadManager>,
        auto_unload: &AutoUnloadRegistry,
        module_path: &str,
    ) -> Arc<Self> {
        let set = Arc::new(Self {
            manager: manager.clone(),
            paths: Mutex::new(HashSet::new()),
        });
        manager.adopt(set.clone());
        auto_unload.track(module_path, set.clone());
        set
    }

    /// Add a path, publishing it immediately. Duplicates are ignored.
    pub fn add(&self, path: &str) {
        if locked(&self.paths).insert(path.to_string()) {
            debug!("📝 download path added: {}", path);
            self.manager.table.add_path(path);
        }
    }

    /// Drop a path from the set. It stays in the engine table until the
    /// next level change, matching how the table itself behaves.
    pub fn remove(&self, path: &str) -> bool {
        locked(&self.paths).remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        locked(&self.paths).contains(path)
    }

    pub fn paths(&self) -> Vec<String> {
        locked(&self.paths).iter().cloned().collect()
    }
}

#[async_trait]
impl Unloadable for Downloadables {
    async fn unload(&self) -> Result<(), UnloadError> {
        self.manager.detach(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_core::RecordingReporter;

    #[derive(Default)]
    struct CollectingTable {
        entries: Mutex<Vec<String>>,
    }

    impl CollectingTable {
        fn entries(&self) -> Vec<String> {
            locked(&self.entries).clone()
        }
    }

    impl DownloadTable for CollectingTable {
        fn add_path(&self, path: &str) {
            locked(&self.entries).push(path.to_string());
        }
    }

    fn harness() -> (
        Arc<CollectingTable>,
        Arc<DownloadManager>,
        Arc<AutoUnloadRegistry>,
    ) {
        let table = Arc::new(CollectingTable::default());
        let manager = DownloadManager::new(table.clone());
        (table, manager, Arc::new(AutoUnloadRegistry::new()))
    }

    #[tokio::test]
    async fn added_paths_publish_once_and_dedup() {
        let (table, manager, auto_unload) = harness();
        let set = Downloadables::new(manager, &auto_unload, "plugins.sounds");

        set.add("sound/chime.wav");
        set.add("sound/chime.wav");
        set.add("models/crate.mdl");

        assert_eq!(table.entries(), ["sound/chime.wav", "models/crate.mdl"]);
        assert!(set.contains("sound/chime.wav"));
    }

    #[tokio::test]
    async fn server_activate_republishes_every_live_set() {
        let (table, manager, auto_unload) = harness();
        let reporter = Arc::new(RecordingReporter::new());
        let registries = LifecycleRegistries::new(reporter);
        manager.attach(&registries).await;

        let set = Downloadables::new(manager, &auto_unload, "plugins.sounds");
        set.add("sound/chime.wav");

        registries
            .server_activate
            .notify(&ServerActivateEvent {
                map_name: "de_test".into(),
                max_clients: 16,
            })
            .await;

        // Once on add, once on refresh.
        assert_eq!(table.entries(), ["sound/chime.wav", "sound/chime.wav"]);
    }

    #[tokio::test]
    async fn repeated_attach_installs_a_single_refresh_listener() {
        let (table, manager, auto_unload) = harness();
        let reporter = Arc::new(RecordingReporter::new());
        let registries = LifecycleRegistries::new(reporter);
        manager.attach(&registries).await;
        manager.attach(&registries).await;
        assert_eq!(registries.server_activate.listener_count().await, 1);

        let set = Downloadables::new(manager, &auto_unload, "plugins.sounds");
        set.add("sound/chime.wav");

        registries
            .server_activate
            .notify(&ServerActivateEvent {
                map_name: "de_test".into(),
                max_clients: 16,
            })
            .await;

        // Once on add, once from the single refresh listener.
        assert_eq!(table.entries(), ["sound/chime.wav", "sound/chime.wav"]);
    }

    #[tokio::test]
    async fn unloaded_sets_drop_out_of_the_refresh() {
        let (table, manager, auto_unload) = harness();
        let set = Downloadables::new(manager.clone(), &auto_unload, "plugins.sounds");
        set.add("sound/chime.wav");
        assert_eq!(manager.set_count(), 1);

        for resource in auto_unload.take("plugins.sounds") {
            resource.unload().await.unwrap();
        }
        assert_eq!(manager.set_count(), 0);

        manager.refresh();
        assert_eq!(table.entries(), ["sound/chime.wav"]);
    }

    #[tokio::test]
    async fn independent_sets_refresh_together() {
        let (table, manager, auto_unload) = harness();
        let sounds = Downloadables::new(manager.clone(), &auto_unload, "plugins.sounds");
        let models = Downloadables::new(manager.clone(), &auto_unload, "plugins.models");
        sounds.add("sound/chime.wav");
        models.add("models/crate.mdl");

        manager.refresh();
        let mut refreshed = table.entries().split_off(2);
        refreshed.sort();
        assert_eq!(refreshed, ["models/crate.mdl", "sound/chime.wav"]);
    }
}
