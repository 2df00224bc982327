use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::{ControllerError, Result};
use crate::store::{Store, StoreError};
use crate::synchronizer::client::SynchronizerClient;
use crate::synchronizer::record::Synchronizer;
use crate::transport::Transport;

/// Store column holding one JSON record per synchronizer, keyed by ID.
pub const SYNCHRONIZER_COLUMN: &str = "synchronizers";

/// Registry of live synchronizers and their durable ownership records.
///
/// Registry mutations take the write lock and persist the affected record
/// before releasing it, so the store never lags an observed in-memory state.
/// Reads take the shared lock and hand out owned snapshots.
pub struct SynchronizerManager {
    synchronizers: RwLock<BTreeMap<String, Synchronizer>>,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
}

impl SynchronizerManager {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            synchronizers: RwLock::new(BTreeMap::new()),
            store,
            transport,
            request_timeout,
        }
    }

    /// Rebuild the registry from durable records.
    ///
    /// Returns every recovered `(pipeline_id, synchronizer_id)` pair so the
    /// pipeline registry can adopt the same ownership. No remote calls are
    /// made. Pipeline IDs outside `0..pipeline_count`, or already claimed by
    /// an earlier record, are dropped and the cleaned record is written back.
    pub async fn restore(&self, pipeline_count: u64) -> Result<Vec<(u64, String)>> {
        tracing::info!("Restoring synchronizers from store");

        let rows = self
            .blocking(|store| {
                let mut rows: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
                store.list(SYNCHRONIZER_COLUMN, b"", &mut |key, value| {
                    rows.push((key.to_vec(), value.to_vec()));
                    true
                })?;
                Ok(rows)
            })
            .await?;

        let mut synchronizers = self.synchronizers.write().await;
        let mut claimed: HashMap<u64, String> = HashMap::new();
        let mut recovered = Vec::new();

        for (key, value) in rows {
            let stored = match Synchronizer::decode(&value) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::error!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "Skipping undecodable synchronizer record"
                    );
                    continue;
                }
            };

            let id = if stored.id.is_empty() {
                String::from_utf8_lossy(&key).into_owned()
            } else {
                stored.id.clone()
            };

            let mut synchronizer = Synchronizer::new(id.clone());
            let mut dirty = false;

            for pipeline_id in stored.pipeline_ids {
                if pipeline_id >= pipeline_count {
                    tracing::warn!(
                        synchronizer_id = %id,
                        pipeline_id,
                        pipeline_count,
                        "Dropping recovered pipeline outside configured range"
                    );
                    dirty = true;
                    continue;
                }
                if let Some(owner) = claimed.get(&pipeline_id) {
                    tracing::warn!(
                        synchronizer_id = %id,
                        pipeline_id,
                        owner = %owner,
                        "Dropping recovered pipeline already owned by another synchronizer"
                    );
                    dirty = true;
                    continue;
                }
                if !synchronizer.add_pipeline(pipeline_id) {
                    dirty = true;
                    continue;
                }
                claimed.insert(pipeline_id, id.clone());
                recovered.push((pipeline_id, id.clone()));
            }

            if dirty {
                self.persist(&synchronizer).await?;
            }

            tracing::info!(
                synchronizer_id = %id,
                pipelines = synchronizer.load(),
                "Restored synchronizer"
            );
            synchronizers.insert(id, synchronizer);
        }

        Ok(recovered)
    }

    /// Register a synchronizer. Registering a known ID returns the existing
    /// record untouched.
    pub async fn register(&self, synchronizer_id: &str) -> Result<Synchronizer> {
        let mut synchronizers = self.synchronizers.write().await;
        if let Some(existing) = synchronizers.get(synchronizer_id) {
            return Ok(existing.clone());
        }

        let synchronizer = Synchronizer::new(synchronizer_id);
        synchronizers.insert(synchronizer_id.to_string(), synchronizer.clone());
        tracing::info!(synchronizer_id, "Registered synchronizer");

        self.persist(&synchronizer).await?;
        Ok(synchronizer)
    }

    /// Remove a synchronizer and its durable record.
    ///
    /// Returns the pipelines it owned, which the caller must release. An
    /// unknown ID is a no-op.
    pub async fn unregister(&self, synchronizer_id: &str) -> Result<Vec<u64>> {
        let mut synchronizers = self.synchronizers.write().await;
        if !synchronizers.contains_key(synchronizer_id) {
            tracing::debug!(synchronizer_id, "Unregister for unknown synchronizer ignored");
            return Ok(Vec::new());
        }

        let key = synchronizer_id.to_string();
        self.blocking(move |store| store.delete(SYNCHRONIZER_COLUMN, key.as_bytes()))
            .await?;
        let released = synchronizers
            .remove(synchronizer_id)
            .map(|s| s.pipeline_ids)
            .unwrap_or_default();

        tracing::info!(
            synchronizer_id,
            released = released.len(),
            "Unregistered synchronizer"
        );
        Ok(released)
    }

    /// Snapshot of every registered synchronizer, ordered by ID.
    pub async fn synchronizers(&self) -> Vec<Synchronizer> {
        self.synchronizers.read().await.values().cloned().collect()
    }

    pub async fn synchronizer(&self, synchronizer_id: &str) -> Option<Synchronizer> {
        self.synchronizers.read().await.get(synchronizer_id).cloned()
    }

    pub async fn contains(&self, synchronizer_id: &str) -> bool {
        self.synchronizers.read().await.contains_key(synchronizer_id)
    }

    pub async fn count(&self) -> usize {
        self.synchronizers.read().await.len()
    }

    /// The synchronizer owning the fewest pipelines. Ties go to the lowest ID.
    pub async fn least_loaded(&self) -> Option<Synchronizer> {
        self.synchronizers
            .read()
            .await
            .values()
            .min_by_key(|s| s.load())
            .cloned()
    }

    /// Record that `target` now owns `pipeline_id`, removing it from
    /// `previous` in the same critical section.
    ///
    /// Returns `Ok(false)` without changing anything when `target` is no
    /// longer registered. Local state is updated before the store write, so
    /// a store error leaves the registry committed and is only reported.
    pub async fn commit_assignment(
        &self,
        target: &str,
        pipeline_id: u64,
        previous: Option<&str>,
    ) -> Result<bool> {
        let mut synchronizers = self.synchronizers.write().await;
        if !synchronizers.contains_key(target) {
            return Ok(false);
        }

        let mut dirty = Vec::with_capacity(2);
        if let Some(previous) = previous.filter(|p| *p != target) {
            if let Some(old) = synchronizers.get_mut(previous) {
                if old.remove_pipeline(pipeline_id) {
                    dirty.push(old.clone());
                }
            }
        }
        if let Some(new) = synchronizers.get_mut(target) {
            if new.add_pipeline(pipeline_id) {
                dirty.push(new.clone());
            }
        }

        for synchronizer in &dirty {
            self.persist(synchronizer).await?;
        }
        Ok(true)
    }

    /// Drop `pipeline_id` from a synchronizer's owned set.
    ///
    /// Returns `Ok(false)` when the synchronizer is unknown or does not own it.
    pub async fn remove_pipeline(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<bool> {
        let mut synchronizers = self.synchronizers.write().await;
        let Some(synchronizer) = synchronizers.get_mut(synchronizer_id) else {
            return Ok(false);
        };
        if !synchronizer.remove_pipeline(pipeline_id) {
            return Ok(false);
        }

        let snapshot = synchronizer.clone();
        self.persist(&snapshot).await?;
        Ok(true)
    }

    /// Remote-call wrapper for `synchronizer_id`. Does not check registration.
    pub fn client(&self, synchronizer_id: &str) -> SynchronizerClient {
        SynchronizerClient::new(
            synchronizer_id,
            self.transport.clone(),
            self.request_timeout,
        )
    }

    async fn persist(&self, synchronizer: &Synchronizer) -> Result<()> {
        let data = synchronizer.encode()?;
        let key = synchronizer.id.clone();
        self.blocking(move |store| store.put(SYNCHRONIZER_COLUMN, key.as_bytes(), &data))
            .await
    }

    /// Run a store operation on the blocking pool. Store backends do
    /// synchronous file I/O and must not stall the async workers.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn Store) -> std::result::Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let out = tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| ControllerError::Internal(format!("store task failed: {}", e)))??;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that fails every call; the registry never talks to it.
    struct NoTransport;

    #[tonic::async_trait]
    impl Transport for NoTransport {
        async fn call(
            &self,
            target: &str,
            method: &str,
            _payload: Vec<u8>,
            _timeout: Duration,
        ) -> Result<Vec<u8>> {
            Err(ControllerError::Transport(format!(
                "unexpected {} to {}",
                method, target
            )))
        }
    }

    fn manager_with(store: Arc<MemoryStore>) -> SynchronizerManager {
        SynchronizerManager::new(store, Arc::new(NoTransport), Duration::from_secs(1))
    }

    fn stored(store: &MemoryStore, id: &str) -> Option<Synchronizer> {
        store
            .get(SYNCHRONIZER_COLUMN, id.as_bytes())
            .unwrap()
            .map(|data| Synchronizer::decode(&data).unwrap())
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());

        let first = manager.register("node-a").await.unwrap();
        manager
            .commit_assignment("node-a", 4, None)
            .await
            .unwrap();
        let second = manager.register("node-a").await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.pipeline_ids.is_empty());
        assert_eq!(second.pipeline_ids, vec![4]);
        assert_eq!(manager.count().await, 1);
        assert_eq!(stored(&store, "node-a").unwrap().pipeline_ids, vec![4]);
    }

    #[tokio::test]
    async fn unregister_unknown_is_noop() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        assert!(manager.unregister("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unregister_returns_owned_pipelines_and_deletes_record() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        manager.register("node-a").await.unwrap();
        manager.commit_assignment("node-a", 3, None).await.unwrap();
        manager.commit_assignment("node-a", 7, None).await.unwrap();

        let released = manager.unregister("node-a").await.unwrap();
        assert_eq!(released, vec![3, 7]);
        assert!(manager.synchronizer("node-a").await.is_none());
        assert!(stored(&store, "node-a").is_none());
    }

    #[tokio::test]
    async fn least_loaded_prefers_fewest_then_lowest_id() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        assert!(manager.least_loaded().await.is_none());

        manager.register("node-b").await.unwrap();
        manager.register("node-a").await.unwrap();
        assert_eq!(manager.least_loaded().await.unwrap().id, "node-a");

        manager.commit_assignment("node-a", 0, None).await.unwrap();
        assert_eq!(manager.least_loaded().await.unwrap().id, "node-b");
    }

    #[tokio::test]
    async fn commit_to_unknown_target_changes_nothing() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        manager.register("node-a").await.unwrap();
        manager.commit_assignment("node-a", 1, None).await.unwrap();

        let committed = manager
            .commit_assignment("gone", 1, Some("node-a"))
            .await
            .unwrap();
        assert!(!committed);
        assert_eq!(
            manager.synchronizer("node-a").await.unwrap().pipeline_ids,
            vec![1]
        );
    }

    #[tokio::test]
    async fn commit_moves_pipeline_from_previous_owner() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        manager.register("node-a").await.unwrap();
        manager.register("node-b").await.unwrap();
        manager.commit_assignment("node-a", 5, None).await.unwrap();

        assert!(manager
            .commit_assignment("node-b", 5, Some("node-a"))
            .await
            .unwrap());
        assert!(stored(&store, "node-a").unwrap().pipeline_ids.is_empty());
        assert_eq!(stored(&store, "node-b").unwrap().pipeline_ids, vec![5]);
    }

    #[tokio::test]
    async fn remove_pipeline_is_lenient() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        assert!(!manager.remove_pipeline("ghost", 1).await.unwrap());

        manager.register("node-a").await.unwrap();
        assert!(!manager.remove_pipeline("node-a", 1).await.unwrap());

        manager.commit_assignment("node-a", 1, None).await.unwrap();
        assert!(manager.remove_pipeline("node-a", 1).await.unwrap());
        assert_eq!(manager.synchronizer("node-a").await.unwrap().load(), 0);
    }

    #[tokio::test]
    async fn restore_rebuilds_registry() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(SYNCHRONIZER_COLUMN, b"A", br#"{"id":"A","pipelines":[1,2]}"#)
            .unwrap();
        store
            .put(SYNCHRONIZER_COLUMN, b"B", br#"{"id":"B","pipelines":[3]}"#)
            .unwrap();

        let manager = manager_with(store);
        let mut recovered = manager.restore(256).await.unwrap();
        recovered.sort();

        assert_eq!(
            recovered,
            vec![(1, "A".to_string()), (2, "A".to_string()), (3, "B".to_string())]
        );
        assert_eq!(manager.synchronizer("A").await.unwrap().pipeline_ids, vec![1, 2]);
        assert_eq!(manager.synchronizer("B").await.unwrap().pipeline_ids, vec![3]);
    }

    #[tokio::test]
    async fn restore_drops_out_of_range_and_duplicate_claims() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(SYNCHRONIZER_COLUMN, b"A", br#"{"id":"A","pipelines":[1,9]}"#)
            .unwrap();
        store
            .put(SYNCHRONIZER_COLUMN, b"B", br#"{"id":"B","pipelines":[1,2]}"#)
            .unwrap();
        store.put(SYNCHRONIZER_COLUMN, b"C", b"garbage").unwrap();

        let manager = manager_with(store.clone());
        let recovered = manager.restore(4).await.unwrap();

        assert_eq!(recovered, vec![(1, "A".to_string()), (2, "B".to_string())]);
        assert_eq!(stored(&store, "A").unwrap().pipeline_ids, vec![1]);
        assert_eq!(stored(&store, "B").unwrap().pipeline_ids, vec![2]);
        assert!(manager.synchronizer("C").await.is_none());
    }

    /// Memory store whose writes take a while, like a slow disk.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl Store for SlowStore {
        fn put(&self, column: &str, key: &[u8], value: &[u8]) -> crate::store::Result<()> {
            std::thread::sleep(self.delay);
            self.inner.put(column, key, value)
        }

        fn get(&self, column: &str, key: &[u8]) -> crate::store::Result<Option<Vec<u8>>> {
            self.inner.get(column, key)
        }

        fn delete(&self, column: &str, key: &[u8]) -> crate::store::Result<()> {
            std::thread::sleep(self.delay);
            self.inner.delete(column, key)
        }

        fn list(
            &self,
            column: &str,
            prefix: &[u8],
            visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool,
        ) -> crate::store::Result<()> {
            self.inner.list(column, prefix, visitor)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn store_writes_do_not_block_the_runtime() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(200),
        });
        let manager =
            SynchronizerManager::new(store.clone(), Arc::new(NoTransport), Duration::from_secs(1));

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        manager.register("node-a").await.unwrap();
        manager.unregister("node-a").await.unwrap();
        ticker.abort();

        // A write on the only runtime thread would starve the ticker.
        assert!(ticks.load(Ordering::SeqCst) >= 10);
        assert!(store.inner.get(SYNCHRONIZER_COLUMN, b"node-a").unwrap().is_none());
    }
}
