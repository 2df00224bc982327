//! Restart behavior: ownership reloaded from the durable store.


use std::sync::Arc;
use std::time::Duration;

use gravity_lite::store::{MemoryStore, SqliteStore, Store};
use gravity_lite::synchronizer::{Synchronizer, SYNCHRONIZER_COLUMN};
use test_harness::{assert_consistent, test_config, TestCoordinator};

const TIMEOUT: Duration = Duration::from_secs(5);

fn seed(store: &dyn Store, id: &str, record: &str) {
    store
        .put(SYNCHRONIZER_COLUMN, id.as_bytes(), record.as_bytes())
        .unwrap();
}

fn stored(store: &dyn Store, id: &str) -> Option<Synchronizer> {
    store
        .get(SYNCHRONIZER_COLUMN, id.as_bytes())
        .unwrap()
        .map(|data| Synchronizer::decode(&data).unwrap())
}

#[tokio::test]
async fn test_recovered_owners_are_adopted() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), "A", r#"{"id":"A","pipelines":[1,2]}"#);
    seed(store.as_ref(), "B", r#"{"id":"B","pipelines":[3]}"#);

    let coordinator = TestCoordinator::with_store(test_config(4), store).await;
    let pipelines = coordinator.controller.pipelines();
    assert!(pipelines.pipeline(1).await.unwrap().is_owned_by("A"));
    assert!(pipelines.pipeline(2).await.unwrap().is_owned_by("A"));
    assert!(pipelines.pipeline(3).await.unwrap().is_owned_by("B"));
    assert_eq!(coordinator.controller.client_count().await, 2);

    // Only the unowned pipeline needs a remote call; B has the lower load.
    assert!(coordinator.wait_all_assigned(TIMEOUT).await);
    assert_eq!(coordinator.transport.assigns(), vec![("B".to_string(), 0)]);
    assert_consistent(&coordinator.controller).await;
}

#[tokio::test]
async fn test_fully_owned_restart_makes_no_remote_calls() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), "A", r#"{"id":"A","pipelines":[0,1]}"#);
    seed(store.as_ref(), "B", r#"{"id":"B","pipelines":[2]}"#);

    let coordinator = TestCoordinator::with_store(test_config(3), store).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(coordinator.transport.calls(), 0);
    assert_eq!(coordinator.assigned_count().await, 3);
    assert_eq!(coordinator.controller.pipelines().pending_tasks(), 0);
}

#[tokio::test]
async fn test_restore_drops_invalid_claims() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), "A", r#"{"id":"A","pipelines":[0,9,0,null]}"#);
    seed(store.as_ref(), "B", r#"{"id":"B","pipelines":[0,1]}"#);
    seed(store.as_ref(), "C", "not json");

    let coordinator = TestCoordinator::with_store(test_config(2), store.clone()).await;

    // A loads first and keeps 0; B's duplicate claim and A's out-of-range 9 go.
    assert_eq!(stored(store.as_ref(), "A").unwrap().pipeline_ids, vec![0]);
    assert_eq!(stored(store.as_ref(), "B").unwrap().pipeline_ids, vec![1]);
    assert_eq!(coordinator.controller.client_count().await, 2);
    assert_eq!(coordinator.transport.calls(), 0);
    assert_consistent(&coordinator.controller).await;
}

#[tokio::test]
async fn test_sqlite_restart_preserves_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datastore").join("controller.db");

    let before = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let mut coordinator = TestCoordinator::with_store(test_config(8), store).await;
        coordinator.controller.register("A").await.unwrap();
        coordinator.controller.register("B").await.unwrap();
        assert!(coordinator.wait_all_assigned(TIMEOUT).await);

        let owners = coordinator.controller.pipelines().pipelines().await;
        coordinator.stop().await;
        owners
    };

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let coordinator = TestCoordinator::with_store(test_config(8), store).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = coordinator.controller.pipelines().pipelines().await;
    for (old, new) in before.iter().zip(after.iter()) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.owner, new.owner);
    }
    assert_eq!(coordinator.transport.calls(), 0);
    assert_consistent(&coordinator.controller).await;
}

#[tokio::test]
async fn test_unregistered_synchronizer_is_not_restored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("controller.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let mut coordinator = TestCoordinator::with_store(test_config(4), store).await;
        coordinator.controller.register("A").await.unwrap();
        coordinator.controller.register("B").await.unwrap();
        assert!(coordinator.wait_all_assigned(TIMEOUT).await);
        coordinator.controller.unregister("A").await.unwrap();
        assert!(coordinator.wait_all_assigned(TIMEOUT).await);
        coordinator.stop().await;
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let coordinator = TestCoordinator::with_store(test_config(4), store).await;
    assert_eq!(coordinator.controller.client_count().await, 1);
    assert_eq!(
        coordinator.controller.get_pipelines("B").await.unwrap(),
        vec![0, 1, 2, 3]
    );
}
