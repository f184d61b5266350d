//! Watch loops driven by real change sources.

use proptree_store::{CoordinationClient, PropertyTreeStore};
use proptree_watch::{ChangeWatchLoop, ReloadFn, WatchExit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn counter() -> (Arc<AtomicUsize>, ReloadFn) {
    let count = Arc::new(AtomicUsize::new(0));
    let reload_count = count.clone();
    let reload: ReloadFn = Arc::new(move || {
        reload_count.fetch_add(1, Ordering::SeqCst);
    });
    (count, reload)
}

async fn wait_for(count: &AtomicUsize, at_least: usize) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while count.load(Ordering::SeqCst) < at_least {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_file_modification_triggers_reload() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.properties");
    std::fs::write(&file, "a=1\n").unwrap();

    let (count, reload) = counter();
    let cancel = CancellationToken::new();
    let handle = ChangeWatchLoop::for_file(&file, reload, cancel.clone())
        .unwrap()
        .spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&file, "a=2\n").unwrap();

    assert!(wait_for(&count, 1).await, "reload was not triggered");

    cancel.cancel();
    let report = handle.await.unwrap();
    assert_eq!(report.exit, WatchExit::Cancelled);
    assert!(report.reloads >= 1);
}

#[tokio::test]
async fn test_sibling_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.properties");
    let sibling = dir.path().join("other.properties");
    std::fs::write(&file, "a=1\n").unwrap();

    let (count, reload) = counter();
    let cancel = CancellationToken::new();
    let handle = ChangeWatchLoop::for_file(&file, reload, cancel.clone())
        .unwrap()
        .spawn();

    std::fs::write(&sibling, "b=1\n").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    cancel.cancel();
    let report = handle.await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(report.reloads, 0);
}

#[tokio::test]
async fn test_watch_missing_directory_fails() {
    let (_, reload) = counter();
    let result = ChangeWatchLoop::for_file(
        std::path::Path::new("/definitely/not/here/app.properties"),
        reload,
        CancellationToken::new(),
    );
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_node_watch_reloads_on_group_update() {
    let client = Arc::new(CoordinationClient::connect_to("memory://").await.unwrap());
    let store = PropertyTreeStore::new(client.clone());
    store.create_property("/u1/v1/g1/k1", Some("1")).await;
    store.create_property("/u1/v1/g2/k1", Some("1")).await;

    let (count, reload) = counter();
    let cancel = CancellationToken::new();
    let handle = ChangeWatchLoop::for_node(&client, "/u1/v1", "g1", reload, cancel.clone())
        .await
        .expect("node exists")
        .spawn();

    store.update_property("/u1/v1/g2/k1", "2").await;
    store.create_property("/u1/v1/g1/k2", Some("new")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    store.update_property("/u1/v1/g1/k1", "2").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    cancel.cancel();
    let report = handle.await.unwrap();
    assert_eq!(report.exit, WatchExit::Cancelled);
    assert_eq!(report.reloads, 1);
}

#[tokio::test]
async fn test_node_watch_ends_when_node_deleted() {
    let client = Arc::new(CoordinationClient::connect_to("memory://").await.unwrap());
    let store = PropertyTreeStore::new(client.clone());
    store.create_property("/u1/v1/g1/k1", Some("1")).await;

    let (_, reload) = counter();
    let handle = ChangeWatchLoop::for_node(&client, "/u1/v1", "g1", reload, CancellationToken::new())
        .await
        .expect("node exists")
        .spawn();

    store.delete_property("/u1/v1").await;

    let report = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop")
        .unwrap();
    assert!(matches!(
        report.exit,
        WatchExit::SourceClosed | WatchExit::RearmFailed
    ));
    assert_eq!(report.reloads, 0);
}

#[tokio::test]
async fn test_node_watch_on_missing_node() {
    let client = CoordinationClient::connect_to("memory://").await.unwrap();
    let (_, reload) = counter();
    let watch =
        ChangeWatchLoop::for_node(&client, "/missing", "g1", reload, CancellationToken::new()).await;
    assert!(watch.is_none());
}

#[tokio::test]
async fn test_surreal_node_watch_reloads_and_stops_on_close() {
    let client = Arc::new(CoordinationClient::connect_to("mem://").await.unwrap());
    let store = PropertyTreeStore::new(client.clone());
    assert!(store.create_property("/u1/v1/g1/k1", Some("1")).await);
    assert!(store.create_property("/u1/v1/g2/k1", Some("1")).await);

    let (count, reload) = counter();
    let watch = ChangeWatchLoop::for_node(&client, "/u1/v1", "g1", reload, CancellationToken::new())
        .await
        .unwrap();
    let handle = watch.spawn();

    assert!(store.update_property("/u1/v1/g2/k1", "2").await);
    assert!(store.update_property("/u1/v1/g1/k1", "2").await);
    assert!(wait_for(&count, 1).await, "reload was not triggered");

    client.close().await;
    let report = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop once the session is closed")
        .unwrap();
    assert!(matches!(
        report.exit,
        WatchExit::SourceClosed | WatchExit::RearmFailed
    ));
    assert_eq!(report.reloads, 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
