//! Self re-arming change observer.
//!
//! A [`ChangeWatchLoop`] is the sole consumer of one [`WatchKey`]. It waits for
//! a batch, invokes the reload callback for every modification of its target,
//! then re-arms the key before waiting again:
//!
//! ```text
//!   Running --batch--> Processing --> Rearm --reset ok--> Running
//!      |                                 |
//!      +--cancel / source closed--+      +--reset failed--+
//!                                 v                       v
//!                             Terminated <----------------+
//! ```
//!
//! Re-arm failure is terminal; the loop does not retry or restart itself.

use proptree_core::error::Result;
use proptree_core::{WatchEvent, WatchEventKind, WatchKey};
use proptree_store::CoordinationClient;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::file_source;

/// Zero-argument reload operation. Must tolerate being called repeatedly.
pub type ReloadFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Processing,
    Rearm,
    Terminated,
}

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// Cancellation was requested.
    Cancelled,
    /// The key could not be re-armed after a batch.
    RearmFailed,
    /// The key was invalidated while the loop was waiting.
    SourceClosed,
}

/// Outcome of a finished loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchReport {
    pub exit: WatchExit,
    pub batches: u64,
    pub reloads: u64,
}

/// Observer for a single watched target.
pub struct ChangeWatchLoop {
    key: WatchKey,
    target: String,
    reload: ReloadFn,
    cancel: CancellationToken,
    state: LoopState,
    batches: u64,
    reloads: u64,
}

impl ChangeWatchLoop {
    /// Build a loop over an existing key.
    ///
    /// `target` is matched against event contexts: an event qualifies if its
    /// context equals `target` or lies beneath it (`target/...`).
    pub fn new(
        key: WatchKey,
        target: impl Into<String>,
        reload: ReloadFn,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key,
            target: target.into(),
            reload,
            cancel,
            state: LoopState::Running,
            batches: 0,
            reloads: 0,
        }
    }

    /// Watch a local file for content modifications.
    pub fn for_file(path: &Path, reload: ReloadFn, cancel: CancellationToken) -> Result<Self> {
        let watch = file_source::watch_file(path)?;
        Ok(Self::new(watch.key, watch.target, reload, cancel))
    }

    /// Watch `node` in the coordination store for modifications under `target`.
    ///
    /// Returns `None` if the node does not exist or the watch cannot be registered.
    pub async fn for_node(
        client: &CoordinationClient,
        node: &str,
        target: impl Into<String>,
        reload: ReloadFn,
        cancel: CancellationToken,
    ) -> Option<Self> {
        let key = client.watch(node).await?;
        Some(Self::new(key, target, reload, cancel))
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run on a dedicated task.
    pub fn spawn(self) -> JoinHandle<WatchReport> {
        tokio::spawn(self.run())
    }

    /// Run until cancelled, the source closes, or re-arming fails.
    pub async fn run(mut self) -> WatchReport {
        info!("Watching {} for changes to {}", self.key.watched(), self.target);

        let exit = loop {
            self.transition(LoopState::Running);

            let batch = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break WatchExit::Cancelled,
                batch = self.key.take() => batch,
            };
            let Some(batch) = batch else {
                break WatchExit::SourceClosed;
            };

            self.transition(LoopState::Processing);
            self.batches += 1;
            self.process(&batch);

            self.transition(LoopState::Rearm);
            if !self.key.reset() {
                warn!("Failed to re-arm watch on {}, stopping", self.key.watched());
                break WatchExit::RearmFailed;
            }
        };

        self.transition(LoopState::Terminated);
        self.key.cancel();
        info!(
            "Stopped watching {} ({:?}, {} reloads)",
            self.target, exit, self.reloads
        );

        WatchReport {
            exit,
            batches: self.batches,
            reloads: self.reloads,
        }
    }

    fn process(&mut self, batch: &[WatchEvent]) {
        for event in batch {
            if event.kind == WatchEventKind::Modified && self.matches(&event.context) {
                debug!("{} modified, reloading", event.context);
                (self.reload)();
                self.reloads += 1;
            } else {
                debug!("Ignoring {:?} on {}", event.kind, event.context);
            }
        }
    }

    fn matches(&self, context: &str) -> bool {
        context == self.target
            || context
                .strip_prefix(self.target.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!("Watch {}: {:?} -> {:?}", self.target, self.state, next);
            self.state = next;
        }
    }
}

impl std::fmt::Debug for ChangeWatchLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatchLoop")
            .field("key", &self.key)
            .field("target", &self.target)
            .field("state", &self.state)
            .field("reloads", &self.reloads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptree_core::watch_key;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, ReloadFn) {
        let count = Arc::new(AtomicUsize::new(0));
        let reload_count = count.clone();
        let reload: ReloadFn = Arc::new(move || {
            reload_count.fetch_add(1, Ordering::SeqCst);
        });
        (count, reload)
    }

    #[test]
    fn test_target_matching() {
        let (key, _signal) = watch_key("/u1/v1");
        let (_, reload) = counter();
        let watch = ChangeWatchLoop::new(key, "g1", reload, CancellationToken::new());

        assert!(watch.matches("g1"));
        assert!(watch.matches("g1/k1"));
        assert!(!watch.matches("g10"));
        assert!(!watch.matches("g2/g1"));
        assert_eq!(watch.state(), LoopState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_events_do_not_reload() {
        let (key, signal) = watch_key("/etc");
        let (count, reload) = counter();
        let cancel = CancellationToken::new();
        let handle = ChangeWatchLoop::new(key, "app.properties", reload, cancel.clone()).spawn();

        signal.signal(WatchEvent::created("app.properties"));
        signal.signal(WatchEvent::modified("other.properties"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(report.exit, WatchExit::Cancelled);
        assert_eq!(report.batches, 1);
        assert_eq!(report.reloads, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_modification_reloads_and_rearms() {
        let (key, signal) = watch_key("/etc");
        let (count, reload) = counter();
        let cancel = CancellationToken::new();
        let handle = ChangeWatchLoop::new(key, "app.properties", reload, cancel.clone()).spawn();

        signal.signal(WatchEvent::modified("app.properties"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        signal.signal(WatchEvent::modified("app.properties"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.exit, WatchExit::Cancelled);
        assert_eq!(report.reloads, 2);
    }

    #[tokio::test]
    async fn test_cancel_while_blocked_never_reloads() {
        let (key, _signal) = watch_key("/etc");
        let (count, reload) = counter();
        let cancel = CancellationToken::new();
        let handle = ChangeWatchLoop::new(key, "app.properties", reload, cancel.clone()).spawn();

        tokio::task::yield_now().await;
        cancel.cancel();

        let report = handle.await.unwrap();
        assert_eq!(report.exit, WatchExit::Cancelled);
        assert_eq!(report.batches, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rearm_failure_terminates() {
        let (key, signal) = watch_key("/etc");
        let (count, reload) = counter();

        signal.signal(WatchEvent::modified("app.properties"));
        signal.invalidate();

        let report = ChangeWatchLoop::new(key, "app.properties", reload, CancellationToken::new())
            .run()
            .await;

        assert_eq!(report.exit, WatchExit::RearmFailed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_source_terminates() {
        let (key, signal) = watch_key("/etc");
        let (_, reload) = counter();
        signal.invalidate();

        let report = ChangeWatchLoop::new(key, "app.properties", reload, CancellationToken::new())
            .run()
            .await;

        assert_eq!(report.exit, WatchExit::SourceClosed);
        assert_eq!(report.batches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_matches_in_one_batch() {
        let (key, signal) = watch_key("/u1/v1");
        let (count, reload) = counter();
        let cancel = CancellationToken::new();

        signal.signal(WatchEvent::modified("g1/k1"));
        signal.signal(WatchEvent::modified("g1/k2"));
        signal.signal(WatchEvent::deleted("g1/k3"));

        let handle = ChangeWatchLoop::new(key, "g1", reload, cancel.clone()).spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let report = handle.await.unwrap();
        assert_eq!(report.batches, 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
