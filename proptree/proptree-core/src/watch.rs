//! One-shot-per-batch change notification primitive.
//!
//! A [`WatchKey`] is handed to the single consumer of a watch registration; the
//! producer side (a coordination backend or a filesystem watcher) holds the
//! matching [`WatchSignal`]. A key moves through four states:
//!
//! ```text
//!   Ready --signal--> Signalled --take--> Delivered --reset--> Ready
//!                                                    (or Signalled if events queued)
//!   any state --invalidate/cancel--> Invalid
//! ```
//!
//! Events raised while a batch is delivered but not yet re-armed are queued and
//! only handed out after [`WatchKey::reset`]. A consumer that never resets
//! never sees another batch.

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// Kind of change reported for a watched descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

/// A single change, with its context relative to the watched node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Path of the changed entry relative to the watched node (`g1/k1`, `app.properties`).
    pub context: String,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }

    pub fn created(context: impl Into<String>) -> Self {
        Self::new(WatchEventKind::Created, context)
    }

    pub fn modified(context: impl Into<String>) -> Self {
        Self::new(WatchEventKind::Modified, context)
    }

    pub fn deleted(context: impl Into<String>) -> Self {
        Self::new(WatchEventKind::Deleted, context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Ready,
    Signalled,
    Delivered,
    Invalid,
}

struct KeyInner {
    state: KeyState,
    pending: Vec<WatchEvent>,
}

struct Shared {
    inner: Mutex<KeyInner>,
    notify: Notify,
}

/// Create a connected key/signal pair for a watch on `watched`.
pub fn watch_key(watched: impl Into<String>) -> (WatchKey, WatchSignal) {
    let shared = Arc::new(Shared {
        inner: Mutex::new(KeyInner {
            state: KeyState::Ready,
            pending: Vec::new(),
        }),
        notify: Notify::new(),
    });
    let signal = WatchSignal {
        shared: Arc::downgrade(&shared),
    };
    let key = WatchKey {
        shared,
        watched: watched.into(),
        _guard: None,
    };
    (key, signal)
}

/// Consumer side of a watch registration.
pub struct WatchKey {
    shared: Arc<Shared>,
    watched: String,
    // Keeps the producer (filesystem watcher, live-query task) alive.
    _guard: Option<Box<dyn Any + Send>>,
}

impl WatchKey {
    /// Attach a resource that must live as long as the key.
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    /// The node or directory this key watches.
    pub fn watched(&self) -> &str {
        &self.watched
    }

    /// Block until the next batch is signalled.
    ///
    /// Returns `None` once the key is invalid and nothing remains queued.
    pub async fn take(&mut self) -> Option<Vec<WatchEvent>> {
        loop {
            {
                let mut inner = self.shared.inner.lock();
                match inner.state {
                    KeyState::Signalled => {
                        inner.state = KeyState::Delivered;
                        return Some(std::mem::take(&mut inner.pending));
                    }
                    KeyState::Invalid => {
                        if inner.pending.is_empty() {
                            return None;
                        }
                        return Some(std::mem::take(&mut inner.pending));
                    }
                    KeyState::Ready | KeyState::Delivered => {}
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Re-arm the key after a delivered batch.
    ///
    /// Returns `false` if the key is no longer valid.
    pub fn reset(&mut self) -> bool {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            KeyState::Invalid => false,
            KeyState::Ready => true,
            KeyState::Signalled | KeyState::Delivered => {
                if inner.pending.is_empty() {
                    inner.state = KeyState::Ready;
                } else {
                    inner.state = KeyState::Signalled;
                    drop(inner);
                    self.shared.notify.notify_one();
                }
                true
            }
        }
    }

    /// Cancel the registration; queued events are discarded.
    pub fn cancel(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.state = KeyState::Invalid;
        inner.pending.clear();
        drop(inner);
        self.shared.notify.notify_one();
    }

    pub fn is_valid(&self) -> bool {
        self.shared.inner.lock().state != KeyState::Invalid
    }
}

impl fmt::Debug for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("WatchKey")
            .field("watched", &self.watched)
            .field("state", &inner.state)
            .field("pending", &inner.pending.len())
            .finish()
    }
}

/// Producer side of a watch registration.
#[derive(Clone)]
pub struct WatchSignal {
    shared: Weak<Shared>,
}

impl WatchSignal {
    /// Queue an event, waking the consumer if the key was ready.
    ///
    /// Returns `false` if the key was dropped or invalidated, in which case the
    /// producer should stop.
    pub fn signal(&self, event: WatchEvent) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut inner = shared.inner.lock();
        match inner.state {
            KeyState::Invalid => false,
            KeyState::Ready => {
                inner.pending.push(event);
                inner.state = KeyState::Signalled;
                drop(inner);
                shared.notify.notify_one();
                true
            }
            KeyState::Signalled | KeyState::Delivered => {
                inner.pending.push(event);
                true
            }
        }
    }

    /// Invalidate the key, e.g. because the watched node was deleted.
    pub fn invalidate(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.inner.lock().state = KeyState::Invalid;
            shared.notify.notify_one();
        }
    }

    /// Whether the consumer is gone or the key is invalid.
    pub fn is_closed(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.inner.lock().state == KeyState::Invalid,
            None => true,
        }
    }
}

impl fmt::Debug for WatchSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSignal")
            .field("closed", &self.is_closed())
            .finish()
    }
}
