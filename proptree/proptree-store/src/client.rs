//! Coordination session lifecycle and low-level path operations.
//!
//! [`CoordinationClient`] owns one backend session. Establishing the session is
//! the only fallible entry point; after that every call logs backend failures
//! and degrades to a "no data" result (false / empty / none).

use crate::backend::CoordinationBackend;
use crate::error::{CoordinationError, CoordinationResult};
use crate::memory::MemoryBackend;
use crate::surreal::SurrealBackend;
use parking_lot::RwLock;
use proptree_core::config::{CoordinationConfig, RetryConfig};
use proptree_core::WatchKey;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared session against the coordination store.
///
/// Cheap to share behind an `Arc`; calls may be issued concurrently and are not
/// serialised on the client side.
pub struct CoordinationClient {
    config: CoordinationConfig,
    session: RwLock<Option<Arc<dyn CoordinationBackend>>>,
}

impl CoordinationClient {
    /// Create a client that is not yet connected.
    pub fn new(config: CoordinationConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
        }
    }

    /// Create a client and connect it to `address` with the default retry policy.
    pub async fn connect_to(address: &str) -> CoordinationResult<Self> {
        let client = Self::new(CoordinationConfig::with_address(address));
        client.connect().await?;
        Ok(client)
    }

    /// Wrap an already-open backend session.
    pub fn with_backend(backend: Arc<dyn CoordinationBackend>) -> Self {
        let config = CoordinationConfig::with_address(format!("{}://", backend.name()));
        Self {
            config,
            session: RwLock::new(Some(backend)),
        }
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn is_connected(&self) -> bool {
        self.session.read().is_some()
    }

    /// Establish the session, retrying with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns `ConnectFailed` once every attempt has failed.
    pub async fn connect(&self) -> CoordinationResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let retry = &self.config.retry;
        info!("Connecting to coordination store at {}", self.config.address);

        let backend = with_backoff(retry, "Coordination connect", || open_backend(&self.config))
            .await
            .map_err(|e| {
                error!(
                    "Giving up on coordination store {} after {} attempts: {}",
                    self.config.address,
                    retry.max_retries + 1,
                    e
                );
                CoordinationError::ConnectFailed {
                    address: self.config.address.clone(),
                    attempts: retry.max_retries + 1,
                    reason: e.to_string(),
                }
            })?;

        info!("Coordination session established ({} backend)", backend.name());
        *self.session.write() = Some(backend);
        Ok(())
    }

    /// Release the session. Safe to call repeatedly or before `connect`.
    pub async fn close(&self) {
        let backend = self.session.write().take();
        if let Some(backend) = backend {
            info!("Closing coordination session at {}", self.config.address);
            if let Err(e) = backend.close().await {
                warn!("Error while closing coordination session: {}", e);
            }
        }
    }

    fn session(&self) -> CoordinationResult<Arc<dyn CoordinationBackend>> {
        self.session
            .read()
            .clone()
            .ok_or(CoordinationError::NotConnected)
    }

    // Typed operations used inside the crate.

    pub(crate) async fn try_exists(&self, path: &str) -> CoordinationResult<bool> {
        self.session()?.exists(path).await
    }

    pub(crate) async fn try_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        self.session()?.get_children(path).await
    }

    pub(crate) async fn try_read(&self, path: &str) -> CoordinationResult<Vec<u8>> {
        self.session()?.get_data(path).await
    }

    pub(crate) async fn try_create(&self, path: &str, data: &[u8]) -> CoordinationResult<String> {
        self.session()?.create(path, data).await
    }

    pub(crate) async fn try_write(&self, path: &str, data: &[u8]) -> CoordinationResult<String> {
        let backend = self.session()?;

        if backend.exists(path).await? {
            match backend.set_data(path, data).await {
                Ok(()) => return Ok(path.to_string()),
                // Deleted between the check and the write; recreate below.
                Err(e) if e.is_no_node() => {}
                Err(e) => return Err(e),
            }
        }

        match backend.create(path, data).await {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_node_exists() => {
                backend.set_data(path, data).await?;
                Ok(path.to_string())
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn try_delete(&self, path: &str) -> CoordinationResult<()> {
        self.session()?.delete_recursive(path).await
    }

    pub(crate) async fn try_watch(&self, path: &str) -> CoordinationResult<WatchKey> {
        self.session()?.watch(path).await
    }

    // Public boundary: never fails, absence is false/empty/none.

    pub async fn exists(&self, path: &str) -> bool {
        self.try_exists(path).await.unwrap_or_else(|e| {
            log_failure("exists", path, &e);
            false
        })
    }

    /// Children of `path`; `None` if the path does not exist.
    pub async fn children(&self, path: &str) -> Option<Vec<String>> {
        match self.try_children(path).await {
            Ok(children) => Some(children),
            Err(e) => {
                log_failure("children", path, &e);
                None
            }
        }
    }

    /// Data at `path`. Reading an absent path is a caller error and yields `None`.
    pub async fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.try_read(path).await {
            Ok(data) => Some(data),
            Err(e) if e.is_no_node() => {
                warn!("Read of absent node {}", path);
                None
            }
            Err(e) => {
                log_failure("read", path, &e);
                None
            }
        }
    }

    /// Create `path` with its ancestors only if absent.
    pub async fn create(&self, path: &str, data: &[u8]) -> bool {
        match self.try_create(path, data).await {
            Ok(stored) => stored == path,
            Err(e) => {
                log_failure("create", path, &e);
                false
            }
        }
    }

    /// Create or overwrite `path`; true if the stored path matches the request.
    pub async fn write(&self, path: &str, data: &[u8]) -> bool {
        match self.try_write(path, data).await {
            Ok(stored) => {
                if stored != path {
                    warn!("Store wrote {} when {} was requested", stored, path);
                }
                stored == path
            }
            Err(e) => {
                log_failure("write", path, &e);
                false
            }
        }
    }

    /// Recursively delete `path`; no-op if absent.
    pub async fn delete(&self, path: &str) {
        if let Err(e) = self.try_delete(path).await {
            log_failure("delete", path, &e);
        }
    }

    /// Register a watch on `path`; `None` if the path is absent or the call fails.
    pub async fn watch(&self, path: &str) -> Option<WatchKey> {
        match self.try_watch(path).await {
            Ok(key) => Some(key),
            Err(e) => {
                log_failure("watch", path, &e);
                None
            }
        }
    }
}

impl std::fmt::Debug for CoordinationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationClient")
            .field("address", &self.config.address)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn log_failure(op: &str, path: &str, err: &CoordinationError) {
    if err.is_expected() {
        debug!("Coordination {} on {}: {}", op, path, err);
    } else {
        error!("Coordination {} failed for {}: {}", op, path, err);
    }
}

async fn open_backend(config: &CoordinationConfig) -> CoordinationResult<Arc<dyn CoordinationBackend>> {
    if config.is_memory() {
        Ok(Arc::new(MemoryBackend::new()))
    } else {
        Ok(Arc::new(SurrealBackend::connect(config).await?))
    }
}

/// Run `operation` until it succeeds or the retry budget is spent.
async fn with_backoff<F, Fut, T>(
    retry: &RetryConfig,
    what: &str,
    mut operation: F,
) -> CoordinationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoordinationResult<T>>,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempts < retry.max_retries => {
                attempts += 1;
                let delay = retry.delay_for(attempts);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    what,
                    attempts,
                    retry.max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            base_sleep_ms: 1,
            max_retries,
            max_sleep_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_backoff_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_backoff(&fast_retry(3), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoordinationError::backend("down"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_gives_up_after_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: CoordinationResult<()> = with_backoff(&fast_retry(3), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoordinationError::backend("down"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_exponentially() {
        let retry = RetryConfig {
            base_sleep_ms: 1000,
            max_retries: 3,
            max_sleep_ms: 60_000,
        };
        let started = tokio::time::Instant::now();
        let _: CoordinationResult<()> =
            with_backoff(&retry, "test", || async { Err(CoordinationError::backend("down")) })
                .await;

        // 1s + 2s + 4s
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_memory_connect_and_close() {
        let client = CoordinationClient::connect_to("memory://").await.unwrap();
        assert!(client.is_connected());
        assert!(client.exists("/").await);

        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
        assert!(!client.exists("/").await);
    }

    #[tokio::test]
    async fn test_close_without_connect() {
        let client = CoordinationClient::new(CoordinationConfig::default());
        client.close().await;
        assert!(!client.is_connected());
        assert_eq!(client.children("/").await, None);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let mut config = CoordinationConfig::with_address("unsupported://nowhere");
        config.retry = fast_retry(2);
        let client = CoordinationClient::new(config);

        match client.connect().await {
            Err(CoordinationError::ConnectFailed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected ConnectFailed, got {:?}", other.map(|_| ())),
        }
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_write_creates_then_overwrites() {
        let client = CoordinationClient::connect_to("memory://").await.unwrap();
        assert!(client.write("/a/b", b"1").await);
        assert!(client.write("/a/b", b"2").await);
        assert_eq!(client.read("/a/b").await, Some(b"2".to_vec()));
        assert_eq!(client.read("/a/missing").await, None);
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let client = CoordinationClient::connect_to("memory://").await.unwrap();
        assert!(client.create("/a/b", b"1").await);
        assert!(!client.create("/a/b", b"2").await);
        assert_eq!(client.read("/a/b").await, Some(b"1".to_vec()));

        client.delete("/a").await;
        client.delete("/a").await;
        assert!(!client.exists("/a/b").await);
        assert_eq!(client.children("/a").await, None);
    }
}
