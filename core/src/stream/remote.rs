use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::fetch::Fetcher;

/// Read-only view of a fetched resource.
///
/// The body is fetched at most once, on first read. Clones share the body and
/// the cursor, so a read can run off the host's dispatch loop.
#[derive(Clone)]
pub struct RemoteStream {
    locator: String,
    fetcher: Arc<dyn Fetcher>,
    body: Arc<OnceCell<Arc<[u8]>>>,
    cursor: Arc<AtomicUsize>,
}

impl RemoteStream {
    pub fn new(locator: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            locator: locator.into(),
            fetcher,
            body: Arc::new(OnceCell::new()),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn is_fetched(&self) -> bool {
        self.body.initialized()
    }

    async fn body(&self) -> Arc<[u8]> {
        self.body
            .get_or_init(|| async {
                match self.fetcher.fetch(&self.locator).await {
                    Ok(bytes) => {
                        debug!(locator = %self.locator, len = bytes.len(), "fetched resource");
                        Arc::from(bytes)
                    }
                    Err(e) => {
                        warn!(locator = %self.locator, error = %e, "fetch failed, stream reads as exhausted");
                        Arc::from(Vec::new())
                    }
                }
            })
            .await
            .clone()
    }

    pub async fn read(&self) -> Option<u8> {
        let body = self.body().await;
        self.cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |at| {
                (at < body.len()).then_some(at + 1)
            })
            .ok()
            .map(|at| body[at])
    }

    /// Writes are accepted and ignored.
    pub fn write(&self, bytes: &[u8]) {
        debug!(locator = %self.locator, len = bytes.len(), "ignoring write to remote stream");
    }
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream")
            .field("locator", &self.locator)
            .field("fetched", &self.is_fetched())
            .field("cursor", &self.cursor.load(Ordering::SeqCst))
            .finish()
    }
}
