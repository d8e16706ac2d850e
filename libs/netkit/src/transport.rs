//! The pluggable transport seam.
//!
//! A [`Transport`] performs the actual network I/O. The orchestrator hands it
//! fully built [`TransportRequest`]s and receives either a
//! [`TransportResponse`] or a [`RequestError`]. Background transfers report
//! progress and completion out of band through a [`TransferDelegate`],
//! correlated by [`TransferHandle`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::descriptor::CachePolicy;
use crate::error::RequestError;

/// Fully built request as handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Per-request timeout; `None` means the transport default
    pub timeout: Option<Duration>,
    pub cache_policy: CachePolicy,
}

impl TransportRequest {
    /// Request with an empty body and no header, timeout or cache override.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
            cache_policy: CachePolicy::default(),
        }
    }
}

/// Status line and headers of an HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Complete HTTP response of a foreground submission.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn meta(&self) -> ResponseMeta {
        ResponseMeta {
            status: self.status,
            headers: self.headers.clone(),
        }
    }
}

/// Opaque identifier of a background transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferHandle(pub u64);

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transfer-{}", self.0)
    }
}

/// A background transfer issued by a transport.
///
/// The transfer stays parked until [`resume`](Self::resume) is called (or the
/// task is dropped), so callbacks can be registered before the first
/// notification arrives.
pub struct TransferTask {
    handle: TransferHandle,
    cancel: CancellationToken,
    start: Mutex<Option<oneshot::Sender<()>>>,
}

impl fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferTask")
            .field("handle", &self.handle)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TransferTask {
    /// Create a parked task plus the gate its worker waits on.
    #[must_use]
    pub fn new(handle: TransferHandle) -> (Self, StartGate) {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let task = Self {
            handle,
            cancel: cancel.clone(),
            start: Mutex::new(Some(tx)),
        };
        (task, StartGate { rx, cancel })
    }

    #[must_use]
    pub fn handle(&self) -> TransferHandle {
        self.handle
    }

    /// Let the transfer start emitting notifications. Idempotent.
    pub fn resume(&self) {
        if let Some(tx) = self.start.lock().take() {
            // Receiver gone means the worker already finished.
            let _ = tx.send(());
        }
    }

    /// Cancel the transfer. Completion is reported through the delegate as a
    /// [`TransportErrorKind::Cancelled`](crate::TransportErrorKind::Cancelled) failure.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.resume();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Worker side of a [`TransferTask`].
#[derive(Debug)]
pub struct StartGate {
    rx: oneshot::Receiver<()>,
    cancel: CancellationToken,
}

impl StartGate {
    /// Wait until the task is resumed or dropped.
    pub async fn opened(self) -> CancellationToken {
        let _ = self.rx.await;
        self.cancel
    }
}

/// Receiver of out-of-band transfer notifications.
pub trait TransferDelegate: Send + Sync {
    /// Bytes moved so far; `total` is 0 when the length is unknown.
    fn on_progress(&self, handle: TransferHandle, done: u64, total: u64);

    /// Response bytes of an upload arrived.
    fn on_upload_data_received(&self, handle: TransferHandle, data: &[u8]);

    /// A download landed at `location`. The file may be removed as soon as
    /// this returns.
    fn on_download_finished(&self, handle: TransferHandle, location: &Path, response: Option<&ResponseMeta>);

    /// Terminal notification, sent exactly once per transfer.
    fn on_task_completed(&self, handle: TransferHandle, response: Option<&ResponseMeta>, error: Option<RequestError>);
}

/// Settings pushed to a transport by [`NetworkClient::configure`](crate::NetworkClient::configure).
#[derive(Clone)]
pub struct EngineConfig {
    /// Headers added to every request that doesn't already carry them
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub cache_policy: CachePolicy,
    /// Receiver of background transfer notifications
    pub delegate: Arc<dyn TransferDelegate>,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("cache_policy", &self.cache_policy)
            .finish_non_exhaustive()
    }
}

/// Performs network I/O on behalf of the orchestrator.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Install engine settings. Must be called before any submission and may
    /// be called again to replace them.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    fn configure(&self, config: EngineConfig) -> Result<(), RequestError>;

    /// Perform a request and collect the full response.
    ///
    /// # Errors
    ///
    /// `NotConfigured` before [`configure`](Self::configure); otherwise a
    /// `Transport` error carrying the low-level failure class.
    async fn submit(&self, request: TransportRequest) -> Result<TransportResponse, RequestError>;

    /// Start a download that reports through the delegate.
    ///
    /// # Errors
    ///
    /// `NotConfigured` before [`configure`](Self::configure).
    async fn submit_background_download(&self, request: TransportRequest) -> Result<TransferTask, RequestError>;

    /// Start an upload of the file at `payload`. The file is read before this
    /// returns and may be deleted afterwards.
    ///
    /// # Errors
    ///
    /// `NotConfigured` before [`configure`](Self::configure), `NoData` if the
    /// payload cannot be read.
    async fn submit_background_upload(
        &self,
        request: TransportRequest,
        payload: &Path,
    ) -> Result<TransferTask, RequestError>;
}
