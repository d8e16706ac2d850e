//! Scriptable in-memory transport.
//!
//! [`MockTransport`] answers every request through a handler closure,
//! records what it was sent and drives background transfers through the
//! configured delegate. Useful for testing code built on
//! [`NetworkClient`](crate::NetworkClient) without a network.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;

use crate::error::{RequestError, TransportError, TransportErrorKind};
use crate::transport::{
    EngineConfig, StartGate, TransferDelegate, TransferHandle, TransferTask, Transport, TransportRequest,
    TransportResponse,
};

/// Produces the response for a request.
pub type MockHandler = Arc<dyn Fn(&TransportRequest) -> Result<TransportResponse, RequestError> + Send + Sync>;

/// Number of progress notifications emitted per background transfer.
const PROGRESS_STEPS: usize = 4;

/// In-memory [`Transport`].
pub struct MockTransport {
    handler: MockHandler,
    latency: Option<Duration>,
    engine: Mutex<Option<EngineConfig>>,
    requests: Mutex<Vec<TransportRequest>>,
    payloads: Mutex<Vec<Bytes>>,
    next_handle: AtomicU64,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("latency", &self.latency)
            .field("configured", &self.engine.lock().is_some())
            .field("requests", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&TransportRequest) -> Result<TransportResponse, RequestError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            latency: None,
            engine: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Answers every request with `200 {}`.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(|_| Ok(TransportResponse::new(StatusCode::OK, "{}")))
    }

    /// Delay every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every request seen so far, in submission order.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Payloads read by background uploads.
    #[must_use]
    pub fn uploaded_payloads(&self) -> Vec<Bytes> {
        self.payloads.lock().clone()
    }

    /// Settings from the last `configure`.
    #[must_use]
    pub fn engine_config(&self) -> Option<EngineConfig> {
        self.engine.lock().clone()
    }

    fn delegate(&self) -> Result<Arc<dyn TransferDelegate>, RequestError> {
        self.engine
            .lock()
            .as_ref()
            .map(|engine| Arc::clone(&engine.delegate))
            .ok_or(RequestError::NotConfigured)
    }

    fn record(&self, request: &TransportRequest) {
        self.requests.lock().push(request.clone());
    }

    fn next_task(&self) -> (TransferTask, StartGate) {
        TransferTask::new(TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    async fn answer(&self, request: &TransportRequest) -> Result<TransportResponse, RequestError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        (self.handler)(request)
    }
}

/// Byte offsets after each progress step.
fn progress_marks(len: usize) -> Vec<u64> {
    if len == 0 {
        return Vec::new();
    }
    let step = len.div_ceil(PROGRESS_STEPS);
    let mut marks: Vec<u64> = (1..=PROGRESS_STEPS)
        .map(|i| (step * i).min(len))
        .map(|done| u64::try_from(done).unwrap_or(u64::MAX))
        .collect();
    marks.dedup();
    marks
}

fn cancelled() -> RequestError {
    RequestError::Transport(TransportError::new(
        TransportErrorKind::Cancelled,
        "transfer cancelled",
    ))
}

#[async_trait]
impl Transport for MockTransport {
    fn configure(&self, config: EngineConfig) -> Result<(), RequestError> {
        *self.engine.lock() = Some(config);
        Ok(())
    }

    async fn submit(&self, request: TransportRequest) -> Result<TransportResponse, RequestError> {
        self.delegate()?;
        self.record(&request);
        self.answer(&request).await
    }

    async fn submit_background_download(&self, request: TransportRequest) -> Result<TransferTask, RequestError> {
        let delegate = self.delegate()?;
        self.record(&request);
        let (task, gate) = self.next_task();
        let handle = task.handle();
        let outcome = self.answer(&request).await;

        tokio::spawn(async move {
            let cancel = gate.opened().await;
            if cancel.is_cancelled() {
                delegate.on_task_completed(handle, None, Some(cancelled()));
                return;
            }
            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    delegate.on_task_completed(handle, None, Some(e));
                    return;
                }
            };

            let total = u64::try_from(response.body.len()).unwrap_or(u64::MAX);
            for done in progress_marks(response.body.len()) {
                delegate.on_progress(handle, done, total);
            }

            let meta = response.meta();
            let staged = tempfile::NamedTempFile::new().and_then(|mut file| {
                file.write_all(&response.body)?;
                Ok(file)
            });
            match staged {
                Ok(file) => {
                    delegate.on_download_finished(handle, file.path(), Some(&meta));
                    drop(file);
                    delegate.on_task_completed(handle, Some(&meta), None);
                }
                Err(e) => {
                    let error = RequestError::Transport(TransportError::new(TransportErrorKind::Io, e));
                    delegate.on_task_completed(handle, Some(&meta), Some(error));
                }
            }
        });

        Ok(task)
    }

    async fn submit_background_upload(
        &self,
        mut request: TransportRequest,
        payload: &Path,
    ) -> Result<TransferTask, RequestError> {
        let delegate = self.delegate()?;
        let data = Bytes::from(std::fs::read(payload).map_err(|_| RequestError::NoData)?);
        request.body = data.clone();
        self.record(&request);
        self.payloads.lock().push(data.clone());

        let (task, gate) = self.next_task();
        let handle = task.handle();
        let outcome = self.answer(&request).await;

        tokio::spawn(async move {
            let cancel = gate.opened().await;
            if cancel.is_cancelled() {
                delegate.on_task_completed(handle, None, Some(cancelled()));
                return;
            }

            let total = u64::try_from(data.len()).unwrap_or(u64::MAX);
            for done in progress_marks(data.len()) {
                delegate.on_progress(handle, done, total);
            }

            match outcome {
                Ok(response) => {
                    if !response.body.is_empty() {
                        delegate.on_upload_data_received(handle, &response.body);
                    }
                    delegate.on_task_completed(handle, Some(&response.meta()), None);
                }
                Err(e) => delegate.on_task_completed(handle, None, Some(e)),
            }
        });

        Ok(task)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn progress_marks_cover_the_body() {
        assert!(progress_marks(0).is_empty());
        assert_eq!(progress_marks(1), vec![1]);
        assert_eq!(progress_marks(3), vec![1, 2, 3]);
        assert_eq!(progress_marks(100), vec![25, 50, 75, 100]);
        assert_eq!(progress_marks(10), vec![3, 6, 9, 10]);
    }

    #[tokio::test]
    async fn submit_requires_configure() {
        let transport = MockTransport::ok();
        let request = TransportRequest::new(http::Method::GET, "https://a.example".parse().unwrap());
        assert!(matches!(
            transport.submit(request).await,
            Err(RequestError::NotConfigured)
        ));
        assert_eq!(transport.request_count(), 0);
    }
}
