//! Correlation of background transfer notifications to caller callbacks.
//!
//! Transports report progress and completion out of band, identified only by
//! a [`TransferHandle`]. The [`ProgressRegistry`] stores the callbacks given at
//! submission time and routes notifications to them.
//!
//! Progress callbacks and upload completions are delivered through a
//! [`CallbackExecutor`] standing in for the application's main context.
//! Download completions run inline on the notifying thread: the downloaded
//! file is only guaranteed to exist until the notification returns.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{RequestError, check_status};
use crate::transport::{ResponseMeta, TransferDelegate, TransferHandle};

/// Receives the completed fraction, in `[0.0, 1.0]`.
pub type ProgressHandler = Arc<dyn Fn(f64) + Send + Sync>;

/// Receives the location of a finished download or the classified failure.
pub type DownloadHandler = Box<dyn FnOnce(Result<PathBuf, RequestError>) + Send>;

/// Receives the response body of a finished upload or the classified failure.
pub type UploadHandler = Box<dyn FnOnce(Result<Bytes, RequestError>) + Send>;

type Job = Box<dyn FnOnce() + Send>;

/// Where progress callbacks run.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, job: Box<dyn FnOnce() + Send>);
}

/// Runs callbacks on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateExecutor;

impl CallbackExecutor for ImmediateExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Forwards callbacks to a [`CallbackQueue`].
#[derive(Debug, Clone)]
pub struct QueuedExecutor {
    tx: mpsc::UnboundedSender<Job>,
}

impl CallbackExecutor for QueuedExecutor {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::debug!("callback queue closed; dropping callback");
        }
    }
}

/// Callbacks waiting to run on the application's main context.
pub struct CallbackQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue").finish_non_exhaustive()
    }
}

impl CallbackQueue {
    /// Run callbacks as they arrive until every executor is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Run every callback queued so far and return how many ran.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

/// Create a connected executor and queue.
#[must_use]
pub fn callback_queue() -> (QueuedExecutor, CallbackQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueuedExecutor { tx }, CallbackQueue { rx })
}

struct DownloadEntry {
    progress: Option<ProgressHandler>,
    completion: Option<DownloadHandler>,
}

struct UploadEntry {
    progress: Option<ProgressHandler>,
    completion: Option<UploadHandler>,
    received: BytesMut,
}

#[derive(Default)]
struct Entries {
    downloads: HashMap<TransferHandle, DownloadEntry>,
    uploads: HashMap<TransferHandle, UploadEntry>,
}

/// Keyed store of transfer callbacks.
///
/// A single lock guards both maps; callbacks are always invoked after the
/// lock is released so they may call back into the registry.
pub struct ProgressRegistry {
    entries: Mutex<Entries>,
    executor: Arc<dyn CallbackExecutor>,
}

impl fmt::Debug for ProgressRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("ProgressRegistry")
            .field("downloads", &entries.downloads.len())
            .field("uploads", &entries.uploads.len())
            .finish_non_exhaustive()
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new(Arc::new(ImmediateExecutor))
    }
}

impl ProgressRegistry {
    #[must_use]
    pub fn new(executor: Arc<dyn CallbackExecutor>) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            executor,
        }
    }

    /// Store download callbacks. No-op when `handle` is `None`.
    pub fn register_download(
        &self,
        handle: Option<TransferHandle>,
        progress: Option<ProgressHandler>,
        completion: DownloadHandler,
    ) {
        let Some(handle) = handle else { return };
        self.entries.lock().downloads.insert(
            handle,
            DownloadEntry {
                progress,
                completion: Some(completion),
            },
        );
    }

    /// Store upload callbacks. No-op when `handle` is `None`.
    pub fn register_upload(
        &self,
        handle: Option<TransferHandle>,
        progress: Option<ProgressHandler>,
        completion: Option<UploadHandler>,
    ) {
        let Some(handle) = handle else { return };
        self.entries.lock().uploads.insert(
            handle,
            UploadEntry {
                progress,
                completion,
                received: BytesMut::new(),
            },
        );
    }

    /// Report `done` of `total` bytes. Ignored when `total` is zero.
    pub fn signal_progress(&self, handle: TransferHandle, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let progress = {
            let entries = self.entries.lock();
            entries
                .downloads
                .get(&handle)
                .and_then(|e| e.progress.clone())
                .or_else(|| entries.uploads.get(&handle).and_then(|e| e.progress.clone()))
        };
        let Some(progress) = progress else { return };

        #[allow(clippy::cast_precision_loss)]
        let fraction = (done as f64 / total as f64).clamp(0.0, 1.0);
        self.executor.execute(Box::new(move || progress(fraction)));
    }

    /// Buffer response bytes of an upload.
    pub fn notify_upload_data(&self, handle: TransferHandle, data: &[u8]) {
        if let Some(entry) = self.entries.lock().uploads.get_mut(&handle) {
            entry.received.extend_from_slice(data);
        }
    }

    /// Deliver the terminal result of a download and remove its entry.
    ///
    /// The completion runs inline. Later calls for the same handle are no-ops.
    pub fn resolve_download(&self, handle: TransferHandle, result: Result<PathBuf, RequestError>) {
        let entry = self.entries.lock().downloads.remove(&handle);
        if let Some(completion) = entry.and_then(|e| e.completion) {
            completion(result);
        }
    }

    /// Deliver the terminal result of an upload and remove its entry.
    ///
    /// Success carries the buffered response body. The completion goes through
    /// the executor.
    pub fn resolve_upload(&self, handle: TransferHandle, response: Option<&ResponseMeta>, error: Option<RequestError>) {
        let Some(entry) = self.entries.lock().uploads.remove(&handle) else {
            return;
        };
        let Some(completion) = entry.completion else { return };

        let body = entry.received.freeze();
        let result = match (error, response) {
            (Some(error), _) => Err(error.reclassify()),
            (None, Some(meta)) => check_status(meta.status, &meta.headers, &body).map(|()| body),
            (None, None) => Err(RequestError::InvalidResponse),
        };
        self.executor.execute(Box::new(move || completion(result)));
    }

    /// Drop every entry for `handle`.
    pub fn unregister(&self, handle: TransferHandle) {
        let mut entries = self.entries.lock();
        entries.downloads.remove(&handle);
        entries.uploads.remove(&handle);
    }

    /// Whether `handle` still has registered callbacks.
    #[must_use]
    pub fn contains(&self, handle: TransferHandle) -> bool {
        let entries = self.entries.lock();
        entries.downloads.contains_key(&handle) || entries.uploads.contains_key(&handle)
    }
}

impl TransferDelegate for ProgressRegistry {
    fn on_progress(&self, handle: TransferHandle, done: u64, total: u64) {
        self.signal_progress(handle, done, total);
    }

    fn on_upload_data_received(&self, handle: TransferHandle, data: &[u8]) {
        self.notify_upload_data(handle, data);
    }

    fn on_download_finished(&self, handle: TransferHandle, location: &Path, response: Option<&ResponseMeta>) {
        let result = match response {
            Some(meta) => check_status(meta.status, &meta.headers, &Bytes::new()).map(|()| location.to_path_buf()),
            None => Err(RequestError::InvalidResponse),
        };
        if let Err(err) = &result {
            tracing::debug!(transfer = %handle, error = %err, "download finished with failure");
        }
        self.resolve_download(handle, result);
    }

    fn on_task_completed(&self, handle: TransferHandle, response: Option<&ResponseMeta>, error: Option<RequestError>) {
        let is_download = self.entries.lock().downloads.contains_key(&handle);
        if is_download {
            // reached only when no file was delivered
            let error = error.map_or(RequestError::InvalidResponse, RequestError::reclassify);
            tracing::debug!(transfer = %handle, error = %error, "download failed");
            self.resolve_download(handle, Err(error));
        } else {
            self.resolve_upload(handle, response, error);
        }
        self.unregister(handle);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::{ErrorBody, TransportError, TransportErrorKind};
    use http::{HeaderMap, StatusCode};
    use std::io;

    fn meta(status: StatusCode) -> ResponseMeta {
        ResponseMeta {
            status,
            headers: HeaderMap::new(),
        }
    }

    fn recording_progress() -> (ProgressHandler, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Arc::new(move |p: f64| sink.lock().push(p)), seen)
    }

    fn capture<T: Send + 'static>() -> (Box<dyn FnOnce(T) + Send>, Arc<Mutex<Vec<T>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Box::new(move |v| sink.lock().push(v)), seen)
    }

    #[test]
    fn absent_handle_is_ignored() {
        let registry = ProgressRegistry::default();
        let (completion, seen) = capture();
        registry.register_download(None, None, completion);
        registry.register_upload(None, None, None);
        assert!(seen.lock().is_empty());
        assert_eq!(format!("{registry:?}"), "ProgressRegistry { downloads: 0, uploads: 0, .. }");
    }

    #[test]
    fn download_progress_then_single_completion() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(1);
        let (progress, fractions) = recording_progress();
        let (completion, results) = capture::<Result<PathBuf, RequestError>>();
        registry.register_download(Some(handle), Some(progress), completion);

        for done in [25, 50, 75, 100] {
            registry.on_progress(handle, done, 100);
        }
        registry.on_download_finished(handle, Path::new("/tmp/file.bin"), Some(&meta(StatusCode::OK)));
        registry.on_task_completed(handle, Some(&meta(StatusCode::OK)), None);

        assert_eq!(*fractions.lock(), vec![0.25, 0.5, 0.75, 1.0]);
        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), Path::new("/tmp/file.bin"));
        assert!(!registry.contains(handle));
    }

    #[test]
    fn zero_total_and_overshoot_are_guarded() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(2);
        let (progress, fractions) = recording_progress();
        let (completion, _) = capture();
        registry.register_download(Some(handle), Some(progress), completion);

        registry.signal_progress(handle, 10, 0);
        registry.signal_progress(handle, 150, 100);
        assert_eq!(*fractions.lock(), vec![1.0]);
    }

    #[test]
    fn download_http_failure_is_classified() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(3);
        let (completion, results) = capture::<Result<PathBuf, RequestError>>();
        registry.register_download(Some(handle), None, completion);

        registry.on_download_finished(handle, Path::new("/tmp/x"), Some(&meta(StatusCode::NOT_FOUND)));
        registry.on_task_completed(handle, Some(&meta(StatusCode::NOT_FOUND)), None);

        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(RequestError::HttpStatus { status: StatusCode::NOT_FOUND, body: ErrorBody::None, .. })
        ));
    }

    #[test]
    fn download_transport_failure_surfaces_through_completion() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(4);
        let (completion, results) = capture::<Result<PathBuf, RequestError>>();
        registry.register_download(Some(handle), None, completion);

        let error = RequestError::Transport(TransportError::new(
            TransportErrorKind::NetworkConnectionLost,
            io::Error::from(io::ErrorKind::ConnectionReset),
        ));
        registry.on_task_completed(handle, None, Some(error));

        assert!(matches!(results.lock()[0], Err(RequestError::NoInternet(_))));
        assert!(!registry.contains(handle));
    }

    #[test]
    fn download_without_response_is_invalid() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(5);
        let (completion, results) = capture::<Result<PathBuf, RequestError>>();
        registry.register_download(Some(handle), None, completion);

        registry.on_task_completed(handle, None, None);
        assert!(matches!(results.lock()[0], Err(RequestError::InvalidResponse)));
    }

    #[test]
    fn upload_buffers_response_body() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(6);
        let (progress, fractions) = recording_progress();
        let (completion, results) = capture::<Result<Bytes, RequestError>>();
        registry.register_upload(Some(handle), Some(progress), Some(completion));

        registry.on_progress(handle, 512, 1024);
        registry.on_progress(handle, 1024, 1024);
        registry.on_upload_data_received(handle, b"{\"id\":");
        registry.on_upload_data_received(handle, b"7}");
        registry.on_task_completed(handle, Some(&meta(StatusCode::CREATED)), None);

        assert_eq!(*fractions.lock(), vec![0.5, 1.0]);
        assert_eq!(results.lock()[0].as_ref().unwrap(), &Bytes::from_static(b"{\"id\":7}"));
        assert!(!registry.contains(handle));
    }

    #[test]
    fn upload_failure_body_is_classified() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(7);
        let (completion, results) = capture::<Result<Bytes, RequestError>>();
        registry.register_upload(Some(handle), None, Some(completion));

        registry.on_upload_data_received(handle, br#"{"error":"too large"}"#);
        registry.on_task_completed(handle, Some(&meta(StatusCode::PAYLOAD_TOO_LARGE)), None);

        let results = results.lock();
        let Err(RequestError::HttpStatus { body: ErrorBody::JsonObject(map), .. }) = &results[0] else {
            panic!("expected HTTP failure, got {:?}", results[0]);
        };
        assert_eq!(map["error"], "too large");
    }

    #[test]
    fn upload_401_is_unauthenticated() {
        let registry = ProgressRegistry::default();
        let handle = TransferHandle(8);
        let (completion, results) = capture::<Result<Bytes, RequestError>>();
        registry.register_upload(Some(handle), None, Some(completion));
        registry.on_task_completed(handle, Some(&meta(StatusCode::UNAUTHORIZED)), None);
        assert!(matches!(results.lock()[0], Err(RequestError::Unauthenticated)));
    }

    #[test]
    fn queued_executor_defers_until_drained() {
        let (executor, mut queue) = callback_queue();
        let registry = ProgressRegistry::new(Arc::new(executor));
        let handle = TransferHandle(9);
        let (progress, fractions) = recording_progress();
        let (completion, results) = capture::<Result<PathBuf, RequestError>>();
        registry.register_download(Some(handle), Some(progress), completion);

        registry.on_progress(handle, 1, 2);
        assert!(fractions.lock().is_empty());

        // download completion bypasses the queue
        registry.on_download_finished(handle, Path::new("/tmp/y"), Some(&meta(StatusCode::OK)));
        assert_eq!(results.lock().len(), 1);

        assert_eq!(queue.drain(), 1);
        assert_eq!(*fractions.lock(), vec![0.5]);
    }

    #[tokio::test]
    async fn queue_run_stops_when_executors_drop() {
        let (executor, queue) = callback_queue();
        let (completion, results) = capture::<Result<Bytes, RequestError>>();
        let registry = ProgressRegistry::new(Arc::new(executor));
        registry.register_upload(Some(TransferHandle(10)), None, Some(completion));
        registry.on_task_completed(TransferHandle(10), Some(&meta(StatusCode::OK)), None);
        drop(registry);

        queue.run().await;
        assert!(results.lock()[0].as_ref().unwrap().is_empty());
    }
}
