//! Spawned workers for background downloads and uploads.
//!
//! Workers park on the task's [`StartGate`] so the caller can register
//! callbacks first, then report through the engine's delegate. Each
//! transfer ends with exactly one `on_task_completed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Request, Response};
use http_body_util::BodyExt;
use netkit::{RequestError, ResponseMeta, StartGate, TransferHandle, TransportErrorKind, TransportRequest};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;

use crate::body::{self, RequestBody, ResponseBody};
use crate::error::{BoxError, cancelled, failure, transport_failure};
use crate::transport::{Engine, timed_out, to_http};

pub struct Job {
    pub handle: TransferHandle,
    pub timeout: Duration,
    pub engine: Arc<Engine>,
}

impl Job {
    /// Send the request and wait for the response head, bounded by the timeout.
    async fn exchange(&self, request: Request<RequestBody>) -> Result<Response<ResponseBody>, RequestError> {
        let call: BoxFuture<'static, Result<Response<ResponseBody>, BoxError>> =
            Box::pin(self.engine.service().oneshot(request));
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| timed_out(self.timeout))?
            .map_err(transport_failure)
    }
}

fn meta(response: &Response<ResponseBody>) -> ResponseMeta {
    ResponseMeta {
        status: response.status(),
        headers: response.headers().clone(),
    }
}

fn expected_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn io_failure(err: std::io::Error) -> RequestError {
    failure(TransportErrorKind::Io, err)
}

async fn stage_file(dir: Option<&Path>) -> Result<NamedTempFile, RequestError> {
    let dir = dir.map(Path::to_path_buf);
    tokio::task::spawn_blocking(move || match dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    })
    .await
    .map_err(|e| failure(TransportErrorKind::Io, e))?
    .map_err(io_failure)
}

/// Stream the response body into a staged file, reporting progress when the
/// length is known.
async fn fetch_to_file(
    job: &Job,
    request: Request<RequestBody>,
    dir: Option<&Path>,
) -> Result<(ResponseMeta, NamedTempFile), RequestError> {
    let response = job.exchange(request).await?;
    let meta = meta(&response);
    let expected = expected_length(&meta.headers);

    let staged = stage_file(dir).await?;
    let mut file = tokio::fs::File::from_std(staged.reopen().map_err(io_failure)?);
    let mut body = std::pin::pin!(response.into_body());
    let mut written = 0_u64;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(transport_failure)?;
        if let Some(chunk) = frame.data_ref() {
            file.write_all(chunk).await.map_err(io_failure)?;
            written += chunk.len() as u64;
            if expected > 0 {
                job.engine.delegate.on_progress(job.handle, written.min(expected), expected);
            }
        }
    }
    file.flush().await.map_err(io_failure)?;

    Ok((meta, staged))
}

pub async fn download(job: Job, request: Request<RequestBody>, gate: StartGate, dir: Option<PathBuf>) {
    let cancel = gate.opened().await;
    let delegate = Arc::clone(&job.engine.delegate);
    let handle = job.handle;

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancelled()),
        result = fetch_to_file(&job, request, dir.as_deref()) => result,
    };

    match outcome {
        Ok((meta, staged)) => {
            tracing::debug!(transfer = %handle, status = meta.status.as_u16(), "download finished");
            delegate.on_download_finished(handle, staged.path(), Some(&meta));
            if let Err(e) = staged.close() {
                tracing::warn!(transfer = %handle, error = %e, "failed to remove staged download");
            }
            delegate.on_task_completed(handle, Some(&meta), None);
        }
        Err(error) => {
            tracing::debug!(transfer = %handle, error = %error, "download failed");
            delegate.on_task_completed(handle, None, Some(error));
        }
    }
}

/// Send the payload and forward response chunks as they arrive.
async fn send_payload(job: &Job, request: TransportRequest, payload: Bytes) -> Result<ResponseMeta, RequestError> {
    let delegate = Arc::clone(&job.engine.delegate);
    let handle = job.handle;
    let progress: body::ProgressFn = Arc::new(move |sent, total| delegate.on_progress(handle, sent, total));

    let response = job.exchange(to_http(request, body::upload_body(payload, progress))).await?;
    let meta = meta(&response);

    let mut body = std::pin::pin!(response.into_body());
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(transport_failure)?;
        if let Some(chunk) = frame.data_ref()
            && !chunk.is_empty()
        {
            job.engine.delegate.on_upload_data_received(handle, chunk);
        }
    }

    Ok(meta)
}

pub async fn upload(job: Job, request: TransportRequest, payload: Bytes, gate: StartGate) {
    let cancel = gate.opened().await;
    let delegate = Arc::clone(&job.engine.delegate);
    let handle = job.handle;

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancelled()),
        result = send_payload(&job, request, payload) => result,
    };

    match outcome {
        Ok(meta) => {
            tracing::debug!(transfer = %handle, status = meta.status.as_u16(), "upload finished");
            delegate.on_task_completed(handle, Some(&meta), None);
        }
        Err(error) => {
            tracing::debug!(transfer = %handle, error = %error, "upload failed");
            delegate.on_task_completed(handle, None, Some(error));
        }
    }
}
