use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream;
use http_body::{Body, Frame};
use http_body_util::{BodyExt, Full, StreamBody};
use netkit::{RequestError, TransportErrorKind};
use pin_project_lite::pin_project;

use crate::error::{BoxError, failure, transport_failure};

/// Type-erased body sent through the client.
pub type RequestBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Type-erased (possibly decompressed) response body.
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Size of the frames an upload payload is split into.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Called with `(sent, total)` after each frame leaves the body.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[must_use]
pub fn full(bytes: Bytes) -> RequestBody {
    Full::new(bytes)
        .map_err(|never: Infallible| -> BoxError { match never {} })
        .boxed()
}

pin_project! {
    /// Request body wrapper that reports how many bytes were handed to the
    /// connection so far.
    pub struct ProgressBody<B> {
        #[pin]
        inner: B,
        sent: u64,
        total: u64,
        on_progress: ProgressFn,
    }
}

impl<B> ProgressBody<B> {
    #[must_use]
    pub fn new(inner: B, total: u64, on_progress: ProgressFn) -> Self {
        Self {
            inner,
            sent: 0,
            total,
            on_progress,
        }
    }
}

impl<B> Body for ProgressBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let polled = this.inner.poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled
            && let Some(data) = frame.data_ref()
        {
            *this.sent += data.len() as u64;
            (this.on_progress)(*this.sent, *this.total);
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

/// Upload body streaming `payload` in [`UPLOAD_CHUNK_SIZE`] frames with
/// progress reporting.
#[must_use]
pub fn upload_body(payload: Bytes, on_progress: ProgressFn) -> RequestBody {
    let total = payload.len() as u64;
    let frames = (0..payload.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(move |start| {
            let end = (start + UPLOAD_CHUNK_SIZE).min(payload.len());
            Ok::<_, BoxError>(Frame::data(payload.slice(start..end)))
        })
        .collect::<Vec<_>>();
    ProgressBody::new(StreamBody::new(stream::iter(frames)), total, on_progress).boxed()
}

/// Collect a response body, failing once more than `limit` bytes arrive.
///
/// # Errors
///
/// `BodyTooLarge` over the limit, otherwise the classified read failure.
pub async fn read_limited<B>(body: B, limit: usize) -> Result<Bytes, RequestError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(transport_failure)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(failure(
                    TransportErrorKind::BodyTooLarge,
                    format!("response body exceeds {limit} bytes"),
                ));
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
