use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::CACHE_CONTROL;
use http::{HeaderMap, HeaderValue, Request, Response, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use netkit::{
    CachePolicy, EngineConfig, RequestError, StartGate, TransferDelegate, TransferHandle, TransferTask, Transport,
    TransportErrorKind, TransportRequest, TransportResponse,
};
use parking_lot::Mutex;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

use crate::background;
use crate::body::{self, RequestBody, ResponseBody};
use crate::config::{HyperTransportConfig, TransportSecurity};
use crate::error::{BoxError, failure, transport_failure};
use crate::layers::DefaultHeadersLayer;
use crate::tls;

/// The composed middleware stack around the hyper client.
pub type HttpService = BoxCloneService<Request<RequestBody>, Response<ResponseBody>, BoxError>;

/// State installed by `configure`.
pub struct Engine {
    service: Mutex<HttpService>,
    pub timeout: Duration,
    pub delegate: Arc<dyn TransferDelegate>,
}

impl Engine {
    pub fn service(&self) -> HttpService {
        self.service.lock().clone()
    }
}

/// [`Transport`] backed by a pooled hyper client with rustls TLS.
///
/// Responses are transparently decompressed (gzip, brotli, deflate). Engine
/// headers from [`EngineConfig`] and the configured User-Agent are added to
/// requests that don't carry them.
pub struct HyperTransport {
    config: HyperTransportConfig,
    engine: ArcSwapOption<Engine>,
    next_handle: AtomicU64,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .field("configured", &self.engine.load().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(HyperTransportConfig::default())
    }
}

impl HyperTransport {
    #[must_use]
    pub fn new(config: HyperTransportConfig) -> Self {
        Self {
            config,
            engine: ArcSwapOption::empty(),
            next_handle: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HyperTransportConfig {
        &self.config
    }

    fn engine(&self) -> Result<Arc<Engine>, RequestError> {
        self.engine.load_full().ok_or(RequestError::NotConfigured)
    }

    fn next_task(&self) -> (TransferTask, StartGate) {
        TransferTask::new(TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn build_service(&self, headers: HeaderMap) -> Result<HttpService, RequestError> {
        let https = tls::https_connector(self.config.tls_roots, self.config.transport)?;

        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .pool_idle_timeout(self.config.pool_idle_timeout);
        let client = builder.build::<_, RequestBody>(https);

        let defaults = DefaultHeadersLayer::new(headers).with_user_agent(&self.config.user_agent)?;

        let service = ServiceBuilder::new()
            .layer(defaults)
            .layer(DecompressionLayer::new())
            .service(client)
            .map_response(boxed_response)
            .map_err(|e| -> BoxError { Box::new(e) });

        Ok(BoxCloneService::new(service))
    }

    /// Refuse schemes the security policy doesn't allow.
    fn check_scheme(&self, uri: &Uri) -> Result<(), RequestError> {
        let allowed = match uri.scheme_str() {
            Some(scheme) if scheme.eq_ignore_ascii_case("https") => true,
            Some(scheme) if scheme.eq_ignore_ascii_case("http") => {
                self.config.transport == TransportSecurity::AllowInsecureHttp
            }
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(failure(
                TransportErrorKind::InsecureScheme,
                format!("scheme of '{uri}' is not allowed by the transport security policy"),
            ))
        }
    }

    /// Request timeout, then engine timeout, then the transport fallback.
    fn timeout_for(&self, engine: &Engine, request: &TransportRequest) -> Duration {
        request
            .timeout
            .filter(|t| !t.is_zero())
            .or_else(|| Some(engine.timeout).filter(|t| !t.is_zero()))
            .unwrap_or(self.config.request_timeout)
    }
}

fn boxed_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

/// Turn a transport request into an `http::Request` carrying `body`.
pub fn to_http(request: TransportRequest, body: RequestBody) -> Request<RequestBody> {
    let mut http_request = Request::new(body);
    *http_request.method_mut() = request.method;
    *http_request.uri_mut() = request.uri;
    *http_request.headers_mut() = request.headers;
    if request.cache_policy == CachePolicy::ReloadIgnoringLocalCacheData {
        http_request
            .headers_mut()
            .entry(CACHE_CONTROL)
            .or_insert(HeaderValue::from_static("no-cache"));
    }
    http_request
}

pub fn timed_out(timeout: Duration) -> RequestError {
    failure(
        TransportErrorKind::TimedOut,
        format!("request timed out after {timeout:?}"),
    )
}

#[async_trait]
impl Transport for HyperTransport {
    fn configure(&self, config: EngineConfig) -> Result<(), RequestError> {
        let service = self.build_service(config.headers)?;
        self.engine.store(Some(Arc::new(Engine {
            service: Mutex::new(service),
            timeout: config.timeout,
            delegate: config.delegate,
        })));
        tracing::debug!(
            timeout = ?config.timeout,
            security = ?self.config.transport,
            "hyper transport configured"
        );
        Ok(())
    }

    async fn submit(&self, mut request: TransportRequest) -> Result<TransportResponse, RequestError> {
        let engine = self.engine()?;
        self.check_scheme(&request.uri)?;

        let timeout = self.timeout_for(&engine, &request);
        let limit = self.config.max_body_size;
        let method = request.method.clone();
        let uri = request.uri.clone();
        let payload = std::mem::take(&mut request.body);
        let http_request = to_http(request, body::full(payload));

        let exchange = async move {
            let call: BoxFuture<'static, Result<Response<ResponseBody>, BoxError>> =
                Box::pin(engine.service().oneshot(http_request));
            let response = call.await.map_err(transport_failure)?;
            let (parts, body) = response.into_parts();
            let body = body::read_limited(body, limit).await?;
            Ok::<_, RequestError>(TransportResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        let response = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| timed_out(timeout))??;
        tracing::debug!(%method, url = %uri, status = response.status.as_u16(), "response received");
        Ok(response)
    }

    async fn submit_background_download(&self, request: TransportRequest) -> Result<TransferTask, RequestError> {
        let engine = self.engine()?;
        self.check_scheme(&request.uri)?;

        let (task, gate) = self.next_task();
        let job = background::Job {
            handle: task.handle(),
            timeout: self.timeout_for(&engine, &request),
            engine,
        };
        let http_request = to_http(request, body::full(Bytes::new()));
        tokio::spawn(background::download(
            job,
            http_request,
            gate,
            self.config.download_dir.clone(),
        ));
        Ok(task)
    }

    async fn submit_background_upload(
        &self,
        mut request: TransportRequest,
        payload: &Path,
    ) -> Result<TransferTask, RequestError> {
        let engine = self.engine()?;
        self.check_scheme(&request.uri)?;
        let data = tokio::fs::read(payload).await.map_err(|e| {
            tracing::warn!(path = %payload.display(), error = %e, "upload payload unreadable");
            RequestError::NoData
        })?;
        request.body = Bytes::new();

        let (task, gate) = self.next_task();
        let job = background::Job {
            handle: task.handle(),
            timeout: self.timeout_for(&engine, &request),
            engine,
        };
        tokio::spawn(background::upload(job, request, Bytes::from(data), gate));
        Ok(task)
    }
}
