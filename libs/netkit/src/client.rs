use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use futures::FutureExt;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::auth::AuthProvider;
use crate::config::{NetworkConfig, parse_header};
use crate::content::ResponseContentType;
use crate::descriptor::{Body, EmptyResponse, RequestDescriptor};
use crate::error::{CodecError, RequestError, TransportError, TransportErrorKind, check_status};
use crate::progress::{
    CallbackExecutor, DownloadHandler, ImmediateExecutor, ProgressHandler, ProgressRegistry, UploadHandler,
};
use crate::refresh::RefreshCoordinator;
use crate::transport::{EngineConfig, TransferDelegate, TransferTask, TransportRequest, TransportResponse};
use crate::url_builder;

/// Observes requests and their raw outcomes. Has no effect on control flow.
pub trait ResponseInspector: Send + Sync {
    /// Called before the request is built.
    fn will_submit(&self, _descriptor: &RequestDescriptor) {}

    /// Called with the final transport outcome, after any refresh retry and
    /// before classification.
    fn did_receive(&self, _descriptor: &RequestDescriptor, _outcome: Result<&TransportResponse, &RequestError>) {}
}

/// Inspector that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInspector;

impl ResponseInspector for NoopInspector {}

/// Configuration snapshot swapped in by [`NetworkClient::configure`].
struct ClientState {
    config: NetworkConfig,
    auth: Option<Arc<dyn AuthProvider>>,
}

struct ClientInner {
    state: ArcSwapOption<ClientState>,
    refresh: RefreshCoordinator,
    registry: Arc<ProgressRegistry>,
    inspector: Arc<dyn ResponseInspector>,
}

/// Request orchestrator.
///
/// Turns [`RequestDescriptor`]s into transport requests, submits them,
/// refreshes credentials once on a 401 (shared across concurrent callers),
/// classifies the outcome and decodes the body into the caller's type.
///
/// `NetworkClient` is cheap to clone; clones share configuration, the refresh
/// coordinator and the progress registry.
///
/// # Example
///
/// ```ignore
/// let client = NetworkClient::new();
/// client.configure(
///     NetworkConfig::builder(Arc::new(HyperTransport::new(HyperTransportConfig::default())))
///         .base_path("https://api.example.com/v1")
///         .header("x-client", "my-app")
///         .build(),
///     Some(Arc::new(BearerAuth::new(token_source))),
/// )?;
///
/// let user: User = client.submit(&RequestDescriptor::get("users/42")).await?;
/// ```
#[derive(Clone)]
pub struct NetworkClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkClient")
            .field("configured", &self.is_configured())
            .field("refresh", &self.inner.refresh)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`NetworkClient`].
#[must_use]
pub struct NetworkClientBuilder {
    executor: Arc<dyn CallbackExecutor>,
    inspector: Arc<dyn ResponseInspector>,
}

impl NetworkClientBuilder {
    /// Where progress and upload completion callbacks run.
    pub fn executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn ResponseInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    #[must_use]
    pub fn build(self) -> NetworkClient {
        NetworkClient {
            inner: Arc::new(ClientInner {
                state: ArcSwapOption::empty(),
                refresh: RefreshCoordinator::new(),
                registry: Arc::new(ProgressRegistry::new(self.executor)),
                inspector: self.inspector,
            }),
        }
    }
}

impl NetworkClient {
    /// Unconfigured client with inline callbacks and no inspector.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> NetworkClientBuilder {
        NetworkClientBuilder {
            executor: Arc::new(ImmediateExecutor),
            inspector: Arc::new(NoopInspector),
        }
    }

    /// Install a configuration and optional auth provider.
    ///
    /// Pushes engine settings to the transport, wiring background
    /// notifications to the configured delegate or, by default, this client's
    /// progress registry. Replaces any previous configuration atomically;
    /// requests already in flight keep the snapshot they started with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHeader` for an invalid global header, or whatever the
    /// transport reports from its own `configure`.
    pub fn configure(&self, config: NetworkConfig, auth: Option<Arc<dyn AuthProvider>>) -> Result<(), RequestError> {
        let delegate: Arc<dyn TransferDelegate> = match &config.delegate {
            Some(delegate) => Arc::clone(delegate),
            None => self.inner.registry.clone(),
        };
        config.transport.configure(EngineConfig {
            headers: config.header_map()?,
            timeout: config.timeout,
            cache_policy: config.cache_policy,
            delegate,
        })?;

        tracing::info!(
            base_path = config.base_path.as_deref().unwrap_or("<none>"),
            timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
            auth = auth.is_some(),
            "network client configured"
        );
        self.inner.state.store(Some(Arc::new(ClientState { config, auth })));
        Ok(())
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.state.load().is_some()
    }

    /// Registry receiving this client's background transfer notifications.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProgressRegistry> {
        &self.inner.registry
    }

    /// Resolve the URL `descriptor` would be sent to.
    ///
    /// # Errors
    ///
    /// `NotConfigured`, `NoBasePath` or `InvalidUrl`.
    pub fn url(&self, descriptor: &RequestDescriptor) -> Result<http::Uri, RequestError> {
        let state = self.inner.state.load();
        url_builder::url(descriptor, state.as_deref().map(|s| &s.config))
    }

    /// Perform `descriptor` and decode the response into `T`.
    ///
    /// Use [`EmptyResponse`] with [`ResponseContentType::None`], and
    /// [`Bytes`] or `Vec<u8>` for raw [`ResponseContentType::Binary`] bodies.
    ///
    /// # Errors
    ///
    /// Any [`RequestError`] from building, transport, classification or
    /// decoding.
    pub async fn submit<T>(&self, descriptor: &RequestDescriptor) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Any,
    {
        let state = self.state()?;
        self.inner.inspector.will_submit(descriptor);

        let outcome = self.perform(descriptor, &state).await;
        self.inner.inspector.did_receive(descriptor, outcome.as_ref());

        let response = outcome?;
        check_status(response.status, &response.headers, &response.body)?;
        decode(descriptor, &state.config, response.body)
    }

    /// Start a background download.
    ///
    /// Returns `None` if the transfer could not be started; `completion` then
    /// receives the failure immediately. Otherwise `progress` and
    /// `completion` are driven by transport notifications. Callbacks only fire
    /// when notifications reach this client's registry (the default delegate).
    pub async fn submit_background_download(
        &self,
        descriptor: &RequestDescriptor,
        progress: Option<ProgressHandler>,
        completion: DownloadHandler,
    ) -> Option<TransferTask> {
        let started = async {
            let state = self.state()?;
            let request = Self::build_request(descriptor, &state)?;
            state.config.transport.submit_background_download(request).await
        }
        .await;

        match started {
            Ok(task) => {
                tracing::debug!(transfer = %task.handle(), path = descriptor.path(), "background download started");
                self.inner
                    .registry
                    .register_download(Some(task.handle()), progress, completion);
                task.resume();
                Some(task)
            }
            Err(e) => {
                let e = e.reclassify();
                tracing::warn!(path = descriptor.path(), error = %e, "background download not started");
                completion(Err(e));
                None
            }
        }
    }

    /// Start a background upload of the descriptor's encoded body.
    ///
    /// The body is staged in a temporary file for the transport. An empty
    /// body starts nothing and reports `NoData`.
    pub async fn submit_background_upload(
        &self,
        descriptor: &RequestDescriptor,
        progress: Option<ProgressHandler>,
        completion: Option<UploadHandler>,
    ) -> Option<TransferTask> {
        match self.start_upload(descriptor).await {
            Ok(task) => {
                tracing::debug!(transfer = %task.handle(), path = descriptor.path(), "background upload started");
                self.inner
                    .registry
                    .register_upload(Some(task.handle()), progress, completion);
                task.resume();
                Some(task)
            }
            Err(e) => {
                let e = e.reclassify();
                tracing::warn!(path = descriptor.path(), error = %e, "background upload not started");
                if let Some(completion) = completion {
                    completion(Err(e));
                }
                None
            }
        }
    }

    async fn start_upload(&self, descriptor: &RequestDescriptor) -> Result<TransferTask, RequestError> {
        let state = self.state()?;
        let mut request = Self::build_request(descriptor, &state)?;
        let payload = std::mem::take(&mut request.body);
        if payload.is_empty() {
            return Err(RequestError::NoData);
        }

        let mut staged = tempfile::NamedTempFile::new().map_err(staging_error)?;
        staged.write_all(&payload).map_err(staging_error)?;
        staged.flush().map_err(staging_error)?;

        // the transport reads the payload before returning; the file goes
        // away when `staged` drops
        state
            .config
            .transport
            .submit_background_upload(request, staged.path())
            .await
    }

    fn state(&self) -> Result<Arc<ClientState>, RequestError> {
        self.inner.state.load_full().ok_or(RequestError::NotConfigured)
    }

    /// Build phase: URL, body, headers, timeout, cache policy, credentials.
    fn build_request(descriptor: &RequestDescriptor, state: &ClientState) -> Result<TransportRequest, RequestError> {
        let config = &state.config;
        let uri = url_builder::url(descriptor, Some(config))?;

        let codecs = descriptor.codecs.as_ref().unwrap_or(&config.codecs);
        let body = match &descriptor.body {
            None => Bytes::new(),
            Some(Body::Bytes(bytes)) => bytes.clone(),
            Some(Body::Structured(value)) => {
                let encoder = codecs
                    .encoder(&descriptor.request_type)
                    .ok_or(RequestError::NoEncoder)?;
                Bytes::from(encoder.encode(value).map_err(RequestError::Serialization)?)
            }
        };

        let mut headers = config.header_map()?;
        if let Some(content_type) = descriptor.request_type.header_value() {
            let value = HeaderValue::from_str(&content_type).map_err(|e| RequestError::InvalidHeader {
                name: CONTENT_TYPE.to_string(),
                reason: e.to_string(),
            })?;
            headers.insert(CONTENT_TYPE, value);
        }
        if let Some(accept) = descriptor.response_type.accept_value() {
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
        }
        let mut overridden = HashSet::new();
        for (name, value) in &descriptor.headers {
            let (name, value) = parse_header(name, value)?;
            if overridden.insert(name.clone()) {
                headers.insert(name, value);
            } else {
                headers.append(name, value);
            }
        }

        let timeout = if descriptor.timeout.is_zero() {
            config.timeout
        } else {
            descriptor.timeout
        };

        let mut request = TransportRequest {
            method: descriptor.method.clone(),
            uri,
            headers,
            body,
            timeout: Some(timeout),
            cache_policy: descriptor.cache_policy.unwrap_or(config.cache_policy),
        };

        if descriptor.uses_auth
            && let Some(auth) = &state.auth
        {
            auth.apply(&mut request);
        }

        tracing::debug!(
            method = %request.method,
            url = %request.uri,
            body_len = request.body.len(),
            "built request"
        );
        Ok(request)
    }

    /// Submit, then refresh and retry once on a 401 when auth applies.
    async fn perform(&self, descriptor: &RequestDescriptor, state: &ClientState) -> Result<TransportResponse, RequestError> {
        let request = Self::build_request(descriptor, state)?;
        let transport = &state.config.transport;

        let response = transport
            .submit(request.clone())
            .await
            .map_err(RequestError::reclassify)?;
        tracing::debug!(
            method = %request.method,
            url = %request.uri,
            status = response.status.as_u16(),
            "received response"
        );

        if response.status != StatusCode::UNAUTHORIZED || !descriptor.uses_auth {
            return Ok(response);
        }
        let Some(auth) = state.auth.clone() else {
            return Ok(response);
        };

        if !self.refresh(Arc::clone(&auth)).await {
            tracing::debug!(url = %request.uri, "credential refresh failed; not retrying");
            return Ok(response);
        }

        let mut retry = request;
        auth.apply(&mut retry);
        let url = retry.uri.clone();
        match transport.submit(retry).await {
            Ok(retried) => {
                tracing::debug!(url = %url, status = retried.status.as_u16(), "retried after credential refresh");
                Ok(retried)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "retry after credential refresh failed; keeping original 401");
                Ok(response)
            }
        }
    }

    /// Join the in-flight refresh or start one.
    async fn refresh(&self, auth: Arc<dyn AuthProvider>) -> bool {
        let inner: Weak<ClientInner> = Arc::downgrade(&self.inner);
        self.inner
            .refresh
            .handle(move || {
                async move {
                    let Some(inner) = inner.upgrade() else {
                        return false;
                    };
                    auth.refresh(&NetworkClient { inner }).await
                }
                .boxed()
            })
            .await
    }
}

fn staging_error(err: std::io::Error) -> RequestError {
    RequestError::Transport(TransportError::new(TransportErrorKind::Io, err))
}

/// Move `value` into `T` when both are the same type.
fn downcast<T: Any, U: Any>(value: U) -> Option<T> {
    let mut slot = Some(value);
    (&mut slot as &mut dyn Any)
        .downcast_mut::<Option<T>>()
        .and_then(Option::take)
}

/// Decode phase, selected by the expected response content type.
fn decode<T>(descriptor: &RequestDescriptor, config: &NetworkConfig, body: Bytes) -> Result<T, RequestError>
where
    T: DeserializeOwned + Any,
{
    let response_type = descriptor.response_type;
    match response_type {
        ResponseContentType::None => {
            return downcast::<T, _>(EmptyResponse).ok_or(RequestError::UnexpectedResponse {
                expected: response_type,
            });
        }
        ResponseContentType::Binary => {
            if let Some(bytes) = downcast::<T, _>(body.clone()) {
                return Ok(bytes);
            }
            if TypeId::of::<T>() == TypeId::of::<Vec<u8>>()
                && let Some(bytes) = downcast::<T, _>(body.to_vec())
            {
                return Ok(bytes);
            }
        }
        ResponseContentType::Json => {}
    }

    if body.is_empty() {
        return Err(RequestError::NoData);
    }

    let codecs = descriptor.codecs.as_ref().unwrap_or(&config.codecs);
    let decoder = codecs
        .decoder(response_type)
        .or_else(|| codecs.decoder(ResponseContentType::Json))
        .ok_or(RequestError::NoDecoder)?;
    let value = decoder.decode(&body).map_err(RequestError::Deserialization)?;
    tracing::trace!(body = %value, "decoded response");
    serde_json::from_value(value).map_err(|e| RequestError::Deserialization(CodecError::Json(e)))
}
