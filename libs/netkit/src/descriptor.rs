use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::CodecRegistry;
use crate::content::{RequestContentType, ResponseContentType};
use crate::error::{CodecError, RequestError};

/// Marker type for requests whose response carries no body.
///
/// Submit a descriptor with [`ResponseContentType::None`] and ask for this type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EmptyResponse;

/// Cache behaviour requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePolicy {
    /// Follow the protocol's caching rules
    #[default]
    UseProtocolCachePolicy,
    /// Always go to the origin
    ReloadIgnoringLocalCacheData,
    /// Use cached data regardless of age, load if absent
    ReturnCacheDataElseLoad,
    /// Use cached data only, never load
    ReturnCacheDataDontLoad,
}

/// Value of a single query parameter.
///
/// `Bool(true)` renders as the bare key, `Bool(false)` drops the parameter.
/// Text is percent-encoded; numbers render as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Bool(bool),
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i32> for QueryValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for QueryValue {
    fn from(v: u32) -> Self {
        Self::Unsigned(u64::from(v))
    }
}

impl From<u64> for QueryValue {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<f64> for QueryValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Request body held by a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Sent verbatim; no encoder is consulted
    Bytes(Bytes),
    /// Rendered by the encoder registered for the request content type
    Structured(serde_json::Value),
}

/// Declarative description of a single logical request.
///
/// A descriptor is an immutable value: every setter consumes and returns it.
/// The client reads it during the build phase and never mutates it.
///
/// # Example
///
/// ```ignore
/// let descriptor = RequestDescriptor::post("users")
///     .header("x-request-id", "abc")
///     .query("notify", true)
///     .json(&NewUser { name: "Alice" })?;
///
/// let user: User = client.submit(&descriptor).await?;
/// ```
#[derive(Clone)]
#[must_use]
pub struct RequestDescriptor {
    pub(crate) base_path: Option<String>,
    pub(crate) path: String,
    pub(crate) method: http::Method,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) request_type: RequestContentType,
    pub(crate) response_type: ResponseContentType,
    pub(crate) query: Vec<(String, QueryValue)>,
    pub(crate) body: Option<Body>,
    pub(crate) timeout: Duration,
    pub(crate) cache_policy: Option<CachePolicy>,
    pub(crate) codecs: Option<Arc<dyn CodecRegistry>>,
    pub(crate) uses_auth: bool,
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("base_path", &self.base_path)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("request_type", &self.request_type)
            .field("response_type", &self.response_type)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("cache_policy", &self.cache_policy)
            .field("codecs", &self.codecs.is_some())
            .field("uses_auth", &self.uses_auth)
            .finish()
    }
}

impl RequestDescriptor {
    /// Descriptor with the given method and path and every other attribute defaulted:
    /// JSON request and response, no headers, query or body, default timeout and
    /// cache policy, global codecs, auth enabled.
    pub fn new(method: http::Method, path: impl Into<String>) -> Self {
        Self {
            base_path: None,
            path: path.into(),
            method,
            headers: Vec::new(),
            request_type: RequestContentType::default(),
            response_type: ResponseContentType::default(),
            query: Vec::new(),
            body: None,
            timeout: Duration::ZERO,
            cache_policy: None,
            codecs: None,
            uses_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(http::Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(http::Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(http::Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(http::Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(http::Method::DELETE, path)
    }

    /// Base path for a relative `path`; takes precedence over the configured one.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Add a header. Descriptor headers win over configured headers on collision.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn request_type(mut self, content_type: RequestContentType) -> Self {
        self.request_type = content_type;
        self
    }

    pub fn response_type(mut self, content_type: ResponseContentType) -> Self {
        self.response_type = content_type;
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a structured body, rendered at build time by the encoder for the
    /// request content type.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::Serialization` if `body` cannot be represented
    /// as a structured value.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, RequestError> {
        let value = serde_json::to_value(body)
            .map_err(|e| RequestError::Serialization(CodecError::Json(e)))?;
        self.body = Some(Body::Structured(value));
        Ok(self)
    }

    /// Set a raw body sent without encoding.
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Bytes(body.into()));
        self
    }

    /// Per-request timeout. Zero means "use the configured default".
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    /// Codec registry used instead of the configured one for this request.
    pub fn codecs(mut self, codecs: Arc<dyn CodecRegistry>) -> Self {
        self.codecs = Some(codecs);
        self
    }

    /// Whether the auth provider applies credentials and handles 401 refresh.
    ///
    /// Disable for the refresh request itself and for sign-in style endpoints.
    pub fn uses_auth(mut self, uses_auth: bool) -> Self {
        self.uses_auth = uses_auth;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn method(&self) -> &http::Method {
        &self.method
    }

    #[must_use]
    pub fn response_content_type(&self) -> ResponseContentType {
        self.response_type
    }

    #[must_use]
    pub fn request_content_type(&self) -> &RequestContentType {
        &self.request_type
    }

    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.uses_auth
    }
}
