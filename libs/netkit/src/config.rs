use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

use crate::codec::{CodecRegistry, JsonCodecRegistry};
use crate::descriptor::CachePolicy;
use crate::error::RequestError;
use crate::transport::{Transport, TransferDelegate};

/// Timeout applied when neither the descriptor nor the configuration sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Process-wide settings for a [`NetworkClient`](crate::NetworkClient).
///
/// Immutable once built; re-configuring the client swaps in a new snapshot.
#[derive(Clone)]
pub struct NetworkConfig {
    pub(crate) base_path: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) codecs: Arc<dyn CodecRegistry>,
    pub(crate) timeout: Duration,
    pub(crate) cache_policy: CachePolicy,
    pub(crate) delegate: Option<Arc<dyn TransferDelegate>>,
    pub(crate) transport: Arc<dyn Transport>,
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("base_path", &self.base_path)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("cache_policy", &self.cache_policy)
            .field("custom_delegate", &self.delegate.is_some())
            .finish_non_exhaustive()
    }
}

impl NetworkConfig {
    /// Start a configuration around `transport` with JSON codecs, a 60 second
    /// timeout and the protocol cache policy.
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>) -> NetworkConfigBuilder {
        NetworkConfigBuilder {
            config: Self {
                base_path: None,
                headers: Vec::new(),
                codecs: Arc::new(JsonCodecRegistry::new()),
                timeout: DEFAULT_TIMEOUT,
                cache_policy: CachePolicy::default(),
                delegate: None,
                transport,
            },
        }
    }

    #[must_use]
    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    #[must_use]
    pub fn codecs(&self) -> &Arc<dyn CodecRegistry> {
        &self.codecs
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Global headers as a validated map.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHeader` if a name or value is not valid HTTP.
    pub fn header_map(&self) -> Result<HeaderMap, RequestError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let (name, value) = parse_header(name, value)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

/// Fluent builder for [`NetworkConfig`].
#[must_use]
pub struct NetworkConfigBuilder {
    config: NetworkConfig,
}

impl NetworkConfigBuilder {
    /// Base path for relative descriptor paths.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.config.base_path = Some(base_path.into());
        self
    }

    /// Header sent with every request unless the descriptor overrides it.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    pub fn codecs(mut self, codecs: Arc<dyn CodecRegistry>) -> Self {
        self.config.codecs = codecs;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.config.cache_policy = policy;
        self
    }

    /// Route background notifications to `delegate` instead of the client's
    /// own progress registry.
    pub fn delegate(mut self, delegate: Arc<dyn TransferDelegate>) -> Self {
        self.config.delegate = Some(delegate);
        self
    }

    #[must_use]
    pub fn build(self) -> NetworkConfig {
        self.config
    }
}

pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), RequestError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| RequestError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| RequestError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })?;
    Ok((header_name, header_value))
}
