//! Credential injection and refresh.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use http::HeaderValue;
use http::header::{AUTHORIZATION, HeaderName};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::client::NetworkClient;
use crate::descriptor::RequestDescriptor;
use crate::error::RequestError;
use crate::transport::TransportRequest;

/// Applies credentials to outgoing requests and refreshes them after a 401.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Attach credentials to `request`.
    fn apply(&self, request: &mut TransportRequest);

    /// Obtain new credentials. Returns `false` on any failure; never errors.
    ///
    /// `client` may be used to call a token endpoint; such requests must set
    /// `uses_auth(false)`.
    async fn refresh(&self, client: &NetworkClient) -> bool;
}

/// Failure to obtain a token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The token request itself failed
    #[error("token request failed: {0}")]
    Request(#[from] RequestError),

    /// The token response did not contain the expected field
    #[error("token response has no '{0}' field")]
    MissingToken(String),

    /// Failure reported by an application token source
    #[error("token source failed: {0}")]
    Source(String),
}

/// Source of fresh bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AuthError`] if no token could be obtained.
    async fn fetch(&self, client: &NetworkClient) -> Result<SecretString, AuthError>;
}

/// Token source that calls a token endpoint and reads one string field from
/// its JSON response.
#[derive(Debug, Clone)]
pub struct EndpointTokenSource {
    descriptor: RequestDescriptor,
    token_field: String,
}

impl EndpointTokenSource {
    /// `descriptor` is always sent without auth.
    pub fn new(descriptor: RequestDescriptor, token_field: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.uses_auth(false),
            token_field: token_field.into(),
        }
    }
}

#[async_trait]
impl TokenSource for EndpointTokenSource {
    async fn fetch(&self, client: &NetworkClient) -> Result<SecretString, AuthError> {
        let body: serde_json::Value = client.submit(&self.descriptor).await?;
        body.get(&self.token_field)
            .and_then(serde_json::Value::as_str)
            .map(|token| SecretString::from(token.to_owned()))
            .ok_or_else(|| AuthError::MissingToken(self.token_field.clone()))
    }
}

/// Bearer token provider.
///
/// Injects `Authorization: Bearer <token>` (or a custom header) when a token
/// is present. Reads are lock-free; a refresh swaps the token atomically and
/// keeps the old one if the source fails.
pub struct BearerAuth {
    token: ArcSwapOption<SecretString>,
    header_name: HeaderName,
    source: Arc<dyn TokenSource>,
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("header_name", &self.header_name)
            .field("has_token", &self.has_token())
            .finish_non_exhaustive()
    }
}

impl BearerAuth {
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            token: ArcSwapOption::empty(),
            header_name: AUTHORIZATION,
            source,
        }
    }

    /// Start with an initial token.
    #[must_use]
    pub fn with_token(self, token: SecretString) -> Self {
        self.set_token(token);
        self
    }

    /// Inject `<header_name>: Bearer <token>` instead of `Authorization`.
    #[must_use]
    pub fn with_header_name(mut self, header_name: HeaderName) -> Self {
        self.header_name = header_name;
        self
    }

    pub fn set_token(&self, token: SecretString) {
        self.token.store(Some(Arc::new(token)));
    }

    /// Forget the current token.
    pub fn clear(&self) {
        self.token.store(None);
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.load().is_some()
    }
}

#[async_trait]
impl AuthProvider for BearerAuth {
    fn apply(&self, request: &mut TransportRequest) {
        let Some(token) = self.token.load_full() else {
            return;
        };
        let raw = zeroize::Zeroizing::new(format!("Bearer {}", token.expose_secret()));
        match HeaderValue::from_str(&raw) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(self.header_name.clone(), value);
            }
            Err(e) => tracing::warn!("bearer token is not a valid header value: {e}"),
        }
    }

    async fn refresh(&self, client: &NetworkClient) -> bool {
        match self.source.fetch(client).await {
            Ok(token) => {
                self.set_token(token);
                true
            }
            Err(e) => {
                tracing::warn!("bearer token refresh failed: {e}");
                false
            }
        }
    }
}
