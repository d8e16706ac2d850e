use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::content::ResponseContentType;

/// Low-level failure classes reported by a [`Transport`](crate::Transport).
///
/// Transports map their native errors onto these kinds so the orchestrator can
/// reclassify connectivity and certificate failures without knowing which
/// HTTP stack produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// TLS handshake or certificate validation failed
    SecureConnectionFailed,
    /// Host name could not be resolved to an address
    CannotFindHost,
    /// Host was resolved but the connection was refused
    CannotConnectToHost,
    /// An established connection was reset or dropped
    NetworkConnectionLost,
    /// No usable network route
    NotConnectedToInternet,
    /// DNS lookup failed for reasons other than an unknown host
    DnsLookupFailed,
    /// Attempt exceeded its timeout
    TimedOut,
    /// Transfer was cancelled by the caller
    Cancelled,
    /// URL scheme refused by the transport security policy
    InsecureScheme,
    /// Response body exceeded the configured limit
    BodyTooLarge,
    /// Local file I/O during a background transfer failed
    Io,
    /// Anything else
    Other,
}

impl TransportErrorKind {
    /// Whether this kind indicates missing connectivity rather than a server problem.
    #[must_use]
    pub fn is_connectivity(self) -> bool {
        matches!(
            self,
            Self::CannotFindHost
                | Self::CannotConnectToHost
                | Self::NetworkConnectionLost
                | Self::NotConnectedToInternet
                | Self::DnsLookupFailed
        )
    }
}

/// Error produced by a transport while performing I/O.
#[derive(Debug, Error)]
#[error("{kind:?}: {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    /// Wrap a native transport error with its classification.
    pub fn new(
        kind: TransportErrorKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    /// Classification of this failure.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

/// Failure raised by an encoder or decoder.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// JSON (de)serialization failed
    #[error("JSON codec failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A form URL encoded body must be a flat key/value object
    #[error("form URL encoding requires a key/value object body")]
    NotParameters,

    /// Error raised by an application-supplied codec
    #[error("codec failed: {0}")]
    Custom(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Body of a failed HTTP response, interpreted as far as possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    /// Zero bytes
    None,
    /// Body parsed as a JSON object
    JsonObject(serde_json::Map<String, serde_json::Value>),
    /// Body parsed as a JSON array
    JsonArray(Vec<serde_json::Value>),
    /// Anything else, verbatim
    Raw(Bytes),
}

impl ErrorBody {
    /// Interpret raw response bytes.
    #[must_use]
    pub fn from_bytes(bytes: &Bytes) -> Self {
        if bytes.is_empty() {
            return Self::None;
        }
        match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(serde_json::Value::Object(map)) => Self::JsonObject(map),
            Ok(serde_json::Value::Array(items)) => Self::JsonArray(items),
            _ => Self::Raw(bytes.clone()),
        }
    }
}

/// Classified outcome of a failed request.
///
/// Every failure of [`NetworkClient::submit`](crate::NetworkClient::submit) and
/// every failed background transfer surfaces as one of these variants.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    /// Relative path with neither a descriptor nor a global base path
    #[error("relative path requires a base path")]
    NoBasePath,

    /// Resolved URL could not be parsed
    #[error("invalid URL '{url}'")]
    InvalidUrl { url: String },

    /// Submission attempted before `configure`
    #[error("network client is not configured")]
    NotConfigured,

    /// Header name or value is not valid HTTP
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    /// Transport produced no HTTP response
    #[error("transport returned no HTTP response")]
    InvalidResponse,

    /// Decoding required bytes but the body was empty
    #[error("response contained no data")]
    NoData,

    /// Caller expected a different representation than the response type produces
    #[error("unexpected response for content type {expected:?}")]
    UnexpectedResponse { expected: ResponseContentType },

    /// Decoder failed
    #[error("failed to decode response: {0}")]
    Deserialization(#[source] CodecError),

    /// Encoder failed
    #[error("failed to encode request body: {0}")]
    Serialization(#[source] CodecError),

    /// No decoder registered for the response content type
    #[error("no decoder for the response content type")]
    NoDecoder,

    /// No encoder registered for the request content type
    #[error("no encoder for the request content type")]
    NoEncoder,

    /// 401 after the refresh phase was attempted or skipped
    #[error("request is unauthenticated")]
    Unauthenticated,

    /// TLS failure reported by the transport
    #[error("secure connection failed: {0}")]
    InvalidSsl(#[source] TransportError),

    /// Connectivity failure reported by the transport
    #[error("no internet connection: {0}")]
    NoInternet(#[source] TransportError),

    /// Any status other than 2xx and 401
    #[error("HTTP {status}")]
    HttpStatus {
        status: StatusCode,
        headers: HeaderMap,
        body: ErrorBody,
    },

    /// Transport failure that has no dedicated classification
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl RequestError {
    /// Reclassify known low-level connectivity and certificate failures.
    ///
    /// All other errors pass through unchanged.
    #[must_use]
    pub fn reclassify(self) -> Self {
        match self {
            Self::Transport(err) if err.kind() == TransportErrorKind::SecureConnectionFailed => {
                Self::InvalidSsl(err)
            }
            Self::Transport(err) if err.kind().is_connectivity() => Self::NoInternet(err),
            other => other,
        }
    }

    /// Status code when this is an HTTP status failure.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Unauthenticated => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// Classify a final status code: 2xx passes, 401 is `Unauthenticated`,
/// everything else becomes `HttpStatus` with `body` interpreted.
///
/// # Errors
///
/// Returns the classified failure for any non-2xx status.
pub fn check_status(status: StatusCode, headers: &HeaderMap, body: &Bytes) -> Result<(), RequestError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(RequestError::Unauthenticated);
    }
    Err(RequestError::HttpStatus {
        status,
        headers: headers.clone(),
        body: ErrorBody::from_bytes(body),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::error::Error;
    use std::io;

    fn transport(kind: TransportErrorKind) -> TransportError {
        TransportError::new(kind, io::Error::other("boom"))
    }

    #[test]
    fn error_body_empty_is_none() {
        assert_eq!(ErrorBody::from_bytes(&Bytes::new()), ErrorBody::None);
    }

    #[test]
    fn error_body_json_object_preserves_keys() {
        let bytes = Bytes::from(r#"{"code":"E42","detail":{"field":"name"},"retry":false}"#);
        let ErrorBody::JsonObject(map) = ErrorBody::from_bytes(&bytes) else {
            panic!("expected JSON object");
        };
        assert_eq!(map["code"], json!("E42"));
        assert_eq!(map["detail"], json!({"field": "name"}));
        assert_eq!(map["retry"], json!(false));
    }

    #[test]
    fn error_body_json_array() {
        let bytes = Bytes::from("[1, 2, 3]");
        assert_eq!(
            ErrorBody::from_bytes(&bytes),
            ErrorBody::JsonArray(vec![json!(1), json!(2), json!(3)])
        );
    }

    #[test]
    fn error_body_scalar_json_is_raw() {
        let bytes = Bytes::from("\"just a string\"");
        assert_eq!(ErrorBody::from_bytes(&bytes), ErrorBody::Raw(bytes));
    }

    #[test]
    fn error_body_text_is_raw() {
        let bytes = Bytes::from("<html>Not Found</html>");
        assert_eq!(ErrorBody::from_bytes(&bytes), ErrorBody::Raw(bytes));
    }

    #[test]
    fn reclassify_tls_failure() {
        let err = RequestError::Transport(transport(TransportErrorKind::SecureConnectionFailed));
        assert!(matches!(err.reclassify(), RequestError::InvalidSsl(_)));
    }

    #[test]
    fn reclassify_connectivity_failures() {
        for kind in [
            TransportErrorKind::CannotFindHost,
            TransportErrorKind::CannotConnectToHost,
            TransportErrorKind::NetworkConnectionLost,
            TransportErrorKind::NotConnectedToInternet,
            TransportErrorKind::DnsLookupFailed,
        ] {
            let err = RequestError::Transport(transport(kind)).reclassify();
            assert!(
                matches!(&err, RequestError::NoInternet(inner) if inner.kind() == kind),
                "{kind:?} should map to NoInternet, got {err:?}"
            );
        }
    }

    #[test]
    fn reclassify_passes_other_errors_through() {
        let err = RequestError::Transport(transport(TransportErrorKind::TimedOut)).reclassify();
        assert!(matches!(err, RequestError::Transport(ref e) if e.kind() == TransportErrorKind::TimedOut));

        assert!(matches!(RequestError::NoData.reclassify(), RequestError::NoData));
    }

    #[test]
    fn transport_error_preserves_source() {
        let err = RequestError::NoInternet(transport(TransportErrorKind::CannotFindHost));
        let inner = err.source().expect("NoInternet should have a source");
        let io_err = inner
            .source()
            .and_then(|e| e.downcast_ref::<io::Error>())
            .expect("root cause should be the io::Error");
        assert_eq!(io_err.to_string(), "boom");
    }

    #[test]
    fn check_status_branches() {
        let headers = HeaderMap::new();
        assert!(check_status(StatusCode::NO_CONTENT, &headers, &Bytes::new()).is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, &headers, &Bytes::new()),
            Err(RequestError::Unauthenticated)
        ));
        let err = check_status(StatusCode::NOT_FOUND, &headers, &Bytes::from("[]")).unwrap_err();
        assert!(matches!(
            err,
            RequestError::HttpStatus { status: StatusCode::NOT_FOUND, body: ErrorBody::JsonArray(_), .. }
        ));
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }
}
