//! Request and response content types.
//!
//! These closed enumerations drive codec selection and the `Content-Type` /
//! `Accept` headers attached during the build phase.

/// Content type of a request body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RequestContentType {
    /// Empty request
    None,
    /// `application/json`
    #[default]
    Json,
    /// Opaque bytes, no `Content-Type` header
    Binary,
    /// `application/x-www-form-urlencoded`
    FormUrlEncoded,
    /// `multipart/form-data` with the given boundary
    Multipart { boundary: String },
}

impl RequestContentType {
    /// `Content-Type` header value, if this type has one.
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::Json => Some("application/json".to_owned()),
            Self::FormUrlEncoded => Some("application/x-www-form-urlencoded; charset=utf-8".to_owned()),
            Self::Multipart { boundary } => Some(format!("multipart/form-data; boundary={boundary}")),
            Self::None | Self::Binary => None,
        }
    }
}

/// Expected content type of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseContentType {
    /// No body expected; decode into [`EmptyResponse`](crate::EmptyResponse)
    None,
    /// JSON body
    #[default]
    Json,
    /// Raw bytes, or JSON when the caller asks for a structured type
    Binary,
}

impl ResponseContentType {
    /// `Accept` header value, if this type has one.
    #[must_use]
    pub fn accept_value(self) -> Option<&'static str> {
        match self {
            Self::Json => Some("application/json"),
            Self::None | Self::Binary => None,
        }
    }
}
