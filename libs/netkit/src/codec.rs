//! Content-type driven encoders and decoders.
//!
//! A [`CodecRegistry`] vends at most one encoder per request content type and
//! one decoder per response content type. Codecs work on `serde_json::Value`
//! so they can sit behind trait objects; the client converts to and from the
//! caller's concrete types.

use std::sync::Arc;

pub use crate::error::CodecError;

use crate::content::{RequestContentType, ResponseContentType};
use crate::descriptor::QueryValue;
use crate::url_builder::query_string;

/// Renders a structured body into bytes.
pub trait DataEncoder: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the value cannot be rendered.
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError>;
}

/// Parses response bytes into a structured value.
pub trait DataDecoder: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the bytes are not valid for this decoder.
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// Vends codecs by content type.
pub trait CodecRegistry: Send + Sync {
    fn decoder(&self, content_type: ResponseContentType) -> Option<Arc<dyn DataDecoder>>;

    fn encoder(&self, content_type: &RequestContentType) -> Option<Arc<dyn DataEncoder>>;
}

/// JSON encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder {
    pretty: bool,
}

impl JsonEncoder {
    #[must_use]
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl DataEncoder for JsonEncoder {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }
}

/// JSON decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl DataDecoder for JsonDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Form URL encoder.
///
/// Accepts a flat JSON object and renders it with the same rules as query
/// strings: keys sorted, spaces as `+`, `true` as a bare key, `false` dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormUrlEncoder;

impl DataEncoder for FormUrlEncoder {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
        let serde_json::Value::Object(map) = value else {
            return Err(CodecError::NotParameters);
        };

        let mut params = Vec::with_capacity(map.len());
        for (key, value) in map {
            let value = match value {
                serde_json::Value::Bool(b) => QueryValue::Bool(*b),
                serde_json::Value::String(s) => QueryValue::Text(s.clone()),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        QueryValue::Integer(i)
                    } else if let Some(u) = n.as_u64() {
                        QueryValue::Unsigned(u)
                    } else {
                        QueryValue::Float(n.as_f64().ok_or(CodecError::NotParameters)?)
                    }
                }
                serde_json::Value::Null
                | serde_json::Value::Array(_)
                | serde_json::Value::Object(_) => return Err(CodecError::NotParameters),
            };
            params.push((key.clone(), value));
        }

        Ok(query_string(&params, &RequestContentType::FormUrlEncoded).into_bytes())
    }
}

/// Default registry: JSON both ways plus form URL encoding for requests.
#[derive(Clone)]
pub struct JsonCodecRegistry {
    decoder: Arc<dyn DataDecoder>,
    json_encoder: Arc<dyn DataEncoder>,
    form_encoder: Arc<dyn DataEncoder>,
}

impl JsonCodecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_codecs(Arc::new(JsonDecoder), Arc::new(JsonEncoder::default()))
    }

    /// Registry using custom JSON codecs (e.g. a pretty-printing encoder).
    #[must_use]
    pub fn with_codecs(decoder: Arc<dyn DataDecoder>, encoder: Arc<dyn DataEncoder>) -> Self {
        Self {
            decoder,
            json_encoder: encoder,
            form_encoder: Arc::new(FormUrlEncoder),
        }
    }
}

impl Default for JsonCodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry for JsonCodecRegistry {
    fn decoder(&self, content_type: ResponseContentType) -> Option<Arc<dyn DataDecoder>> {
        match content_type {
            ResponseContentType::Json => Some(Arc::clone(&self.decoder)),
            ResponseContentType::None | ResponseContentType::Binary => None,
        }
    }

    fn encoder(&self, content_type: &RequestContentType) -> Option<Arc<dyn DataEncoder>> {
        match content_type {
            RequestContentType::Json => Some(Arc::clone(&self.json_encoder)),
            RequestContentType::FormUrlEncoded => Some(Arc::clone(&self.form_encoder)),
            RequestContentType::None
            | RequestContentType::Binary
            | RequestContentType::Multipart { .. } => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_vends_by_content_type() {
        let registry = JsonCodecRegistry::new();
        assert!(registry.decoder(ResponseContentType::Json).is_some());
        assert!(registry.decoder(ResponseContentType::Binary).is_none());
        assert!(registry.decoder(ResponseContentType::None).is_none());

        assert!(registry.encoder(&RequestContentType::Json).is_some());
        assert!(registry.encoder(&RequestContentType::FormUrlEncoded).is_some());
        assert!(registry.encoder(&RequestContentType::Binary).is_none());
        assert!(registry.encoder(&RequestContentType::None).is_none());
        assert!(
            registry
                .encoder(&RequestContentType::Multipart { boundary: "b".to_owned() })
                .is_none()
        );
    }

    #[test]
    fn json_round_trip_through_registry() {
        let registry = JsonCodecRegistry::new();
        let value = json!({"name": "Alice", "tags": ["a", "b"]});
        let bytes = registry
            .encoder(&RequestContentType::Json)
            .unwrap()
            .encode(&value)
            .unwrap();
        let decoded = registry
            .decoder(ResponseContentType::Json)
            .unwrap()
            .decode(&bytes)
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn pretty_encoder_emits_newlines() {
        let bytes = JsonEncoder::pretty().encode(&json!({"a": 1})).unwrap();
        assert!(bytes.contains(&b'\n'));
    }

    #[test]
    fn decoder_reports_invalid_json() {
        let err = JsonDecoder.decode(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn form_encoder_renders_sorted_pairs() {
        let body = json!({
            "last name": "Doe",
            "first name": "John",
            "age": 42,
            "subscribed": true,
            "hidden": false
        });
        let bytes = FormUrlEncoder.encode(&body).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "age=42&first+name=John&last+name=Doe&subscribed"
        );
    }

    #[test]
    fn form_encoder_rejects_non_objects() {
        assert!(matches!(
            FormUrlEncoder.encode(&json!(["a", "b"])),
            Err(CodecError::NotParameters)
        ));
        assert!(matches!(
            FormUrlEncoder.encode(&json!({"nested": {"a": 1}})),
            Err(CodecError::NotParameters)
        ));
    }
}
