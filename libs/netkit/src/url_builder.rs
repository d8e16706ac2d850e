//! Resolve a descriptor plus configuration into an absolute URL.
//!
//! Resolution rules:
//! - a path that already carries a URL scheme is used as-is
//! - otherwise the descriptor base path wins over the configured one, and a
//!   relative path without either fails with [`RequestError::NoBasePath`]
//! - base and relative path are joined with exactly one `/`
//! - query parameters are percent-encoded and sorted so the same set always
//!   renders identically

use crate::config::NetworkConfig;
use crate::content::RequestContentType;
use crate::descriptor::{QueryValue, RequestDescriptor};
use crate::error::RequestError;

/// Scheme prefixes treated as absolute URLs.
const ABSOLUTE_PREFIXES: [&str; 4] = ["http://", "https://", "ftp://", "ftps://"];

/// Whether `path` already carries a recognised URL scheme.
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    ABSOLUTE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

/// Join `base` and `relative` with a single `/`.
#[must_use]
pub fn join(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    format!("{base}/{relative}")
}

/// Serialize query parameters.
///
/// Keys and text values are percent-encoded; form URL encoded requests use
/// `+` for spaces. `true` renders as the bare key and `false` drops the pair.
/// Output is sorted by encoded key, ties broken on the whole `key=value`.
#[must_use]
pub fn query_string(params: &[(String, QueryValue)], content_type: &RequestContentType) -> String {
    let form = matches!(content_type, RequestContentType::FormUrlEncoded);
    let encode = |raw: &str| {
        let encoded = urlencoding::encode(raw);
        if form {
            encoded.replace("%20", "+")
        } else {
            encoded.into_owned()
        }
    };

    let mut pairs: Vec<(String, String)> = params
        .iter()
        .filter_map(|(key, value)| {
            let key = encode(key);
            let rendered = match value {
                QueryValue::Bool(false) => return None,
                QueryValue::Bool(true) => key.clone(),
                QueryValue::Text(text) => format!("{key}={}", encode(text)),
                QueryValue::Integer(_) | QueryValue::Unsigned(_) | QueryValue::Float(_) => {
                    format!("{key}={value}")
                }
            };
            Some((key, rendered))
        })
        .collect();

    pairs.sort();
    pairs
        .into_iter()
        .map(|(_, rendered)| rendered)
        .collect::<Vec<_>>()
        .join("&")
}

/// Resolve the full URL string for `descriptor`.
///
/// # Errors
///
/// - [`RequestError::NotConfigured`] when `config` is `None`
/// - [`RequestError::NoBasePath`] for a relative path without any base path
pub fn path(descriptor: &RequestDescriptor, config: Option<&NetworkConfig>) -> Result<String, RequestError> {
    let config = config.ok_or(RequestError::NotConfigured)?;

    let mut resolved = if is_absolute(&descriptor.path) {
        descriptor.path.clone()
    } else {
        let base = descriptor
            .base_path
            .as_deref()
            .or(config.base_path.as_deref())
            .ok_or(RequestError::NoBasePath)?;
        join(base, &descriptor.path)
    };

    let query = query_string(&descriptor.query, &descriptor.request_type);
    if !query.is_empty() {
        resolved.push(if resolved.contains('?') { '&' } else { '?' });
        resolved.push_str(&query);
    }

    Ok(resolved)
}

/// Resolve and parse the URL for `descriptor`.
///
/// # Errors
///
/// Everything [`path`] returns, plus [`RequestError::InvalidUrl`] when the
/// resolved string is not an absolute URL with a host.
pub fn url(descriptor: &RequestDescriptor, config: Option<&NetworkConfig>) -> Result<http::Uri, RequestError> {
    let resolved = path(descriptor, config)?;

    let has_host = url::Url::parse(&resolved).is_ok_and(|parsed| parsed.has_host());
    if !has_host {
        return Err(RequestError::InvalidUrl { url: resolved });
    }

    match resolved.parse::<http::Uri>() {
        Ok(uri) if uri.authority().is_some() => Ok(uri),
        _ => Err(RequestError::InvalidUrl { url: resolved }),
    }
}
