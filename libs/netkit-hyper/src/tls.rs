//! TLS connector setup.
//!
//! Native root certificates are loaded once per process; OS certificate
//! store lookups can be slow.

use std::sync::{Arc, OnceLock};

use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use netkit::{RequestError, TransportError, TransportErrorKind};
use rustls_pki_types::CertificateDer;

use crate::config::{TlsRootConfig, TransportSecurity};

/// Empty vec means the OS store had nothing usable.
static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_roots() -> Vec<CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }
    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }
    result.certs
}

#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(load_native_roots).as_slice()
}

/// Globally installed provider if any, otherwise a private aws-lc-rs one.
#[must_use]
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn tls_error(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> RequestError {
    RequestError::InvalidSsl(TransportError::new(
        TransportErrorKind::SecureConnectionFailed,
        source,
    ))
}

/// # Errors
///
/// Fails when the OS store yields no parsable root certificate.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, RequestError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(tls_error("no native root CA certificates found in OS certificate store"));
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(tls_error(format!(
            "no valid native root CA certificates parsed ({ignored} rejected)"
        )));
    }

    rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(tls_error)
        .map(|builder| builder.with_root_certificates(root_store).with_no_client_auth())
}

/// HTTPS connector advertising h2 and http/1.1 via ALPN.
///
/// # Errors
///
/// `InvalidSsl` when the chosen root store cannot be set up.
pub fn https_connector(
    roots: TlsRootConfig,
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, RequestError> {
    let builder = match roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(tls_error)?,
        TlsRootConfig::Native => {
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(native_roots_client_config()?)
        }
    };

    let connector = if security == TransportSecurity::AllowInsecureHttp {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
