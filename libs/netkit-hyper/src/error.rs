//! Mapping of hyper, rustls and I/O failures onto [`TransportErrorKind`].

use std::error::Error as StdError;
use std::io;

use netkit::{RequestError, TransportError, TransportErrorKind};

/// Boxed error used across the tower stack.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Classify a failure by walking its source chain.
///
/// The first recognised cause wins. A connect failure with no recognised
/// cause counts as `CannotConnectToHost`.
#[must_use]
pub fn classify(err: &(dyn StdError + 'static)) -> TransportErrorKind {
    let mut connect = false;
    let mut current = Some(err);

    while let Some(e) = current {
        if e.is::<rustls::Error>() {
            return TransportErrorKind::SecureConnectionFailed;
        }
        if e.is::<tokio::time::error::Elapsed>() {
            return TransportErrorKind::TimedOut;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            // io::Error::source skips the wrapped error itself
            if io_err.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
                return TransportErrorKind::SecureConnectionFailed;
            }
            if let Some(kind) = io_kind(io_err.kind()) {
                return kind;
            }
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_timeout() {
                return TransportErrorKind::TimedOut;
            }
            if hyper_err.is_incomplete_message() || hyper_err.is_closed() || hyper_err.is_canceled() {
                return TransportErrorKind::NetworkConnectionLost;
            }
        }
        if let Some(client_err) = e.downcast_ref::<hyper_util::client::legacy::Error>() {
            connect |= client_err.is_connect();
        }
        // hyper-util's resolver failure carries no typed marker
        if e.to_string().starts_with("dns error") {
            return TransportErrorKind::CannotFindHost;
        }
        current = e.source();
    }

    if connect {
        TransportErrorKind::CannotConnectToHost
    } else {
        TransportErrorKind::Other
    }
}

fn io_kind(kind: io::ErrorKind) -> Option<TransportErrorKind> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some(TransportErrorKind::CannotConnectToHost),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(TransportErrorKind::NetworkConnectionLost),
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkDown => {
            Some(TransportErrorKind::NotConnectedToInternet)
        }
        io::ErrorKind::TimedOut => Some(TransportErrorKind::TimedOut),
        _ => None,
    }
}

/// Wrap a native failure as a classified [`RequestError::Transport`].
#[must_use]
pub fn transport_failure(err: impl Into<BoxError>) -> RequestError {
    let err = err.into();
    let kind = classify(err.as_ref());
    RequestError::Transport(TransportError::new(kind, err))
}

pub(crate) fn failure(kind: TransportErrorKind, err: impl Into<BoxError>) -> RequestError {
    RequestError::Transport(TransportError::new(kind, err))
}

pub(crate) fn cancelled() -> RequestError {
    failure(TransportErrorKind::Cancelled, "transfer cancelled")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::fmt;

    /// Error with an arbitrary message and optional cause, like hyper-util's `ConnectError`.
    #[derive(Debug)]
    struct Wrapped {
        msg: &'static str,
        cause: Option<BoxError>,
    }

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.msg)
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
        }
    }

    fn kind_of(err: impl Into<BoxError>) -> TransportErrorKind {
        let err = err.into();
        classify(err.as_ref())
    }

    #[test]
    fn test_io_kinds() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, TransportErrorKind::CannotConnectToHost),
            (io::ErrorKind::ConnectionReset, TransportErrorKind::NetworkConnectionLost),
            (io::ErrorKind::BrokenPipe, TransportErrorKind::NetworkConnectionLost),
            (io::ErrorKind::NetworkUnreachable, TransportErrorKind::NotConnectedToInternet),
            (io::ErrorKind::TimedOut, TransportErrorKind::TimedOut),
            (io::ErrorKind::PermissionDenied, TransportErrorKind::Other),
        ];
        for (io_kind, expected) in cases {
            assert_eq!(kind_of(io::Error::new(io_kind, "x")), expected, "{io_kind:?}");
        }
    }

    #[test]
    fn test_nested_cause_is_found() {
        let err = Wrapped {
            msg: "tcp connect error",
            cause: Some(Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))),
        };
        assert_eq!(kind_of(err), TransportErrorKind::CannotConnectToHost);
    }

    #[test]
    fn test_dns_failure() {
        let err = Wrapped {
            msg: "dns error",
            cause: Some(Box::new(io::Error::other("failed to lookup address information"))),
        };
        assert_eq!(kind_of(err), TransportErrorKind::CannotFindHost);
    }

    #[test]
    fn test_tls_failure_inside_io_error() {
        let tls = rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer);
        let err = io::Error::new(io::ErrorKind::InvalidData, tls);
        assert_eq!(kind_of(err), TransportErrorKind::SecureConnectionFailed);
    }

    #[test]
    fn test_unknown_is_other() {
        assert_eq!(kind_of("something odd"), TransportErrorKind::Other);
    }

    #[test]
    fn test_transport_failure_preserves_source() {
        let err = transport_failure(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let RequestError::Transport(inner) = &err else {
            panic!("expected Transport, got {err:?}");
        };
        assert_eq!(inner.kind(), TransportErrorKind::NetworkConnectionLost);
        assert!(matches!(err.reclassify(), RequestError::NoInternet(_)));
    }
}
