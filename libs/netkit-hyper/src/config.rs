use std::path::PathBuf;
use std::time::Duration;

/// Default User-Agent string for the transport
pub const DEFAULT_USER_AGENT: &str = concat!("netkit-hyper/", env!("CARGO_PKG_VERSION"));

/// Default limit for foreground response bodies (10 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// TLS root certificate source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the transport enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP, for local mock servers
    AllowInsecureHttp,
}

/// Settings of a [`HyperTransport`](crate::HyperTransport)
///
/// Engine-level settings (global headers, timeout, delegate) arrive later via
/// `Transport::configure`; this struct covers the connection layer.
#[derive(Debug, Clone)]
pub struct HyperTransportConfig {
    /// Fallback when neither the request nor the engine carries a timeout
    pub request_timeout: Duration,
    pub user_agent: String,
    pub transport: TransportSecurity,
    pub tls_roots: TlsRootConfig,
    /// `None` keeps idle connections forever
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
    /// Limit on decompressed foreground response bodies
    pub max_body_size: usize,
    /// Where background downloads are staged; system temp dir if `None`
    pub download_dir: Option<PathBuf>,
}

impl Default for HyperTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            download_dir: None,
        }
    }
}

impl HyperTransportConfig {
    /// Configuration for tests against local plain-HTTP servers.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            transport: TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: None,
            pool_max_idle_per_host: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.tls_roots = roots;
        self
    }

    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }
}
