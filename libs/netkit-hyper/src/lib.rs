#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! hyper-based [`Transport`](netkit::Transport) for `netkit`
//!
//! This crate provides a production transport with:
//! - Automatic TLS via rustls (HTTPS only by default)
//! - Connection pooling
//! - Per-request timeouts with engine and transport fallbacks
//! - User-Agent and engine-wide default headers
//! - **Transparent response decompression** (gzip, brotli, deflate)
//! - Background downloads streamed to staged files and chunked uploads,
//!   both reporting progress through the engine's transfer delegate
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use netkit::{NetworkClient, NetworkConfig};
//! use netkit_hyper::{HyperTransport, HyperTransportConfig};
//!
//! let transport = Arc::new(HyperTransport::new(HyperTransportConfig::default()));
//! let client = NetworkClient::new();
//! client.configure(
//!     NetworkConfig::builder(transport)
//!         .base_path("https://api.example.com")
//!         .build(),
//!     None,
//! )?;
//! ```

mod background;
pub mod body;
mod config;
pub mod error;
mod layers;
pub mod tls;
mod transport;

pub use config::{DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, HyperTransportConfig, TlsRootConfig, TransportSecurity};
pub use error::{classify, transport_failure};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use transport::HyperTransport;
