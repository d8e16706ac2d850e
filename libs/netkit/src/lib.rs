#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Typed HTTP request orchestration
//!
//! This crate turns declarative [`RequestDescriptor`]s into typed results:
//! - URL resolution against per-request or global base paths, with
//!   deterministic query serialization
//! - Content-type driven body encoding and response decoding
//! - A pluggable [`Transport`] for the actual network I/O
//! - **Single-flight credential refresh**: concurrent 401s trigger one
//!   refresh, then each request is retried once
//! - A closed error taxonomy ([`RequestError`])
//! - Background downloads and uploads whose progress and completion arrive
//!   out of band and are routed through a [`ProgressRegistry`]
//!
//! # Example
//!
//! ```ignore
//! use netkit::{NetworkClient, NetworkConfig, RequestDescriptor};
//!
//! let client = NetworkClient::new();
//! client.configure(
//!     NetworkConfig::builder(transport)
//!         .base_path("https://api.example.com/v1")
//!         .build(),
//!     None,
//! )?;
//!
//! let users: Vec<User> = client
//!     .submit(&RequestDescriptor::get("users").query("active", true))
//!     .await?;
//! ```

pub mod auth;
mod client;
pub mod codec;
mod config;
mod content;
mod descriptor;
mod error;
pub mod mock;
mod progress;
mod refresh;
mod transport;
pub mod url_builder;

pub use auth::{AuthError, AuthProvider, BearerAuth, EndpointTokenSource, TokenSource};
pub use client::{NetworkClient, NetworkClientBuilder, NoopInspector, ResponseInspector};
pub use codec::{CodecRegistry, DataDecoder, DataEncoder, FormUrlEncoder, JsonCodecRegistry, JsonDecoder, JsonEncoder};
pub use config::{DEFAULT_TIMEOUT, NetworkConfig, NetworkConfigBuilder};
pub use content::{RequestContentType, ResponseContentType};
pub use descriptor::{Body, CachePolicy, EmptyResponse, QueryValue, RequestDescriptor};
pub use error::{CodecError, ErrorBody, RequestError, TransportError, TransportErrorKind, check_status};
pub use progress::{
    CallbackExecutor, CallbackQueue, DownloadHandler, ImmediateExecutor, ProgressHandler, ProgressRegistry,
    QueuedExecutor, UploadHandler, callback_queue,
};
pub use refresh::{RefreshCoordinator, RefreshHandle};
pub use transport::{
    EngineConfig, ResponseMeta, StartGate, TransferDelegate, TransferHandle, TransferTask, Transport,
    TransportRequest, TransportResponse,
};
