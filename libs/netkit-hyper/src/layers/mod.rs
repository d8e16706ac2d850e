//! Tower layers of the transport's middleware stack
//!
//! - [`DefaultHeadersLayer`] - Adds engine-wide headers and User-Agent when absent

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
