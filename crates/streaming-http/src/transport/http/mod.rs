//! reqwest-backed SSE transport.
mod adapter;
mod config;
pub(crate) mod sse;

pub use adapter::HttpTransport;
pub use config::HttpTransportConfig;
