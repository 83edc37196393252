//! Many concurrent server-sent-event requests over one shared event bus.
//!
//! A [`Transport`] streams each HTTP response and publishes its lifecycle
//! (`onOpen`, `onMessage`, `onComplete`, `onError`, `onClose`) onto a single
//! [`EventBus`], tagged only by the request's `hash_id`. The [`Correlator`]
//! routes those events back to the caller that started the request,
//! accumulates message content, and guarantees exactly one terminal callback
//! and complete listener cleanup per request.
//!
//! ```no_run
//! use streaming_http::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamingError> {
//! let correlator = Correlator::with_http(
//!     CorrelatorConfig::from_env()?,
//!     HttpTransportConfig::from_env()?,
//! )?;
//!
//! let id = correlator
//!     .start(
//!         RequestSpec::post("http://localhost:3001/api/v1/ai-proxy/chat")
//!             .json(serde_json::json!({"messages": [{"role": "user", "content": "hi"}]})),
//!         StreamListeners::new()
//!             .on_message(|delta| print!("{}", delta.content.as_deref().unwrap_or("")))
//!             .on_complete(|done| println!("\n{}", done.text))
//!             .on_error(|failure| eprintln!("stream failed: {}", failure.message)),
//!     )
//!     .await?;
//!
//! // The identifier doubles as a cancellation token.
//! correlator.cancel(&id).await?;
//! # Ok(())
//! # }
//! ```

/// Shared broadcast bus with request-scoped routing.
pub mod bus;
/// Correlator and listener configuration.
pub mod config;
/// Message fragment content extraction.
pub mod content;
/// Request correlation, lifecycle and cancellation.
pub mod correlator;
/// Public error types.
pub mod errors;
/// Lifecycle events and wire payloads.
pub mod event;
/// Request identifiers and allocation strategies.
pub mod identifier;
/// Per-request callbacks.
pub mod listeners;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Identifier -> session map.
pub mod registry;
/// Caller-side request description.
pub mod request;
/// Per-request session state.
pub mod session;
/// Transport contract and the HTTP implementation.
pub mod transport;

pub use bus::{EventBus, ListenerHandle};
pub use config::CorrelatorConfig;
pub use content::ContentExtractor;
pub use correlator::{Correlator, CorrelatorBuilder};
pub use errors::{EventDecodeError, StreamingError, TransportError};
pub use event::{DONE_SENTINEL, EventKind, StreamEvent, channel_name};
pub use identifier::{IdStrategy, RequestId};
pub use listeners::{
    CloseNotice, CloseReason, Completion, MessageDelta, StreamFailure, StreamListeners,
};
pub use observability::{TracingConfig, init_tracing, init_tracing_with};
pub use request::RequestSpec;
pub use transport::http::{HttpTransport, HttpTransportConfig};
pub use transport::{Transport, TransportRequest};
