//! Common imports for typical usage.
pub use crate::{
    CloseNotice, CloseReason, Completion, Correlator, CorrelatorConfig, EventBus, EventKind,
    HttpTransport, HttpTransportConfig, IdStrategy, MessageDelta, RequestId, RequestSpec,
    StreamEvent, StreamFailure, StreamListeners, StreamingError, Transport, TransportError,
};
