use crate::event::EventKind;
use crate::identifier::RequestId;

/// Errors returned by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request was rejected before any network work started.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Connecting or sending the request failed.
    #[error("connection error ({hash_id}): {message}")]
    Connection { hash_id: RequestId, message: String },
    /// The server answered with a non-success status.
    #[error("status {status} ({hash_id}): {message}")]
    Status {
        hash_id: RequestId,
        status: u16,
        message: String,
    },
    /// Reading the response stream failed part way through.
    #[error("stream error ({hash_id}): {message}")]
    Stream { hash_id: RequestId, message: String },
}

impl TransportError {
    /// Creates a request validation error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a connection-level error.
    pub fn connection(hash_id: RequestId, message: impl Into<String>) -> Self {
        Self::Connection {
            hash_id,
            message: message.into(),
        }
    }

    /// Creates a stream read error.
    pub fn stream(hash_id: RequestId, message: impl Into<String>) -> Self {
        Self::Stream {
            hash_id,
            message: message.into(),
        }
    }

    /// Returns the message that is surfaced to callers through an `onError` event.
    pub fn event_message(&self) -> String {
        match self {
            Self::InvalidRequest(message)
            | Self::Connection { message, .. }
            | Self::Stream { message, .. } => message.clone(),
            Self::Status {
                status, message, ..
            } => {
                if message.is_empty() {
                    format!("request failed with status {status}")
                } else {
                    format!("request failed with status {status}: {message}")
                }
            }
        }
    }
}

/// Failure to turn an untyped bus payload into a `StreamEvent`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventDecodeError {
    /// The payload was not a JSON object.
    #[error("{kind} payload must be an object")]
    NotAnObject { kind: EventKind },
    /// A required field was absent or had the wrong type.
    #[error("{kind} payload is missing string field `{field}`")]
    MissingField {
        kind: EventKind,
        field: &'static str,
    },
    /// The event name does not match any known kind.
    #[error("unknown event name: {0}")]
    UnknownKind(String),
}

/// Top-level error type for the caller-facing correlator API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamingError {
    /// Invalid caller input, rejected before any registration or transport call.
    #[error("validation error: {0}")]
    Validation(String),
    /// Invalid correlator or transport configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The transport refused or failed an operation.
    #[error(transparent)]
    Transport(TransportError),
}

impl StreamingError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<TransportError> for StreamingError {
    fn from(value: TransportError) -> Self {
        StreamingError::Transport(value)
    }
}
