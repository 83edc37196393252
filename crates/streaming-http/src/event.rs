//! Lifecycle events carried on the shared bus and their wire shapes.
//!
//! Transports publish loosely shaped JSON payloads; everything inside the
//! correlator works on [`StreamEvent`] after [`StreamEvent::from_wire`] has
//! validated the payload.

use std::fmt;

use serde_json::Value;

use crate::errors::EventDecodeError;
use crate::identifier::RequestId;

/// Message payload that marks the end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// The five lifecycle signals a transport emits per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Complete,
    Error,
    Close,
}

impl EventKind {
    /// All kinds, in lifecycle order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Open,
        EventKind::Message,
        EventKind::Complete,
        EventKind::Error,
        EventKind::Close,
    ];

    /// Name the event is published under on the bus.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Open => "onOpen",
            Self::Message => "onMessage",
            Self::Complete => "onComplete",
            Self::Error => "onError",
            Self::Close => "onClose",
        }
    }

    /// Parses a bus event name.
    pub fn from_event_name(name: &str) -> Result<Self, EventDecodeError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_name() == name)
            .ok_or_else(|| EventDecodeError::UnknownKind(name.to_string()))
    }

    /// `Complete`, `Error` and `Close` end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Close)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Bus name scoped to one request: `{event_name}_{hash_id}`.
pub fn channel_name(kind: EventKind, id: &RequestId) -> String {
    format!("{}_{}", kind.event_name(), id)
}

/// `onOpen` payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OpenPayload {
    pub hash_id: RequestId,
}

/// `onMessage` payload. `data` is JSON text or [`DONE_SENTINEL`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessagePayload {
    pub hash_id: RequestId,
    pub data: String,
}

/// `onComplete` payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompletePayload {
    pub hash_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// `onError` payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorPayload {
    pub hash_id: RequestId,
    pub message: String,
}

/// `onClose` payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClosePayload {
    pub hash_id: RequestId,
}

/// Typed form of a bus payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Open { id: RequestId },
    Message { id: RequestId, data: String },
    Complete { id: RequestId, data: Option<String> },
    Error { id: RequestId, message: String },
    Close { id: RequestId },
}

impl StreamEvent {
    /// Validates and converts an untyped payload received under `kind`.
    pub fn from_wire(kind: EventKind, payload: &Value) -> Result<Self, EventDecodeError> {
        let object = payload
            .as_object()
            .ok_or(EventDecodeError::NotAnObject { kind })?;
        let string_field = |field: &'static str| {
            object
                .get(field)
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .ok_or(EventDecodeError::MissingField { kind, field })
        };
        let id = RequestId(string_field("hash_id")?);
        let event = match kind {
            EventKind::Open => Self::Open { id },
            EventKind::Message => Self::Message {
                id,
                data: string_field("data")?,
            },
            EventKind::Complete => Self::Complete {
                id,
                data: object
                    .get("data")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
            },
            EventKind::Error => Self::Error {
                id,
                message: string_field("message")?,
            },
            EventKind::Close => Self::Close { id },
        };
        Ok(event)
    }

    /// Converts to the `(kind, payload)` pair a transport publishes.
    pub fn to_wire(&self) -> (EventKind, Value) {
        let payload = match self {
            Self::Open { id } => serde_json::json!({ "hash_id": id }),
            Self::Message { id, data } => serde_json::json!({ "hash_id": id, "data": data }),
            Self::Complete { id, data: Some(data) } => {
                serde_json::json!({ "hash_id": id, "data": data })
            }
            Self::Complete { id, data: None } => serde_json::json!({ "hash_id": id }),
            Self::Error { id, message } => {
                serde_json::json!({ "hash_id": id, "message": message })
            }
            Self::Close { id } => serde_json::json!({ "hash_id": id }),
        };
        (self.kind(), payload)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open { .. } => EventKind::Open,
            Self::Message { .. } => EventKind::Message,
            Self::Complete { .. } => EventKind::Complete,
            Self::Error { .. } => EventKind::Error,
            Self::Close { .. } => EventKind::Close,
        }
    }

    pub fn id(&self) -> &RequestId {
        match self {
            Self::Open { id }
            | Self::Message { id, .. }
            | Self::Complete { id, .. }
            | Self::Error { id, .. }
            | Self::Close { id } => id,
        }
    }

    /// A `Message` carrying the sentinel is the transport-level end of stream.
    pub fn is_done_sentinel(&self) -> bool {
        matches!(self, Self::Message { data, .. } if data.trim() == DONE_SENTINEL)
    }
}
