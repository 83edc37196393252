//! Transport contract and the reqwest-backed implementation.
//!
//! A transport performs the streaming HTTP call and publishes lifecycle
//! events onto the [`EventBus`](crate::bus::EventBus) it was built with. It
//! does no routing of its own: every event just carries its `hash_id`.

pub mod http;

use std::collections::BTreeMap;

use crate::errors::TransportError;
use crate::identifier::RequestId;

/// Request handed to a transport. Field names match the bridge wire format.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub hash_id: RequestId,
}

/// Streaming transport used by the correlator.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Starts streaming `request` in the background.
    ///
    /// Returns once the stream has been dispatched; events follow on the bus.
    /// Invalid requests are rejected here, before any event is emitted.
    async fn request(&self, request: TransportRequest) -> Result<(), TransportError>;

    /// Aborts the stream for `hash_id`, or every stream when `None`.
    ///
    /// Once this returns no further events for the aborted streams are
    /// emitted apart from the `onClose` acknowledgement.
    async fn close(&self, hash_id: Option<&RequestId>) -> Result<(), TransportError>;
}
