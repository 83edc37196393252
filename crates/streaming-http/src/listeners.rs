use std::fmt;
use std::sync::Arc;

use crate::identifier::RequestId;

/// One message fragment as seen by `on_message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDelta {
    pub id: RequestId,
    /// Raw fragment as received.
    pub data: String,
    /// Content parsed out of the fragment, when present.
    pub content: Option<String>,
    /// All content received so far, including this fragment.
    pub accumulated: String,
}

/// Successful end of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub id: RequestId,
    /// Concatenated content of every message fragment.
    pub text: String,
    /// Payload carried by the completion event itself, if any.
    pub data: Option<String>,
}

/// Failed end of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFailure {
    pub id: RequestId,
    pub message: String,
}

/// Why a session closed without completing or failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport reported the connection ended.
    Transport,
    /// `cancel` or `cancel_all` was called.
    Cancelled,
    /// A new request reused the identifier.
    Preempted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseNotice {
    pub id: RequestId,
    pub reason: CloseReason,
}

pub type OpenCallback = Arc<dyn Fn(&RequestId) + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(&MessageDelta) + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn(&Completion) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&StreamFailure) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn(&CloseNotice) + Send + Sync>;

/// Per-request callbacks. Every callback is optional.
///
/// Callbacks run on the transport's task and must not block. Callbacks for
/// one request never overlap, and nothing fires after its terminal callback.
/// To cancel from inside a callback, spawn the `cancel` call.
#[derive(Clone, Default)]
pub struct StreamListeners {
    on_open: Option<OpenCallback>,
    on_message: Option<MessageCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<CloseCallback>,
}

impl StreamListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open(mut self, callback: impl Fn(&RequestId) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(callback));
        self
    }

    pub fn on_message(mut self, callback: impl Fn(&MessageDelta) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(callback));
        self
    }

    pub fn on_complete(mut self, callback: impl Fn(&Completion) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&StreamFailure) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_close(mut self, callback: impl Fn(&CloseNotice) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }

    pub(crate) fn open(&self, id: &RequestId) {
        if let Some(callback) = &self.on_open {
            callback(id);
        }
    }

    pub(crate) fn message(&self, delta: &MessageDelta) {
        if let Some(callback) = &self.on_message {
            callback(delta);
        }
    }

    pub(crate) fn complete(&self, completion: &Completion) {
        if let Some(callback) = &self.on_complete {
            callback(completion);
        }
    }

    pub(crate) fn error(&self, failure: &StreamFailure) {
        if let Some(callback) = &self.on_error {
            callback(failure);
        }
    }

    pub(crate) fn close(&self, notice: &CloseNotice) {
        if let Some(callback) = &self.on_close {
            callback(notice);
        }
    }
}

impl fmt::Debug for StreamListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamListeners")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}
