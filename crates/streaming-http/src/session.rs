use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::bus::ListenerHandle;
use crate::identifier::RequestId;
use crate::listeners::StreamListeners;

/// Live state of one streaming request.
///
/// Created by `Correlator::start`; torn down on the first terminal event or
/// on cancellation, whichever comes first.
pub struct RequestSession {
    id: RequestId,
    listeners: StreamListeners,
    started_at: Instant,
    state: Mutex<SessionState>,
    delivery: Mutex<()>,
}

#[derive(Default)]
struct SessionState {
    accumulated_text: String,
    handles: Vec<ListenerHandle>,
    terminal_reached: bool,
    message_count: u64,
}

/// What the winner of the terminal race takes away for cleanup.
#[derive(Debug)]
pub struct Teardown {
    pub handles: Vec<ListenerHandle>,
    pub accumulated_text: String,
    pub message_count: u64,
    pub elapsed: Duration,
}

impl RequestSession {
    pub fn new(id: RequestId, listeners: StreamListeners) -> Self {
        Self {
            id,
            listeners,
            started_at: Instant::now(),
            state: Mutex::new(SessionState::default()),
            delivery: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn listeners(&self) -> &StreamListeners {
        &self.listeners
    }

    /// Stores the bus registrations owned by this session.
    ///
    /// If the session already ended the handles are handed back so the
    /// caller can remove them right away.
    pub fn attach_handles(&self, handles: Vec<ListenerHandle>) -> Option<Vec<ListenerHandle>> {
        let mut state = self.lock();
        if state.terminal_reached {
            return Some(handles);
        }
        state.handles.extend(handles);
        None
    }

    /// Appends a content fragment and returns the accumulated text, or `None`
    /// once the session is terminal.
    pub fn append(&self, fragment: Option<&str>) -> Option<String> {
        let mut state = self.lock();
        if state.terminal_reached {
            return None;
        }
        state.message_count += 1;
        if let Some(fragment) = fragment {
            state.accumulated_text.push_str(fragment);
        }
        Some(state.accumulated_text.clone())
    }

    /// Marks the session terminal. Only the first caller gets `Some`.
    pub fn claim_terminal(&self) -> Option<Teardown> {
        let mut state = self.lock();
        if state.terminal_reached {
            return None;
        }
        state.terminal_reached = true;
        Some(Teardown {
            handles: std::mem::take(&mut state.handles),
            accumulated_text: std::mem::take(&mut state.accumulated_text),
            message_count: state.message_count,
            elapsed: self.started_at.elapsed(),
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().terminal_reached
    }

    pub fn accumulated_text(&self) -> String {
        self.lock().accumulated_text.clone()
    }

    pub fn message_count(&self) -> u64 {
        self.lock().message_count
    }

    /// Serializes caller callbacks with the terminal claim.
    ///
    /// Non-terminal callbacks run while holding this guard, and the terminal
    /// claim takes it too, so once the session is claimed no `on_open` or
    /// `on_message` can still be in flight. Never hold it across an `.await`.
    pub fn delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State stays consistent across a panicking callback; callbacks never run under this lock.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
