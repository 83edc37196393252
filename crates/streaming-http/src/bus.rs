//! Process-wide event bus shared by transports and the correlator.
//!
//! The bus is a routing table from listener name to callbacks. Transports
//! publish every event under its bare kind name (`onMessage`); the bus also
//! delivers it under the request-scoped name (`onMessage_<hash_id>`) so a
//! request's listeners can be found and removed without scanning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::event::{EventKind, StreamEvent, channel_name};
use crate::identifier::RequestId;

/// Untyped bus callback.
pub type BusCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Registration returned by [`EventBus::add_listener`]; pass it back to remove.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    name: String,
    id: u64,
}

impl ListenerHandle {
    /// Name the listener was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
struct Listener {
    id: u64,
    callback: BusCallback,
}

#[derive(Default)]
struct BusInner {
    routes: DashMap<String, Vec<Listener>>,
    next_id: AtomicU64,
}

/// Shared, clonable broadcast bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `name`.
    pub fn add_listener(
        &self,
        name: impl Into<String>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .routes
            .entry(name.clone())
            .or_default()
            .push(Listener {
                id,
                callback: Arc::new(callback),
            });
        trace!(listener = %name, id, "listener added");
        ListenerHandle { name, id }
    }

    /// Removes one listener. Returns `false` if it was already gone.
    pub fn remove_listener(&self, handle: &ListenerHandle) -> bool {
        let mut removed = false;
        if let Some(mut listeners) = self.inner.routes.get_mut(&handle.name) {
            let before = listeners.len();
            listeners.retain(|listener| listener.id != handle.id);
            removed = listeners.len() != before;
        }
        self.inner
            .routes
            .remove_if(&handle.name, |_, listeners| listeners.is_empty());
        removed
    }

    /// Drops every listener on the bus, whoever registered it.
    pub fn remove_all_listeners(&self) {
        let count = self.listener_count();
        self.inner.routes.clear();
        debug!(count, "removed all bus listeners");
    }

    /// Total number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .routes
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Returns `true` if anything listens on `name`.
    pub fn has_listeners(&self, name: &str) -> bool {
        self.inner
            .routes
            .get(name)
            .is_some_and(|listeners| !listeners.is_empty())
    }

    /// Publishes `payload` under `kind`.
    ///
    /// Listeners on the bare kind name run first, then listeners on the
    /// request-scoped name derived from the payload's `hash_id`. Returns the
    /// number of callbacks invoked.
    pub fn emit(&self, kind: EventKind, payload: &Value) -> usize {
        let mut delivered = self.dispatch(kind.event_name(), payload);
        if let Some(hash_id) = payload.get("hash_id").and_then(Value::as_str) {
            let scoped = channel_name(kind, &RequestId::new(hash_id));
            delivered += self.dispatch(&scoped, payload);
        }
        trace!(kind = %kind, delivered, "event emitted");
        delivered
    }

    /// Publishes a typed event in its wire shape.
    pub fn emit_event(&self, event: &StreamEvent) -> usize {
        let (kind, payload) = event.to_wire();
        self.emit(kind, &payload)
    }

    fn dispatch(&self, name: &str, payload: &Value) -> usize {
        // Snapshot so callbacks can add or remove listeners without holding a shard lock.
        let snapshot: Vec<BusCallback> = match self.inner.routes.get(name) {
            Some(listeners) => listeners
                .iter()
                .map(|listener| listener.callback.clone())
                .collect(),
            None => return 0,
        };
        for callback in &snapshot {
            callback(payload);
        }
        snapshot.len()
    }
}
