//! Routes events from the shared bus back to the request that caused them.
//!
//! For every started request the correlator registers one listener per event
//! kind under a request-scoped bus name, so no listener ever sees another
//! request's events. The first terminal event (or a cancel) tears the
//! session down: its listeners come off the bus and it leaves the registry.

use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, ListenerHandle};
use crate::config::CorrelatorConfig;
use crate::errors::StreamingError;
use crate::event::{DONE_SENTINEL, EventKind, StreamEvent, channel_name};
use crate::identifier::RequestId;
use crate::listeners::{
    CloseNotice, CloseReason, Completion, MessageDelta, StreamFailure, StreamListeners,
};
use crate::registry::SessionRegistry;
use crate::request::RequestSpec;
use crate::session::RequestSession;
use crate::transport::Transport;
use crate::transport::http::{HttpTransport, HttpTransportConfig};

pub(crate) struct CorrelatorInner {
    transport: Arc<dyn Transport>,
    bus: EventBus,
    config: CorrelatorConfig,
    registry: SessionRegistry,
    // Serializes registry replacement and cancellation.
    ops: Mutex<()>,
}

enum Outcome {
    Completed { data: Option<String> },
    Failed { message: String },
    Closed(CloseReason),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Closed(CloseReason::Transport) => "closed",
            Self::Closed(CloseReason::Cancelled) => "cancelled",
            Self::Closed(CloseReason::Preempted) => "preempted",
        }
    }
}

impl CorrelatorInner {
    fn register_handlers(self: &Arc<Self>, session: &Arc<RequestSession>) -> Vec<ListenerHandle> {
        EventKind::ALL
            .into_iter()
            .map(|kind| {
                let inner: Weak<Self> = Arc::downgrade(self);
                let session = session.clone();
                self.bus
                    .add_listener(channel_name(kind, session.id()), move |payload| {
                        let Some(inner) = inner.upgrade() else {
                            return;
                        };
                        match StreamEvent::from_wire(kind, payload) {
                            Ok(event) => inner.dispatch(&session, event),
                            Err(err) => {
                                warn!(hash_id = %session.id(), kind = %kind, error = %err, "dropping malformed event");
                            }
                        }
                    })
            })
            .collect()
    }

    fn dispatch(&self, session: &Arc<RequestSession>, event: StreamEvent) {
        if event.is_done_sentinel() {
            self.finish(session, Outcome::Completed { data: None });
            return;
        }
        match event {
            StreamEvent::Open { id } => {
                let _delivery = session.delivery();
                if session.is_terminal() {
                    return;
                }
                debug!(hash_id = %id, "stream open");
                session.listeners().open(&id);
            }
            StreamEvent::Message { id, data } => {
                let content = self.config.content.extract(&data);
                let _delivery = session.delivery();
                let Some(accumulated) = session.append(content.as_deref()) else {
                    debug!(hash_id = %id, "message after terminal ignored");
                    return;
                };
                debug!(hash_id = %id, bytes = data.len(), "stream message");
                session.listeners().message(&MessageDelta {
                    id,
                    data,
                    content,
                    accumulated,
                });
            }
            StreamEvent::Complete { data, .. } => {
                let data = data.filter(|data| data.trim() != DONE_SENTINEL);
                self.finish(session, Outcome::Completed { data });
            }
            StreamEvent::Error { message, .. } => {
                self.finish(session, Outcome::Failed { message });
            }
            StreamEvent::Close { .. } => {
                self.finish(session, Outcome::Closed(CloseReason::Transport));
            }
        }
    }

    /// Runs the terminal path for `session` at most once.
    fn finish(&self, session: &Arc<RequestSession>, outcome: Outcome) {
        let claimed = {
            let _delivery = session.delivery();
            session.claim_terminal()
        };
        let Some(teardown) = claimed else {
            debug!(hash_id = %session.id(), outcome = outcome.label(), "duplicate terminal event suppressed");
            return;
        };
        self.release(session, &teardown.handles);
        info!(
            hash_id = %session.id(),
            outcome = outcome.label(),
            messages = teardown.message_count,
            elapsed_ms = teardown.elapsed.as_millis() as u64,
            "stream finished"
        );

        let id = session.id().clone();
        let listeners = session.listeners();
        match outcome {
            Outcome::Completed { data } => {
                let mut text = teardown.accumulated_text;
                if text.is_empty()
                    && let Some(data) = &data
                {
                    text = self
                        .config
                        .content
                        .extract(data)
                        .unwrap_or_else(|| data.clone());
                }
                listeners.complete(&Completion { id, text, data });
            }
            Outcome::Failed { message } => listeners.error(&StreamFailure { id, message }),
            Outcome::Closed(reason) => listeners.close(&CloseNotice { id, reason }),
        }
    }

    fn release(&self, session: &Arc<RequestSession>, handles: &[ListenerHandle]) {
        for handle in handles {
            self.bus.remove_listener(handle);
        }
        self.registry.remove_if_same(session);
    }

    /// Cancels one session. Returns `false` if it had already ended.
    ///
    /// Local teardown finishes before the transport is awaited, so dropping
    /// the returned future part-way never leaves listeners on the bus.
    async fn cancel_session(
        &self,
        session: &Arc<RequestSession>,
        reason: CloseReason,
    ) -> Result<bool, StreamingError> {
        let claimed = {
            let _delivery = session.delivery();
            session.claim_terminal()
        };
        self.registry.remove_if_same(session);
        let cancelled = match claimed {
            Some(teardown) => {
                self.release(session, &teardown.handles);
                info!(
                    hash_id = %session.id(),
                    outcome = Outcome::Closed(reason).label(),
                    messages = teardown.message_count,
                    "stream cancelled"
                );
                session.listeners().close(&CloseNotice {
                    id: session.id().clone(),
                    reason,
                });
                true
            }
            None => false,
        };
        self.transport.close(Some(session.id())).await?;
        Ok(cancelled)
    }
}

/// Starts, tracks and cancels concurrent streaming requests.
///
/// Cheap to clone; clones share the same registry, bus and transport.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

impl Correlator {
    /// Starts a builder for wiring a transport and bus.
    pub fn builder() -> CorrelatorBuilder {
        CorrelatorBuilder::default()
    }

    /// Creates a correlator over a fresh bus and an [`HttpTransport`].
    pub fn with_http(
        config: CorrelatorConfig,
        http: HttpTransportConfig,
    ) -> Result<Self, StreamingError> {
        let bus = EventBus::new();
        let transport = HttpTransport::new(http, bus.clone())?;
        Self::builder()
            .bus(bus)
            .transport(Arc::new(transport))
            .config(config)
            .build()
    }

    /// Starts a streaming request and returns its identifier.
    ///
    /// Listeners are registered before the transport is invoked, so no event
    /// can be missed. The call returns as soon as the request is dispatched;
    /// callbacks fire later as events arrive. If another session holds the
    /// same identifier it is cancelled first and its `on_close` fires with
    /// [`CloseReason::Preempted`].
    pub async fn start(
        &self,
        spec: RequestSpec,
        listeners: StreamListeners,
    ) -> Result<RequestId, StreamingError> {
        spec.validate()?;
        let id = match &spec.id {
            Some(id) => id.clone(),
            None => self.inner.config.id_strategy.allocate(&spec),
        };

        let _guard = self.inner.ops.lock().await;
        if let Some(previous) = self.inner.registry.get(&id) {
            info!(hash_id = %id, "hash_id already active, preempting previous stream");
            if let Err(err) = self
                .inner
                .cancel_session(&previous, CloseReason::Preempted)
                .await
            {
                warn!(hash_id = %id, error = %err, "transport close failed during preemption");
            }
        }

        let session = Arc::new(RequestSession::new(id.clone(), listeners));
        let handles = self.inner.register_handlers(&session);
        if let Some(orphaned) = session.attach_handles(handles) {
            for handle in &orphaned {
                self.inner.bus.remove_listener(handle);
            }
        }
        self.inner.registry.insert(session.clone());

        if let Err(err) = self
            .inner
            .transport
            .request(spec.to_transport_request(id.clone()))
            .await
        {
            warn!(hash_id = %id, error = %err, "transport rejected request");
            if let Some(teardown) = session.claim_terminal() {
                self.inner.release(&session, &teardown.handles);
            }
            return Err(err.into());
        }
        info!(hash_id = %id, method = %spec.method, url = %spec.url, "stream started");
        Ok(id)
    }

    /// Cancels the request for `id`.
    ///
    /// Returns `Ok(false)` when nothing was active under `id`; calling this
    /// twice, or after the stream ended on its own, is a no-op.
    pub async fn cancel(&self, id: &RequestId) -> Result<bool, StreamingError> {
        let _guard = self.inner.ops.lock().await;
        let Some(session) = self.inner.registry.get(id) else {
            debug!(hash_id = %id, "cancel: no active stream");
            return Ok(false);
        };
        self.inner
            .cancel_session(&session, CloseReason::Cancelled)
            .await
    }

    /// Cancels every active request and clears the whole bus.
    ///
    /// Returns how many sessions were cancelled.
    pub async fn cancel_all(&self) -> Result<usize, StreamingError> {
        let _guard = self.inner.ops.lock().await;
        let claimed: Vec<_> = self
            .inner
            .registry
            .drain()
            .into_iter()
            .filter(|session| {
                let _delivery = session.delivery();
                session.claim_terminal().is_some()
            })
            .collect();
        self.inner.bus.remove_all_listeners();

        info!(count = claimed.len(), "cancelled all streams");
        for session in &claimed {
            session.listeners().close(&CloseNotice {
                id: session.id().clone(),
                reason: CloseReason::Cancelled,
            });
        }
        self.inner.transport.close(None).await?;
        Ok(claimed.len())
    }

    /// Identifiers of sessions that have not reached a terminal state.
    pub fn active_ids(&self) -> Vec<RequestId> {
        self.inner.registry.ids()
    }

    pub fn active_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_active(&self, id: &RequestId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Text accumulated so far for an active request.
    pub fn accumulated_text(&self, id: &RequestId) -> Option<String> {
        self.inner
            .registry
            .get(id)
            .map(|session| session.accumulated_text())
    }

    /// The bus this correlator listens on.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.inner.config
    }
}

/// Builder used to wire a transport and its bus into a [`Correlator`].
#[derive(Default)]
pub struct CorrelatorBuilder {
    transport: Option<Arc<dyn Transport>>,
    bus: Option<EventBus>,
    config: CorrelatorConfig,
}

impl CorrelatorBuilder {
    /// Sets the transport. It must emit onto the bus given to [`bus`](Self::bus).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the bus the transport emits onto.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(mut self, config: CorrelatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Correlator, StreamingError> {
        let transport = self
            .transport
            .ok_or_else(|| StreamingError::Config("a transport is required".into()))?;
        let bus = self
            .bus
            .ok_or_else(|| StreamingError::Config("an event bus is required".into()))?;
        Ok(Correlator {
            inner: Arc::new(CorrelatorInner {
                transport,
                bus,
                config: self.config,
                registry: SessionRegistry::new(),
                ops: Mutex::new(()),
            }),
        })
    }
}
