#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use streaming_http::prelude::*;
use streaming_http::TransportRequest;

/// In-process transport: records calls and lets the test emit events by hand.
pub struct ScriptedTransport {
    bus: EventBus,
    pub requests: Mutex<Vec<TransportRequest>>,
    pub closes: Mutex<Vec<Option<RequestId>>>,
    close_delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(bus: EventBus) -> Arc<Self> {
        Self::with_close_delay(bus, None)
    }

    /// A transport whose `close` takes `delay` before acknowledging.
    pub fn with_close_delay(bus: EventBus, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            requests: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            close_delay: delay,
        })
    }

    pub fn open(&self, id: &str) {
        self.bus.emit_event(&StreamEvent::Open { id: id.into() });
    }

    pub fn message(&self, id: &str, data: &str) {
        self.bus.emit_event(&StreamEvent::Message {
            id: id.into(),
            data: data.into(),
        });
    }

    pub fn content(&self, id: &str, content: &str) {
        let data = serde_json::json!({ "content": content }).to_string();
        self.message(id, &data);
    }

    pub fn complete(&self, id: &str, data: Option<&str>) {
        self.bus.emit_event(&StreamEvent::Complete {
            id: id.into(),
            data: data.map(ToOwned::to_owned),
        });
    }

    pub fn error(&self, id: &str, message: &str) {
        self.bus.emit_event(&StreamEvent::Error {
            id: id.into(),
            message: message.into(),
        });
    }

    pub fn close(&self, id: &str) {
        self.bus.emit_event(&StreamEvent::Close { id: id.into() });
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }

    pub fn close_calls(&self) -> Vec<Option<RequestId>> {
        self.closes.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: TransportRequest) -> Result<(), TransportError> {
        self.requests.lock().expect("lock").push(request);
        Ok(())
    }

    async fn close(&self, hash_id: Option<&RequestId>) -> Result<(), TransportError> {
        self.closes.lock().expect("lock").push(hash_id.cloned());
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        // Acknowledge like a real transport does.
        if let Some(id) = hash_id {
            self.bus.emit_event(&StreamEvent::Close { id: id.clone() });
        }
        Ok(())
    }
}

/// Shared, ordered log of callback invocations.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.entries.lock().expect("lock").push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("lock").clone()
    }

    pub fn entries_for(&self, tag: &str) -> Vec<String> {
        let prefix = format!("{tag}:");
        self.entries()
            .into_iter()
            .filter(|entry| entry.starts_with(&prefix))
            .collect()
    }

    /// Listeners that log `<tag>:<callback>:<detail>` for every invocation.
    pub fn listeners(&self, tag: &str) -> StreamListeners {
        let (open, message, complete, error, close) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );
        let (t1, t2, t3, t4, t5) = (
            tag.to_string(),
            tag.to_string(),
            tag.to_string(),
            tag.to_string(),
            tag.to_string(),
        );
        StreamListeners::new()
            .on_open(move |_| open.push(format!("{t1}:open")))
            .on_message(move |delta| message.push(format!("{t2}:message:{}", delta.accumulated)))
            .on_complete(move |done| complete.push(format!("{t3}:complete:{}", done.text)))
            .on_error(move |failure| error.push(format!("{t4}:error:{}", failure.message)))
            .on_close(move |notice| close.push(format!("{t5}:close:{:?}", notice.reason)))
    }
}

pub fn scripted() -> (Correlator, Arc<ScriptedTransport>) {
    scripted_with_close_delay(None)
}

pub fn scripted_with_close_delay(delay: Option<Duration>) -> (Correlator, Arc<ScriptedTransport>) {
    let bus = EventBus::new();
    let transport = ScriptedTransport::with_close_delay(bus.clone(), delay);
    let correlator = Correlator::builder()
        .bus(bus)
        .transport(transport.clone())
        .build()
        .expect("build correlator");
    (correlator, transport)
}

pub fn spec(id: &str) -> RequestSpec {
    RequestSpec::post("http://localhost:3001/api/v1/ai-proxy/chat")
        .json(serde_json::json!({"messages": [{"role": "user", "content": "hi"}]}))
        .id(id)
}
