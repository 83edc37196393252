use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt as _;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::errors::{StreamingError, TransportError};
use crate::event::{DONE_SENTINEL, StreamEvent};
use crate::identifier::RequestId;
use crate::transport::{Transport, TransportRequest};

use super::config::HttpTransportConfig;
use super::sse::{SseDecoder, SseFrame};

/// Bytes of a non-2xx body kept for the error message.
const ERROR_BODY_LIMIT: usize = 4 * 1024;
/// Read deadline for a non-2xx body when no idle timeout is configured.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(5);

struct ActiveStream {
    generation: u64,
    handle: JoinHandle<()>,
}

type ActiveStreams = Arc<DashMap<RequestId, ActiveStream>>;

/// Streams SSE responses with reqwest and publishes their lifecycle on a bus.
///
/// Each request runs on its own tokio task. Failures are emitted as `onError`
/// followed by `onClose`; a normal end of stream emits `onClose` only.
pub struct HttpTransport {
    client: reqwest::Client,
    bus: EventBus,
    config: HttpTransportConfig,
    active: ActiveStreams,
    next_generation: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport that emits onto `bus`.
    pub fn new(config: HttpTransportConfig, bus: EventBus) -> Result<Self, StreamingError> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StreamingError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            bus,
            config,
            active: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        })
    }

    /// Creates a transport configured from the environment.
    pub fn from_env(bus: EventBus) -> Result<Self, StreamingError> {
        Self::new(HttpTransportConfig::from_env()?, bus)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Identifiers of streams that are still running.
    pub fn active_streams(&self) -> Vec<RequestId> {
        self.active.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn is_active(&self, hash_id: &RequestId) -> bool {
        self.active.contains_key(hash_id)
    }

    fn build_request(
        &self,
        request: &TransportRequest,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        if request.url.trim().is_empty() {
            return Err(TransportError::invalid_request("url is required"));
        }
        if request.hash_id.is_blank() {
            return Err(TransportError::invalid_request("hash_id is required"));
        }
        let url = reqwest::Url::parse(request.url.trim())
            .map_err(|e| TransportError::invalid_request(format!("invalid url: {e}")))?;
        let method_raw = if request.method.trim().is_empty() {
            "GET".to_string()
        } else {
            request.method.trim().to_ascii_uppercase()
        };
        let method = reqwest::Method::from_bytes(method_raw.as_bytes()).map_err(|_| {
            TransportError::invalid_request(format!("invalid method: {}", request.method))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(user_agent) = &self.config.user_agent {
            headers.insert(USER_AGENT, header_value(user_agent)?);
        }
        for (name, value) in self.config.default_headers.iter().chain(&request.headers) {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::invalid_request(format!("invalid header name `{name}`: {e}"))
            })?;
            headers.insert(name, header_value(value)?);
        }

        let send_body = method != reqwest::Method::GET;
        let mut builder = self.client.request(method, url).headers(headers);
        if send_body && let Some(data) = &request.data {
            builder = builder.json(data);
        }
        Ok(builder)
    }

    async fn stop(&self, hash_id: &RequestId, stream: ActiveStream, acknowledge: bool) {
        stream.handle.abort();
        match stream.handle.await {
            Err(err) if err.is_cancelled() => {
                debug!(hash_id = %hash_id, "stream task aborted");
                if acknowledge {
                    self.bus.emit_event(&StreamEvent::Close {
                        id: hash_id.clone(),
                    });
                }
            }
            Err(err) => warn!(hash_id = %hash_id, error = %err, "stream task panicked"),
            // Finished on its own and already emitted its terminal events.
            Ok(()) => {}
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::invalid_request(format!("invalid header value: {e}")))
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: TransportRequest) -> Result<(), TransportError> {
        let builder = self.build_request(&request)?;
        let hash_id = request.hash_id;

        if let Some((_, previous)) = self.active.remove(&hash_id) {
            info!(hash_id = %hash_id, "replacing active stream with the same hash_id");
            self.stop(&hash_id, previous, false).await;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(drive_stream(
            hash_id.clone(),
            builder,
            self.bus.clone(),
            self.active.clone(),
            generation,
            self.config.idle_timeout,
            ready_rx,
        ));
        self.active
            .insert(hash_id.clone(), ActiveStream { generation, handle });
        let _ = ready_tx.send(());
        debug!(hash_id = %hash_id, generation, "stream dispatched");
        Ok(())
    }

    async fn close(&self, hash_id: Option<&RequestId>) -> Result<(), TransportError> {
        match hash_id {
            Some(hash_id) => {
                if let Some((_, stream)) = self.active.remove(hash_id) {
                    info!(hash_id = %hash_id, "closing stream");
                    self.stop(hash_id, stream, true).await;
                }
            }
            None => {
                let ids = self.active_streams();
                info!(count = ids.len(), "closing all streams");
                let stops = ids.into_iter().filter_map(|id| {
                    self.active
                        .remove(&id)
                        .map(|(id, stream)| async move { self.stop(&id, stream, true).await })
                });
                futures::future::join_all(stops).await;
            }
        }
        Ok(())
    }
}

async fn drive_stream(
    hash_id: RequestId,
    builder: reqwest::RequestBuilder,
    bus: EventBus,
    active: ActiveStreams,
    generation: u64,
    idle_timeout: Option<Duration>,
    ready: oneshot::Receiver<()>,
) {
    // Wait until the handle is registered so a fast stream cannot outrun its own bookkeeping.
    let _ = ready.await;

    if let Err(err) = read_stream(&hash_id, builder, &bus, idle_timeout).await {
        warn!(hash_id = %hash_id, error = %err, "stream failed");
        bus.emit_event(&StreamEvent::Error {
            id: hash_id.clone(),
            message: err.event_message(),
        });
    }
    // Close goes out before the entry is dropped. A `close` that still finds
    // the entry waits for the task, so no stale Close can outlive it.
    bus.emit_event(&StreamEvent::Close {
        id: hash_id.clone(),
    });
    active.remove_if(&hash_id, |_, stream| stream.generation == generation);
}

async fn read_stream(
    hash_id: &RequestId,
    builder: reqwest::RequestBuilder,
    bus: &EventBus,
    idle_timeout: Option<Duration>,
) -> Result<(), TransportError> {
    let response = builder
        .send()
        .await
        .map_err(|e| TransportError::connection(hash_id.clone(), format!("request failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        let message = read_error_body(response, idle_timeout).await;
        return Err(TransportError::Status {
            hash_id: hash_id.clone(),
            status: status.as_u16(),
            message,
        });
    }
    debug!(hash_id = %hash_id, status = status.as_u16(), "stream opened");
    bus.emit_event(&StreamEvent::Open {
        id: hash_id.clone(),
    });

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();
    loop {
        let next = match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, body.next()).await.map_err(|_| {
                TransportError::stream(
                    hash_id.clone(),
                    format!("no data received for {limit:?}"),
                )
            })?,
            None => body.next().await,
        };
        match next {
            Some(Ok(chunk)) => {
                let frames = decoder
                    .push_chunk(&chunk)
                    .map_err(|e| TransportError::stream(hash_id.clone(), e.to_string()))?;
                for frame in frames {
                    publish_frame(hash_id, bus, frame);
                }
            }
            Some(Err(e)) => {
                return Err(TransportError::stream(
                    hash_id.clone(),
                    format!("stream read failed: {e}"),
                ));
            }
            None => break,
        }
    }
    if let Some(frame) = decoder.finish() {
        publish_frame(hash_id, bus, frame);
    }
    debug!(hash_id = %hash_id, "stream ended");
    Ok(())
}

/// Reads at most [`ERROR_BODY_LIMIT`] bytes of an error body. A body that
/// stalls is cut off after the idle timeout.
async fn read_error_body(response: reqwest::Response, idle_timeout: Option<Duration>) -> String {
    let limit = idle_timeout.unwrap_or(ERROR_BODY_TIMEOUT);
    let mut body = response.bytes_stream();
    let mut buf = Vec::new();
    while buf.len() < ERROR_BODY_LIMIT {
        match tokio::time::timeout(limit, body.next()).await {
            Ok(Some(Ok(chunk))) => buf.extend_from_slice(&chunk),
            Ok(Some(Err(_)) | None) => break,
            Err(_) => {
                debug!("error body stalled, using what arrived");
                break;
            }
        }
    }
    buf.truncate(ERROR_BODY_LIMIT);
    String::from_utf8_lossy(&buf).trim().to_string()
}

fn publish_frame(hash_id: &RequestId, bus: &EventBus, frame: SseFrame) {
    trace!(hash_id = %hash_id, event = ?frame.event, last_event_id = ?frame.id, "sse frame");
    let id = hash_id.clone();
    let event = if frame.data.trim() == DONE_SENTINEL {
        StreamEvent::Complete {
            id,
            data: Some(DONE_SENTINEL.to_string()),
        }
    } else if frame.data.is_empty() {
        return;
    } else {
        StreamEvent::Message {
            id,
            data: frame.data,
        }
    };
    bus.emit_event(&event);
}
