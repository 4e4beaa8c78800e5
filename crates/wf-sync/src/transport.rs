//! Per-task event channel.
//!
//! A transport owns one socket to `/ws/tasks/{task_id}` and forwards
//! everything it sees as [`TransportSignal`]s on a flume channel. It never
//! reconnects by itself; the reconciler decides that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;
use wf_api_types::{ClientMessage, GenerationEvent};

const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Everything a transport can report to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The socket is up.
    Opened,
    Event(GenerationEvent),
    /// Socket-level problem. Not a task failure.
    Error(String),
    /// The socket went away without the owner asking for it.
    Closed { reason: Option<String> },
}

/// One live event channel for one task.
pub trait EventTransport: Send + Sync {
    fn task_id(&self) -> &str;

    /// Start connecting. Returns immediately; [`TransportSignal::Opened`]
    /// follows once the socket is up. A no-op while already running.
    fn connect(&mut self, include_history: bool);

    /// Tear the socket down. Safe to call any number of times.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Ask the server for an immediate status snapshot.
    fn request_status(&self);
}

/// Builds transports; one call per task id the reconciler subscribes to.
pub trait TransportFactory: Send + Sync + 'static {
    fn create(
        &self,
        task_id: &str,
    ) -> (Box<dyn EventTransport>, flume::Receiver<TransportSignal>);
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WsTransportFactory {
    ws_base: String,
    keepalive: Duration,
}

impl WsTransportFactory {
    /// `ws_base` is the scheme + authority (+ optional prefix), e.g.
    /// `ws://127.0.0.1:8000`.
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into().trim_end_matches('/').to_string(),
            keepalive: DEFAULT_KEEPALIVE,
        }
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(
        &self,
        task_id: &str,
    ) -> (Box<dyn EventTransport>, flume::Receiver<TransportSignal>) {
        let (tx, rx) = flume::unbounded();
        let transport = WsTransport {
            task_id: task_id.to_string(),
            ws_base: self.ws_base.clone(),
            keepalive: self.keepalive,
            signals: tx,
            connected: Arc::new(AtomicBool::new(false)),
            outbound: None,
            shutdown: None,
            worker: None,
        };
        (Box::new(transport), rx)
    }
}

pub struct WsTransport {
    task_id: String,
    ws_base: String,
    keepalive: Duration,
    signals: flume::Sender<TransportSignal>,
    connected: Arc<AtomicBool>,
    outbound: Option<mpsc::UnboundedSender<ClientMessage>>,
    shutdown: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

impl WsTransport {
    /// `{ws_base}/ws/tasks/{task_id}?include_history=…`, with the task id
    /// escaped as a single path segment.
    fn url(&self, include_history: bool) -> Result<Url, String> {
        let mut url = Url::parse(&self.ws_base).map_err(|e| format!("{}: {e}", self.ws_base))?;
        url.path_segments_mut()
            .map_err(|_| format!("{} cannot carry a path", self.ws_base))?
            .pop_if_empty()
            .extend(["ws", "tasks", self.task_id.as_str()]);
        url.query_pairs_mut()
            .clear()
            .append_pair("include_history", if include_history { "true" } else { "false" });
        Ok(url)
    }

    fn running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl EventTransport for WsTransport {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn connect(&mut self, include_history: bool) {
        if self.running() {
            return;
        }
        let url = match self.url(include_history) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(task_id = %self.task_id, error = %e, "invalid event channel url");
                let _ = self.signals.send(TransportSignal::Error(e));
                return;
            }
        };
        let token = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        if include_history {
            // Queued now, flushed right after the handshake.
            let _ = out_tx.send(ClientMessage::GetStatus);
        }

        let conn = Connection {
            task_id: self.task_id.clone(),
            url,
            keepalive: self.keepalive,
            signals: self.signals.clone(),
            connected: self.connected.clone(),
            outbound: out_rx,
            shutdown: token.clone(),
        };
        self.outbound = Some(out_tx);
        self.shutdown = Some(token);
        self.worker = Some(tokio::spawn(conn.run()));
    }

    fn disconnect(&mut self) {
        if let Some(token) = self.shutdown.take() {
            token.cancel();
            tracing::debug!(task_id = %self.task_id, "event channel disconnected");
        }
        self.outbound = None;
        self.worker = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn request_status(&self) {
        if let Some(out) = &self.outbound {
            let _ = out.send(ClientMessage::GetStatus);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The spawned half of a [`WsTransport`].
struct Connection {
    task_id: String,
    url: String,
    keepalive: Duration,
    signals: flume::Sender<TransportSignal>,
    connected: Arc<AtomicBool>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    shutdown: CancellationToken,
}

impl Connection {
    async fn run(mut self) {
        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let ws = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            res = connect => match res {
                Ok((ws, _)) => ws,
                Err(e) => {
                    tracing::warn!(task_id = %self.task_id, error = %e, "event channel connect failed");
                    self.emit(TransportSignal::Error(e.to_string()));
                    self.emit(TransportSignal::Closed { reason: Some(e.to_string()) });
                    return;
                }
            },
        };

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(task_id = %self.task_id, "event channel open");
        self.emit(TransportSignal::Opened);

        let (mut sink, mut stream) = ws.split();
        let mut keepalive = tokio::time::interval(self.keepalive);
        keepalive.tick().await;

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    self.connected.store(false, Ordering::SeqCst);
                    return;
                }
                Some(msg) = self.outbound.recv() => {
                    if let Err(e) = send_json(&mut sink, &msg).await {
                        self.emit(TransportSignal::Error(e.to_string()));
                        break Some(e.to_string());
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(e) = send_json(&mut sink, &ClientMessage::Ping).await {
                        self.emit(TransportSignal::Error(e.to_string()));
                        break Some(e.to_string());
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.forward(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.as_str().to_string()).filter(|r| !r.is_empty());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(task_id = %self.task_id, error = %e, "event channel error");
                        self.emit(TransportSignal::Error(e.to_string()));
                        break Some(e.to_string());
                    }
                    None => break None,
                },
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        tracing::info!(task_id = %self.task_id, ?reason, "event channel closed");
        self.emit(TransportSignal::Closed { reason });
    }

    fn forward(&self, text: &str) {
        match serde_json::from_str::<GenerationEvent>(text) {
            Ok(event) => self.emit(TransportSignal::Event(event)),
            Err(e) => {
                tracing::warn!(task_id = %self.task_id, error = %e, "skipping malformed event frame");
            }
        }
    }

    fn emit(&self, signal: TransportSignal) {
        // A dropped receiver means the owner already moved on.
        let _ = self.signals.send(signal);
    }
}

async fn send_json<S>(sink: &mut S, msg: &ClientMessage) -> Result<(), String>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}
