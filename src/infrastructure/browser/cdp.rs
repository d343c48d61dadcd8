//! Chrome DevTools Protocol WebSocket client.
//!
//! Commands carry auto-incrementing ids and are correlated back to their
//! caller through a oneshot channel registered *before* the frame is written.
//! Everything without an id is an event and is fanned out on a broadcast
//! channel, so several listeners (navigation waits, the network tap) can
//! observe the same stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::error::BrowserError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 1024;

/// A CDP event received from the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
struct CdpCommand<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Clone)]
pub struct CdpResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<CdpResponseError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

/// Classify a decoded CDP frame: frames with an `id` answer a command,
/// frames with only a `method` are events.
pub fn classify_message(json: &Value) -> Option<InboundMessage> {
    if let Some(id) = json.get("id").and_then(Value::as_u64) {
        return Some(InboundMessage::Response(CdpResponse {
            id,
            result: json.get("result").cloned(),
            error: json
                .get("error")
                .and_then(|e| serde_json::from_value(e.clone()).ok()),
        }));
    }
    let method = json.get("method")?.as_str()?.to_string();
    let params = json.get("params").cloned().unwrap_or(Value::Null);
    Some(InboundMessage::Event(CdpEvent { method, params }))
}

/// WebSocket client bound to one DevTools target.
pub struct CdpClient {
    next_id: AtomicU64,
    pending: PendingMap,
    writer: Mutex<WsSink>,
    events: broadcast::Sender<CdpEvent>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to `ws://host:port/devtools/page/{target_id}`.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        info!(url = ws_url, "connecting to Chrome DevTools WebSocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, reader) = ws_stream.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let reader_handle = tokio::spawn(Self::read_loop(
            reader,
            Arc::clone(&pending),
            events.clone(),
        ));

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            events,
            reader_handle,
        })
    }

    /// Subscribe to every event received from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.send_command_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    pub async fn send_command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&CdpCommand { id, method, params })
            .map_err(|e| BrowserError::protocol(format!("failed to serialize command: {e}")))?;

        debug!(id, method, "sending CDP command");

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = self
            .writer
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await;
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(BrowserError::protocol(format!(
                "failed to send WebSocket message: {e}"
            )));
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(BrowserError::protocol("response channel closed unexpectedly"));
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BrowserError::CommandTimeout {
                    method: method.to_string(),
                    duration: timeout,
                });
            }
        };

        if let Some(err) = response.error {
            let message = match err.data {
                Some(data) => format!("{} ({data})", err.message),
                None => err.message,
            };
            return Err(BrowserError::CommandRejected {
                method: method.to_string(),
                code: err.code,
                message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// `Page.enable`, `Network.enable`, ...
    pub async fn enable_domain(&self, domain: &str) -> Result<(), BrowserError> {
        self.send_command(&format!("{domain}.enable"), serde_json::json!({}))
            .await
            .map(|_| ())
    }

    /// Close the socket and stop the reader task.
    pub async fn shutdown(&self) {
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
        self.reader_handle.abort();
    }

    async fn read_loop(
        mut reader: SplitStream<WsStream>,
        pending: PendingMap,
        events: broadcast::Sender<CdpEvent>,
    ) {
        while let Some(frame) = reader.next().await {
            let text = match frame {
                Ok(Message::Text(t)) => t.to_string(),
                Ok(Message::Binary(b)) => match String::from_utf8(b.to_vec()) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => {
                    info!("DevTools WebSocket closed by remote");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "WebSocket read error, stopping reader");
                    break;
                }
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "failed to parse CDP frame as JSON");
                    continue;
                }
            };

            match classify_message(&json) {
                Some(InboundMessage::Response(response)) => {
                    if let Some(tx) = pending.lock().await.remove(&response.id) {
                        let _ = tx.send(response);
                    } else {
                        debug!(id = response.id, "response for unknown command id");
                    }
                }
                Some(InboundMessage::Event(event)) => {
                    // No subscribers is fine.
                    let _ = events.send(event);
                }
                None => debug!("ignoring CDP frame without id or method"),
            }
        }

        // Fail every command still waiting on this connection.
        for (id, tx) in pending.lock().await.drain() {
            let _ = tx.send(CdpResponse {
                id,
                result: None,
                error: Some(CdpResponseError {
                    code: -1,
                    message: "WebSocket connection closed".to_string(),
                    data: None,
                }),
            });
        }
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}
