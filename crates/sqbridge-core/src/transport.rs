//! Remote transport to the debuggee
//!
//! One WebSocket push connection per session, read by a background task
//! that decodes frames and forwards them in arrival order. Commands and
//! queries go over plain HTTP on the same host and port. Calls are not
//! pipelined; the caller awaits one before issuing the next.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::protocol::{decode_push, CommandResponse, Endpoint, PushMessage};

type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle and payload events from the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A decoded push message
    Push(PushMessage),
    /// The connection is gone. Sent at most once per connection.
    Closed { reason: String },
}

/// Connection to one debuggee
pub struct RemoteTransport {
    endpoint: Endpoint,
    client: reqwest::Client,
    writer: Mutex<SplitSink<PushStream, Message>>,
    reader: JoinHandle<()>,
}

impl RemoteTransport {
    /// Open the push channel. Resolves once the WebSocket handshake is done.
    pub async fn connect(
        endpoint: &Endpoint,
        call_timeout: Option<Duration>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = call_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BridgeError::Connection(format!("Failed to create HTTP client: {e}")))?;

        let url = endpoint.push_url();
        info!("Connecting to debuggee at {}", url);

        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| BridgeError::Connection(format!("Failed to connect to {url}: {e}")))?;

        info!("Push channel connected");

        let (writer, reader) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_push_channel(reader, tx));

        Ok((
            Self {
                endpoint: endpoint.clone(),
                client,
                writer: Mutex::new(writer),
                reader,
            },
            rx,
        ))
    }

    /// `PUT /DebugCommand/{name}`; returns the response's `data` field, or
    /// `Null` when there is none
    pub async fn command(&self, name: &str) -> Result<serde_json::Value> {
        let url = self.endpoint.command_url(name);
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| BridgeError::RemoteCall(format!("{name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::RemoteCall(format!("{name}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::RemoteCall(format!("{name}: {e}")))?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }

        let parsed: CommandResponse = serde_json::from_str(&body)?;
        Ok(parsed.data.unwrap_or(serde_json::Value::Null))
    }

    /// `GET /DebugCommand/{name}`; returns the decoded body
    pub async fn query(&self, name: &str) -> Result<serde_json::Value> {
        let url = self.endpoint.command_url(name);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BridgeError::RemoteCall(format!("{name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::RemoteCall(format!("{name}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::RemoteCall(format!("{name}: {e}")))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send a close frame. The reader reports `Closed` once the remote
    /// acknowledges or the stream ends.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(Message::Close(None)).await?;
        Ok(())
    }
}

impl Drop for RemoteTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_push_channel(
    mut reader: SplitStream<PushStream>,
    tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let reason = loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                if !forward_frame(&text, &tx) {
                    return;
                }
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => {
                    if !forward_frame(&text, &tx) {
                        return;
                    }
                }
                Err(e) => warn!("Dropping non-UTF-8 push frame: {}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by remote".to_string());
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                // Pongs are answered by tungstenite
            }
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        }
    };

    info!("Push channel closed: {}", reason);
    let _ = tx.send(TransportEvent::Closed { reason });
}

/// Decode one frame and forward it. Undecodable frames are logged and
/// dropped. Returns `false` once the receiver is gone.
fn forward_frame(text: &str, tx: &mpsc::UnboundedSender<TransportEvent>) -> bool {
    debug!("Push: {}", text.chars().take(200).collect::<String>());

    match decode_push(text) {
        Ok(message) => tx.send(TransportEvent::Push(message)).is_ok(),
        Err(e) => {
            warn!("Dropping push message: {}", e);
            true
        }
    }
}
