//! WebSocket-based live session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use concierge_audio::EncodedChunk;
use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use http::HeaderValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::event::{ServerEvent, parse_events};
use crate::transport::Transport;
use crate::types::{SetupConfig, realtime_input_message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CHANNEL_CAPACITY: usize = 100;

/// WebSocket-based live session.
///
/// Returned by [`Client`](crate::Client) once the endpoint has
/// acknowledged the setup message.
pub struct WebSocketSession {
    write_tx: mpsc::Sender<Message>,
    event_rx: Mutex<mpsc::Receiver<Result<ServerEvent>>>,
    closed: AtomicBool,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

impl WebSocketSession {
    /// Connects, sends `setup` and waits for `setupComplete`.
    pub(crate) async fn connect(
        config: Arc<ClientConfig>,
        setup: &SetupConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        debug!("connecting to: {}", config.ws_url);

        let mut request = config.ws_url.as_str().into_client_request()?;
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| Error::InvalidConfig(format!("invalid api key: {}", e)))?;
        request.headers_mut().insert("x-goog-api-key", key);

        let ws_stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::SessionAborted),
            res = tokio::time::timeout(config.connect_timeout, connect_async(request)) => match res {
                Err(_) => return Err(Error::Timeout("websocket handshake".to_string())),
                Ok(Err(e)) => return Err(Error::Connection(format!("failed to connect: {}", e))),
                Ok(Ok((stream, _response))) => stream,
            },
        };

        let (write, read) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let session = Self {
            write_tx,
            event_rx: Mutex::new(event_rx),
            closed: AtomicBool::new(false),
            write_handle: tokio::spawn(write_loop(write, write_rx)),
            read_handle: tokio::spawn(read_loop(read, event_tx)),
        };

        session.send_json(setup.to_message()).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = session.close().await;
                return Err(Error::SessionAborted);
            }
            res = tokio::time::timeout(config.connect_timeout, session.wait_setup_complete()) => match res {
                Err(_) => return Err(Error::Timeout("setup acknowledgment".to_string())),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(())) => {}
            },
        }

        debug!("session open: {}", setup.model_resource());
        Ok(session)
    }

    async fn wait_setup_complete(&self) -> Result<()> {
        let mut rx = self.event_rx.lock().await;
        loop {
            match rx.recv().await {
                Some(Ok(ServerEvent::SetupComplete)) => return Ok(()),
                Some(Ok(other)) => debug!("ignoring {} before setup complete", other.kind()),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(Error::Connection(
                        "closed before setup completed".to_string(),
                    ));
                }
            }
        }
    }

    async fn send_json(&self, value: serde_json::Value) -> Result<()> {
        let text = value.to_string();
        debug!("sending: {}", truncate_for_log(&text, 200));
        self.write_tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| Error::SessionClosed)
    }
}

#[async_trait]
impl Transport for WebSocketSession {
    async fn send_audio(&self, chunk: &EncodedChunk) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        self.send_json(realtime_input_message(chunk)).await
    }

    async fn recv(&self) -> Option<Result<ServerEvent>> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }

    /// Queues a close frame without waiting on the socket.
    ///
    /// If the outbound queue is full the peer has stopped reading; the
    /// write loop is aborted instead of waiting for room.
    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.write_tx.try_send(Message::Close(None)) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!("outbound queue full, dropping close handshake");
                self.write_handle.abort();
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.write_tx.is_closed()
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.read_handle.abort();
        self.write_handle.abort();
    }
}

// Write loop task
async fn write_loop(mut write: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Message::Close(_) = msg {
            let _ = write.close().await;
            break;
        }
        if let Err(e) = write.send(msg).await {
            error!("write error: {}", e);
            break;
        }
    }
}

// Read loop task. Dropping `tx` ends the event stream, which is how a
// clean close reaches `recv`.
async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<Result<ServerEvent>>) {
    while let Some(result) = read.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    warn!("ignoring non-utf8 binary frame ({} bytes)", data.len());
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                debug!("websocket closed by server: {:?}", frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                error!("read error: {}", e);
                let _ = tx.send(Err(Error::WebSocket(e))).await;
                break;
            }
        };

        debug!("received: {}", truncate_for_log(&text, 200));
        match parse_events(&text) {
            Ok(events) => {
                for event in events {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
            Err(Error::Json(e)) => {
                warn!("ignoring unparseable server message: {}", e);
            }
            Err(e) => {
                if tx.send(Err(e)).await.is_err() {
                    return;
                }
            }
        }
    }
}

// Truncates a string for logging, respecting char boundaries.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
