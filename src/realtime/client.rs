use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{VoiceError, VoiceResult};

/// One open duplex connection carrying JSON text frames
///
/// Only the owning session writes to a transport.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Send one text frame
    async fn send(&mut self, frame: String) -> VoiceResult<()>;

    /// Next inbound text frame in arrival order
    ///
    /// `None` means the remote closed the connection cleanly.
    async fn recv(&mut self) -> Option<VoiceResult<String>>;

    /// Close the connection; safe to call more than once
    async fn close(&mut self) -> VoiceResult<()>;
}

/// Opens transports for new sessions
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> VoiceResult<Box<dyn Transport>>;

    /// Endpoint description for logging
    fn endpoint(&self) -> String;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a realtime endpoint over WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    api_key: Option<String>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> VoiceResult<Box<dyn Transport>> {
        info!("Connecting to realtime service at {}", self.url);

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| VoiceError::Transport(format!("invalid URL {}: {e}", self.url)))?;

        if let Some(key) = &self.api_key {
            let auth = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| VoiceError::Config(format!("invalid API key header: {e}")))?;
            request.headers_mut().insert("Authorization", auth);
            request
                .headers_mut()
                .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to connect to {}: {e}", self.url)))?;

        info!("Connected to realtime service");

        let (writer, reader) = ws_stream.split();
        Ok(Box::new(WebSocketTransport {
            writer,
            reader,
            closed: false,
        }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// WebSocket connection split into its write and read halves
pub struct WebSocketTransport {
    writer: SplitSink<WsStream, Message>,
    reader: SplitStream<WsStream>,
    closed: bool,
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> VoiceResult<()> {
        if self.closed {
            return Err(VoiceError::Transport("connection already closed".to_string()));
        }
        self.writer
            .send(Message::Text(frame))
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to send WebSocket message: {e}")))
    }

    async fn recv(&mut self) -> Option<VoiceResult<String>> {
        if self.closed {
            return None;
        }

        while let Some(msg_result) = self.reader.next().await {
            let msg = match msg_result {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "WebSocket read error");
                    return Some(Err(VoiceError::Transport(e.to_string())));
                }
            };

            match msg {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(bytes) => {
                    return Some(String::from_utf8(bytes).map_err(|_| {
                        VoiceError::Transport("binary frame is not UTF-8 text".to_string())
                    }))
                }
                Message::Close(frame) => {
                    info!("WebSocket closed by remote: {:?}", frame);
                    self.closed = true;
                    return None;
                }
                // Pings are answered by tungstenite on the next write
                _ => continue,
            }
        }

        None
    }

    async fn close(&mut self) -> VoiceResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        debug!("Closing WebSocket connection");
        let close = self.writer.send(Message::Close(None));
        match tokio::time::timeout(Duration::from_secs(2), close).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(VoiceError::Transport(format!("failed to close WebSocket: {e}"))),
            Err(_) => {
                warn!("Timed out sending WebSocket close frame");
                Ok(())
            }
        }
    }
}
