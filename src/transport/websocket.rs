//! WebSocket connector backed by tokio-tungstenite

use super::{Connection, Connector, FrameSink, FrameSource, TransportError};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one socket per session at `{base}/{session_id}`
#[derive(Debug, Clone)]
pub struct WsConnector {
    base: Url,
}

impl WsConnector {
    pub fn new(base: &str) -> Result<Self, TransportError> {
        let base = Url::parse(base)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{base}: {e}")))?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidEndpoint(format!(
                "{base}: expected a ws:// or wss:// address"
            )));
        }
        if base.cannot_be_a_base() {
            return Err(TransportError::InvalidEndpoint(base.to_string()));
        }
        Ok(Self { base })
    }

    /// Address of a session's channel; the id is encoded as one path segment
    pub fn channel_url(&self, session_id: &str) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .push(session_id);
        Ok(url)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, session_id: &str) -> Result<Connection, TransportError> {
        let url = self.channel_url(session_id)?;
        tracing::debug!(url = %url, "Opening chat socket");

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, stream) = socket.split();

        Ok(Connection {
            sink: Box::new(WsSink { sink }),
            source: Box::new(WsSource { stream }),
        })
    }
}

struct WsSink {
    sink: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "Socket close failed");
        }
    }
}

struct WsSource {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Server closed the socket");
                    return None;
                }
                Ok(_) => tracing::debug!("Ignoring non-text frame"),
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }
}
