//! Line transport to the chat network

use super::ChatError;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// An open connection to the chat network.
///
/// `recv` and `send`/`close` may be called concurrently from different tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, line: &str) -> Result<(), ChatError>;

    /// Next inbound frame. `None` means the remote end closed cleanly.
    ///
    /// Must be cancel-safe: the supervisor races it against local shutdown.
    async fn recv(&self) -> Option<Result<String, ChatError>>;

    async fn close(&self) -> Result<(), ChatError>;
}

/// Opens transports to the chat network
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChatError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Chat over a WebSocket (TLS when the url is `wss://`)
pub struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, line: &str) -> Result<(), ChatError> {
        self.sink
            .lock()
            .await
            .send(Message::text(line.to_string()))
            .await
            .map_err(|e| ChatError::UnexpectedDisconnect(e.to_string()))
    }

    async fn recv(&self) -> Option<Result<String, ChatError>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_string())),
                Some(Ok(Message::Close(_))) | None => return None,
                // Control frames are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed)) => return None,
                Some(Err(e)) => return Some(Err(ChatError::UnexpectedDisconnect(e.to_string()))),
            }
        }
    }

    async fn close(&self) -> Result<(), ChatError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| ChatError::UnexpectedDisconnect(e.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChatError> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| ChatError::ConnectFailure(e.to_string()))?;
        let (sink, stream) = socket.split();
        Ok(Box::new(WsTransport {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }))
    }
}
