//! Link establishment
//!
//! [`Connector`] opens a [`LiveLink`]: a bidirectional text-frame pipe. The
//! production connector speaks WebSocket through tokio-tungstenite; tests
//! plug in an in-memory pair.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{TransportError, TransportResult};

/// One inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The peer closed the link; `code` is the close code if one was sent
    Close { code: Option<u16>, reason: String },
}

/// An open link
#[async_trait]
pub trait LiveLink: Send {
    /// Send one text frame
    async fn send(&mut self, text: String) -> TransportResult<()>;

    /// Next inbound frame; a stream end is reported as `Frame::Close`
    async fn next_frame(&mut self) -> TransportResult<Frame>;

    /// Close the link
    async fn close(&mut self);
}

/// Opens links
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> TransportResult<Box<dyn LiveLink>>;
}

/// WebSocket connector
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> TransportResult<Box<dyn LiveLink>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LiveLink for WsLink {
    async fn send(&mut self, text: String) -> TransportResult<()> {
        self.stream
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::Link(e.to_string()))
    }

    async fn next_frame(&mut self) -> TransportResult<Frame> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(TransportError::Link(e.to_string())),
                None => {
                    return Ok(Frame::Close {
                        code: None,
                        reason: "stream ended".to_string(),
                    })
                }
            };

            match message {
                WsMessage::Text(text) => return Ok(Frame::Text(text)),
                WsMessage::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Frame::Text(text)),
                    Err(_) => tracing::warn!("Ignoring non-UTF-8 binary frame"),
                },
                WsMessage::Close(frame) => {
                    return Ok(match frame {
                        Some(frame) => Frame::Close {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.into_owned(),
                        },
                        None => Frame::Close {
                            code: None,
                            reason: String::new(),
                        },
                    });
                }
                // Pings are answered by tungstenite
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}
