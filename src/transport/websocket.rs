//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each frame is sent as one text message. Incoming text and binary
//! messages are both decoded as JSON frames; WebSocket control messages
//! (ping, pong) are answered by tungstenite and skipped here.
//!
//! # Example
//!
//! ```ignore
//! use agentlink_client::transport::{endpoint_url, Dialer, WebSocketDialer};
//!
//! let url = endpoint_url("https://cp.example.com")?;
//! let halves = WebSocketDialer::default().dial(&url).await?;
//! ```

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{BoxFuture, Dialer, FrameReader, FrameWriter, TransportHalves};
use crate::error::{AgentLinkError, Result};
use crate::protocol::{decode_frame, encode_frame, Frame, DEFAULT_MAX_FRAME_SIZE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the control plane over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    max_frame_size: usize,
}

impl WebSocketDialer {
    /// Create a dialer that rejects inbound frames larger than `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for WebSocketDialer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Dialer for WebSocketDialer {
    fn dial<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<TransportHalves>> {
        Box::pin(async move {
            let (stream, response) = connect_async(url.as_str()).await?;
            tracing::debug!(url = %url, status = %response.status(), "WebSocket upgraded");

            let (sink, stream) = stream.split();
            Ok(TransportHalves {
                writer: Box::new(WebSocketWriter { sink }),
                reader: Box::new(WebSocketReader {
                    stream,
                    max_frame_size: self.max_frame_size,
                }),
            })
        })
    }
}

/// Write half of a WebSocket link.
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter for WebSocketWriter {
    fn feed_frame<'a>(&'a mut self, frame: &'a Frame) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let text = encode_frame(frame)?;
            self.sink.feed(Message::text(text)).await?;
            Ok(())
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.sink.flush().await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.sink.close().await?;
            Ok(())
        })
    }
}

/// Read half of a WebSocket link.
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
    max_frame_size: usize,
}

impl FrameReader for WebSocketReader {
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Frame>> {
        Box::pin(async move {
            loop {
                let message = match self.stream.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(AgentLinkError::ConnectionClosed),
                };

                match message {
                    Message::Text(text) => return decode_frame(text.as_bytes(), self.max_frame_size),
                    Message::Binary(data) => return decode_frame(&data, self.max_frame_size),
                    Message::Close(reason) => {
                        tracing::debug!(?reason, "peer closed WebSocket");
                        return Err(AgentLinkError::ConnectionClosed);
                    }
                    // Control frames are handled inside tungstenite.
                    _ => continue,
                }
            }
        })
    }
}
