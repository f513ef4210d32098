//! In-process transport.
//!
//! [`MemoryDialer`] hands out links whose far end is a [`MemoryPeer`]
//! delivered through a [`MemoryListener`]. Frames cross the link as encoded
//! JSON text, so the wire format is exercised exactly as over a socket.
//!
//! # Example
//!
//! ```ignore
//! use agentlink_client::transport::memory::MemoryDialer;
//!
//! let (dialer, mut listener) = MemoryDialer::new();
//! // hand `dialer` to the client, then:
//! let mut peer = listener.accept().await.unwrap();
//! let auth = peer.recv().await?;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use super::{BoxFuture, Dialer, FrameReader, FrameWriter, TransportHalves};
use crate::error::{AgentLinkError, Result};
use crate::protocol::{decode_frame, encode_frame, Frame, DEFAULT_MAX_FRAME_SIZE};

/// Dialer producing in-memory links.
#[derive(Clone)]
pub struct MemoryDialer {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    dials: Arc<AtomicUsize>,
}

impl MemoryDialer {
    /// Create a dialer and the listener that receives the far ends.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dialer = Self {
            peers: tx,
            dials: Arc::new(AtomicUsize::new(0)),
        };
        (dialer, MemoryListener { peers: rx })
    }

    /// Number of links opened so far.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::Acquire)
    }
}

impl Dialer for MemoryDialer {
    fn dial<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<TransportHalves>> {
        Box::pin(async move {
            let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
            let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

            let peer = MemoryPeer {
                url: url.clone(),
                tx: Some(to_client_tx),
                rx: to_peer_rx,
            };
            self.peers.send(peer).map_err(|_| {
                AgentLinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "memory listener dropped",
                ))
            })?;
            self.dials.fetch_add(1, Ordering::AcqRel);

            Ok(TransportHalves {
                writer: Box::new(MemoryWriter {
                    tx: Some(to_peer_tx),
                }),
                reader: Box::new(MemoryReader { rx: to_client_rx }),
            })
        })
    }
}

/// Receives the far end of every dialed link.
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next dialed link. `None` once every dialer is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

/// The control-plane side of an in-memory link.
pub struct MemoryPeer {
    url: Url,
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// URL the client dialed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send a frame to the client.
    pub fn send(&self, frame: &Frame) -> Result<()> {
        self.send_text(encode_frame(frame)?)
    }

    /// Send raw message text to the client, bypassing frame validation.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(text.into())
                .map_err(|_| AgentLinkError::ConnectionClosed),
            None => Err(AgentLinkError::ConnectionClosed),
        }
    }

    /// Wait for the next frame from the client.
    pub async fn recv(&mut self) -> Result<Frame> {
        let text = self.rx.recv().await.ok_or(AgentLinkError::ConnectionClosed)?;
        decode_frame(text.as_bytes(), DEFAULT_MAX_FRAME_SIZE)
    }

    /// Take a frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<Result<Frame>> {
        self.rx
            .try_recv()
            .ok()
            .map(|text| decode_frame(text.as_bytes(), DEFAULT_MAX_FRAME_SIZE))
    }

    /// Stop sending to the client; its reader sees the link close.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl FrameWriter for MemoryWriter {
    fn feed_frame<'a>(&'a mut self, frame: &'a Frame) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let text = encode_frame(frame)?;
            match &self.tx {
                Some(tx) => tx.send(text).map_err(|_| AgentLinkError::ConnectionClosed),
                None => Err(AgentLinkError::ConnectionClosed),
            }
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        self.tx = None;
        Box::pin(async { Ok(()) })
    }
}

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<String>,
}

impl FrameReader for MemoryReader {
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Frame>> {
        Box::pin(async move {
            let text = self.rx.recv().await.ok_or(AgentLinkError::ConnectionClosed)?;
            decode_frame(text.as_bytes(), DEFAULT_MAX_FRAME_SIZE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameType;

    fn url() -> Url {
        Url::parse("ws://memory/api/v1/agent/ws").unwrap()
    }

    #[tokio::test]
    async fn test_dial_delivers_peer() {
        let (dialer, mut listener) = MemoryDialer::new();
        let mut halves = dialer.dial(&url()).await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        assert_eq!(dialer.dial_count(), 1);
        assert_eq!(peer.url().path(), "/api/v1/agent/ws");

        halves.writer.send_frame(&Frame::ping()).await.unwrap();
        assert_eq!(peer.recv().await.unwrap().frame_type, FrameType::Ping);

        peer.send(&Frame::pong(None)).unwrap();
        let frame = halves.reader.read_frame().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Pong);
    }

    #[tokio::test]
    async fn test_dial_refused_without_listener() {
        let (dialer, listener) = MemoryDialer::new();
        drop(listener);

        let result = dialer.dial(&url()).await;
        assert!(matches!(result, Err(AgentLinkError::Io(_))));
        assert_eq!(dialer.dial_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_close_ends_reader() {
        let (dialer, mut listener) = MemoryDialer::new();
        let mut halves = dialer.dial(&url()).await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        peer.close();
        let result = halves.reader.read_frame().await;
        assert!(matches!(result, Err(AgentLinkError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_writer_fails_after_peer_dropped() {
        let (dialer, mut listener) = MemoryDialer::new();
        let mut halves = dialer.dial(&url()).await.unwrap();
        drop(listener.accept().await.unwrap());

        let result = halves.writer.send_frame(&Frame::ping()).await;
        assert!(matches!(result, Err(AgentLinkError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_malformed_text_is_message_error() {
        let (dialer, mut listener) = MemoryDialer::new();
        let mut halves = dialer.dial(&url()).await.unwrap();
        let peer = listener.accept().await.unwrap();

        peer.send_text("{oops").unwrap();
        peer.send(&Frame::ping()).unwrap();

        let err = halves.reader.read_frame().await.unwrap_err();
        assert!(super::super::is_message_error(&err));
        // The link survives a bad message.
        assert!(halves.reader.read_frame().await.is_ok());
    }
}
