//! Transport module - message-framed, full-duplex links.
//!
//! Provides:
//! - [`Dialer`] - opens a link and hands back its two halves
//! - [`FrameWriter`] / [`FrameReader`] - the write and read halves
//! - [`WebSocketDialer`] - the production transport (`ws://` / `wss://`)
//! - [`memory`] - an in-process transport for tests and embedding
//!
//! The halves are owned separately: the writer task owns the
//! [`FrameWriter`] and the inbound router owns the [`FrameReader`].

use std::future::Future;
use std::pin::Pin;

use url::Url;

use crate::error::{AgentLinkError, Result};
use crate::protocol::{Frame, LINK_PATH};

pub mod memory;
mod websocket;

pub use websocket::{WebSocketDialer, WebSocketReader, WebSocketWriter};

/// Boxed future returned by transport trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Write half of a link.
pub trait FrameWriter: Send + 'static {
    /// Queue a frame. It may stay buffered until [`flush`](Self::flush).
    fn feed_frame<'a>(&'a mut self, frame: &'a Frame) -> BoxFuture<'a, Result<()>>;

    /// Push buffered frames to the peer.
    fn flush(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Close the link from this side.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Feed and flush a single frame.
    fn send_frame<'a>(&'a mut self, frame: &'a Frame) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.feed_frame(frame).await?;
            self.flush().await
        })
    }
}

/// Read half of a link.
///
/// `read_frame` returns `Protocol` or `Json` errors for a single bad message;
/// the link is still usable afterwards. Any other error means the link is
/// gone.
pub trait FrameReader: Send + 'static {
    /// Wait for the next frame.
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Frame>>;
}

/// Both halves of a freshly dialed link.
pub struct TransportHalves {
    pub writer: Box<dyn FrameWriter>,
    pub reader: Box<dyn FrameReader>,
}

/// Opens links to the control plane.
pub trait Dialer: Send + Sync + 'static {
    /// Dial `url` and return the link halves.
    fn dial<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<TransportHalves>>;
}

/// Whether a read error only affects one message.
#[inline]
pub(crate) fn is_message_error(err: &AgentLinkError) -> bool {
    matches!(err, AgentLinkError::Protocol(_) | AgentLinkError::Json(_))
}

/// Derive the link endpoint from the control plane base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`, and [`LINK_PATH`] is appended
/// to whatever path the base URL already has.
///
/// # Example
///
/// ```
/// use agentlink_client::transport::endpoint_url;
///
/// let url = endpoint_url("https://cp.example.com/tenant-a/").unwrap();
/// assert_eq!(url.as_str(), "wss://cp.example.com/tenant-a/api/v1/agent/ws");
/// ```
pub fn endpoint_url(base: &str) -> Result<Url> {
    let mut url =
        Url::parse(base).map_err(|e| AgentLinkError::InvalidUrl(format!("{}: {}", base, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AgentLinkError::InvalidUrl(format!(
                "unsupported scheme {:?} in {}",
                other, base
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AgentLinkError::InvalidUrl(format!("cannot rewrite scheme of {}", base)))?;

    let path = format!("{}{}", url.path().trim_end_matches('/'), LINK_PATH);
    url.set_path(&path);
    Ok(url)
}
