//! Dedicated writer task for the link.
//!
//! Transports are not safe for concurrent writers, so every outbound frame
//! (commands, heartbeat pings, pongs) goes through one task that owns the
//! [`FrameWriter`]. Writes are serialized by construction, without a mutex.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ─┐
//! Heartbeat  ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► FrameWriter
//! Router     ─┘
//! ```
//!
//! Each queued frame carries a oneshot acknowledgement, so
//! [`WriterHandle::send`] still reports a failed write to its caller.
//! Frames that are ready together are fed as a batch and flushed once.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentLinkError, Result};
use crate::protocol::Frame;
use crate::transport::FrameWriter;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time allowed for the close handshake on shutdown.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum frames to feed before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// A frame waiting to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    pub frame: Frame,
    ack: oneshot::Sender<Result<()>>,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Upper bound on closing the transport at shutdown.
    pub close_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and shared by every sender on the link.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been written.
    ///
    /// Fails with the transport's error if the write failed, or
    /// `ConnectionClosed` if the writer task is gone.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(OutboundFrame { frame, ack })
            .await
            .map_err(|_| AgentLinkError::ConnectionClosed)?;
        done.await.map_err(|_| AgentLinkError::ConnectionClosed)?
    }

    /// Queue a frame without waiting for it to be written.
    ///
    /// Fails immediately if the queue is full or the writer task is gone.
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        let (ack, _) = oneshot::channel();
        self.tx
            .try_send(OutboundFrame { frame, ack })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    AgentLinkError::SendFailed("writer queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => AgentLinkError::ConnectionClosed,
            })
    }

    /// Whether the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task runs until `cancel` fires, every handle is dropped, or a write
/// fails. On the first two it closes the transport.
pub fn spawn_writer_task(
    writer: Box<dyn FrameWriter>,
    config: WriterConfig,
    cancel: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer, cancel, config.close_timeout));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them in batches.
async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: Box<dyn FrameWriter>,
    cancel: CancellationToken,
    close_timeout: Duration,
) -> Result<()> {
    loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(f) => f,
                // Every handle dropped, clean shutdown
                None => break,
            },
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(f) => batch.push(f),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(writer.as_mut(), batch).await {
            tracing::debug!(error = %e, "writer task stopping after failed write");
            return Err(e);
        }
    }

    rx.close();
    while let Ok(pending) = rx.try_recv() {
        let _ = pending.ack.send(Err(AgentLinkError::ConnectionClosed));
    }

    match tokio::time::timeout(close_timeout, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "transport close failed"),
        Err(_) => tracing::debug!("transport close timed out"),
    }
    Ok(())
}

/// Feed every frame of the batch, flush once, then acknowledge.
///
/// A frame whose feed fails gets that error; frames after it are never
/// written and get `ConnectionClosed`.
async fn write_batch(writer: &mut dyn FrameWriter, batch: Vec<OutboundFrame>) -> Result<()> {
    let mut fed = Vec::with_capacity(batch.len());
    let mut frames = batch.into_iter();

    for outbound in frames.by_ref() {
        match writer.feed_frame(&outbound.frame).await {
            Ok(()) => fed.push(outbound.ack),
            Err(e) => {
                let message = e.to_string();
                let _ = outbound.ack.send(Err(e));
                fail_all(fed);
                fail_all(frames.map(|f| f.ack));
                return Err(AgentLinkError::SendFailed(message));
            }
        }
    }

    match writer.flush().await {
        Ok(()) => {
            for ack in fed {
                let _ = ack.send(Ok(()));
            }
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            for ack in fed {
                let _ = ack.send(Err(AgentLinkError::SendFailed(message.clone())));
            }
            Err(e)
        }
    }
}

fn fail_all(acks: impl IntoIterator<Item = oneshot::Sender<Result<()>>>) {
    for ack in acks {
        let _ = ack.send(Err(AgentLinkError::ConnectionClosed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameType;
    use crate::transport::memory::MemoryDialer;
    use crate::transport::{BoxFuture, Dialer};

    async fn memory_writer() -> (
        Box<dyn FrameWriter>,
        crate::transport::memory::MemoryPeer,
    ) {
        let (dialer, mut listener) = MemoryDialer::new();
        let url = url::Url::parse("ws://memory/").unwrap();
        let halves = dialer.dial(&url).await.unwrap();
        let peer = listener.accept().await.unwrap();
        (halves.writer, peer)
    }

    /// Writer whose feed fails after `ok_frames` frames.
    struct FailingWriter {
        ok_frames: usize,
        flushed: usize,
    }

    impl FrameWriter for FailingWriter {
        fn feed_frame<'a>(&'a mut self, _frame: &'a Frame) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                if self.ok_frames == 0 {
                    return Err(AgentLinkError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "broken pipe",
                    )));
                }
                self.ok_frames -= 1;
                Ok(())
            })
        }

        fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
            self.flushed += 1;
            Box::pin(async { Ok(()) })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.close_timeout, DEFAULT_CLOSE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (writer, mut peer) = memory_writer().await;
        let (handle, _task) =
            spawn_writer_task(writer, WriterConfig::default(), CancellationToken::new());

        handle.send(Frame::ping()).await.unwrap();

        let frame = peer.recv().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Ping);
    }

    #[tokio::test]
    async fn test_writer_preserves_order_across_senders() {
        let (writer, mut peer) = memory_writer().await;
        let (handle, _task) =
            spawn_writer_task(writer, WriterConfig::default(), CancellationToken::new());

        for i in 0..10 {
            handle
                .send(Frame::new(FrameType::Command).with_id(format!("c-{}", i)))
                .await
                .unwrap();
        }

        for i in 0..10 {
            let frame = peer.recv().await.unwrap();
            assert_eq!(frame.id(), Some(format!("c-{}", i).as_str()));
        }
    }

    #[tokio::test]
    async fn test_try_send_queues_without_ack() {
        let (writer, mut peer) = memory_writer().await;
        let (handle, _task) =
            spawn_writer_task(writer, WriterConfig::default(), CancellationToken::new());

        handle.try_send(Frame::pong(Some("p-1".into()))).unwrap();

        let frame = peer.recv().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Pong);
        assert_eq!(frame.id(), Some("p-1"));
    }

    #[tokio::test]
    async fn test_try_send_after_shutdown() {
        let (writer, _peer) = memory_writer().await;
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_writer_task(writer, WriterConfig::default(), cancel.clone());

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(matches!(
            handle.try_send(Frame::ping()),
            Err(AgentLinkError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_send_reports_write_failure() {
        let (writer, peer) = memory_writer().await;
        drop(peer);
        let (handle, task) =
            spawn_writer_task(writer, WriterConfig::default(), CancellationToken::new());

        let result = handle.send(Frame::ping()).await;
        assert!(matches!(result, Err(AgentLinkError::ConnectionClosed)));

        // The task ends with the failure and later sends are refused.
        assert!(task.await.unwrap().is_err());
        assert!(handle.send(Frame::ping()).await.is_err());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_write_batch_partial_failure() {
        let mut writer = FailingWriter {
            ok_frames: 1,
            flushed: 0,
        };

        let mut waiters = Vec::new();
        let mut batch = Vec::new();
        for _ in 0..3 {
            let (ack, done) = oneshot::channel();
            batch.push(OutboundFrame {
                frame: Frame::ping(),
                ack,
            });
            waiters.push(done);
        }

        let result = write_batch(&mut writer, batch).await;
        assert!(matches!(result, Err(AgentLinkError::SendFailed(_))));
        assert_eq!(writer.flushed, 0);

        for done in waiters {
            assert!(done.await.unwrap().is_err());
        }
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_cancel() {
        let (writer, mut peer) = memory_writer().await;
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_writer_task(writer, WriterConfig::default(), cancel.clone());

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());

        // Transport closed from our side.
        assert!(matches!(
            peer.recv().await,
            Err(AgentLinkError::ConnectionClosed)
        ));
        assert!(handle.send(Frame::ping()).await.is_err());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (writer, _peer) = memory_writer().await;
        let (handle, task) =
            spawn_writer_task(writer, WriterConfig::default(), CancellationToken::new());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
