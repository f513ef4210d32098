//! Heartbeat task - periodic `ping` frames while a link is up.
//!
//! The first ping goes out one interval after start. A failed send ends the
//! task; the inbound router reports the loss on its own.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::protocol::Frame;
use crate::writer::WriterHandle;

/// Spawn the heartbeat task for a link.
pub(crate) fn spawn_heartbeat(
    writer: WriterHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = writer.send(Frame::ping()).await {
                tracing::debug!(error = %e, "heartbeat stopping after failed ping");
                break;
            }
            tracing::trace!("heartbeat ping sent");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameType;
    use crate::transport::memory::{MemoryDialer, MemoryPeer};
    use crate::transport::Dialer;
    use crate::writer::{spawn_writer_task, WriterConfig};

    async fn link(cancel: &CancellationToken) -> (WriterHandle, MemoryPeer) {
        let (dialer, mut listener) = MemoryDialer::new();
        let url = url::Url::parse("ws://memory/").unwrap();
        let halves = dialer.dial(&url).await.unwrap();
        let peer = listener.accept().await.unwrap();
        let (writer, _task) = spawn_writer_task(halves.writer, WriterConfig::default(), cancel.clone());
        (writer, peer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_ping_after_one_interval() {
        let cancel = CancellationToken::new();
        let (writer, mut peer) = link(&cancel).await;
        let _task = spawn_heartbeat(writer, Duration::from_secs(30), cancel.clone());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(peer.try_recv().is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let ping = peer.try_recv().unwrap().unwrap();
        assert_eq!(ping.frame_type, FrameType::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_at_interval() {
        let cancel = CancellationToken::new();
        let (writer, mut peer) = link(&cancel).await;
        let _task = spawn_heartbeat(writer, Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_millis(15_500)).await;

        let mut pings = 0;
        while let Some(frame) = peer.try_recv() {
            assert_eq!(frame.unwrap().frame_type, FrameType::Ping);
            pings += 1;
        }
        assert_eq!(pings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_heartbeat() {
        let cancel = CancellationToken::new();
        let (writer, _peer) = link(&cancel).await;
        let task = spawn_heartbeat(writer, Duration::from_secs(5), cancel.clone());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_stops_heartbeat() {
        let cancel = CancellationToken::new();
        let (writer, peer) = link(&cancel).await;
        drop(peer);

        let task = spawn_heartbeat(writer, Duration::from_secs(5), CancellationToken::new());
        task.await.unwrap();
    }
}
