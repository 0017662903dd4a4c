//! Periodic heartbeats keeping the gateway connection alive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use buildcord_common::Frame;

use super::session::Sequence;

/// Sends `HEARTBEAT` frames carrying the last sequence, one per interval.
pub struct HeartbeatMonitor {
    generation: u64,
    interval: Duration,
    sequence: Arc<Sequence>,
    outbound: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
}

impl HeartbeatMonitor {
    pub fn new(
        generation: u64,
        interval: Duration,
        sequence: Arc<Sequence>,
        outbound: mpsc::Sender<Frame>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            generation,
            interval,
            sequence,
            outbound,
            shutdown,
        }
    }

    /// Run until the generation shuts down or its connection goes away.
    pub async fn run(self) {
        tracing::debug!(
            generation = self.generation,
            interval_ms = self.interval.as_millis() as u64,
            "Heartbeat started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            // Shutdown may have been raised while the timer fired.
            if self.shutdown.is_cancelled() {
                break;
            }

            let seq = self.sequence.get();
            if self.outbound.send(Frame::heartbeat(seq)).await.is_err() {
                tracing::debug!(generation = self.generation, "Connection gone, heartbeat stopping");
                break;
            }
            tracing::trace!(generation = self.generation, ?seq, "Heartbeat sent");
        }

        tracing::debug!(generation = self.generation, "Heartbeat stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildcord_common::OpCode;

    #[tokio::test]
    async fn test_heartbeats_per_interval() {
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let sequence = Arc::new(Sequence::new(None));
        sequence.observe(9);

        let monitor = HeartbeatMonitor::new(
            1,
            Duration::from_millis(100),
            sequence,
            tx,
            shutdown.clone(),
        );
        let handle = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let mut beats = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            beats.push(frame);
        }
        assert!((2..=3).contains(&beats.len()), "got {} heartbeats", beats.len());
        for beat in beats {
            assert_eq!(beat.op, OpCode::Heartbeat);
            assert_eq!(beat.d, serde_json::json!(9));
        }
    }

    #[tokio::test]
    async fn test_no_heartbeat_after_shutdown() {
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let monitor = HeartbeatMonitor::new(
            1,
            Duration::from_millis(50),
            Arc::new(Sequence::new(None)),
            tx,
            shutdown.clone(),
        );
        let handle = tokio::spawn(monitor.run());

        shutdown.cancel();
        // Raising it again is a no-op.
        shutdown.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_before_any_dispatch_is_null() {
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let monitor = HeartbeatMonitor::new(
            1,
            Duration::from_millis(20),
            Arc::new(Sequence::new(None)),
            tx,
            shutdown.clone(),
        );
        let handle = tokio::spawn(monitor.run());

        let beat = rx.recv().await.unwrap();
        shutdown.cancel();
        handle.await.unwrap();

        assert!(beat.d.is_null());
    }
}
