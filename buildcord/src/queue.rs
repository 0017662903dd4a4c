//! FIFO queue of build notifications between the webhook ingress and the gateway consumer.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, Mutex};

use buildcord_common::BuildNotification;

/// Multi-producer FIFO queue; each item is handed out exactly once.
///
/// The receiving half sits behind a mutex so that consumers of successive
/// gateway generations can take turns draining it.
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<BuildNotification>,
    rx: Mutex<mpsc::UnboundedReceiver<BuildNotification>>,
    pending: AtomicUsize,
}

impl NotificationQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Enqueue a notification.
    pub fn push(&self, notification: BuildNotification) {
        // Counted before sending so a concurrent pop never sees it below zero.
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(notification).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Wait for the next notification.
    ///
    /// Cancel-safe: dropping the future before it resolves never loses an item.
    /// Returns `None` only if the queue is closed.
    pub async fn pop(&self) -> Option<BuildNotification> {
        let mut rx = self.rx.lock().await;
        let notification = rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(notification)
    }

    /// Number of notifications waiting.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}
