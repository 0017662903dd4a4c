//! Drains queued build notifications into channel messages.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use buildcord_common::MessageBody;

use crate::queue::NotificationQueue;
use crate::rest::DirectoryApi;

use super::tasks::log_join;

/// Turns each dequeued [`BuildNotification`](buildcord_common::BuildNotification)
/// into exactly one outbound message.
pub struct NotificationConsumer {
    generation: u64,
    queue: Arc<NotificationQueue>,
    directory: Arc<dyn DirectoryApi>,
    channel_id: String,
    send_retries: u32,
    shutdown: CancellationToken,
    sends: JoinSet<()>,
}

impl NotificationConsumer {
    pub fn new(
        generation: u64,
        queue: Arc<NotificationQueue>,
        directory: Arc<dyn DirectoryApi>,
        channel_id: String,
        send_retries: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            generation,
            queue,
            directory,
            channel_id,
            send_retries,
            shutdown,
            sends: JoinSet::new(),
        }
    }

    /// Run until shutdown. Returns the sends still in flight so the caller can drain them.
    pub async fn run(mut self) -> JoinSet<()> {
        tracing::debug!(generation = self.generation, "Consumer started");

        loop {
            while let Some(result) = self.sends.try_join_next() {
                log_join(self.generation, result);
            }

            let notification = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.queue.pop() => next,
            };
            let Some(notification) = notification else {
                tracing::warn!(generation = self.generation, "Notification queue closed");
                break;
            };

            tracing::info!(
                generation = self.generation,
                repository = %notification.repository_name,
                status = %notification.status_message,
                "Relaying build notification"
            );
            let body = MessageBody::Embed(notification.to_embed());
            self.sends.spawn(deliver(
                self.generation,
                self.directory.clone(),
                self.channel_id.clone(),
                body,
                self.send_retries,
            ));
        }

        tracing::debug!(
            generation = self.generation,
            in_flight = self.sends.len(),
            "Consumer stopped"
        );
        self.sends
    }
}

/// Post one message, retrying up to `retries` more times. Failures are logged, never raised.
pub async fn deliver(
    generation: u64,
    directory: Arc<dyn DirectoryApi>,
    channel_id: String,
    body: MessageBody,
    retries: u32,
) {
    let mut attempt = 0;
    loop {
        match directory.send_message(&channel_id, &body).await {
            Ok(()) => return,
            Err(e) if attempt < retries => {
                attempt += 1;
                tracing::warn!(generation, attempt, "Send failed, retrying: {}", e);
            }
            Err(e) => {
                tracing::error!(generation, channel_id = %channel_id, "Failed to send message: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use buildcord_common::BuildNotification;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    use crate::error::{Error, Result};

    #[derive(Default)]
    struct RecordingDirectory {
        sent: Mutex<Vec<(String, MessageBody)>>,
    }

    #[async_trait]
    impl DirectoryApi for RecordingDirectory {
        async fn send_message(&self, channel_id: &str, body: &MessageBody) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((channel_id.to_string(), body.clone()));
            Ok(())
        }
    }

    struct FailingDirectory {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DirectoryApi for FailingDirectory {
        async fn send_message(&self, _channel_id: &str, _body: &MessageBody) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api {
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    fn notification(n: usize) -> BuildNotification {
        BuildNotification {
            repository_name: format!("repo{}", n),
            owner_name: "me".to_string(),
            status_message: "passed".to_string(),
            author_name: "A".to_string(),
            build_type: "push".to_string(),
            compare_url: format!("c{}", n),
            build_url: format!("b{}", n),
        }
    }

    async fn drain(mut sends: JoinSet<()>) {
        while let Some(result) = sends.join_next().await {
            log_join(1, result);
        }
    }

    #[tokio::test]
    async fn test_each_notification_sent_once_in_order() {
        let queue = Arc::new(NotificationQueue::new());
        for n in 0..5 {
            queue.push(notification(n));
        }
        let directory = Arc::new(RecordingDirectory::default());
        let shutdown = CancellationToken::new();
        let consumer = NotificationConsumer::new(
            1,
            queue.clone(),
            directory.clone(),
            "chan".to_string(),
            0,
            shutdown.clone(),
        );
        let handle = tokio::spawn(consumer.run());

        while !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        drain(handle.await.unwrap()).await;

        let sent = directory.sent.lock().await;
        assert_eq!(sent.len(), 5);
        for (n, (channel, body)) in sent.iter().enumerate() {
            assert_eq!(channel, "chan");
            match body {
                MessageBody::Embed(embed) => {
                    assert_eq!(embed.title, format!("me/repo{} passed", n));
                    assert_eq!(embed.description, format!("A push <c{}>", n));
                    assert_eq!(embed.url, format!("b{}", n));
                }
                other => panic!("Expected embed, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_leaves_queue_untouched() {
        let queue = Arc::new(NotificationQueue::new());
        let directory = Arc::new(RecordingDirectory::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        queue.push(notification(0));
        let consumer = NotificationConsumer::new(
            1,
            queue.clone(),
            directory.clone(),
            "chan".to_string(),
            0,
            shutdown,
        );
        drain(consumer.run().await).await;

        assert!(directory.sent.lock().await.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_is_retried_then_logged() {
        let directory = Arc::new(FailingDirectory {
            calls: AtomicU32::new(0),
        });
        deliver(
            1,
            directory.clone(),
            "chan".to_string(),
            MessageBody::Content("hi".to_string()),
            2,
        )
        .await;
        assert_eq!(directory.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_send_does_not_stop_consumer() {
        let queue = Arc::new(NotificationQueue::new());
        queue.push(notification(0));
        queue.push(notification(1));
        let directory = Arc::new(FailingDirectory {
            calls: AtomicU32::new(0),
        });
        let shutdown = CancellationToken::new();
        let consumer = NotificationConsumer::new(
            1,
            queue.clone(),
            directory.clone(),
            "chan".to_string(),
            0,
            shutdown.clone(),
        );
        let handle = tokio::spawn(consumer.run());

        while !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        drain(handle.await.unwrap()).await;

        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }
}
