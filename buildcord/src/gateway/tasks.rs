//! Background tasks owned by one connection generation.

use std::time::Duration;

use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};

/// Heartbeat, consumer and fire-and-forget tasks of a generation.
///
/// Teardown waits for each of them; nothing spawned here outlives its generation.
pub struct GenerationTasks {
    generation: u64,
    heartbeat: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<JoinSet<()>>>,
    in_flight: JoinSet<()>,
}

impl GenerationTasks {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            heartbeat: None,
            consumer: None,
            in_flight: JoinSet::new(),
        }
    }

    /// Whether heartbeat and consumer are already running.
    pub fn started(&self) -> bool {
        self.heartbeat.is_some() || self.consumer.is_some()
    }

    pub fn start(&mut self, heartbeat: JoinHandle<()>, consumer: JoinHandle<JoinSet<()>>) {
        self.heartbeat = Some(heartbeat);
        self.consumer = Some(consumer);
    }

    /// Spawn a short-lived task tracked until teardown.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.in_flight.spawn(task);
    }

    /// Collect tasks that already finished.
    pub fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            log_join(self.generation, result);
        }
    }

    /// Wait for heartbeat and consumer to observe shutdown, then drain in-flight sends.
    ///
    /// The shutdown signal must already be raised.
    pub async fn teardown(mut self, drain_timeout: Duration) {
        if let Some(heartbeat) = self.heartbeat.take() {
            if let Err(e) = heartbeat.await {
                log_join(self.generation, Err(e));
            }
        }

        let deadline = Instant::now() + drain_timeout;
        if let Some(consumer) = self.consumer.take() {
            match consumer.await {
                Ok(sends) => drain(self.generation, sends, deadline).await,
                Err(e) => log_join(self.generation, Err(e)),
            }
        }
        drain(self.generation, self.in_flight, deadline).await;

        tracing::debug!(generation = self.generation, "Generation tasks drained");
    }
}

/// Join every task in `set`, cancelling whatever is left at `deadline`.
pub async fn drain(generation: u64, mut set: JoinSet<()>, deadline: Instant) {
    loop {
        match timeout_at(deadline, set.join_next()).await {
            Ok(Some(result)) => log_join(generation, result),
            Ok(None) => return,
            Err(_) => break,
        }
    }

    tracing::warn!(
        generation,
        remaining = set.len(),
        "In-flight tasks didn't finish in time, cancelling"
    );
    set.abort_all();
    while let Some(result) = set.join_next().await {
        log_join(generation, result);
    }
}

/// Log the outcome of a finished task. Cancellation is expected during teardown.
pub fn log_join(generation: u64, result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            tracing::debug!(generation, "Task cancelled");
        }
        Err(e) => {
            tracing::error!(generation, "Task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_teardown_waits_for_in_flight() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut tasks = GenerationTasks::new(1);
        let flag = finished.clone();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tasks.teardown(Duration::from_secs(5)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_teardown_cancels_stragglers() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut tasks = GenerationTasks::new(1);
        let flag = finished.clone();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        tasks.teardown(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_teardown_collects_consumer_sends() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let consumer = tokio::spawn(async move {
            let mut sends = JoinSet::new();
            sends.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
            });
            sends
        });
        let heartbeat = tokio::spawn(async {});

        let mut tasks = GenerationTasks::new(1);
        tasks.start(heartbeat, consumer);
        assert!(tasks.started());
        tasks.teardown(Duration::from_secs(5)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
