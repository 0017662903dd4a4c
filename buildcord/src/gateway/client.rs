//! WebSocket client for the chat platform's gateway.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use buildcord_common::{Frame, HelloPayload, OpCode, ReadyPayload};

use crate::config::{DiscordConfig, GatewayConfig, InvalidSessionPolicy};
use crate::error::Result;
use crate::queue::NotificationQueue;
use crate::rest::DirectoryApi;

use super::codec::{self, Inbound};
use super::consumer::NotificationConsumer;
use super::heartbeat::HeartbeatMonitor;
use super::router::{DispatchContext, DispatchRouter};
use super::session::{ConnectionState, ResumeState, Session};
use super::tasks::GenerationTasks;

/// Whether the read loop keeps going after a frame.
enum Flow {
    Continue,
    /// End this generation; the outer loop reconnects.
    Reconnect,
}

/// Gateway WebSocket client.
///
/// Handles the connection lifecycle: handshake, heartbeats, dispatch routing,
/// draining the notification queue, and reconnection. Each connection attempt is a
/// generation with its own [`Session`], shutdown token and background tasks.
pub struct GatewayClient {
    url: String,
    config: GatewayConfig,
    token: String,
    channel_id: String,
    presence_name: String,
    directory: Arc<dyn DirectoryApi>,
    queue: Arc<NotificationQueue>,
    router: Arc<DispatchRouter>,
    state: watch::Sender<ConnectionState>,
}

impl GatewayClient {
    pub fn new(
        url: String,
        config: GatewayConfig,
        discord: &DiscordConfig,
        directory: Arc<dyn DirectoryApi>,
        queue: Arc<NotificationQueue>,
        router: DispatchRouter,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url,
            config,
            token: discord.token.clone(),
            channel_id: discord.channel_id.clone(),
            presence_name: discord.presence_name.clone(),
            directory,
            queue,
            router: Arc::new(router),
            state,
        }
    }

    /// Observe connection state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run generations back to back until `stop` is cancelled.
    pub async fn run(&self, stop: CancellationToken) {
        let mut resume = ResumeState::default();
        let mut generation = 0;

        while !stop.is_cancelled() {
            generation += 1;
            let mut session = Session::new(generation, resume);
            tracing::info!(generation, "Connecting to gateway at {}", self.url);

            match self.connect_and_run(&mut session, &stop).await {
                Ok(()) => {
                    tracing::info!(generation, "Gateway connection closed");
                }
                Err(e) => {
                    tracing::error!(generation, "Gateway connection error: {}", e);
                }
            }

            resume = session.resume_state();
            self.transition(&mut session, ConnectionState::Disconnected);

            if stop.is_cancelled() {
                break;
            }
            if self.config.reconnect_delay_ms > 0 {
                tracing::info!("Reconnecting in {} ms...", self.config.reconnect_delay_ms);
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms)) => {}
                }
            }
        }

        tracing::info!("Gateway client stopped");
    }

    /// Connect, run the read loop, then tear the generation down.
    async fn connect_and_run(&self, session: &mut Session, stop: &CancellationToken) -> Result<()> {
        self.transition(session, ConnectionState::Connecting);
        let url = self.config.connect_url(&self.url)?;
        let (ws_stream, _) = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            connected = connect_async(url.as_str()) => connected?,
        };
        let (mut write, mut read) = ws_stream.split();
        self.transition(session, ConnectionState::AwaitingHello);

        // Cancelled at teardown, or with everything else when the client stops.
        let shutdown = stop.child_token();
        let (tx, mut rx) = mpsc::channel::<Frame>(32);
        let mut tasks = GenerationTasks::new(session.generation);

        let result = self
            .message_loop(session, &mut write, &mut read, &mut rx, &tx, &shutdown, &mut tasks)
            .await;

        self.transition(session, ConnectionState::Disconnecting);
        shutdown.cancel();
        drop(tx);
        tasks
            .teardown(Duration::from_millis(self.config.drain_timeout_ms))
            .await;
        if let Err(e) = write.close().await {
            tracing::debug!(generation = session.generation, "Close after teardown failed: {}", e);
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn message_loop<S, R>(
        &self,
        session: &mut Session,
        write: &mut S,
        read: &mut R,
        rx: &mut mpsc::Receiver<Frame>,
        tx: &mpsc::Sender<Frame>,
        shutdown: &CancellationToken,
        tasks: &mut GenerationTasks,
    ) -> Result<()>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
        R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        let generation = session.generation;
        loop {
            tasks.reap();

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    return Ok(());
                }

                // Frames queued by the heartbeat and dispatch tasks
                Some(frame) = rx.recv() => {
                    write.send(codec::encode(&frame)?).await?;
                    tracing::trace!(generation, op = ?frame.op, "Sent frame");
                }

                next = read.next() => {
                    let message = match next {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    };
                    match codec::decode(message) {
                        Ok(Inbound::Frame(frame)) => {
                            match self.handle_frame(session, frame, write, tx, shutdown, tasks).await? {
                                Flow::Continue => {}
                                Flow::Reconnect => return Ok(()),
                            }
                        }
                        Ok(Inbound::UnknownOp { op, payload }) => {
                            tracing::warn!(generation, op, "Ignoring unknown opcode: {}", payload);
                        }
                        Ok(Inbound::Control) => {}
                        Ok(Inbound::Close) => {
                            tracing::info!(generation, "Gateway sent close frame");
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::warn!(generation, "Closing on malformed frame: {}", e);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame<S>(
        &self,
        session: &mut Session,
        frame: Frame,
        write: &mut S,
        tx: &mpsc::Sender<Frame>,
        shutdown: &CancellationToken,
        tasks: &mut GenerationTasks,
    ) -> Result<Flow>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let generation = session.generation;

        match frame.op {
            OpCode::Hello => {
                if tasks.started() {
                    tracing::warn!(generation, "Ignoring repeated HELLO");
                    return Ok(Flow::Continue);
                }
                let hello: HelloPayload = serde_json::from_value(frame.d)?;
                let interval = Duration::from_millis(hello.heartbeat_interval);
                session.heartbeat_interval = Some(interval);

                let handshake = match session.session_id.clone() {
                    Some(session_id) => {
                        let seq = session.sequence.get();
                        tracing::info!(generation, session_id = %session_id, ?seq, "Resuming session");
                        self.transition(session, ConnectionState::Resuming);
                        Frame::resume(&self.token, &session_id, seq)
                    }
                    None => {
                        tracing::info!(generation, "Identifying");
                        self.transition(session, ConnectionState::Identifying);
                        Frame::identify(&self.token)
                    }
                };
                write.send(codec::encode(&handshake)?).await?;

                self.start_background(session, interval, tx, shutdown, tasks);
            }

            OpCode::HeartbeatAck => {
                tracing::trace!(generation, "Heartbeat acknowledged");
            }

            OpCode::InvalidSession => match self.config.invalid_session {
                InvalidSessionPolicy::Keep => {
                    tracing::warn!(generation, payload = %frame.d, "Invalid session, keeping it");
                }
                InvalidSessionPolicy::Reidentify => {
                    tracing::warn!(generation, payload = %frame.d, "Invalid session, reconnecting to identify");
                    session.reset();
                    return Ok(Flow::Reconnect);
                }
            },

            OpCode::Dispatch => {
                // Sequence first: nothing below may observe a stale value.
                if let Some(seq) = frame.s {
                    session.sequence.observe(seq);
                }
                let event = frame.event_name().unwrap_or_default();

                match event.as_str() {
                    "ready" => match serde_json::from_value::<ReadyPayload>(frame.d.clone()) {
                        Ok(ready) => {
                            tracing::info!(generation, session_id = %ready.session_id, "Session ready");
                            session.session_id = Some(ready.session_id);
                            self.transition(session, ConnectionState::Ready);

                            let tx = tx.clone();
                            let presence = Frame::status_update(&self.presence_name);
                            tasks.spawn(async move {
                                if tx.send(presence).await.is_err() {
                                    tracing::debug!(generation, "Status update dropped, connection closing");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(generation, payload = %frame.d, "Unreadable READY payload: {}", e);
                        }
                    },
                    "resumed" => {
                        tracing::info!(generation, "Session resumed");
                        self.transition(session, ConnectionState::Ready);
                    }
                    _ => {}
                }

                match self.router.get(&event) {
                    Some(handler) => {
                        let ctx = DispatchContext {
                            generation,
                            directory: self.directory.clone(),
                            channel_id: self.channel_id.clone(),
                        };
                        tasks.spawn(async move { handler.handle(ctx, frame.d).await });
                    }
                    None => {
                        tracing::info!(
                            generation,
                            event = %event,
                            seq = ?frame.s,
                            payload = %frame.d,
                            "Unhandled dispatch event"
                        );
                    }
                }
            }

            other => {
                tracing::debug!(generation, op = ?other, payload = %frame.d, "Ignoring frame");
            }
        }

        Ok(Flow::Continue)
    }

    /// Spawn the heartbeat and the consumer bound to this generation.
    fn start_background(
        &self,
        session: &Session,
        interval: Duration,
        tx: &mpsc::Sender<Frame>,
        shutdown: &CancellationToken,
        tasks: &mut GenerationTasks,
    ) {
        let heartbeat = HeartbeatMonitor::new(
            session.generation,
            interval,
            session.sequence.clone(),
            tx.clone(),
            shutdown.clone(),
        );
        let consumer = NotificationConsumer::new(
            session.generation,
            self.queue.clone(),
            self.directory.clone(),
            self.channel_id.clone(),
            self.config.send_retries,
            shutdown.clone(),
        );
        tasks.start(tokio::spawn(heartbeat.run()), tokio::spawn(consumer.run()));
    }

    fn transition(&self, session: &mut Session, state: ConnectionState) {
        tracing::debug!(
            generation = session.generation,
            from = ?session.state,
            to = ?state,
            "Connection state"
        );
        session.state = state;
        self.state.send_replace(state);
    }
}
