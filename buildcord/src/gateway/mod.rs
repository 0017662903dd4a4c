//! Gateway client for the chat platform's real-time connection.
//!
//! This module handles the WebSocket connection to the gateway, including the
//! HELLO/IDENTIFY/RESUME handshake, heartbeats, dispatch routing and the consumer
//! relaying queued build notifications.

mod client;
pub mod codec;
mod consumer;
pub mod handlers;
mod heartbeat;
mod router;
mod session;
mod tasks;

pub use client::GatewayClient;
pub use consumer::{deliver, NotificationConsumer};
pub use heartbeat::HeartbeatMonitor;
pub use router::{DispatchContext, DispatchRouter, EventHandler, HANDLER_PREFIX};
pub use session::{ConnectionState, ResumeState, Sequence, Session};
pub use tasks::GenerationTasks;
