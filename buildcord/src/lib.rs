//! buildcord - relays CI build notifications into a chat channel.
//!
//! The webhook [`ingress`] enqueues build notifications, the [`gateway`] client keeps
//! a live session with the chat platform and drains the queue through the [`rest`] API.

pub mod config;
pub mod error;
pub mod gateway;
pub mod ingress;
pub mod queue;
pub mod rest;
pub mod travis;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{DispatchRouter, GatewayClient};
pub use queue::NotificationQueue;
pub use rest::{DirectoryApi, RestClient};
