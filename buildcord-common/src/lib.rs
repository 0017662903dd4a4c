//! buildcord common types
//!
//! Shared types used by the gateway client, the webhook ingress and the REST client.

pub mod notification;
pub mod protocol;

pub use notification::{BuildNotification, Embed, MessageBody, TravisPayload, TravisRepository};
pub use protocol::{
    Frame, HelloPayload, IdentifyPayload, OpCode, Presence, PresenceGame, ReadyPayload,
    ResumePayload, UnknownOpCode, LARGE_THRESHOLD,
};
