//! Gateway wire types.
//!
//! This module defines the frame format of the chat platform's real-time gateway.
//!
//! # Protocol Overview
//!
//! Every frame is a JSON object `{"op": <int>, "d": <payload>, "s": <int|null>, "t": <string|null>}`.
//! `s` and `t` are only meaningful on `DISPATCH` frames. Frames may arrive as text, or as
//! zlib-compressed binary decompressing to the same JSON.
//!
//! ## Connection Flow
//!
//! 1. Client connects to the gateway WebSocket endpoint
//! 2. Gateway sends `HELLO` with the heartbeat interval
//! 3. Client sends `IDENTIFY` (fresh session) or `RESUME` (known session id)
//! 4. Client sends `HEARTBEAT` every interval, gateway replies `HEARTBEAT_ACK`
//! 5. Gateway sends `DISPATCH` events; the `READY` event carries the session id

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Members threshold announced in the identify payload.
pub const LARGE_THRESHOLD: u32 = 250;

/// Gateway operation codes. Values are fixed by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatched by the gateway (inbound).
    Dispatch = 0,
    /// Liveness beat carrying the last sequence (outbound).
    Heartbeat = 1,
    /// Start a new session (outbound).
    Identify = 2,
    /// Presence announcement (outbound).
    StatusUpdate = 3,
    /// Resume a dropped session (outbound).
    Resume = 6,
    /// The session can't be identified or resumed (inbound).
    InvalidSession = 9,
    /// First frame after connecting, carries the heartbeat interval (inbound).
    Hello = 10,
    /// Heartbeat acknowledged (inbound).
    HeartbeatAck = 11,
}

/// Raw opcode value that isn't part of [`OpCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpCode(pub u8);

impl fmt::Display for UnknownOpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown gateway opcode {}", self.0)
    }
}

impl std::error::Error for UnknownOpCode {}

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            3 => Ok(Self::StatusUpdate),
            6 => Ok(Self::Resume),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            other => Err(UnknownOpCode(other)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

impl OpCode {
    /// Whether the client is the one sending this opcode.
    pub const fn is_outbound(self) -> bool {
        matches!(
            self,
            Self::Heartbeat | Self::Identify | Self::StatusUpdate | Self::Resume
        )
    }
}

/// A single gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub op: OpCode,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// Payload of the `HELLO` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Interval between heartbeats, in milliseconds.
    pub heartbeat_interval: u64,
}

/// Payload of the `READY` dispatch event. Only the fields the client uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
}

/// Payload of the `IDENTIFY` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: serde_json::Map<String, Value>,
    pub compress: bool,
    pub large_threshold: u32,
}

/// Payload of the `RESUME` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: Option<u64>,
}

/// Payload of the `STATUS_UPDATE` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub idle_since: Option<u64>,
    pub game: PresenceGame,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceGame {
    pub name: String,
}

impl From<IdentifyPayload> for Value {
    fn from(p: IdentifyPayload) -> Self {
        json!({
            "token": p.token,
            "properties": p.properties,
            "compress": p.compress,
            "large_threshold": p.large_threshold,
        })
    }
}

impl From<ResumePayload> for Value {
    fn from(p: ResumePayload) -> Self {
        json!({
            "token": p.token,
            "session_id": p.session_id,
            "seq": p.seq,
        })
    }
}

impl From<Presence> for Value {
    fn from(p: Presence) -> Self {
        json!({
            "idle_since": p.idle_since,
            "game": { "name": p.game.name },
        })
    }
}

impl Frame {
    fn outbound(op: OpCode, payload: impl Into<Value>) -> Self {
        Self {
            op,
            d: payload.into(),
            s: None,
            t: None,
        }
    }

    /// Identify frame starting a fresh session.
    pub fn identify(token: &str) -> Self {
        Self::outbound(
            OpCode::Identify,
            IdentifyPayload {
                token: token.to_string(),
                properties: serde_json::Map::new(),
                compress: true,
                large_threshold: LARGE_THRESHOLD,
            },
        )
    }

    /// Resume frame replaying events after `seq` for `session_id`.
    pub fn resume(token: &str, session_id: &str, seq: Option<u64>) -> Self {
        Self::outbound(
            OpCode::Resume,
            ResumePayload {
                token: token.to_string(),
                session_id: session_id.to_string(),
                seq,
            },
        )
    }

    /// Heartbeat carrying the last received sequence, `null` before any dispatch.
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            d: seq.map(Value::from).unwrap_or(Value::Null),
            s: None,
            t: None,
        }
    }

    /// Presence update announcing the given game name.
    pub fn status_update(game: &str) -> Self {
        Self::outbound(
            OpCode::StatusUpdate,
            Presence {
                idle_since: None,
                game: PresenceGame {
                    name: game.to_string(),
                },
            },
        )
    }

    /// Lower-cased event name of a dispatch frame.
    pub fn event_name(&self) -> Option<String> {
        self.t.as_deref().map(str::to_lowercase)
    }
}
