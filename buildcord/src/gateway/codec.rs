//! Conversion between WebSocket messages and gateway frames.

use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use buildcord_common::{Frame, OpCode};

use crate::error::{Error, Result};

/// What a single WebSocket message turned out to be.
#[derive(Debug)]
pub enum Inbound {
    /// A frame with a known opcode.
    Frame(Frame),
    /// Well-formed frame whose opcode isn't part of the protocol.
    UnknownOp { op: i64, payload: Value },
    /// Transport-level keepalive, answered by tungstenite itself.
    Control,
    /// The gateway closed the connection.
    Close,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    op: i64,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Decode a WebSocket message. Binary messages are zlib-compressed JSON.
pub fn decode(message: Message) -> Result<Inbound> {
    let raw: RawFrame = match message {
        Message::Text(text) => serde_json::from_str(&text)?,
        Message::Binary(bytes) => serde_json::from_slice(&inflate(&bytes)?)?,
        Message::Ping(_) | Message::Pong(_) => return Ok(Inbound::Control),
        Message::Close(_) => return Ok(Inbound::Close),
        Message::Frame(_) => return Err(Error::Decode("raw frame".to_string())),
    };

    let known = u8::try_from(raw.op)
        .ok()
        .and_then(|op| OpCode::try_from(op).ok());
    match known {
        Some(op) => Ok(Inbound::Frame(Frame {
            op,
            d: raw.d,
            s: raw.s,
            t: raw.t,
        })),
        None => Ok(Inbound::UnknownOp {
            op: raw.op,
            payload: raw.d,
        }),
    }
}

/// Encode an outbound frame as a text message.
pub fn encode(frame: &Frame) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(frame)?))
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Decode(format!("zlib: {}", e)))?;
    Ok(out)
}
