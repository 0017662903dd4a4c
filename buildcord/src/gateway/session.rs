//! Per-generation session state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of one gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHello,
    Identifying,
    Resuming,
    Ready,
    Disconnecting,
}

/// Last dispatch sequence number seen on a connection.
///
/// Written by the read loop only, read by the heartbeat task. Never decreases.
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    // 0 encodes "no dispatch yet"; the gateway numbers events from 1.
    pub fn new(initial: Option<u64>) -> Self {
        Self(AtomicU64::new(initial.map_or(0, |s| s.saturating_add(1))))
    }

    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            n => Some(n - 1),
        }
    }

    /// Record `seq`; an older value never overwrites a newer one.
    pub fn observe(&self, seq: u64) {
        self.0.fetch_max(seq.saturating_add(1), Ordering::AcqRel);
    }
}

/// What survives a generation so the next one can resume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
}

/// State of a single connection generation, owned by the read loop.
pub struct Session {
    pub generation: u64,
    pub session_id: Option<String>,
    pub sequence: Arc<Sequence>,
    pub heartbeat_interval: Option<Duration>,
    pub state: ConnectionState,
}

impl Session {
    /// Start generation `generation` from whatever the previous one left behind.
    ///
    /// Without a session id the sequence starts over, as a fresh identify will.
    pub fn new(generation: u64, previous: ResumeState) -> Self {
        let sequence = match previous.session_id {
            Some(_) => previous.sequence,
            None => None,
        };
        Self {
            generation,
            session_id: previous.session_id,
            sequence: Arc::new(Sequence::new(sequence)),
            heartbeat_interval: None,
            state: ConnectionState::Connecting,
        }
    }

    /// Whether the handshake should resume rather than identify.
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// Forget the session so the next handshake identifies from scratch.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.sequence = Arc::new(Sequence::new(None));
    }

    pub fn resume_state(&self) -> ResumeState {
        ResumeState {
            session_id: self.session_id.clone(),
            sequence: self.sequence.get(),
        }
    }
}
