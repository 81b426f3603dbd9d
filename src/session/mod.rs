//! Device session - owns the serial link to the synth
//!
//! A single actor task owns the transport, the frame decoder and the
//! connection state. Everything else talks to it through a cloneable
//! `SessionHandle`; sends are fire-and-forget so MIDI callbacks never block.

mod actor;
mod commands;
mod handle;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::serial::{DetectRules, LineSettings, TransportError};

pub use actor::SessionActor;
pub use handle::SessionHandle;

/// Default period between two auto-detect scans
pub const DEFAULT_AUTO_DETECT_INTERVAL: Duration = Duration::from_millis(2000);

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("session actor is not running")]
    ActorStopped,
}

/// Startup parameters of the session actor
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub line: LineSettings,
    pub auto_detect_interval: Duration,
    pub detect_rules: DetectRules,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            line: LineSettings::default(),
            auto_detect_interval: DEFAULT_AUTO_DETECT_INTERVAL,
            detect_rules: DetectRules::default(),
        }
    }
}

/// Traffic counters, updated by the actor and read lock-free by handles
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_received: AtomicU64,
    frames_discarded: AtomicU64,
    responses_dispatched: AtomicU64,
    unknown_opcodes: AtomicU64,
    raw_bytes: AtomicU64,
    bytes_written: AtomicU64,
}

/// Point-in-time copy of `SessionStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub responses_dispatched: u64,
    pub unknown_opcodes: u64,
    pub raw_bytes: u64,
    pub bytes_written: u64,
}

impl SessionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            responses_dispatched: self.responses_dispatched.load(Ordering::Relaxed),
            unknown_opcodes: self.unknown_opcodes.load(Ordering::Relaxed),
            raw_bytes: self.raw_bytes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}
