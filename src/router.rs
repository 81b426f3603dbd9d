//! Router - bridges MIDI input to the device session
//!
//! Every inbound message is decoded for listeners and, when forwarding is on
//! and the device is connected, written unchanged to the serial link.
//! `on_midi_input` runs on the MIDI delivery thread: it only decodes, reads
//! atomics and pushes onto unbounded channels.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::events::{AppEvent, EventSender};
use crate::input::InputHandler;
use crate::midi::{format_hex, MidiEvent};
use crate::session::SessionHandle;

/// Message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub received: u64,
    pub forwarded: u64,
}

pub struct Router {
    session: SessionHandle,
    events: EventSender,
    forwarding: AtomicBool,
    received: AtomicU64,
    forwarded: AtomicU64,
}

impl Router {
    /// Forwarding starts enabled
    pub fn new(session: SessionHandle, events: EventSender) -> Self {
        Self {
            session,
            events,
            forwarding: AtomicBool::new(true),
            received: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
        }
    }

    /// Handler to install on a MIDI input backend
    pub fn input_handler(self: &Arc<Self>) -> InputHandler {
        let router = Arc::clone(self);
        Arc::new(move |bytes: &[u8]| router.on_midi_input(bytes))
    }

    /// Process one complete raw MIDI message
    pub fn on_midi_input(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.received.fetch_add(1, Ordering::Relaxed);

        match MidiEvent::decode(bytes) {
            Some(event) => {
                trace!("MIDI {}", event);
                let _ = self.events.send(AppEvent::Midi(event));
            }
            None => trace!("Undecoded MIDI {}", format_hex(bytes)),
        }

        if self.is_forwarding_enabled() && self.session.is_connected() {
            self.session.send_raw(bytes);
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_forwarding_enabled(&self, enabled: bool) {
        let previous = self.forwarding.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            debug!(
                "MIDI forwarding {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    pub fn is_forwarding_enabled(&self) -> bool {
        self.forwarding.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests;
