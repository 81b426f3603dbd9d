//! Application events
//!
//! Everything the device layer reports to its collaborators (patch bank,
//! console, monitor) travels as an `AppEvent` over one unbounded channel.

use tokio::sync::mpsc;

use crate::midi::MidiEvent;
use crate::protocol::FmPatch;
use crate::session::ConnectionState;

/// Sender half handed to the session, the router and the input manager
pub type EventSender = mpsc::UnboundedSender<AppEvent>;

/// Receiver half consumed by the application loop
pub type EventReceiver = mpsc::UnboundedReceiver<AppEvent>;

/// Create the application event channel
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    // Device session
    ConnectionStateChanged(ConnectionState),
    Connected { port: String },
    Disconnected,
    ConnectionError(String),
    /// Serial byte outside any SysEx frame
    SerialByte(u8),
    PatchReceived { slot: u8, patch: FmPatch },
    IdentityReceived { mode: u8, version: u8 },

    // MIDI input
    Midi(MidiEvent),
    PortsChanged(Vec<String>),
    InputOpened(String),
    InputClosed,
    VirtualPortCreated(String),
    VirtualPortDestroyed,
}

impl AppEvent {
    /// Short tag for logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppEvent::ConnectionStateChanged(_) => "state",
            AppEvent::Connected { .. } => "connected",
            AppEvent::Disconnected => "disconnected",
            AppEvent::ConnectionError(_) => "error",
            AppEvent::SerialByte(_) => "serial-byte",
            AppEvent::PatchReceived { .. } => "patch",
            AppEvent::IdentityReceived { .. } => "identity",
            AppEvent::Midi(_) => "midi",
            AppEvent::PortsChanged(_) => "ports",
            AppEvent::InputOpened(_) => "input-opened",
            AppEvent::InputClosed => "input-closed",
            AppEvent::VirtualPortCreated(_) => "virtual-created",
            AppEvent::VirtualPortDestroyed => "virtual-destroyed",
        }
    }
}
