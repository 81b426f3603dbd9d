//! SessionHandle - public API of the device session
//!
//! Fire-and-forget methods for everything on the MIDI hot path, async
//! methods with oneshot replies for lifecycle operations. Connection status
//! and counters are read directly from shared memory.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use super::actor::{LinkStatus, SessionActor};
use super::commands::SessionCommand;
use super::{ConnectionState, SessionConfig, SessionError, SessionStats, StatsSnapshot};
use crate::events::EventSender;
use crate::midi::MidiEvent;
use crate::protocol::{Command, FmPatch, PsgEnvelope, SynthMode};
use crate::serial::{DetectRules, PortDescriptor, SerialConnector};

/// Cloneable handle to the session actor
///
/// # Hot Path Methods (fire-and-forget)
/// - `send_raw` / `send_midi` - forward performance data
/// - `send_command` and the typed helpers (`ping`, `load_patch_to_channel`, ...)
///
/// # Lifecycle Methods (async with response)
/// - `connect` / `disconnect`
/// - `available_ports`
/// - `shutdown`
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    status: Arc<RwLock<LinkStatus>>,
    stats: Arc<SessionStats>,
}

impl SessionHandle {
    pub(super) fn new(
        cmd_tx: mpsc::UnboundedSender<SessionCommand>,
        status: Arc<RwLock<LinkStatus>>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            cmd_tx,
            status,
            stats,
        }
    }

    /// Convenience wrapper around `SessionActor::spawn`
    pub fn spawn(
        connector: Arc<dyn SerialConnector>,
        config: SessionConfig,
        events: EventSender,
    ) -> Self {
        SessionActor::spawn(connector, config, events)
    }

    // =========================================================================
    // Hot path methods (fire-and-forget, no await)
    // =========================================================================

    /// Write bytes unchanged. Dropped when not connected.
    pub fn send_raw(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.cmd_tx.send(SessionCommand::SendRaw(bytes.into()));
    }

    pub fn send_midi(&self, event: &MidiEvent) {
        self.send_raw(event.encode());
    }

    /// Encode and write a command; out-of-range commands are refused
    pub fn send_command(&self, command: Command) {
        let _ = self.cmd_tx.send(SessionCommand::SendCommand(command));
    }

    pub fn ping(&self) {
        self.send_command(Command::Ping);
    }

    pub fn load_patch_to_channel(&self, channel: u8, patch: &FmPatch) {
        self.send_command(Command::LoadPatchToChannel {
            channel,
            patch: patch.clone(),
        });
    }

    pub fn store_patch_to_slot(&self, slot: u8, patch: &FmPatch) {
        self.send_command(Command::StorePatchToSlot {
            slot,
            patch: patch.clone(),
        });
    }

    pub fn load_psg_envelope(&self, channel: u8, envelope: &PsgEnvelope) {
        self.send_command(Command::LoadPsgEnvelope {
            channel,
            envelope: envelope.clone(),
        });
    }

    pub fn recall_patch(&self, channel: u8, slot: u8) {
        self.send_command(Command::RecallToChannel { channel, slot });
    }

    pub fn request_patch_dump(&self, slot: u8) {
        self.send_command(Command::RequestPatchDump { slot });
    }

    pub fn request_all_patches(&self) {
        self.send_command(Command::RequestAllPatches);
    }

    pub fn set_mode(&self, mode: SynthMode) {
        self.send_command(Command::SetMode(mode));
    }

    // =========================================================================
    // Auto-detect
    // =========================================================================

    pub fn start_auto_detect(&self) {
        let _ = self.cmd_tx.send(SessionCommand::StartAutoDetect);
    }

    pub fn stop_auto_detect(&self) {
        let _ = self.cmd_tx.send(SessionCommand::StopAutoDetect);
    }

    /// Replace the detection table (config hot reload)
    pub fn set_detect_rules(&self, rules: DetectRules) {
        let _ = self.cmd_tx.send(SessionCommand::SetDetectRules(rules));
    }

    // =========================================================================
    // Lifecycle methods (async with response)
    // =========================================================================

    /// Open a port. Accepts display names such as `"COM3 - Arduino Uno"`.
    pub async fn connect(&self, port: impl Into<String>) -> Result<(), SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SessionCommand::Connect {
            port: port.into(),
            response: response_tx,
        };

        self.cmd_tx
            .send(cmd)
            .map_err(|_| SessionError::ActorStopped)?;

        response_rx.await.map_err(|_| SessionError::ActorStopped)?
    }

    /// Close the link and stop auto-detect
    pub async fn disconnect(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SessionCommand::Disconnect {
                response: response_tx,
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    /// Serial ports with metadata, in enumeration order
    pub async fn port_descriptors(&self) -> Vec<PortDescriptor> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SessionCommand::ListPorts {
                response: response_tx,
            })
            .is_err()
        {
            return Vec::new();
        }

        response_rx.await.unwrap_or_default()
    }

    /// Serial ports as `"<port> - <description>"` display names
    pub async fn available_ports(&self) -> Vec<String> {
        self.port_descriptors()
            .await
            .iter()
            .map(PortDescriptor::display_name)
            .collect()
    }

    /// Tear down the link and stop the actor
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SessionCommand::Shutdown {
                response: response_tx,
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    // =========================================================================
    // Accessors (no round trip)
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        self.status.read().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// System name of the open port
    pub fn connected_port(&self) -> Option<String> {
        self.status.read().port.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
