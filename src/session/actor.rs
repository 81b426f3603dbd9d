//! SessionActor - serial link owner
//!
//! The actor serializes every operation on the link: connect, disconnect,
//! writes, auto-detect scans and the bytes coming back from the reader
//! thread. Only the actor writes the shared connection status; handles read
//! it without going through the channel.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::commands::{ReaderMessage, SessionCommand};
use super::handle::SessionHandle;
use super::{ConnectionState, SessionConfig, SessionError, SessionStats};
use crate::events::{AppEvent, EventSender};
use crate::midi::format_hex;
use crate::protocol::command::validate_frame;
use crate::protocol::{Command, Decoded, FrameDecoder, ProtocolError, SysExFrame};
use crate::serial::{
    system_port_name, DetectRules, LineSettings, SerialConnector, SerialReader, SerialTransport,
};

/// Read buffer of the reader thread
const READ_CHUNK_SIZE: usize = 256;

/// Upper bound on waiting for a cancelled reader to exit
const READER_JOIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Connection status shared with handles
#[derive(Debug, Default)]
pub(super) struct LinkStatus {
    pub state: ConnectionState,
    pub port: Option<String>,
}

pub struct SessionActor {
    connector: Arc<dyn SerialConnector>,
    line: LineSettings,

    /// Open transport, write half
    transport: Option<Box<dyn SerialTransport>>,
    /// Reader thread of the open transport
    reader: Option<ReaderThread>,
    /// Bumped on every connect and teardown; reader output tagged with an
    /// older value is ignored
    generation: u64,
    decoder: FrameDecoder,

    status: Arc<RwLock<LinkStatus>>,
    stats: Arc<SessionStats>,

    detect_rules: DetectRules,
    auto_detect_interval: Duration,
    auto_detect: Option<Interval>,

    events: EventSender,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    reader_tx: mpsc::UnboundedSender<ReaderMessage>,
    reader_rx: mpsc::UnboundedReceiver<ReaderMessage>,
}

impl SessionActor {
    /// Spawn the actor on the current tokio runtime and return its handle
    pub fn spawn(
        connector: Arc<dyn SerialConnector>,
        config: SessionConfig,
        events: EventSender,
    ) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (reader_tx, reader_rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(LinkStatus::default()));
        let stats = Arc::new(SessionStats::default());

        let actor = SessionActor {
            connector,
            line: config.line,
            transport: None,
            reader: None,
            generation: 0,
            decoder: FrameDecoder::new(),
            status: status.clone(),
            stats: stats.clone(),
            detect_rules: config.detect_rules,
            auto_detect_interval: config.auto_detect_interval,
            auto_detect: None,
            events,
            command_rx: cmd_rx,
            reader_tx,
            reader_rx,
        };

        tokio::spawn(actor.run());

        info!("Session actor spawned");

        SessionHandle::new(cmd_tx, status, stats)
    }

    async fn run(mut self) {
        debug!("Session actor run loop started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    trace!(?cmd, "Processing command");

                    match cmd {
                        SessionCommand::SendRaw(bytes) => self.write(&bytes),
                        SessionCommand::SendCommand(command) => self.write_command(&command),
                        SessionCommand::Connect { port, response } => {
                            let result = self.connect(&port);
                            let _ = response.send(result);
                        }
                        SessionCommand::Disconnect { response } => {
                            self.disconnect();
                            let _ = response.send(());
                        }
                        SessionCommand::ListPorts { response } => {
                            let ports = self.connector.list_ports().unwrap_or_else(|e| {
                                warn!("Serial port enumeration failed: {}", e);
                                Vec::new()
                            });
                            let _ = response.send(ports);
                        }
                        SessionCommand::StartAutoDetect => self.start_auto_detect(),
                        SessionCommand::StopAutoDetect => self.stop_auto_detect(),
                        SessionCommand::SetDetectRules(rules) => {
                            debug!(
                                "Detect rules replaced ({} USB ids, {} keywords)",
                                rules.usb_ids.len(),
                                rules.keywords.len()
                            );
                            self.detect_rules = rules;
                        }
                        SessionCommand::Shutdown { response } => {
                            self.stop_auto_detect();
                            self.close_transport();
                            let _ = response.send(());
                            break;
                        }
                    }
                }
                Some(msg) = self.reader_rx.recv() => self.handle_reader_message(msg),
                _ = next_tick(&mut self.auto_detect) => self.scan_for_device(),
            }
        }

        self.close_transport();
        info!("Session actor stopped");
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn connect(&mut self, port: &str) -> Result<(), SessionError> {
        if self.transport.is_some() {
            self.close_transport();
            self.set_state(ConnectionState::Disconnected);
            let _ = self.events.send(AppEvent::Disconnected);
        }

        let name = system_port_name(port).to_string();
        self.set_state(ConnectionState::Connecting);

        let transport = match self.open_link(&name) {
            Ok(transport) => transport,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e);
            }
        };

        self.transport = Some(transport);
        self.status.write().port = Some(name.clone());
        self.set_state(ConnectionState::Connected);
        let _ = self.events.send(AppEvent::Connected { port: name.clone() });
        info!("Connected to {}", name);

        // Connected, nothing left to look for
        self.stop_auto_detect();

        // Identify request; the answer arrives as an IdentityReceived event
        self.write_command(&Command::Ping);
        Ok(())
    }

    /// Open the port and start its reader thread
    fn open_link(&mut self, name: &str) -> Result<Box<dyn SerialTransport>, SessionError> {
        let transport = self.connector.open(name, &self.line)?;
        let reader = transport.reader().map_err(crate::serial::TransportError::from)?;

        self.generation += 1;
        let thread = spawn_reader(reader, self.generation, self.reader_tx.clone())
            .map_err(crate::serial::TransportError::from)?;
        self.reader = Some(thread);

        Ok(transport)
    }

    fn disconnect(&mut self) {
        self.stop_auto_detect();
        self.close_transport();
        self.set_state(ConnectionState::Disconnected);
        let _ = self.events.send(AppEvent::Disconnected);
        info!("Disconnected");
    }

    /// Transport failure while open: tear down and report
    fn link_lost(&mut self, reason: String) {
        warn!("Serial link lost: {}", reason);
        self.close_transport();
        self.fail(reason);
    }

    fn fail(&mut self, message: String) {
        self.set_state(ConnectionState::Error);
        let _ = self.events.send(AppEvent::ConnectionError(message));
    }

    /// Cancel the reader before dropping the transport, then wait for the
    /// reader to release its handle on the port
    fn close_transport(&mut self) {
        if let Some(reader) = &self.reader {
            reader.cancel.store(true, Ordering::Release);
        }
        self.generation += 1;

        if let Some(transport) = self.transport.take() {
            debug!("Closing {}", transport.port_name());
        }

        if let Some(reader) = self.reader.take() {
            reader.join();
        }

        self.decoder.reset();
        self.status.write().port = None;
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.status.write().state = state;
        let _ = self.events.send(AppEvent::ConnectionStateChanged(state));
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    fn write(&mut self, bytes: &[u8]) {
        let Some(transport) = self.transport.as_mut() else {
            trace!("Not connected, dropping {} bytes", bytes.len());
            return;
        };

        match transport.write_all(bytes) {
            Ok(()) => {
                trace!("TX {}", format_hex(bytes));
                SessionStats::bump(&self.stats.bytes_written, bytes.len() as u64);
            }
            Err(e) => self.link_lost(e.to_string()),
        }
    }

    fn write_command(&mut self, command: &Command) {
        match command.encode() {
            Ok(bytes) => {
                debug!("Sending {}", command.name());
                self.write(&bytes);
            }
            Err(e) => warn!("Refusing to send {}: {}", command.name(), e),
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    fn handle_reader_message(&mut self, msg: ReaderMessage) {
        if msg.generation() != self.generation || self.transport.is_none() {
            trace!("Ignoring reader output from stale connection");
            return;
        }

        match msg {
            ReaderMessage::Bytes { bytes, .. } => self.receive(&bytes),
            ReaderMessage::Failed { error, .. } => self.link_lost(describe(&error)),
        }
    }

    fn receive(&mut self, bytes: &[u8]) {
        trace!("RX {}", format_hex(bytes));

        for item in self.decoder.feed(bytes) {
            match item {
                Decoded::Frame(frame) => self.dispatch_frame(frame),
                Decoded::Byte(byte) => {
                    SessionStats::bump(&self.stats.raw_bytes, 1);
                    let _ = self.events.send(AppEvent::SerialByte(byte));
                }
            }
        }
    }

    fn dispatch_frame(&mut self, frame: SysExFrame) {
        SessionStats::bump(&self.stats.frames_received, 1);

        let opcode = match validate_frame(frame.as_bytes()) {
            Ok(opcode) => opcode,
            Err(e) => {
                SessionStats::bump(&self.stats.frames_discarded, 1);
                debug!("Discarding frame {}: {}", format_hex(frame.as_bytes()), e);
                return;
            }
        };

        match Command::decode_opcode(opcode, &frame) {
            Ok(Command::PatchDumpResponse { slot, patch }) => {
                SessionStats::bump(&self.stats.responses_dispatched, 1);
                debug!("Patch dump received for slot {}", slot);
                let _ = self.events.send(AppEvent::PatchReceived { slot, patch });
            }
            Ok(Command::IdentityResponse { mode, version }) => {
                SessionStats::bump(&self.stats.responses_dispatched, 1);
                info!("Device identified: mode={} version={}", mode, version);
                let _ = self
                    .events
                    .send(AppEvent::IdentityReceived { mode, version });
            }
            Ok(other) => {
                SessionStats::bump(&self.stats.frames_discarded, 1);
                debug!("Ignoring host command {} sent by device", other.name());
            }
            Err(ProtocolError::UnknownOpcode(op)) => {
                SessionStats::bump(&self.stats.unknown_opcodes, 1);
                debug!("Unknown SysEx response {:#04X}", op);
            }
            Err(e) => {
                SessionStats::bump(&self.stats.frames_discarded, 1);
                debug!("Discarding malformed frame: {}", e);
            }
        }
    }

    // =========================================================================
    // Auto-detect
    // =========================================================================

    fn start_auto_detect(&mut self) {
        if self.auto_detect.is_some() {
            return;
        }

        // First scan right away, then every interval
        let mut interval = tokio::time::interval_at(Instant::now(), self.auto_detect_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.auto_detect = Some(interval);
        info!(
            "Auto-detect started (every {} ms)",
            self.auto_detect_interval.as_millis()
        );
    }

    fn stop_auto_detect(&mut self) {
        if self.auto_detect.take().is_some() {
            info!("Auto-detect stopped");
        }
    }

    fn scan_for_device(&mut self) {
        if self.transport.is_some() {
            self.stop_auto_detect();
            return;
        }

        let ports = match self.connector.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                debug!("Auto-detect scan failed: {}", e);
                return;
            }
        };

        let Some(found) = self.detect_rules.find(&ports).cloned() else {
            trace!("Auto-detect: no matching port among {}", ports.len());
            return;
        };

        info!(
            "Auto-detected {} board on {}",
            self.detect_rules.board_type(&found),
            found.name
        );
        if let Err(e) = self.connect(&found.name) {
            debug!("Auto-detect connect failed: {}", e);
        }
    }
}

/// Resolves on the next auto-detect tick, never when auto-detect is off
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn describe(error: &io::Error) -> String {
    match error.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => {
            format!("device disconnected ({})", error)
        }
        _ => error.to_string(),
    }
}

/// Handle on a running reader thread
struct ReaderThread {
    generation: u64,
    cancel: Arc<AtomicBool>,
    /// Disconnects once the thread has dropped its reader
    done: channel::Receiver<()>,
    handle: JoinHandle<()>,
}

impl ReaderThread {
    /// Cancel and wait, bounded, for the thread to exit
    fn join(self) {
        self.cancel.store(true, Ordering::Release);

        match self.done.recv_timeout(READER_JOIN_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Serial reader {} still running after {} ms",
                    self.generation,
                    READER_JOIN_TIMEOUT.as_millis()
                );
            }
            _ => {
                if self.handle.join().is_err() {
                    warn!("Serial reader {} panicked", self.generation);
                }
            }
        }
    }
}

/// Blocking read loop on a dedicated thread
///
/// The serial read times out every poll interval so the cancel flag is
/// observed promptly after teardown.
fn spawn_reader(
    mut reader: Box<dyn SerialReader>,
    generation: u64,
    tx: mpsc::UnboundedSender<ReaderMessage>,
) -> io::Result<ReaderThread> {
    let cancel = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = channel::bounded::<()>(0);
    let thread_cancel = cancel.clone();

    let handle = thread::Builder::new()
        .name(format!("serial-reader-{}", generation))
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK_SIZE];

            while !thread_cancel.load(Ordering::Acquire) {
                match reader.read_chunk(&mut buf) {
                    Ok(0) if tx.is_closed() => break,
                    Ok(0) => continue,
                    Ok(n) => {
                        let msg = ReaderMessage::Bytes {
                            generation,
                            bytes: buf[..n].to_vec(),
                        };
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        if !thread_cancel.load(Ordering::Acquire) {
                            let _ = tx.send(ReaderMessage::Failed { generation, error });
                        }
                        break;
                    }
                }
            }

            // Port handle first, then the done signal
            drop(reader);
            drop(done_tx);
            trace!("Serial reader {} exiting", generation);
        })?;

    Ok(ReaderThread {
        generation,
        cancel,
        done: done_rx,
        handle,
    })
}
