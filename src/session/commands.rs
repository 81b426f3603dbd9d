//! Messages processed by the session actor
//!
//! Handle commands are split like the rest of the actor API: fire-and-forget
//! sends on the hot path, oneshot replies for lifecycle operations. Reader
//! messages come from the blocking reader thread and carry the connection
//! generation they were produced under.

use std::io;

use tokio::sync::oneshot;

use super::SessionError;
use crate::protocol::Command;
use crate::serial::{DetectRules, PortDescriptor};

pub enum SessionCommand {
    // -------------------------------------------------------------------------
    // Hot path (no response)
    // -------------------------------------------------------------------------
    /// Write bytes as-is
    SendRaw(Vec<u8>),

    /// Encode and write a protocol command
    SendCommand(Command),

    // -------------------------------------------------------------------------
    // Lifecycle (with response)
    // -------------------------------------------------------------------------
    Connect {
        port: String,
        response: oneshot::Sender<Result<(), SessionError>>,
    },

    Disconnect {
        response: oneshot::Sender<()>,
    },

    ListPorts {
        response: oneshot::Sender<Vec<PortDescriptor>>,
    },

    // -------------------------------------------------------------------------
    // Auto-detect
    // -------------------------------------------------------------------------
    StartAutoDetect,
    StopAutoDetect,
    SetDetectRules(DetectRules),

    /// Tear down and exit the run loop
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::SendRaw(bytes) => f.debug_tuple("SendRaw").field(&bytes.len()).finish(),
            SessionCommand::SendCommand(cmd) => {
                f.debug_tuple("SendCommand").field(&cmd.name()).finish()
            }
            SessionCommand::Connect { port, .. } => f
                .debug_struct("Connect")
                .field("port", port)
                .finish_non_exhaustive(),
            SessionCommand::Disconnect { .. } => write!(f, "Disconnect"),
            SessionCommand::ListPorts { .. } => write!(f, "ListPorts"),
            SessionCommand::StartAutoDetect => write!(f, "StartAutoDetect"),
            SessionCommand::StopAutoDetect => write!(f, "StopAutoDetect"),
            SessionCommand::SetDetectRules(rules) => f
                .debug_struct("SetDetectRules")
                .field("usb_ids", &rules.usb_ids.len())
                .field("keywords", &rules.keywords.len())
                .finish(),
            SessionCommand::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

/// Output of the reader thread
#[derive(Debug)]
pub enum ReaderMessage {
    Bytes { generation: u64, bytes: Vec<u8> },
    Failed { generation: u64, error: io::Error },
}

impl ReaderMessage {
    pub fn generation(&self) -> u64 {
        match self {
            ReaderMessage::Bytes { generation, .. } | ReaderMessage::Failed { generation, .. } => {
                *generation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_command_debug() {
        let cmd = SessionCommand::SendRaw(vec![0x90, 60, 100]);
        assert_eq!(format!("{:?}", cmd), "SendRaw(3)");

        let cmd = SessionCommand::SendCommand(Command::Ping);
        assert_eq!(format!("{:?}", cmd), "SendCommand(\"ping\")");

        let (tx, _rx) = oneshot::channel();
        let cmd = SessionCommand::Connect {
            port: "COM3".to_string(),
            response: tx,
        };
        assert!(format!("{:?}", cmd).contains("COM3"));

        let (tx, _rx) = oneshot::channel();
        assert_eq!(format!("{:?}", SessionCommand::Shutdown { response: tx }), "Shutdown");
    }

    #[test]
    fn test_reader_message_generation() {
        let msg = ReaderMessage::Bytes {
            generation: 7,
            bytes: vec![0xF0],
        };
        assert_eq!(msg.generation(), 7);

        let msg = ReaderMessage::Failed {
            generation: 3,
            error: io::Error::new(io::ErrorKind::BrokenPipe, "gone"),
        };
        assert_eq!(msg.generation(), 3);
    }
}
