//! GenesisEngine SysEx protocol
//!
//! Framing of the serial byte stream, the vendor command set and the patch
//! value objects exchanged with the firmware.

pub mod command;
pub mod frame;
pub mod patch;

use thiserror::Error;

pub use command::Command;
pub use frame::{Decoded, FrameDecoder, SysExFrame};
pub use patch::{FmOperator, FmPatch, PsgEnvelope, SynthMode};

/// Non-commercial / educational manufacturer id
pub const MANUFACTURER_ID: u8 = 0x7D;

/// Device id of the synth
pub const DEVICE_ID: u8 = 0x00;

/// Number of live FM channels
pub const FM_CHANNEL_COUNT: u8 = 6;

/// Number of patch storage slots on the device
pub const PATCH_SLOT_COUNT: u8 = 16;

/// Number of PSG channels
pub const PSG_CHANNEL_COUNT: u8 = 4;

/// Protocol-level failures. None of these are shown to the user.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("truncated frame: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("frame is not delimited by F0/F7")]
    Unframed,

    #[error("foreign manufacturer id {0:#04X}")]
    ForeignManufacturer(u8),

    #[error("unknown opcode {0:#04X}")]
    UnknownOpcode(u8),

    #[error("invalid synth mode {0}")]
    InvalidMode(u8),

    #[error("{field} {value} out of range (limit {limit})")]
    OutOfRange {
        field: &'static str,
        value: u8,
        limit: u8,
    },

    #[error("invalid PSG envelope length {0}")]
    InvalidEnvelopeLength(usize),
}
