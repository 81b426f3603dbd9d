//! Vendor command set carried in SysEx frames
//!
//! Every frame is `F0 <manufacturer> <device> <opcode> [payload] F7`. Host
//! commands use opcodes below 0x80, device responses 0x80 and above.

use super::frame::SysExFrame;
use super::patch::{FmPatch, PsgEnvelope, SynthMode, FM_PATCH_SIZE, PSG_ENVELOPE_MAX_STEPS};
use super::{
    ProtocolError, DEVICE_ID, FM_CHANNEL_COUNT, MANUFACTURER_ID, PATCH_SLOT_COUNT,
    PSG_CHANNEL_COUNT,
};
use crate::midi::status::{SYSEX_END, SYSEX_START};

/// Opcode values (must match the firmware)
pub mod opcode {
    pub const LOAD_FM_PATCH: u8 = 0x01;
    pub const LOAD_PSG_ENVELOPE: u8 = 0x02;
    pub const STORE_FM_PATCH: u8 = 0x03;
    pub const RECALL_PATCH: u8 = 0x04;
    pub const REQUEST_PATCH: u8 = 0x10;
    pub const REQUEST_ALL: u8 = 0x11;
    pub const SET_MODE: u8 = 0x12;
    pub const PING: u8 = 0x13;

    pub const PATCH_DUMP: u8 = 0x80;
    pub const IDENTITY: u8 = 0x81;
}

/// Smallest valid frame: F0 mfr dev opcode F7
pub const MIN_FRAME_LEN: usize = 5;

/// Offset of the first payload byte inside a frame
const PAYLOAD_OFFSET: usize = 4;

/// Commands and responses of the device protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load an FM patch into a live channel (host → device)
    LoadPatchToChannel { channel: u8, patch: FmPatch },
    /// Load a PSG envelope into a PSG channel (host → device)
    LoadPsgEnvelope { channel: u8, envelope: PsgEnvelope },
    /// Store an FM patch in a device slot (host → device)
    StorePatchToSlot { slot: u8, patch: FmPatch },
    /// Recall a stored slot into a live channel (host → device)
    RecallToChannel { channel: u8, slot: u8 },
    /// Ask the device to dump one slot (host → device)
    RequestPatchDump { slot: u8 },
    /// Ask the device to dump every slot (host → device)
    RequestAllPatches,
    /// Switch voice allocation mode (host → device)
    SetMode(SynthMode),
    /// Identify request (host → device)
    Ping,
    /// Patch content of one slot (device → host)
    PatchDumpResponse { slot: u8, patch: FmPatch },
    /// Capability / version report (device → host)
    IdentityResponse { mode: u8, version: u8 },
}

impl Command {
    /// Opcode byte for this command
    pub fn opcode(&self) -> u8 {
        match self {
            Command::LoadPatchToChannel { .. } => opcode::LOAD_FM_PATCH,
            Command::LoadPsgEnvelope { .. } => opcode::LOAD_PSG_ENVELOPE,
            Command::StorePatchToSlot { .. } => opcode::STORE_FM_PATCH,
            Command::RecallToChannel { .. } => opcode::RECALL_PATCH,
            Command::RequestPatchDump { .. } => opcode::REQUEST_PATCH,
            Command::RequestAllPatches => opcode::REQUEST_ALL,
            Command::SetMode(_) => opcode::SET_MODE,
            Command::Ping => opcode::PING,
            Command::PatchDumpResponse { .. } => opcode::PATCH_DUMP,
            Command::IdentityResponse { .. } => opcode::IDENTITY,
        }
    }

    /// True for frames the device sends to the host
    pub fn is_response(&self) -> bool {
        self.opcode() >= 0x80
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::LoadPatchToChannel { .. } => "load-patch",
            Command::LoadPsgEnvelope { .. } => "load-psg-envelope",
            Command::StorePatchToSlot { .. } => "store-patch",
            Command::RecallToChannel { .. } => "recall-patch",
            Command::RequestPatchDump { .. } => "request-patch",
            Command::RequestAllPatches => "request-all",
            Command::SetMode(_) => "set-mode",
            Command::Ping => "ping",
            Command::PatchDumpResponse { .. } => "patch-dump",
            Command::IdentityResponse { .. } => "identity",
        }
    }

    /// Build the complete SysEx frame for this command.
    ///
    /// Channels and slots are range checked and every payload byte must be
    /// a 7-bit data byte, so no value can be read as a frame marker.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::with_capacity(FM_PATCH_SIZE + 1);

        match self {
            Command::LoadPatchToChannel { channel, patch } => {
                check_range("channel", *channel, FM_CHANNEL_COUNT)?;
                payload.push(*channel);
                payload.extend_from_slice(&patch_bytes(patch)?);
            }
            Command::StorePatchToSlot { slot, patch }
            | Command::PatchDumpResponse { slot, patch } => {
                check_range("slot", *slot, PATCH_SLOT_COUNT)?;
                payload.push(*slot);
                payload.extend_from_slice(&patch_bytes(patch)?);
            }
            Command::LoadPsgEnvelope { channel, envelope } => {
                check_range("psg channel", *channel, PSG_CHANNEL_COUNT)?;
                let len = envelope.steps.len();
                if len == 0 || len > PSG_ENVELOPE_MAX_STEPS {
                    return Err(ProtocolError::InvalidEnvelopeLength(len));
                }
                if let Some(start) = envelope.loop_start {
                    check_range("loop start", start, len as u8)?;
                }
                check_data("envelope step", &envelope.steps)?;
                payload.push(*channel);
                payload.push(len as u8);
                payload.push(envelope.loop_start_byte());
                payload.extend_from_slice(&envelope.steps);
            }
            Command::RecallToChannel { channel, slot } => {
                check_range("channel", *channel, FM_CHANNEL_COUNT)?;
                check_range("slot", *slot, PATCH_SLOT_COUNT)?;
                payload.push(*channel);
                payload.push(*slot);
            }
            Command::RequestPatchDump { slot } => {
                check_range("slot", *slot, PATCH_SLOT_COUNT)?;
                payload.push(*slot);
            }
            Command::SetMode(mode) => payload.push(*mode as u8),
            Command::IdentityResponse { mode, version } => {
                check_data("identity byte", &[*mode, *version])?;
                payload.push(*mode);
                payload.push(*version);
            }
            Command::RequestAllPatches | Command::Ping => {}
        }

        Ok(wrap_frame(self.opcode(), &payload))
    }

    /// Decode a complete frame into a command.
    ///
    /// Frames that are too short, carry a foreign manufacturer id or an
    /// unknown opcode are rejected; callers drop them without telling the
    /// user because the line may carry unrelated SysEx traffic.
    pub fn decode(frame: &SysExFrame) -> Result<Self, ProtocolError> {
        let opcode = validate_frame(frame.as_bytes())?;
        Self::decode_opcode(opcode, frame)
    }

    /// Opcode dispatch on a frame that already passed `validate_frame`.
    ///
    /// Decoded channels and slots obey the same limits as `encode`.
    pub(crate) fn decode_opcode(opcode: u8, frame: &SysExFrame) -> Result<Self, ProtocolError> {
        let bytes = frame.as_bytes();
        if bytes.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::Truncated {
                expected: MIN_FRAME_LEN,
                actual: bytes.len(),
            });
        }
        let payload = &bytes[PAYLOAD_OFFSET..bytes.len() - 1];

        match opcode {
            opcode::LOAD_FM_PATCH => {
                let (channel, patch) = slot_and_patch(payload)?;
                check_range("channel", channel, FM_CHANNEL_COUNT)?;
                Ok(Command::LoadPatchToChannel { channel, patch })
            }
            opcode::STORE_FM_PATCH => {
                let (slot, patch) = slot_and_patch(payload)?;
                check_range("slot", slot, PATCH_SLOT_COUNT)?;
                Ok(Command::StorePatchToSlot { slot, patch })
            }
            opcode::PATCH_DUMP => {
                let (slot, patch) = slot_and_patch(payload)?;
                check_range("slot", slot, PATCH_SLOT_COUNT)?;
                Ok(Command::PatchDumpResponse { slot, patch })
            }
            opcode::LOAD_PSG_ENVELOPE => {
                let [channel, length, loop_start] = fixed::<3>(payload)?;
                check_range("psg channel", channel, PSG_CHANNEL_COUNT)?;
                let loop_start = PsgEnvelope::loop_start_from_byte(loop_start);
                if let Some(start) = loop_start {
                    check_range("loop start", start, length)?;
                }
                let length = length as usize;
                let steps = payload
                    .get(3..3 + length)
                    .ok_or(ProtocolError::Truncated {
                        expected: 3 + length,
                        actual: payload.len(),
                    })?
                    .to_vec();
                Ok(Command::LoadPsgEnvelope {
                    channel,
                    envelope: PsgEnvelope {
                        steps,
                        loop_start,
                        name: String::new(),
                    },
                })
            }
            opcode::RECALL_PATCH => {
                let [channel, slot] = fixed::<2>(payload)?;
                check_range("channel", channel, FM_CHANNEL_COUNT)?;
                check_range("slot", slot, PATCH_SLOT_COUNT)?;
                Ok(Command::RecallToChannel { channel, slot })
            }
            opcode::REQUEST_PATCH => {
                let [slot] = fixed::<1>(payload)?;
                check_range("slot", slot, PATCH_SLOT_COUNT)?;
                Ok(Command::RequestPatchDump { slot })
            }
            opcode::REQUEST_ALL => Ok(Command::RequestAllPatches),
            opcode::SET_MODE => {
                let [mode] = fixed::<1>(payload)?;
                Ok(Command::SetMode(SynthMode::try_from(mode)?))
            }
            opcode::PING => Ok(Command::Ping),
            opcode::IDENTITY => {
                let [mode, version] = fixed::<2>(payload)?;
                Ok(Command::IdentityResponse { mode, version })
            }
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// Check length, markers and manufacturer id; returns the opcode.
///
/// Nothing past this check looks at a frame that fails it.
pub fn validate_frame(bytes: &[u8]) -> Result<u8, ProtocolError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(ProtocolError::Truncated {
            expected: MIN_FRAME_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0] != SYSEX_START || bytes[bytes.len() - 1] != SYSEX_END {
        return Err(ProtocolError::Unframed);
    }
    if bytes[1] != MANUFACTURER_ID {
        return Err(ProtocolError::ForeignManufacturer(bytes[1]));
    }
    Ok(bytes[3])
}

/// Wrap an opcode and payload in `F0 mfr dev .. F7`
pub fn wrap_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + MIN_FRAME_LEN);
    frame.push(SYSEX_START);
    frame.push(MANUFACTURER_ID);
    frame.push(DEVICE_ID);
    frame.push(opcode);
    frame.extend_from_slice(payload);
    frame.push(SYSEX_END);
    frame
}

fn check_range(field: &'static str, value: u8, limit: u8) -> Result<(), ProtocolError> {
    if value < limit {
        Ok(())
    } else {
        Err(ProtocolError::OutOfRange {
            field,
            value,
            limit,
        })
    }
}

/// Reject bytes with the high bit set (status bytes, frame markers)
fn check_data(field: &'static str, bytes: &[u8]) -> Result<(), ProtocolError> {
    match bytes.iter().find(|&&b| b > 0x7F) {
        Some(&value) => Err(ProtocolError::OutOfRange {
            field,
            value,
            limit: 0x80,
        }),
        None => Ok(()),
    }
}

fn patch_bytes(patch: &FmPatch) -> Result<[u8; FM_PATCH_SIZE], ProtocolError> {
    let bytes = patch.to_bytes();
    check_data("patch byte", &bytes)?;
    Ok(bytes)
}

fn fixed<const N: usize>(payload: &[u8]) -> Result<[u8; N], ProtocolError> {
    payload
        .get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProtocolError::Truncated {
            expected: N,
            actual: payload.len(),
        })
}

fn slot_and_patch(payload: &[u8]) -> Result<(u8, FmPatch), ProtocolError> {
    let [index] = fixed::<1>(payload)?;
    let patch = FmPatch::from_slice(&payload[1..])?;
    Ok((index, patch))
}
