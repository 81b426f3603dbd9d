//! MIDI utilities and message types
//!
//! Decodes and encodes the single channel messages that travel between MIDI
//! input hardware and the synth. Backends always deliver whole messages, so
//! there is no running-status state here.

use std::fmt;

/// Status nibbles understood by the codec
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const PITCH_BEND: u8 = 0xE0;
    pub const SYSEX_START: u8 = 0xF0;
    pub const SYSEX_END: u8 = 0xF7;
}

/// A raw MIDI message as delivered by an input backend.
///
/// Always starts with a status byte. The bytes are never modified after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMidiMessage {
    bytes: Vec<u8>,
}

impl RawMidiMessage {
    /// Wrap raw bytes, rejecting empty input and a leading data byte
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        match bytes.first() {
            Some(&b) if b & 0x80 != 0 => Some(Self { bytes }),
            _ => None,
        }
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decode into a typed event
    pub fn decode(&self) -> Option<MidiEvent> {
        MidiEvent::decode(&self.bytes)
    }
}

/// Typed MIDI event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit, 8192 = center)
    PitchBend { channel: u8, value: u16 },

    /// Complete System Exclusive message, including F0 and F7
    SysEx { data: Vec<u8> },
}

impl MidiEvent {
    /// Decode one complete MIDI message.
    ///
    /// Returns `None` when the message is shorter than its status byte
    /// requires, or when it is a kind this codec does not model (aftertouch,
    /// clock, ...). Short messages are an accepted loss: nothing partial is
    /// ever produced.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let &status_byte = data.first()?;

        if status_byte < 0x80 {
            return None;
        }

        if status_byte == status::SYSEX_START {
            return Some(MidiEvent::SysEx {
                data: data.to_vec(),
            });
        }

        let channel = status_byte & 0x0F;

        match status_byte & 0xF0 {
            status::NOTE_OFF => {
                let [note, velocity] = data_bytes::<2>(data)?;
                Some(MidiEvent::NoteOff {
                    channel,
                    note,
                    velocity,
                })
            }
            status::NOTE_ON => {
                let [note, velocity] = data_bytes::<2>(data)?;
                // Velocity 0 is a note off; downstream note tracking relies on it
                if velocity == 0 {
                    Some(MidiEvent::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(MidiEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            status::CONTROL_CHANGE => {
                let [cc, value] = data_bytes::<2>(data)?;
                Some(MidiEvent::ControlChange { channel, cc, value })
            }
            status::PROGRAM_CHANGE => {
                let [program] = data_bytes::<1>(data)?;
                Some(MidiEvent::ProgramChange { channel, program })
            }
            status::PITCH_BEND => {
                let [lsb, msb] = data_bytes::<2>(data)?;
                let value = (lsb as u16) | ((msb as u16) << 7);
                Some(MidiEvent::PitchBend { channel, value })
            }
            _ => None,
        }
    }

    /// Encode the event to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => vec![status::NOTE_OFF | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => vec![status::NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiEvent::ControlChange { channel, cc, value } => {
                vec![status::CONTROL_CHANGE | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiEvent::ProgramChange { channel, program } => {
                vec![status::PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F]
            }
            MidiEvent::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![status::PITCH_BEND | (channel & 0x0F), lsb, msb]
            }
            MidiEvent::SysEx { ref data } => data.clone(),
        }
    }

    /// Channel (0-15) for channel messages, None for SysEx
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOff { channel, .. }
            | MidiEvent::NoteOn { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => Some(channel),
            MidiEvent::SysEx { .. } => None,
        }
    }
}

/// Read `N` data bytes after the status byte, masked to 7 bits
fn data_bytes<const N: usize>(data: &[u8]) -> Option<[u8; N]> {
    let payload = data.get(1..=N)?;
    let mut out = [0u8; N];
    for (dst, src) in out.iter_mut().zip(payload) {
        *dst = src & 0x7F;
    }
    Some(out)
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiEvent::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiEvent::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiEvent::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiEvent::SysEx { ref data } => write!(f, "SysEx {} bytes", data.len()),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let data = vec![0x90, 60, 100]; // Note On, ch 1, Middle C, velocity 100
        let msg = MidiEvent::decode(&data).unwrap();

        assert_eq!(
            msg,
            MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let data = vec![0x93, 60, 0];
        let msg = MidiEvent::decode(&data).unwrap();

        assert_eq!(
            msg,
            MidiEvent::NoteOff {
                channel: 3,
                note: 60,
                velocity: 0,
            }
        );
    }

    #[test]
    fn test_control_change() {
        let data = vec![0xB2, 7, 100]; // CC ch 3, volume, value 100
        let msg = MidiEvent::decode(&data).unwrap();

        assert_eq!(
            msg,
            MidiEvent::ControlChange {
                channel: 2,
                cc: 7,
                value: 100,
            }
        );
    }

    #[test]
    fn test_program_change() {
        let msg = MidiEvent::decode(&[0xC5, 12]).unwrap();
        assert_eq!(
            msg,
            MidiEvent::ProgramChange {
                channel: 5,
                program: 12
            }
        );
    }

    #[test]
    fn test_pitch_bend() {
        let data = vec![0xE0, 0x00, 0x40]; // Pitch Bend ch 1, center (8192)
        let msg = MidiEvent::decode(&data).unwrap();

        assert_eq!(
            msg,
            MidiEvent::PitchBend {
                channel: 0,
                value: 8192,
            }
        );
    }

    #[test]
    fn test_short_messages_are_dropped() {
        assert_eq!(MidiEvent::decode(&[0x90, 60]), None);
        assert_eq!(MidiEvent::decode(&[0x80]), None);
        assert_eq!(MidiEvent::decode(&[0xB0, 1]), None);
        assert_eq!(MidiEvent::decode(&[0xC0]), None);
        assert_eq!(MidiEvent::decode(&[0xE0, 0x10]), None);
        assert_eq!(MidiEvent::decode(&[]), None);
    }

    #[test]
    fn test_unmodelled_kinds_decode_to_none() {
        assert_eq!(MidiEvent::decode(&[0xA0, 60, 10]), None); // poly aftertouch
        assert_eq!(MidiEvent::decode(&[0xD0, 10]), None); // channel pressure
        assert_eq!(MidiEvent::decode(&[0xF8]), None); // clock
        assert_eq!(MidiEvent::decode(&[0x40, 0x40]), None); // data byte first
    }

    #[test]
    fn test_sysex_keeps_whole_message() {
        let data = vec![0xF0, 0x7D, 0x00, 0x13, 0xF7];
        assert_eq!(
            MidiEvent::decode(&data),
            Some(MidiEvent::SysEx { data: data.clone() })
        );
    }

    #[test]
    fn test_encode_note_on() {
        let msg = MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        };

        assert_eq!(msg.encode(), vec![0x90, 60, 100]);
    }

    #[test]
    fn test_encode_masks_channel_and_data() {
        let msg = MidiEvent::ControlChange {
            channel: 0x1F,
            cc: 0xFF,
            value: 0x80,
        };
        assert_eq!(msg.encode(), vec![0xBF, 0x7F, 0x00]);

        let bend = MidiEvent::PitchBend {
            channel: 1,
            value: 0x3FFF,
        };
        assert_eq!(bend.encode(), vec![0xE1, 0x7F, 0x7F]);
    }

    #[test]
    fn test_raw_message_requires_status_byte() {
        assert!(RawMidiMessage::new(vec![]).is_none());
        assert!(RawMidiMessage::new(vec![0x3C, 0x40]).is_none());

        let raw = RawMidiMessage::new(vec![0x91, 64, 90]).unwrap();
        assert_eq!(raw.status(), 0x91);
        assert_eq!(
            raw.decode(),
            Some(MidiEvent::NoteOn {
                channel: 1,
                note: 64,
                velocity: 90
            })
        );
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xF0, 0x7D, 0x00, 0x13, 0xF7]), "F0 7D 00 13 F7");
    }
}
