//! SysEx frame scanner for the serial byte stream
//!
//! The serial line carries SysEx frames interleaved with loose bytes (debug
//! output, echoed MIDI). The decoder isolates complete `F0 .. F7` frames and
//! hands every byte outside a frame back unchanged. It does not rebuild MIDI
//! messages from loose bytes (no running status).

use tracing::trace;

use crate::midi::status::{SYSEX_END, SYSEX_START};

/// Upper bound for a buffered frame; a patch dump is 48 bytes
pub const MAX_FRAME_LEN: usize = 512;

/// A complete SysEx frame, start and end markers included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysExFrame(Vec<u8>);

impl SysExFrame {
    /// Build a frame from bytes that already carry both markers
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let well_formed = bytes.len() >= 2
            && bytes.first() == Some(&SYSEX_START)
            && bytes.last() == Some(&SYSEX_END);
        well_formed.then_some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Output of the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame
    Frame(SysExFrame),
    /// A byte seen outside any frame
    Byte(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    InFrame,
}

/// Stateful `Idle` / `InFrame` scanner
#[derive(Debug)]
pub struct FrameDecoder {
    state: ScanState,
    buffer: Vec<u8>,
    /// Set when the current frame outgrew `MAX_FRAME_LEN`; it is swallowed up to F7
    overflowed: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            buffer: Vec::with_capacity(64),
            overflowed: false,
        }
    }

    /// True while a frame is being accumulated
    pub fn in_frame(&self) -> bool {
        self.state == ScanState::InFrame
    }

    /// Drop any partial frame and return to `Idle`
    pub fn reset(&mut self) {
        self.state = ScanState::Idle;
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Push one byte, returning a completed frame or a loose byte
    pub fn push(&mut self, byte: u8) -> Option<Decoded> {
        match (self.state, byte) {
            (ScanState::Idle, SYSEX_START) => {
                self.start_frame();
                None
            }
            (ScanState::Idle, SYSEX_END) => {
                trace!("Ignoring stray SysEx end marker");
                None
            }
            (ScanState::Idle, other) => Some(Decoded::Byte(other)),
            (ScanState::InFrame, SYSEX_START) => {
                // A new start marker means the previous frame lost its terminator
                trace!(
                    "Dropping unterminated frame ({} bytes), resyncing",
                    self.buffer.len()
                );
                self.start_frame();
                None
            }
            (ScanState::InFrame, SYSEX_END) => {
                let overflowed = self.overflowed;
                self.buffer.push(byte);
                let bytes = std::mem::take(&mut self.buffer);
                self.reset();
                if overflowed {
                    trace!("Dropping oversized frame");
                    None
                } else {
                    Some(Decoded::Frame(SysExFrame(bytes)))
                }
            }
            (ScanState::InFrame, other) => {
                if self.overflowed {
                    return None;
                }
                if self.buffer.len() + 1 >= MAX_FRAME_LEN {
                    self.overflowed = true;
                    self.buffer.clear();
                    return None;
                }
                self.buffer.push(other);
                None
            }
        }
    }

    /// Push a chunk of bytes, collecting everything that completes
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    fn start_frame(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
        self.buffer.push(SYSEX_START);
        self.state = ScanState::InFrame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frames(out: &[Decoded]) -> Vec<Vec<u8>> {
        out.iter()
            .filter_map(|d| match d {
                Decoded::Frame(f) => Some(f.as_bytes().to_vec()),
                Decoded::Byte(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.feed(&[0xF0, 0x7D, 0x00, 0x81, 0x01, 0x02, 0xF7]);
        assert_eq!(frames(&out), vec![vec![0xF0, 0x7D, 0x00, 0x81, 0x01, 0x02, 0xF7]]);
        assert!(!decoder.in_frame());
    }

    #[test]
    fn test_loose_bytes_are_emitted_individually() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.feed(&[0x90, 0x3C, 0x40, 0xF0, 0x7D, 0xF7, 0x41]);
        assert_eq!(
            out,
            vec![
                Decoded::Byte(0x90),
                Decoded::Byte(0x3C),
                Decoded::Byte(0x40),
                Decoded::Frame(SysExFrame(vec![0xF0, 0x7D, 0xF7])),
                Decoded::Byte(0x41),
            ]
        );
    }

    #[test]
    fn test_stray_end_marker_is_ignored() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&[0xF7, 0xF7]).is_empty());
        assert!(!decoder.in_frame());
    }

    #[test]
    fn test_missing_end_marker_never_emits() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.feed(&[0xF0, 0x7D, 0x00, 0x80, 0x01, 0x02]);
        assert!(out.is_empty());
        assert!(decoder.in_frame());

        // Restarting on a new start marker drops the partial frame
        let out = decoder.feed(&[0xF0, 0x7D, 0x00, 0x13, 0xF7]);
        assert_eq!(frames(&out), vec![vec![0xF0, 0x7D, 0x00, 0x13, 0xF7]]);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&[0xF0, 0x7D]).is_empty());
        assert!(decoder.feed(&[0x00, 0x81, 0x01]).is_empty());
        let out = decoder.feed(&[0x02, 0xF7]);
        assert_eq!(frames(&out).len(), 1);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0xF0, 0x7D, 0x00]);
        decoder.reset();
        let out = decoder.feed(&[0x81, 0xF7]);
        assert_eq!(out, vec![Decoded::Byte(0x81)]);
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut decoder = FrameDecoder::new();
        let mut stream = vec![0xF0];
        stream.extend(std::iter::repeat(0x11).take(MAX_FRAME_LEN + 10));
        stream.push(0xF7);
        stream.push(0x42);
        let out = decoder.feed(&stream);
        assert_eq!(out, vec![Decoded::Byte(0x42)]);
    }

    proptest! {
        #[test]
        fn chunked_feed_equals_bulk(
            stream in proptest::collection::vec(
                prop_oneof![
                    Just(0xF0u8),
                    Just(0xF7u8),
                    Just(0x7Du8),
                    any::<u8>(),
                ],
                0..300,
            ),
            chunk_sizes in proptest::collection::vec(1usize..24, 1..40),
        ) {
            let mut bulk = FrameDecoder::new();
            let bulk_out = bulk.feed(&stream);

            // One decoder fed in uneven chunks, cycling through the sizes
            let mut chunked = FrameDecoder::new();
            let mut chunked_out = Vec::new();
            let mut rest = stream.as_slice();
            for size in chunk_sizes.iter().cycle() {
                if rest.is_empty() {
                    break;
                }
                let (chunk, tail) = rest.split_at((*size).min(rest.len()));
                chunked_out.extend(chunked.feed(chunk));
                rest = tail;
            }

            // And one byte per call
            let mut single = FrameDecoder::new();
            let single_out: Vec<Decoded> =
                stream.chunks(1).flat_map(|byte| single.feed(byte)).collect();

            prop_assert_eq!(&bulk_out, &chunked_out);
            prop_assert_eq!(&bulk_out, &single_out);
            prop_assert_eq!(bulk.in_frame(), chunked.in_frame());
        }

        #[test]
        fn unterminated_frame_never_emits(
            body in proptest::collection::vec(0u8..0x80, 0..64),
            restarts in 0usize..5,
        ) {
            let mut decoder = FrameDecoder::new();
            let mut stream = vec![0xF0];
            stream.extend(&body);
            for _ in 0..restarts {
                stream.push(0xF0);
                stream.extend(&body);
            }
            let out = decoder.feed(&stream);
            prop_assert!(frames(&out).is_empty());
        }
    }
}
