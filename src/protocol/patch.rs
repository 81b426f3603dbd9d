//! Patch value objects shared with the device firmware
//!
//! `FmPatch` serializes to exactly 42 bytes in TFI order. The layout is a wire
//! contract with the synth and must never be reordered.

use super::ProtocolError;

/// Size of one FM patch on the wire
pub const FM_PATCH_SIZE: usize = 42;

/// Size of one operator record on the wire
pub const FM_OPERATOR_SIZE: usize = 10;

/// Maximum number of PSG envelope steps
pub const PSG_ENVELOPE_MAX_STEPS: usize = 64;

/// Wire value for "envelope does not loop"
pub const PSG_NO_LOOP: u8 = 0xFF;

/// One FM operator (10 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmOperator {
    /// Multiplier (0-15, 0 = 0.5x)
    pub mul: u8,
    /// Detune (0-7, 3 = center)
    pub dt: u8,
    /// Total level (0-127, 0 = loudest)
    pub tl: u8,
    /// Rate scaling (0-3)
    pub rs: u8,
    /// Attack rate (0-31)
    pub ar: u8,
    /// Decay rate (0-31)
    pub dr: u8,
    /// Sustain rate (0-31)
    pub sr: u8,
    /// Release rate (0-15)
    pub rr: u8,
    /// Sustain level (0-15)
    pub sl: u8,
    /// SSG-EG mode (0-15, 0 = off)
    pub ssg: u8,
}

impl Default for FmOperator {
    fn default() -> Self {
        Self {
            mul: 1,
            dt: 3,
            tl: 32,
            rs: 0,
            ar: 31,
            dr: 8,
            sr: 0,
            rr: 6,
            sl: 2,
            ssg: 0,
        }
    }
}

impl FmOperator {
    fn write_to(&self, out: &mut [u8]) {
        out[0] = self.mul;
        out[1] = self.dt;
        out[2] = self.tl;
        out[3] = self.rs;
        out[4] = self.ar;
        out[5] = self.dr;
        out[6] = self.sr;
        out[7] = self.rr;
        out[8] = self.sl;
        out[9] = self.ssg;
    }

    fn read_from(data: &[u8]) -> Self {
        Self {
            mul: data[0],
            dt: data[1],
            tl: data[2],
            rs: data[3],
            ar: data[4],
            dr: data[5],
            sr: data[6],
            rr: data[7],
            sl: data[8],
            ssg: data[9],
        }
    }
}

/// FM patch: algorithm, feedback and four operators in TFI order (S1, S3, S2, S4)
#[derive(Debug, Clone, Default)]
pub struct FmPatch {
    /// Algorithm (0-7)
    pub algorithm: u8,
    /// Feedback (0-7)
    pub feedback: u8,
    pub operators: [FmOperator; 4],
    /// Display name, local only; never sent to the device
    pub name: String,
}

// The name is local metadata, two patches that sound the same are equal.
impl PartialEq for FmPatch {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm
            && self.feedback == other.feedback
            && self.operators == other.operators
    }
}

impl Eq for FmPatch {}

impl FmPatch {
    /// Serialize to the 42-byte wire layout
    pub fn to_bytes(&self) -> [u8; FM_PATCH_SIZE] {
        let mut data = [0u8; FM_PATCH_SIZE];
        data[0] = self.algorithm;
        data[1] = self.feedback;
        for (i, op) in self.operators.iter().enumerate() {
            let offset = 2 + i * FM_OPERATOR_SIZE;
            op.write_to(&mut data[offset..offset + FM_OPERATOR_SIZE]);
        }
        data
    }

    /// Deserialize from the 42-byte wire layout
    pub fn from_bytes(data: &[u8; FM_PATCH_SIZE]) -> Self {
        let mut operators = [FmOperator::default(); 4];
        for (i, op) in operators.iter_mut().enumerate() {
            let offset = 2 + i * FM_OPERATOR_SIZE;
            *op = FmOperator::read_from(&data[offset..offset + FM_OPERATOR_SIZE]);
        }
        Self {
            algorithm: data[0],
            feedback: data[1],
            operators,
            name: String::new(),
        }
    }

    /// Deserialize from the start of a slice holding at least 42 bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: &[u8; FM_PATCH_SIZE] = data
            .get(..FM_PATCH_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(ProtocolError::Truncated {
                expected: FM_PATCH_SIZE,
                actual: data.len(),
            })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Attach a display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// PSG software envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsgEnvelope {
    /// Envelope steps (1-64 entries)
    pub steps: Vec<u8>,
    /// Step to loop back to, `None` for a one-shot envelope
    pub loop_start: Option<u8>,
    /// Display name, local only
    pub name: String,
}

impl Default for PsgEnvelope {
    fn default() -> Self {
        Self {
            steps: vec![0],
            loop_start: None,
            name: String::new(),
        }
    }
}

impl PsgEnvelope {
    /// Wire value of the loop start byte
    pub fn loop_start_byte(&self) -> u8 {
        self.loop_start.unwrap_or(PSG_NO_LOOP)
    }

    pub(crate) fn loop_start_from_byte(byte: u8) -> Option<u8> {
        (byte != PSG_NO_LOOP).then_some(byte)
    }
}

/// Voice allocation mode of the synth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthMode {
    /// Six independent FM channels
    #[default]
    Multi = 0,
    /// Six-voice polyphony on MIDI channel 1
    Poly = 1,
}

impl TryFrom<u8> for SynthMode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SynthMode::Multi),
            1 => Ok(SynthMode::Poly),
            other => Err(ProtocolError::InvalidMode(other)),
        }
    }
}

impl std::fmt::Display for SynthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthMode::Multi => write!(f, "multi"),
            SynthMode::Poly => write!(f, "poly"),
        }
    }
}
