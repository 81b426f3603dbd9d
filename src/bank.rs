//! Local patch bank
//!
//! 16 FM patch slots and 8 PSG envelope slots held in memory. The bank is
//! the source of patches sent to the device and is updated from patch dumps.
//! Factory contents match the firmware's built-in presets.

use crate::events::AppEvent;
use crate::protocol::{FmPatch, PsgEnvelope};

pub const FM_SLOT_COUNT: usize = 16;
pub const PSG_SLOT_COUNT: usize = 8;

#[derive(Debug, Clone)]
pub struct PatchBank {
    fm: Vec<FmPatch>,
    psg: Vec<PsgEnvelope>,
    modified: bool,
}

impl Default for PatchBank {
    fn default() -> Self {
        Self::factory()
    }
}

impl PatchBank {
    /// Bank with the factory presets
    pub fn factory() -> Self {
        let mut fm: Vec<FmPatch> = FACTORY_FM
            .iter()
            .map(|(name, bytes)| FmPatch::from_bytes(bytes).with_name(*name))
            .collect();
        for slot in fm.len()..FM_SLOT_COUNT {
            fm.push(FmPatch::default().with_name(format!("Empty {}", slot)));
        }

        let mut psg: Vec<PsgEnvelope> = FACTORY_PSG
            .iter()
            .map(|(name, steps, loop_start)| PsgEnvelope {
                steps: steps.to_vec(),
                loop_start: *loop_start,
                name: name.to_string(),
            })
            .collect();
        for slot in psg.len()..PSG_SLOT_COUNT {
            psg.push(PsgEnvelope {
                // Full attenuation: silent
                steps: vec![0x0F],
                loop_start: None,
                name: format!("Empty {}", slot),
            });
        }

        Self {
            fm,
            psg,
            modified: false,
        }
    }

    pub fn fm_patch(&self, slot: usize) -> Option<&FmPatch> {
        self.fm.get(slot)
    }

    /// Returns false for an out-of-range slot
    pub fn set_fm_patch(&mut self, slot: usize, patch: FmPatch) -> bool {
        match self.fm.get_mut(slot) {
            Some(entry) => {
                *entry = patch;
                self.modified = true;
                true
            }
            None => false,
        }
    }

    /// Display name, `"Patch <n>"` when unnamed
    pub fn fm_patch_name(&self, slot: usize) -> Option<String> {
        self.fm.get(slot).map(|p| {
            if p.name.is_empty() {
                format!("Patch {}", slot)
            } else {
                p.name.clone()
            }
        })
    }

    pub fn psg_envelope(&self, slot: usize) -> Option<&PsgEnvelope> {
        self.psg.get(slot)
    }

    pub fn set_psg_envelope(&mut self, slot: usize, envelope: PsgEnvelope) -> bool {
        match self.psg.get_mut(slot) {
            Some(entry) => {
                *entry = envelope;
                self.modified = true;
                true
            }
            None => false,
        }
    }

    pub fn psg_envelope_name(&self, slot: usize) -> Option<String> {
        self.psg.get(slot).map(|e| {
            if e.name.is_empty() {
                format!("Envelope {}", slot)
            } else {
                e.name.clone()
            }
        })
    }

    pub fn fm_patches(&self) -> &[FmPatch] {
        &self.fm
    }

    pub fn psg_envelopes(&self) -> &[PsgEnvelope] {
        &self.psg
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Store patch dumps coming from the device. The local name of the slot
    /// is kept since names never travel on the wire.
    ///
    /// Returns true when the bank changed.
    pub fn apply(&mut self, event: &AppEvent) -> bool {
        let AppEvent::PatchReceived { slot, patch } = event else {
            return false;
        };

        let slot = *slot as usize;
        let name = self.fm.get(slot).map(|p| p.name.clone()).unwrap_or_default();
        self.set_fm_patch(slot, patch.clone().with_name(name))
    }
}

/// Factory FM presets: name, then the 42 wire bytes
/// (algorithm, feedback, 4 x mul dt tl rs ar dr sr rr sl ssg)
#[rustfmt::skip]
const FACTORY_FM: [(&str, [u8; 42]); 8] = [
    ("Bright EP", [5, 6,
        1, 3, 35, 1, 31, 12, 0, 6, 2, 0,
        1, 3, 25, 1, 31, 8, 2, 7, 2, 0,
        2, 3, 28, 1, 31, 10, 2, 7, 3, 0,
        1, 3, 20, 1, 31, 10, 2, 8, 2, 0]),
    ("Synth Bass", [0, 5,
        0, 3, 25, 0, 31, 8, 0, 5, 1, 0,
        1, 3, 30, 0, 31, 10, 0, 5, 2, 0,
        0, 3, 20, 0, 31, 6, 0, 5, 1, 0,
        1, 3, 15, 0, 31, 12, 2, 7, 3, 0]),
    ("Brass", [4, 4,
        1, 3, 40, 1, 25, 5, 0, 4, 1, 0,
        1, 3, 20, 1, 28, 6, 1, 5, 2, 0,
        2, 4, 35, 1, 25, 5, 0, 4, 1, 0,
        1, 2, 18, 1, 28, 6, 1, 5, 2, 0]),
    ("Lead Synth", [7, 0,
        1, 3, 28, 2, 31, 8, 0, 6, 2, 0,
        2, 4, 30, 2, 31, 10, 0, 6, 3, 0,
        4, 2, 35, 2, 31, 12, 0, 6, 4, 0,
        1, 3, 25, 2, 31, 8, 0, 6, 2, 0]),
    ("Organ", [7, 0,
        1, 3, 25, 0, 31, 0, 0, 8, 0, 0,
        2, 3, 30, 0, 31, 0, 0, 8, 0, 0,
        4, 3, 35, 0, 31, 0, 0, 8, 0, 0,
        8, 3, 40, 0, 31, 0, 0, 8, 0, 0]),
    ("Strings", [2, 3,
        1, 3, 35, 0, 18, 4, 0, 4, 1, 0,
        2, 4, 40, 0, 20, 5, 0, 4, 2, 0,
        3, 2, 45, 0, 22, 6, 0, 4, 2, 0,
        1, 3, 22, 0, 16, 6, 1, 5, 2, 0]),
    ("Pluck", [0, 6,
        1, 3, 28, 2, 31, 15, 5, 8, 5, 0,
        3, 3, 35, 2, 31, 18, 6, 8, 6, 0,
        1, 4, 30, 2, 31, 16, 5, 8, 5, 0,
        1, 3, 18, 2, 31, 14, 4, 9, 4, 0]),
    ("Bell", [4, 3,
        1, 3, 30, 2, 31, 6, 2, 5, 3, 0,
        1, 3, 22, 2, 31, 8, 2, 6, 3, 0,
        7, 6, 45, 2, 31, 10, 3, 6, 5, 0,
        3, 0, 25, 2, 31, 9, 2, 7, 4, 0]),
];

/// Factory PSG envelopes: name, attenuation steps, loop start
#[rustfmt::skip]
const FACTORY_PSG: [(&str, &[u8], Option<u8>); 4] = [
    ("Pluck", &[0x00, 0x01, 0x02, 0x04, 0x06, 0x08, 0x0A, 0x0C, 0x0E, 0x0F], None),
    ("Sustain", &[0x00, 0x00, 0x00, 0x00], Some(0)),
    ("Slow Attack", &[0x0F, 0x0C, 0x0A, 0x08, 0x06, 0x04, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00], Some(8)),
    ("Tremolo", &[0x00, 0x02, 0x04, 0x02, 0x00, 0x02, 0x04, 0x02], Some(0)),
];
