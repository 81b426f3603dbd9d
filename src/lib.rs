//! Genesis Link - companion link for the GenesisEngine FM synth
//!
//! Talks to the synth board over a serial port (SysEx command protocol),
//! bridges MIDI input from the computer to the board and keeps a local
//! patch bank in sync with patch dumps.

pub mod bank;
pub mod cli;
pub mod config;
pub mod events;
pub mod input;
pub mod midi;
pub mod monitor;
pub mod paths;
pub mod protocol;
pub mod router;
pub mod serial;
pub mod session;
