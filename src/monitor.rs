//! Console traffic monitor
//!
//! Prints application events as they happen, one line each:
//! `[timestamp] TAG | detail`, coloured by message type.

use std::time::Instant;

use colored::*;

use crate::events::AppEvent;
use crate::midi::{format_hex, MidiEvent};
use crate::serial::{DetectRules, PortDescriptor};

pub struct Monitor {
    start_time: Instant,
    /// Loose serial bytes are noisy (debug prints from the firmware)
    show_serial_bytes: bool,
}

impl Monitor {
    pub fn new(show_serial_bytes: bool) -> Self {
        Self {
            start_time: Instant::now(),
            show_serial_bytes,
        }
    }

    pub fn print_event(&self, event: &AppEvent) {
        if matches!(event, AppEvent::SerialByte(_)) && !self.show_serial_bytes {
            return;
        }

        let timestamp = format!("{:08}", self.start_time.elapsed().as_millis());
        let (tag, detail) = describe(event);

        let tag = match event {
            AppEvent::Midi(MidiEvent::NoteOn { .. }) => tag.bright_green(),
            AppEvent::Midi(MidiEvent::NoteOff { .. }) => tag.bright_red(),
            AppEvent::Midi(MidiEvent::ControlChange { .. }) => tag.bright_yellow(),
            AppEvent::Midi(MidiEvent::PitchBend { .. }) => tag.bright_cyan(),
            AppEvent::Midi(MidiEvent::SysEx { .. }) => tag.bright_magenta(),
            AppEvent::Midi(_) => tag.normal(),
            AppEvent::Connected { .. } => tag.green(),
            AppEvent::ConnectionError(_) => tag.red(),
            AppEvent::PatchReceived { .. } | AppEvent::IdentityReceived { .. } => tag.bright_blue(),
            AppEvent::SerialByte(_) => tag.bright_black(),
            _ => tag.yellow(),
        };

        println!("[{}ms] {} | {}", timestamp.dimmed(), tag, detail);
    }
}

/// Fixed-width tag and plain-text detail for one event
pub fn describe(event: &AppEvent) -> (String, String) {
    let (tag, detail) = match event {
        AppEvent::ConnectionStateChanged(state) => ("STATE", state.to_string()),
        AppEvent::Connected { port } => ("SERIAL", format!("connected to {}", port)),
        AppEvent::Disconnected => ("SERIAL", "disconnected".to_string()),
        AppEvent::ConnectionError(e) => ("SERIAL", format!("error: {}", e)),
        AppEvent::SerialByte(b) => ("RX", format!("{:02X}", b)),
        AppEvent::PatchReceived { slot, patch } => (
            "DUMP",
            format!(
                "slot {} alg:{} fb:{} tl:{:?}",
                slot,
                patch.algorithm,
                patch.feedback,
                patch.operators.map(|op| op.tl)
            ),
        ),
        AppEvent::IdentityReceived { mode, version } => {
            ("IDENT", format!("mode {} firmware v{}", mode, version))
        }
        AppEvent::Midi(msg) => ("MIDI", format!("{} => {}", format_hex(&msg.encode()), msg)),
        AppEvent::PortsChanged(ports) => ("PORTS", format!("{} MIDI inputs", ports.len())),
        AppEvent::InputOpened(name) => ("INPUT", format!("opened {}", name)),
        AppEvent::InputClosed => ("INPUT", "closed".to_string()),
        AppEvent::VirtualPortCreated(name) => ("VIRT", format!("created {}", name)),
        AppEvent::VirtualPortDestroyed => ("VIRT", "destroyed".to_string()),
    };
    (format!("{:6}", tag), detail)
}

/// List serial ports, marking the ones auto-detect would pick
pub fn print_serial_ports(ports: &[PortDescriptor], rules: &DetectRules) {
    println!("\n{}", "=== Serial Ports ===".bold().cyan());

    if ports.is_empty() {
        println!("  {}", "No serial ports found".dimmed());
    }

    for port in ports {
        let marker = if rules.matches(port) {
            format!("[{}]", rules.board_type(port)).bright_green()
        } else {
            "[OTHER]".dimmed()
        };
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" {:04X}:{:04X}", vid, pid).dimmed().to_string(),
            _ => String::new(),
        };
        println!("  {} {}{}", marker, port.display_name(), ids);
    }

    if let Some(found) = rules.find(ports) {
        println!("\n{}", "Auto-detected synth:".bold().bright_green());
        println!("  {}", found.display_name().bright_white());
    }

    println!();
}

/// List MIDI inputs with their selection index
pub fn print_midi_ports(ports: &[String], current: Option<&str>) {
    println!("\n{}", "=== MIDI Inputs ===".bold().cyan());

    if ports.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }

    for (index, name) in ports.iter().enumerate() {
        let marker = if Some(name.as_str()) == current {
            "*".bright_green()
        } else {
            " ".normal()
        };
        println!("  {} {:2}: {}", marker, index, name);
    }

    println!();
}
