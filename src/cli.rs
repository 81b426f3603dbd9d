//! Command-line console
//!
//! rustyline blocks, so the editor runs on its own thread and hands parsed
//! commands to the async main loop over a channel.

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use crate::bank::PSG_SLOT_COUNT;
use crate::protocol::{SynthMode, FM_CHANNEL_COUNT, PATCH_SLOT_COUNT, PSG_CHANNEL_COUNT};

const PROMPT: &str = "genesis> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Status,
    /// List MIDI inputs
    Ports,
    /// List serial ports
    Serial,
    Connect(String),
    Disconnect,
    AutoDetect(bool),
    Ping,
    Mode(SynthMode),
    Dump(u8),
    DumpAll,
    Recall { channel: u8, slot: u8 },
    /// Send a bank patch to a live channel
    Load { channel: u8, slot: u8 },
    /// Store a bank patch in the same device slot
    Store { slot: u8 },
    /// Send a bank PSG envelope to a PSG channel
    Envelope { channel: u8, slot: u8 },
    /// Open a MIDI input by index or name
    Open(String),
    Close,
    Virtual(Option<String>),
    Unvirtual,
    Forward(bool),
    Bank,
    Quit,
}

impl ReplCommand {
    /// Parse one console line. Empty lines give `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let cmd = match verb.to_lowercase().as_str() {
            "help" | "?" => ReplCommand::Help,
            "status" => ReplCommand::Status,
            "ports" => ReplCommand::Ports,
            "serial" => ReplCommand::Serial,
            "connect" => ReplCommand::Connect(joined(&rest, "connect <port>")?),
            "disconnect" => ReplCommand::Disconnect,
            "autodetect" => ReplCommand::AutoDetect(switch(&rest, "autodetect on|off")?),
            "ping" => ReplCommand::Ping,
            "mode" => ReplCommand::Mode(match rest.first().map(|s| s.to_lowercase()).as_deref() {
                Some("multi") => SynthMode::Multi,
                Some("poly") => SynthMode::Poly,
                _ => bail!("usage: mode multi|poly"),
            }),
            "dump" => ReplCommand::Dump(number(&rest, 0, "slot", PATCH_SLOT_COUNT)?),
            "dump-all" => ReplCommand::DumpAll,
            "recall" => ReplCommand::Recall {
                channel: number(&rest, 0, "channel", FM_CHANNEL_COUNT)?,
                slot: number(&rest, 1, "slot", PATCH_SLOT_COUNT)?,
            },
            "load" => ReplCommand::Load {
                channel: number(&rest, 0, "channel", FM_CHANNEL_COUNT)?,
                slot: number(&rest, 1, "slot", PATCH_SLOT_COUNT)?,
            },
            "store" => ReplCommand::Store {
                slot: number(&rest, 0, "slot", PATCH_SLOT_COUNT)?,
            },
            "envelope" => ReplCommand::Envelope {
                channel: number(&rest, 0, "channel", PSG_CHANNEL_COUNT)?,
                slot: number(&rest, 1, "slot", PSG_SLOT_COUNT as u8)?,
            },
            "open" => ReplCommand::Open(joined(&rest, "open <index|name>")?),
            "close" => ReplCommand::Close,
            "virtual" => ReplCommand::Virtual(if rest.is_empty() {
                None
            } else {
                Some(rest.join(" "))
            }),
            "unvirtual" => ReplCommand::Unvirtual,
            "forward" => ReplCommand::Forward(switch(&rest, "forward on|off")?),
            "bank" => ReplCommand::Bank,
            "quit" | "exit" => ReplCommand::Quit,
            other => bail!("unknown command '{}', type 'help'", other),
        };

        Ok(Some(cmd))
    }
}

fn joined(args: &[&str], usage: &str) -> Result<String> {
    if args.is_empty() {
        bail!("usage: {}", usage);
    }
    Ok(args.join(" "))
}

fn switch(args: &[&str], usage: &str) -> Result<bool> {
    match args.first().map(|s| s.to_lowercase()).as_deref() {
        Some("on") | Some("true") | Some("1") => Ok(true),
        Some("off") | Some("false") | Some("0") => Ok(false),
        _ => bail!("usage: {}", usage),
    }
}

fn number(args: &[&str], index: usize, what: &str, limit: u8) -> Result<u8> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing {}", what))?;
    let value: u8 = raw
        .parse()
        .with_context(|| format!("invalid {} '{}'", what, raw))?;
    if value >= limit {
        bail!("{} must be below {}", what, limit);
    }
    Ok(value)
}

pub fn print_help() {
    println!("{}", "Commands:".bold());
    let rows = [
        ("status", "connection, input and forwarding state"),
        ("serial", "list serial ports"),
        ("connect <port>", "open a serial port"),
        ("disconnect", "close the serial port"),
        ("autodetect on|off", "scan for a synth board"),
        ("ping", "ask the device to identify"),
        ("mode multi|poly", "voice allocation mode"),
        ("dump <slot>", "request one stored patch"),
        ("dump-all", "request every stored patch"),
        ("recall <ch> <slot>", "recall a stored patch on a channel"),
        ("load <ch> <slot>", "send a bank patch to a channel"),
        ("store <slot>", "store a bank patch in a device slot"),
        ("envelope <ch> <slot>", "send a bank PSG envelope to a channel"),
        ("ports", "list MIDI inputs"),
        ("open <index|name>", "open a MIDI input"),
        ("close", "close the MIDI input"),
        ("virtual [name]", "publish a virtual MIDI input"),
        ("unvirtual", "remove the virtual MIDI input"),
        ("forward on|off", "forward MIDI input to the synth"),
        ("bank", "show the local patch bank"),
        ("quit", "exit"),
    ];
    for (cmd, what) in rows {
        println!("  {:22} {}", cmd.cyan(), what);
    }
}

/// Run the line editor on a dedicated thread.
///
/// Parse errors are printed in place; Ctrl-D / Ctrl-C end the console with
/// `Quit`.
pub fn spawn_repl() -> Result<mpsc::UnboundedReceiver<ReplCommand>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut editor = DefaultEditor::new()?;

    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    match ReplCommand::parse(&line) {
                        Ok(Some(cmd)) => {
                            let quit = cmd == ReplCommand::Quit;
                            if tx.send(cmd).is_err() || quit {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{}", e.to_string().red()),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = tx.send(ReplCommand::Quit);
                    break;
                }
                Err(e) => {
                    eprintln!("console error: {}", e);
                    let _ = tx.send(ReplCommand::Quit);
                    break;
                }
            }
        })
        .context("Failed to start console thread")?;

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ReplCommand {
        ReplCommand::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(ReplCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_connect_keeps_display_name() {
        assert_eq!(
            parse("connect COM3 - Arduino Uno"),
            ReplCommand::Connect("COM3 - Arduino Uno".to_string())
        );
        assert!(ReplCommand::parse("connect").is_err());
    }

    #[test]
    fn test_numeric_arguments_are_range_checked() {
        assert_eq!(parse("recall 5 15"), ReplCommand::Recall { channel: 5, slot: 15 });
        assert_eq!(parse("load 0 3"), ReplCommand::Load { channel: 0, slot: 3 });
        assert_eq!(parse("DUMP 2"), ReplCommand::Dump(2));
        assert!(ReplCommand::parse("recall 6 0").is_err());
        assert!(ReplCommand::parse("dump 16").is_err());
        assert!(ReplCommand::parse("store x").is_err());
        assert_eq!(parse("envelope 3 7"), ReplCommand::Envelope { channel: 3, slot: 7 });
        assert!(ReplCommand::parse("envelope 4 0").is_err());
    }

    #[test]
    fn test_switches_and_modes() {
        assert_eq!(parse("forward off"), ReplCommand::Forward(false));
        assert_eq!(parse("autodetect on"), ReplCommand::AutoDetect(true));
        assert_eq!(parse("mode poly"), ReplCommand::Mode(SynthMode::Poly));
        assert!(ReplCommand::parse("mode mono").is_err());
        assert!(ReplCommand::parse("forward maybe").is_err());
    }

    #[test]
    fn test_virtual_name_is_optional() {
        assert_eq!(parse("virtual"), ReplCommand::Virtual(None));
        assert_eq!(
            parse("virtual Genesis In"),
            ReplCommand::Virtual(Some("Genesis In".to_string()))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert!(ReplCommand::parse("reboot").is_err());
        assert_eq!(parse("exit"), ReplCommand::Quit);
    }
}
