//! Genesis Link
//!
//! Companion link for the GenesisEngine FM synth: opens the synth's serial
//! port, forwards MIDI input to it and drives patch transfer from a console.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genesis_link::bank::PatchBank;
use genesis_link::cli::{self, ReplCommand};
use genesis_link::config::{AppConfig, ConfigWatcher};
use genesis_link::events::{self, AppEvent, EventReceiver};
use genesis_link::input::{MidiInputBackend, MidiInputManager, MidirBackend};
use genesis_link::monitor::{self, Monitor};
use genesis_link::paths::AppPaths;
use genesis_link::router::Router;
use genesis_link::serial::{SerialConnector, SystemConnector};
use genesis_link::session::SessionHandle;

/// Genesis Link - serial and MIDI companion for the GenesisEngine synth
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: application data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// List available serial ports
    #[arg(long)]
    list_serial: bool,

    /// Serial port to open, overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// MIDI input to open (index or name), overrides the config file
    #[arg(long)]
    midi_in: Option<String>,

    /// Publish a virtual MIDI input port
    #[arg(long = "virtual")]
    virtual_port: bool,

    /// Start with MIDI forwarding disabled
    #[arg(long)]
    no_forward: bool,

    /// Print traffic to the console
    #[arg(short, long)]
    monitor: bool,

    /// Also print serial bytes outside SysEx frames when monitoring
    #[arg(long)]
    raw_bytes: bool,

    /// Run without the interactive console
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = match &args.config {
        Some(path) => AppPaths::for_config(path),
        None => AppPaths::detect(),
    };

    let _log_guard = init_logging(&args.log_level, &paths);

    info!("Starting Genesis Link v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());

    let mut config = AppConfig::load_or_default(&paths.config).await?;
    if let Some(port) = &args.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(input) = &args.midi_in {
        config.midi.input_port = Some(input.clone());
    }
    if args.virtual_port {
        config.midi.virtual_port = true;
    }
    if args.no_forward {
        config.midi.forward = false;
    }

    if args.list_serial {
        let ports = SystemConnector.list_ports()?;
        monitor::print_serial_ports(&ports, &config.serial.detect);
        return Ok(());
    }

    if args.list_ports {
        let backend = MidirBackend::new(config.midi.client_name.clone(), Arc::new(|_: &[u8]| {}));
        monitor::print_midi_ports(&backend.list_ports()?, None);
        return Ok(());
    }

    let (events_tx, events_rx) = events::channel();

    let session = SessionHandle::spawn(
        Arc::new(SystemConnector),
        config.session_config(),
        events_tx.clone(),
    );

    let router = Arc::new(Router::new(session.clone(), events_tx.clone()));
    router.set_forwarding_enabled(config.midi.forward);

    let backend = MidirBackend::new(config.midi.client_name.clone(), router.input_handler());
    let inputs = MidiInputManager::new(Box::new(backend), events_tx);
    info!("MIDI input backend: {}", inputs.backend_name());

    let mut app = App {
        config,
        session,
        router,
        inputs,
        bank: PatchBank::factory(),
        monitor: args.monitor.then(|| Monitor::new(args.raw_bytes)),
    };
    app.start().await;

    // Hot reload only applies to a file that already exists
    let watcher = if paths.config.exists() {
        match ConfigWatcher::new(&paths.config) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Config hot-reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let console = if args.headless {
        None
    } else {
        println!("Type {} for the command list", "help".cyan());
        Some(cli::spawn_repl()?)
    };

    run_app(app, events_rx, console, watcher, shutdown_signal()).await?;

    info!("Genesis Link shutdown complete");
    Ok(())
}

struct App {
    config: AppConfig,
    session: SessionHandle,
    router: Arc<Router>,
    inputs: MidiInputManager,
    bank: PatchBank,
    monitor: Option<Monitor>,
}

impl App {
    /// Open the configured serial port and MIDI inputs
    async fn start(&mut self) {
        match self.config.serial.port.clone() {
            Some(port) => {
                if let Err(e) = self.session.connect(port.as_str()).await {
                    warn!("Failed to open {}: {}", port, e);
                    if self.config.serial.auto_detect {
                        self.session.start_auto_detect();
                    }
                }
            }
            None if self.config.serial.auto_detect => self.session.start_auto_detect(),
            None => info!("No serial port configured, use 'connect <port>'"),
        }

        if let Err(e) = self.inputs.refresh_ports() {
            warn!("Failed to list MIDI inputs: {}", e);
        }

        if let Some(selector) = self.config.midi.input_port.clone() {
            if let Err(e) = self.inputs.open(&selector) {
                warn!("Failed to open MIDI input '{}': {}", selector, e);
            }
        }

        if self.config.midi.virtual_port {
            let name = self.config.midi.client_name.clone();
            if let Err(e) = self.inputs.create_virtual_port(&name) {
                warn!("Failed to create virtual MIDI input: {}", e);
            }
        }
    }

    fn on_event(&mut self, event: AppEvent) {
        if let Some(monitor) = &self.monitor {
            monitor.print_event(&event);
        }

        match &event {
            AppEvent::PatchReceived { slot, .. } => {
                if self.bank.apply(&event) {
                    info!(
                        "Patch dump stored in slot {} ({})",
                        slot,
                        self.bank.fm_patch_name(*slot as usize).unwrap_or_default()
                    );
                }
            }
            AppEvent::IdentityReceived { mode, version } => {
                info!("Synth identified: firmware v{}, mode {}", version, mode);
            }
            AppEvent::ConnectionError(_) if self.config.serial.auto_detect => {
                // Pick the board up again once it is plugged back in
                self.session.start_auto_detect();
            }
            _ => debug!("Event: {}", event.kind()),
        }
    }

    /// Returns false when the application should exit
    async fn execute(&mut self, cmd: ReplCommand) -> bool {
        match cmd {
            ReplCommand::Help => cli::print_help(),
            ReplCommand::Status => self.print_status(),
            ReplCommand::Ports => match self.inputs.refresh_ports() {
                Ok(ports) => monitor::print_midi_ports(&ports, self.inputs.current_port()),
                Err(e) => println!("{}", e.to_string().red()),
            },
            ReplCommand::Serial => {
                let ports = self.session.port_descriptors().await;
                monitor::print_serial_ports(&ports, &self.config.serial.detect);
            }
            ReplCommand::Connect(port) => {
                if let Err(e) = self.session.connect(port).await {
                    println!("{}", e.to_string().red());
                }
            }
            ReplCommand::Disconnect => self.session.disconnect().await,
            ReplCommand::AutoDetect(true) => self.session.start_auto_detect(),
            ReplCommand::AutoDetect(false) => self.session.stop_auto_detect(),
            ReplCommand::Ping => {
                if self.require_connection() {
                    self.session.ping();
                }
            }
            ReplCommand::Mode(mode) => {
                if self.require_connection() {
                    self.session.set_mode(mode);
                }
            }
            ReplCommand::Dump(slot) => {
                if self.require_connection() {
                    self.session.request_patch_dump(slot);
                }
            }
            ReplCommand::DumpAll => {
                if self.require_connection() {
                    self.session.request_all_patches();
                }
            }
            ReplCommand::Recall { channel, slot } => {
                if self.require_connection() {
                    self.session.recall_patch(channel, slot);
                }
            }
            ReplCommand::Load { channel, slot } => {
                if let Some(patch) = self.bank.fm_patch(slot as usize) {
                    if self.require_connection() {
                        self.session.load_patch_to_channel(channel, patch);
                    }
                }
            }
            ReplCommand::Store { slot } => {
                if let Some(patch) = self.bank.fm_patch(slot as usize) {
                    if self.require_connection() {
                        self.session.store_patch_to_slot(slot, patch);
                    }
                }
            }
            ReplCommand::Envelope { channel, slot } => {
                if let Some(envelope) = self.bank.psg_envelope(slot as usize) {
                    if self.require_connection() {
                        self.session.load_psg_envelope(channel, envelope);
                    }
                }
            }
            ReplCommand::Open(selector) => {
                if let Err(e) = self.inputs.open(&selector) {
                    println!("{}", e.to_string().red());
                }
            }
            ReplCommand::Close => self.inputs.close(),
            ReplCommand::Virtual(name) => {
                let name = name.unwrap_or_else(|| self.config.midi.client_name.clone());
                if let Err(e) = self.inputs.create_virtual_port(&name) {
                    println!("{}", e.to_string().red());
                }
            }
            ReplCommand::Unvirtual => self.inputs.destroy_virtual_port(),
            ReplCommand::Forward(enabled) => self.router.set_forwarding_enabled(enabled),
            ReplCommand::Bank => self.print_bank(),
            ReplCommand::Quit => return false,
        }
        true
    }

    fn require_connection(&self) -> bool {
        let connected = self.session.is_connected();
        if !connected {
            println!("{}", "Not connected to a synth".red());
        }
        connected
    }

    fn apply_config(&mut self, new: AppConfig) {
        if new.midi.forward != self.config.midi.forward {
            self.router.set_forwarding_enabled(new.midi.forward);
        }
        if new.serial.detect != self.config.serial.detect {
            info!("Auto-detect rules updated");
            self.session.set_detect_rules(new.serial.detect.clone());
        }
        if new.serial.baud_rate != self.config.serial.baud_rate
            || new.serial.auto_detect_interval_ms != self.config.serial.auto_detect_interval_ms
            || new.midi.client_name != self.config.midi.client_name
        {
            warn!("Serial line and MIDI client changes take effect after a restart");
        }
        self.config = new;
    }

    fn print_status(&self) {
        let state = self.session.state();
        let port = self.session.connected_port().unwrap_or_else(|| "-".to_string());
        let stats = self.session.stats();
        let routed = self.router.stats();

        println!("\n{}", "=== Status ===".bold().cyan());
        println!("  Synth:      {} {}", state.to_string().bright_white(), port);
        println!(
            "  Frames:     {} received, {} discarded, {} unknown opcodes",
            stats.frames_received, stats.frames_discarded, stats.unknown_opcodes
        );
        println!(
            "  Bytes:      {} written, {} outside frames",
            stats.bytes_written, stats.raw_bytes
        );
        println!(
            "  MIDI input: {} (virtual: {})",
            self.inputs.current_port().unwrap_or("-"),
            self.inputs.virtual_port().unwrap_or("-")
        );
        println!(
            "  Forwarding: {} ({} received, {} forwarded)",
            if self.router.is_forwarding_enabled() {
                "on".green()
            } else {
                "off".yellow()
            },
            routed.received,
            routed.forwarded
        );
        println!();
    }

    fn print_bank(&self) {
        println!("\n{}", "FM patches:".bold());
        for slot in 0..self.bank.fm_patches().len() {
            println!("  {:2}: {}", slot, self.bank.fm_patch_name(slot).unwrap_or_default());
        }
        println!("\n{}", "PSG envelopes:".bold());
        for slot in 0..self.bank.psg_envelopes().len() {
            println!("  {:2}: {}", slot, self.bank.psg_envelope_name(slot).unwrap_or_default());
        }
        if self.bank.is_modified() {
            println!("\n  {}", "(updated from patch dumps)".dimmed());
        }
        println!();
    }

    async fn shutdown(&mut self) {
        self.inputs.destroy_virtual_port();
        self.inputs.close();
        self.session.shutdown().await;
    }
}

async fn run_app(
    mut app: App,
    mut events: EventReceiver,
    mut console: Option<mpsc::UnboundedReceiver<ReplCommand>>,
    mut watcher: Option<ConfigWatcher>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop...");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events.recv() => app.on_event(event),

            cmd = next_command(&mut console) => match cmd {
                Some(cmd) => {
                    if !app.execute(cmd).await {
                        break;
                    }
                }
                None => break,
            },

            Some(new_config) = next_config(&mut watcher) => app.apply_config(new_config),

            _ = &mut shutdown => break,
        }
    }

    app.shutdown().await;
    Ok(())
}

async fn next_command(console: &mut Option<mpsc::UnboundedReceiver<ReplCommand>>) -> Option<ReplCommand> {
    match console {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

/// Console layer plus a daily JSON log file in the logs directory.
/// The returned guard flushes the file writer when dropped.
fn init_logging(level: &str, paths: &AppPaths) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match paths.ensure_directories() {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&paths.logs_dir, "genesis-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("File logging disabled: {:#}", e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}
