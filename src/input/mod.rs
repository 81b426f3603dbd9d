//! MIDI input backends
//!
//! `MidiInputBackend` hides the native MIDI facility (ALSA, CoreMIDI, WinMM
//! through `midir`, or the in-process `MemoryBackend`). Every backend hands
//! complete raw messages to the `InputHandler` it was built with; the
//! handler runs on the backend's delivery thread and must not block.

mod memory;
mod midir_backend;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{AppEvent, EventSender};

pub use memory::{MemoryBackend, MemoryInjector};
pub use midir_backend::MidirBackend;

/// Callback receiving each raw inbound MIDI message
pub type InputHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("MIDI backend initialization failed: {0}")]
    Init(String),

    #[error("MIDI input port not found: {0}")]
    PortNotFound(String),

    #[error("MIDI input index {index} out of range ({count} ports)")]
    InvalidIndex { index: usize, count: usize },

    #[error("failed to open MIDI input {port}: {reason}")]
    Connect { port: String, reason: String },

    #[error("virtual MIDI ports are not supported by this backend")]
    VirtualPortsUnsupported,
}

/// Capability contract of a native MIDI input facility
pub trait MidiInputBackend: Send {
    /// Short backend label for logs
    fn name(&self) -> &'static str;

    /// Input port display names, in system order
    fn list_ports(&self) -> Result<Vec<String>, InputError>;

    /// Open the port at `index`, closing any open port first.
    /// Returns the opened port's name.
    fn open_index(&mut self, index: usize) -> Result<String, InputError>;

    /// Open a port by name: exact match first, then case-insensitive substring
    fn open_name(&mut self, name: &str) -> Result<String, InputError> {
        let ports = self.list_ports()?;
        let index =
            find_port_index(&ports, name).ok_or_else(|| InputError::PortNotFound(name.to_string()))?;
        self.open_index(index)
    }

    /// Close the open port; no-op when nothing is open
    fn close(&mut self);

    fn current_port(&self) -> Option<&str>;

    fn is_open(&self) -> bool {
        self.current_port().is_some()
    }

    fn can_create_virtual_port(&self) -> bool {
        false
    }

    /// Publish a virtual input port other applications can send to.
    /// Creating it again while it exists is a no-op.
    fn create_virtual_port(&mut self, _name: &str) -> Result<(), InputError> {
        Err(InputError::VirtualPortsUnsupported)
    }

    fn destroy_virtual_port(&mut self) {}

    fn virtual_port(&self) -> Option<&str> {
        None
    }
}

/// Exact name match first, then case-insensitive substring
pub fn find_port_index(ports: &[String], name: &str) -> Option<usize> {
    if let Some(index) = ports.iter().position(|p| p == name) {
        return Some(index);
    }

    let needle = name.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    ports
        .iter()
        .position(|p| p.to_lowercase().contains(&needle))
}

/// Backend wrapper that reports port changes and open/close as `AppEvent`s
pub struct MidiInputManager {
    backend: Box<dyn MidiInputBackend>,
    events: EventSender,
    known_ports: Vec<String>,
}

impl MidiInputManager {
    pub fn new(backend: Box<dyn MidiInputBackend>, events: EventSender) -> Self {
        Self {
            backend,
            events,
            known_ports: Vec::new(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Re-enumerate ports; emits `PortsChanged` when the list differs
    pub fn refresh_ports(&mut self) -> Result<Vec<String>, InputError> {
        let ports = self.backend.list_ports()?;
        if ports != self.known_ports {
            debug!("MIDI input ports changed: {:?}", ports);
            self.known_ports = ports.clone();
            let _ = self.events.send(AppEvent::PortsChanged(ports.clone()));
        }
        Ok(ports)
    }

    /// Open by index when `selector` is a number within range, else by name
    pub fn open(&mut self, selector: &str) -> Result<String, InputError> {
        match selector.trim().parse::<usize>() {
            Ok(index) if index < self.refresh_ports()?.len() => self.open_index(index),
            _ => self.open_name(selector.trim()),
        }
    }

    pub fn open_index(&mut self, index: usize) -> Result<String, InputError> {
        let result = self.backend.open_index(index);
        self.opened(result)
    }

    pub fn open_name(&mut self, name: &str) -> Result<String, InputError> {
        let result = self.backend.open_name(name);
        self.opened(result)
    }

    fn opened(&mut self, result: Result<String, InputError>) -> Result<String, InputError> {
        match &result {
            Ok(port) => {
                info!("MIDI input opened: {}", port);
                let _ = self.events.send(AppEvent::InputOpened(port.clone()));
            }
            Err(e) => warn!("MIDI input open failed: {}", e),
        }
        result
    }

    pub fn close(&mut self) {
        if self.backend.is_open() {
            self.backend.close();
            info!("MIDI input closed");
            let _ = self.events.send(AppEvent::InputClosed);
        }
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    pub fn current_port(&self) -> Option<&str> {
        self.backend.current_port()
    }

    pub fn can_create_virtual_port(&self) -> bool {
        self.backend.can_create_virtual_port()
    }

    pub fn create_virtual_port(&mut self, name: &str) -> Result<(), InputError> {
        if self.backend.virtual_port().is_some() {
            return Ok(());
        }
        self.backend.create_virtual_port(name)?;
        info!("Virtual MIDI input created: {}", name);
        let _ = self
            .events
            .send(AppEvent::VirtualPortCreated(name.to_string()));
        Ok(())
    }

    pub fn destroy_virtual_port(&mut self) {
        if self.backend.virtual_port().is_some() {
            self.backend.destroy_virtual_port();
            info!("Virtual MIDI input destroyed");
            let _ = self.events.send(AppEvent::VirtualPortDestroyed);
        }
    }

    pub fn virtual_port(&self) -> Option<&str> {
        self.backend.virtual_port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn noop() -> InputHandler {
        Arc::new(|_: &[u8]| {})
    }

    #[test]
    fn test_find_port_index_prefers_exact_match() {
        let ports = names(&["Keystation 49 MIDI 1", "Keystation", "Launchkey Mini"]);
        assert_eq!(find_port_index(&ports, "Keystation"), Some(1));
        assert_eq!(find_port_index(&ports, "launchkey"), Some(2));
        assert_eq!(find_port_index(&ports, "KEYSTATION 49"), Some(0));
        assert_eq!(find_port_index(&ports, "Oxygen"), None);
        assert_eq!(find_port_index(&ports, ""), None);
    }

    #[test]
    fn test_manager_reports_port_changes_once() {
        let (tx, mut rx) = events::channel();
        let backend = MemoryBackend::new(names(&["Keys"]), noop());
        let injector = backend.injector();
        let mut manager = MidiInputManager::new(Box::new(backend), tx);

        manager.refresh_ports().unwrap();
        manager.refresh_ports().unwrap();
        assert_eq!(rx.try_recv().unwrap(), AppEvent::PortsChanged(names(&["Keys"])));
        assert!(rx.try_recv().is_err());

        injector.set_ports(names(&["Keys", "Pads"]));
        manager.refresh_ports().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::PortsChanged(names(&["Keys", "Pads"]))
        );
    }

    #[test]
    fn test_manager_open_by_index_or_name() {
        let (tx, mut rx) = events::channel();
        let backend = MemoryBackend::new(names(&["Keys", "Pads"]), noop());
        let mut manager = MidiInputManager::new(Box::new(backend), tx);

        assert_eq!(manager.open("1").unwrap(), "Pads");
        assert_eq!(manager.open("keys").unwrap(), "Keys");
        assert_eq!(manager.current_port(), Some("Keys"));

        let opened: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, AppEvent::InputOpened(_)))
            .collect();
        assert_eq!(
            opened,
            vec![
                AppEvent::InputOpened("Pads".to_string()),
                AppEvent::InputOpened("Keys".to_string())
            ]
        );

        assert!(matches!(
            manager.open("Drums"),
            Err(InputError::PortNotFound(_))
        ));
    }

    #[test]
    fn test_manager_close_is_idempotent() {
        let (tx, mut rx) = events::channel();
        let backend = MemoryBackend::new(names(&["Keys"]), noop());
        let mut manager = MidiInputManager::new(Box::new(backend), tx);

        manager.open_index(0).unwrap();
        manager.close();
        manager.close();

        let closed = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| *e == AppEvent::InputClosed)
            .count();
        assert_eq!(closed, 1);
        assert!(!manager.is_open());
    }

    #[test]
    fn test_virtual_port_unsupported() {
        let (tx, mut rx) = events::channel();
        let backend = MemoryBackend::new(Vec::new(), noop()).without_virtual_ports();
        let mut manager = MidiInputManager::new(Box::new(backend), tx);

        assert!(!manager.can_create_virtual_port());
        assert!(matches!(
            manager.create_virtual_port("GenesisEngineSynth"),
            Err(InputError::VirtualPortsUnsupported)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_virtual_port_lifecycle() {
        let (tx, mut rx) = events::channel();
        let backend = MemoryBackend::new(Vec::new(), noop());
        let mut manager = MidiInputManager::new(Box::new(backend), tx);

        manager.create_virtual_port("GenesisEngineSynth").unwrap();
        manager.create_virtual_port("GenesisEngineSynth").unwrap();
        assert_eq!(manager.virtual_port(), Some("GenesisEngineSynth"));

        manager.destroy_virtual_port();
        manager.destroy_virtual_port();

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                AppEvent::VirtualPortCreated("GenesisEngineSynth".to_string()),
                AppEvent::VirtualPortDestroyed
            ]
        );
    }
}
