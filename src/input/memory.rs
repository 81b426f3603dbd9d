//! In-process MIDI input backend
//!
//! Ports are plain names; messages are pushed in through a `MemoryInjector`
//! and reach the handler only while the addressed port is open (or is the
//! virtual port).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{InputError, InputHandler, MidiInputBackend};

#[derive(Debug, Default)]
struct MemoryPorts {
    ports: Vec<String>,
    open: Option<String>,
    virtual_port: Option<String>,
}

pub struct MemoryBackend {
    shared: Arc<Mutex<MemoryPorts>>,
    handler: InputHandler,
    virtual_capable: bool,
    // Mirrors of the shared state, so the trait can hand out `&str`
    open: Option<String>,
    virtual_port: Option<String>,
}

impl MemoryBackend {
    pub fn new(ports: Vec<String>, handler: InputHandler) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MemoryPorts {
                ports,
                ..Default::default()
            })),
            handler,
            virtual_capable: true,
            open: None,
            virtual_port: None,
        }
    }

    /// Behave like a facility without virtual port support
    pub fn without_virtual_ports(mut self) -> Self {
        self.virtual_capable = false;
        self
    }

    pub fn injector(&self) -> MemoryInjector {
        MemoryInjector {
            shared: self.shared.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl MidiInputBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn list_ports(&self) -> Result<Vec<String>, InputError> {
        Ok(self.shared.lock().ports.clone())
    }

    fn open_index(&mut self, index: usize) -> Result<String, InputError> {
        self.close();

        let mut shared = self.shared.lock();
        let count = shared.ports.len();
        let port = shared
            .ports
            .get(index)
            .cloned()
            .ok_or(InputError::InvalidIndex { index, count })?;
        shared.open = Some(port.clone());
        self.open = Some(port.clone());
        Ok(port)
    }

    fn close(&mut self) {
        self.shared.lock().open = None;
        self.open = None;
    }

    fn current_port(&self) -> Option<&str> {
        self.open.as_deref()
    }

    fn can_create_virtual_port(&self) -> bool {
        self.virtual_capable
    }

    fn create_virtual_port(&mut self, name: &str) -> Result<(), InputError> {
        if !self.virtual_capable {
            return Err(InputError::VirtualPortsUnsupported);
        }
        if self.virtual_port.is_none() {
            self.shared.lock().virtual_port = Some(name.to_string());
            self.virtual_port = Some(name.to_string());
        }
        Ok(())
    }

    fn destroy_virtual_port(&mut self) {
        self.shared.lock().virtual_port = None;
        self.virtual_port = None;
    }

    fn virtual_port(&self) -> Option<&str> {
        self.virtual_port.as_deref()
    }
}

/// Test-side sender into a `MemoryBackend`
#[derive(Clone)]
pub struct MemoryInjector {
    shared: Arc<Mutex<MemoryPorts>>,
    handler: InputHandler,
}

impl MemoryInjector {
    /// Deliver `bytes` as received on `port`. Returns false when that port
    /// is neither open nor the virtual port.
    pub fn send(&self, port: &str, bytes: &[u8]) -> bool {
        let listening = {
            let shared = self.shared.lock();
            shared.open.as_deref() == Some(port) || shared.virtual_port.as_deref() == Some(port)
        };

        if listening {
            (self.handler)(bytes);
        } else {
            trace!("Memory port {} not open, dropping message", port);
        }
        listening
    }

    /// Replace the port list (simulates hot-plug)
    pub fn set_ports(&self, ports: Vec<String>) {
        self.shared.lock().ports = ports;
    }
}
