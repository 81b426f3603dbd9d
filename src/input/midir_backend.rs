//! Native MIDI input through `midir`
//!
//! `midir` selects the platform facility at build time: ALSA on Linux,
//! CoreMIDI on macOS, WinMM on Windows. Virtual ports exist on the Unix
//! facilities only.

use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::{debug, info, trace};

use super::{InputError, InputHandler, MidiInputBackend};
use crate::midi::format_hex;

pub struct MidirBackend {
    client_name: String,
    handler: InputHandler,
    connection: Option<(MidiInputConnection<()>, String)>,
    virtual_connection: Option<(MidiInputConnection<()>, String)>,
}

impl MidirBackend {
    pub fn new(client_name: impl Into<String>, handler: InputHandler) -> Self {
        Self {
            client_name: client_name.into(),
            handler,
            connection: None,
            virtual_connection: None,
        }
    }

    fn client(&self, suffix: &str) -> Result<MidiInput, InputError> {
        let mut midi_in = MidiInput::new(&format!("{}-{}", self.client_name, suffix))
            .map_err(|e| InputError::Init(e.to_string()))?;
        // SysEx included
        midi_in.ignore(Ignore::None);
        Ok(midi_in)
    }

    fn callback(&self) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
        let handler = self.handler.clone();
        move |_timestamp, data, _| {
            trace!("MIDI IN {}", format_hex(data));
            handler(data);
        }
    }
}

/// Display name of a port, `"Port <n>"` when the system has none for it
fn port_label(index: usize, name: Option<String>) -> String {
    name.unwrap_or_else(|| format!("Port {}", index))
}

impl MidiInputBackend for MidirBackend {
    fn name(&self) -> &'static str {
        "midir"
    }

    fn list_ports(&self) -> Result<Vec<String>, InputError> {
        let midi_in = self.client("scanner")?;
        // Every port keeps its position, so an index from this list is an
        // index into `ports()`
        Ok(midi_in
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| port_label(index, midi_in.port_name(port).ok()))
            .collect())
    }

    fn open_index(&mut self, index: usize) -> Result<String, InputError> {
        self.close();

        let midi_in = self.client("input")?;
        let ports = midi_in.ports();
        let port = ports.get(index).ok_or(InputError::InvalidIndex {
            index,
            count: ports.len(),
        })?;
        let name = port_label(index, midi_in.port_name(port).ok());

        debug!("Connecting to MIDI input port {}: {}", index, name);

        let connection = midi_in
            .connect(port, &self.client_name, self.callback(), ())
            .map_err(|e| InputError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        self.connection = Some((connection, name.clone()));
        Ok(name)
    }

    fn close(&mut self) {
        if let Some((connection, name)) = self.connection.take() {
            connection.close();
            debug!("Closed MIDI input {}", name);
        }
    }

    fn current_port(&self) -> Option<&str> {
        self.connection.as_ref().map(|(_, name)| name.as_str())
    }

    fn can_create_virtual_port(&self) -> bool {
        cfg!(unix)
    }

    #[cfg(unix)]
    fn create_virtual_port(&mut self, name: &str) -> Result<(), InputError> {
        use midir::os::unix::VirtualInput;

        if self.virtual_connection.is_some() {
            return Ok(());
        }

        let midi_in = self.client("virtual")?;
        let connection = midi_in
            .create_virtual(name, self.callback(), ())
            .map_err(|e| InputError::Connect {
                port: name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Published virtual MIDI input '{}'", name);
        self.virtual_connection = Some((connection, name.to_string()));
        Ok(())
    }

    #[cfg(not(unix))]
    fn create_virtual_port(&mut self, _name: &str) -> Result<(), InputError> {
        Err(InputError::VirtualPortsUnsupported)
    }

    fn destroy_virtual_port(&mut self) {
        if let Some((connection, name)) = self.virtual_connection.take() {
            connection.close();
            debug!("Removed virtual MIDI input {}", name);
        }
    }

    fn virtual_port(&self) -> Option<&str> {
        self.virtual_connection
            .as_ref()
            .map(|(_, name)| name.as_str())
    }
}

impl Drop for MidirBackend {
    fn drop(&mut self) {
        self.close();
        self.destroy_virtual_port();
    }
}
