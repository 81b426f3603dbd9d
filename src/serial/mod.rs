//! Serial transport to the synth board
//!
//! The session talks to the wire through `SerialConnector` / `SerialTransport`
//! so the real `serialport` backend can be swapped for an in-memory port in
//! tests.

pub mod detect;
#[cfg(test)]
pub(crate) mod mock;

use std::io::{self, Read, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub use detect::{BoardType, DetectRules};

/// Line speed expected by the firmware
pub const BAUD_RATE: u32 = 115_200;

/// Read timeout of the reader thread; bounds how long a cancel takes
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fixed line parameters: 8 data bits, no parity, 1 stop bit, no flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout: READ_POLL_INTERVAL,
        }
    }
}

/// Transport failures (open, read, write, enumeration)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),
}

/// Metadata about one serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// System name used to open the port (e.g. `/dev/ttyACM0`, `COM3`)
    pub name: String,
    /// Human readable description (USB product or manufacturer string)
    pub description: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortDescriptor {
    /// `"<name> - <description>"`, or just the name without a description
    pub fn display_name(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.description)
        }
    }
}

/// Strip a display suffix (`"COM3 - Arduino Uno"` → `"COM3"`)
pub fn system_port_name(display_name: &str) -> &str {
    display_name
        .split(" - ")
        .next()
        .unwrap_or(display_name)
        .trim()
}

/// Read half of an open port, owned by the reader thread
pub trait SerialReader: Send {
    /// Read available bytes. Returns `Ok(0)` when the poll interval elapsed
    /// without data.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Write half of an open port, owned by the session actor
pub trait SerialTransport: Send {
    fn port_name(&self) -> &str;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Independent read handle on the same port
    fn reader(&self) -> io::Result<Box<dyn SerialReader>>;
}

/// Factory for transports and source of port listings
pub trait SerialConnector: Send + Sync {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, TransportError>;

    fn open(
        &self,
        port: &str,
        settings: &LineSettings,
    ) -> Result<Box<dyn SerialTransport>, TransportError>;
}

/// Connector backed by the operating system's serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnector;

impl SerialConnector for SystemConnector {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, TransportError> {
        let ports = serialport::available_ports()
            .map_err(|e| TransportError::Enumerate(e.to_string()))?;

        Ok(ports
            .into_iter()
            .map(|info| match info.port_type {
                serialport::SerialPortType::UsbPort(usb) => PortDescriptor {
                    name: info.port_name,
                    description: usb.product.or(usb.manufacturer).unwrap_or_default(),
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                },
                serialport::SerialPortType::BluetoothPort => PortDescriptor {
                    name: info.port_name,
                    description: "Bluetooth".to_string(),
                    vid: None,
                    pid: None,
                },
                _ => PortDescriptor {
                    name: info.port_name,
                    description: String::new(),
                    vid: None,
                    pid: None,
                },
            })
            .collect())
    }

    fn open(
        &self,
        port: &str,
        settings: &LineSettings,
    ) -> Result<Box<dyn SerialTransport>, TransportError> {
        let handle = serialport::new(port, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: port.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Opened serial port {} at {} baud", port, settings.baud_rate);

        Ok(Box::new(SystemTransport {
            name: port.to_string(),
            port: handle,
        }))
    }
}

struct SystemTransport {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport for SystemTransport {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn reader(&self) -> io::Result<Box<dyn SerialReader>> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(Box::new(SystemReader { port }))
    }
}

struct SystemReader {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialReader for SystemReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial device closed",
            )),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_port_name() {
        assert_eq!(system_port_name("COM3 - Arduino Uno"), "COM3");
        assert_eq!(system_port_name("/dev/ttyACM0"), "/dev/ttyACM0");
    }

    #[test]
    fn test_display_name() {
        let port = PortDescriptor {
            name: "/dev/ttyACM0".to_string(),
            description: "Teensyduino".to_string(),
            vid: None,
            pid: None,
        };
        assert_eq!(port.display_name(), "/dev/ttyACM0 - Teensyduino");

        let bare = PortDescriptor {
            description: String::new(),
            ..port
        };
        assert_eq!(bare.display_name(), "/dev/ttyACM0");
    }

    #[test]
    fn test_default_line_settings() {
        let settings = LineSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.read_timeout, READ_POLL_INTERVAL);
    }
}
