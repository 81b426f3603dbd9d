//! In-memory serial ports for tests

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::{LineSettings, PortDescriptor, SerialConnector, SerialReader, SerialTransport, TransportError};

/// Shared view on a mock port, kept by the test
#[derive(Clone)]
pub struct MockWire {
    written: Arc<Mutex<Vec<u8>>>,
    inbound_tx: Sender<io::Result<Vec<u8>>>,
    inbound_rx: Receiver<io::Result<Vec<u8>>>,
    fail_writes: Arc<Mutex<bool>>,
    readers: Arc<AtomicUsize>,
}

impl MockWire {
    fn new() -> Self {
        let (inbound_tx, inbound_rx) = channel::unbounded();
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            inbound_tx,
            inbound_rx,
            fail_writes: Arc::new(Mutex::new(false)),
            readers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Everything the session wrote so far
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn clear_written(&self) {
        self.written.lock().clear();
    }

    /// Bytes the device "sends"
    pub fn inject(&self, bytes: &[u8]) {
        let _ = self.inbound_tx.send(Ok(bytes.to_vec()));
    }

    /// Simulate the device disappearing
    pub fn unplug(&self) {
        let _ = self.inbound_tx.send(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device unplugged",
        )));
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    /// Reader handles currently holding the port
    pub fn open_readers(&self) -> usize {
        self.readers.load(Ordering::SeqCst)
    }
}

/// Connector with a fixed list of ports
pub struct MockConnector {
    ports: Mutex<Vec<PortDescriptor>>,
    wire: MockWire,
    pub list_calls: AtomicUsize,
    pub open_calls: AtomicUsize,
}

impl MockConnector {
    pub fn new(ports: Vec<PortDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            ports: Mutex::new(ports),
            wire: MockWire::new(),
            list_calls: AtomicUsize::new(0),
            open_calls: AtomicUsize::new(0),
        })
    }

    pub fn with_port(name: &str) -> Arc<Self> {
        Self::new(vec![port(name, "", None)])
    }

    pub fn wire(&self) -> MockWire {
        self.wire.clone()
    }

    pub fn set_ports(&self, ports: Vec<PortDescriptor>) {
        *self.ports.lock() = ports;
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

pub fn port(name: &str, description: &str, ids: Option<(u16, u16)>) -> PortDescriptor {
    PortDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        vid: ids.map(|(v, _)| v),
        pid: ids.map(|(_, p)| p),
    }
}

impl SerialConnector for MockConnector {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ports.lock().clone())
    }

    fn open(
        &self,
        port: &str,
        _settings: &LineSettings,
    ) -> Result<Box<dyn SerialTransport>, TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);

        if !self.ports.lock().iter().any(|p| p.name == port) {
            return Err(TransportError::Open {
                port: port.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }

        Ok(Box::new(MockTransport {
            name: port.to_string(),
            wire: self.wire.clone(),
        }))
    }
}

struct MockTransport {
    name: String,
    wire: MockWire,
}

impl SerialTransport for MockTransport {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if *self.wire.fail_writes.lock() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        self.wire.written.lock().extend_from_slice(data);
        Ok(())
    }

    fn reader(&self) -> io::Result<Box<dyn SerialReader>> {
        self.wire.readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockReader {
            rx: self.wire.inbound_rx.clone(),
            readers: self.wire.readers.clone(),
        }))
    }
}

struct MockReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    readers: Arc<AtomicUsize>,
}

impl Drop for MockReader {
    fn drop(&mut self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SerialReader for MockReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.recv_timeout(super::READ_POLL_INTERVAL) {
            Ok(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock wire dropped",
            )),
        }
    }
}
