//! Raw serial device access
//!
//! [`SerialLink`] is the seam between [`SerialTransport`](super::SerialTransport)
//! and the bytes on the wire. [`NativeLink`] drives a real port through the
//! `serialport` crate; the simulator and tests provide their own links.

use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{ProtocolError, SerialConfig};

/// A byte pipe that can be opened with a [`SerialConfig`]
///
/// `read` must not block for long: it returns `Ok(0)` when nothing is
/// available so the transport can apply its own timeouts.
pub trait SerialLink: Send {
    /// Open the device
    fn open(&mut self, port_name: &str, config: &SerialConfig) -> Result<(), ProtocolError>;

    /// Close the device; closing a closed link is a no-op
    fn close(&mut self);

    /// Whether the device is open
    fn is_open(&self) -> bool;

    /// Read whatever is available into `buf`
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf`
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Discard buffered data
    fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()>;
}

/// [`SerialLink`] backed by an OS serial port
#[derive(Default)]
pub struct NativeLink {
    port: Option<Box<dyn SerialPort>>,
}

impl NativeLink {
    /// Create a closed link
    pub fn new() -> Self {
        Self::default()
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is not open"))
    }
}

impl SerialLink for NativeLink {
    fn open(&mut self, port_name: &str, config: &SerialConfig) -> Result<(), ProtocolError> {
        let mut port = serialport::new(port_name, config.baud_rate.value())
            .data_bits(config.data_bits.into())
            .stop_bits(config.stop_bits.into())
            .parity(config.parity.into())
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .open()
            .map_err(|e| ProtocolError::OpenFailed {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            tracing::debug!("{}: failed to set DTR high: {} (continuing)", port_name, e);
        }

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let port = self.port()?;
        let available = port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }
        let to_read = available.min(buf.len());
        match port.read(&mut buf[..to_read]) {
            Ok(n) => Ok(n),
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(buf)?;
        port.flush()
    }

    fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
        self.port()?.clear(buffer).map_err(io::Error::from)
    }
}
