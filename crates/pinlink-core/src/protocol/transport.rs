//! Serial transport
//!
//! Byte-level reads and writes with per-byte timeouts, bounded string reads
//! and line-ending handling on top of a [`SerialLink`].

use serialport::ClearBuffer;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::link::{NativeLink, SerialLink};
use super::serial::{is_bluetooth, BaudRate, DataBits, LineEnding, Parity, SerialConfig, StopBits};
use super::ProtocolError;

/// A named serial port plus its line settings
pub struct SerialTransport {
    port_name: String,
    config: SerialConfig,
    link: Box<dyn SerialLink>,
    poll_interval: Duration,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("config", &self.config)
            .field("open", &self.link.is_open())
            .finish()
    }
}

/// Printable ASCII, including space
fn is_printable(b: u8) -> bool {
    b.is_ascii_graphic() || b == b' '
}

impl SerialTransport {
    /// Transport for an OS serial port (not yet opened)
    pub fn new(port_name: impl Into<String>, config: SerialConfig) -> Self {
        Self::with_link(port_name, config, Box::new(NativeLink::new()))
    }

    /// Transport over a caller-supplied link
    pub fn with_link(
        port_name: impl Into<String>,
        config: SerialConfig,
        link: Box<dyn SerialLink>,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            config,
            link,
            poll_interval: Duration::from_millis(1),
        }
    }

    /// Open the port. Bluetooth ports wait `boot_time_ms` before first use.
    pub fn open(&mut self) -> Result<(), ProtocolError> {
        if self.link.is_open() {
            return Ok(());
        }
        tracing::info!(
            "Opening {} at {} baud ({}{}{})",
            self.port_name,
            self.config.baud_rate,
            self.config.data_bits,
            self.config.parity.to_string().chars().next().unwrap_or('N'),
            self.config.stop_bits
        );
        self.link.open(&self.port_name, &self.config)?;

        if self.is_bluetooth() && self.config.boot_time_ms > 0 {
            tracing::debug!(
                "{}: waiting {}ms for bluetooth bridge",
                self.port_name,
                self.config.boot_time_ms
            );
            std::thread::sleep(Duration::from_millis(self.config.boot_time_ms));
        }

        // Stale bytes from before the open are never part of a response
        let _ = self.link.clear(ClearBuffer::All);
        Ok(())
    }

    /// Close the port
    pub fn close(&mut self) {
        if self.link.is_open() {
            tracing::info!("Closing {}", self.port_name);
        }
        self.link.close();
    }

    /// Whether the port is open
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Port name as given at construction
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Current settings
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Whether the port name looks like a Bluetooth bridge
    pub fn is_bluetooth(&self) -> bool {
        is_bluetooth(&self.port_name)
    }

    fn ensure_open(&self) -> Result<(), ProtocolError> {
        if self.link.is_open() {
            Ok(())
        } else {
            Err(ProtocolError::NotConnected)
        }
    }

    /// Wait up to `timeout` for one printable byte; non-printable bytes are dropped.
    ///
    /// `Ok(None)` means nothing arrived in time.
    pub fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, ProtocolError> {
        self.read_byte_cancellable(timeout, None)
    }

    fn read_byte_cancellable(
        &mut self,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<u8>, ProtocolError> {
        self.ensure_open()?;
        let start = Instant::now();
        let mut buf = [0u8; 1];
        loop {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(ProtocolError::Cancelled);
            }
            match self.link.read(&mut buf) {
                Ok(0) => {}
                Ok(_) if is_printable(buf[0]) => return Ok(Some(buf[0])),
                Ok(_) if start.elapsed() < timeout => continue,
                Ok(_) => return Ok(None),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(ProtocolError::IoError(e)),
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn byte_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Read up to `max_len` printable bytes, stopping after `retry_count`
    /// consecutive empty reads
    pub fn read_string(&mut self, max_len: usize) -> Result<String, ProtocolError> {
        self.read_string_cancellable(max_len, None)
    }

    pub(crate) fn read_string_cancellable(
        &mut self,
        max_len: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, ProtocolError> {
        self.read_bounded(max_len, None, cancel)
    }

    /// Like [`read_string`](Self::read_string) but also stops once the data read
    /// ends with `terminator`
    pub fn read_until(&mut self, terminator: &str, max_len: usize) -> Result<String, ProtocolError> {
        self.read_until_cancellable(terminator, max_len, None)
    }

    pub(crate) fn read_until_cancellable(
        &mut self,
        terminator: &str,
        max_len: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, ProtocolError> {
        if terminator.len() > max_len {
            return Err(ProtocolError::InvalidArgument(format!(
                "terminator {:?} is longer than the maximum read length {}",
                terminator, max_len
            )));
        }
        self.read_bounded(max_len, Some(terminator), cancel)
    }

    fn read_bounded(
        &mut self,
        max_len: usize,
        terminator: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, ProtocolError> {
        self.ensure_open()?;
        let allowed_misses = self.config.retry_count.max(1);
        let timeout = self.byte_timeout();
        let mut out = String::new();
        let mut misses = 0;

        while out.len() < max_len {
            match self.read_byte_cancellable(timeout, cancel)? {
                Some(b) => {
                    out.push(b as char);
                    misses = 0;
                    if terminator.is_some_and(|t| !t.is_empty() && out.ends_with(t)) {
                        break;
                    }
                }
                None => {
                    misses += 1;
                    if misses >= allowed_misses {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Write `s` one byte at a time, appending the line ending when missing.
    ///
    /// Returns the number of bytes written.
    pub fn write_string(&mut self, s: &str) -> Result<usize, ProtocolError> {
        self.write_string_cancellable(s, None)
    }

    pub(crate) fn write_string_cancellable(
        &mut self,
        s: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<usize, ProtocolError> {
        self.ensure_open()?;
        let mut data = s.to_string();
        let ending = self.config.line_ending.as_str();
        if !ending.is_empty() && !data.ends_with(ending) {
            data.push_str(ending);
        }
        tracing::trace!("{} <- {:?}", self.port_name, data);
        for b in data.bytes() {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(ProtocolError::Cancelled);
            }
            self.link.write_all(&[b])?;
        }
        Ok(data.len())
    }

    /// Discard unread input
    pub fn flush_rx(&mut self) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        self.link.clear(ClearBuffer::Input)?;
        Ok(())
    }

    /// Discard unsent output
    pub fn flush_tx(&mut self) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        self.link.clear(ClearBuffer::Output)?;
        Ok(())
    }

    /// Discard both directions
    pub fn flush_rx_tx(&mut self) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        self.link.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn ensure_closed(&self, setting: &'static str) -> Result<(), ProtocolError> {
        if self.link.is_open() {
            Err(ProtocolError::PortOpen(setting))
        } else {
            Ok(())
        }
    }

    /// Line speed
    pub fn baud_rate(&self) -> BaudRate {
        self.config.baud_rate
    }

    /// Change the line speed; port must be closed
    pub fn set_baud_rate(&mut self, baud_rate: BaudRate) -> Result<(), ProtocolError> {
        self.ensure_closed("baud rate")?;
        self.config.baud_rate = baud_rate;
        Ok(())
    }

    /// Data bits per character
    pub fn data_bits(&self) -> DataBits {
        self.config.data_bits
    }

    /// Change data bits; port must be closed
    pub fn set_data_bits(&mut self, data_bits: DataBits) -> Result<(), ProtocolError> {
        self.ensure_closed("data bits")?;
        self.config.data_bits = data_bits;
        Ok(())
    }

    /// Stop bits
    pub fn stop_bits(&self) -> StopBits {
        self.config.stop_bits
    }

    /// Change stop bits; port must be closed
    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<(), ProtocolError> {
        self.ensure_closed("stop bits")?;
        self.config.stop_bits = stop_bits;
        Ok(())
    }

    /// Parity
    pub fn parity(&self) -> Parity {
        self.config.parity
    }

    /// Change parity; port must be closed
    pub fn set_parity(&mut self, parity: Parity) -> Result<(), ProtocolError> {
        self.ensure_closed("parity")?;
        self.config.parity = parity;
        Ok(())
    }

    /// Line ending appended to writes
    pub fn line_ending(&self) -> LineEnding {
        self.config.line_ending
    }

    /// Change the line ending; port must be closed
    pub fn set_line_ending(&mut self, line_ending: LineEnding) -> Result<(), ProtocolError> {
        self.ensure_closed("line ending")?;
        self.config.line_ending = line_ending;
        Ok(())
    }

    /// Per-byte read timeout in milliseconds
    pub fn timeout_ms(&self) -> u64 {
        self.config.timeout_ms
    }

    /// Change the per-byte read timeout. Allowed while open.
    ///
    /// With 0 each read takes only what is already buffered.
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.config.timeout_ms = timeout_ms;
    }

    /// Consecutive empty reads tolerated by a string read
    pub fn retry_count(&self) -> u32 {
        self.config.retry_count
    }

    /// Change the consecutive empty read limit
    pub fn set_retry_count(&mut self, retry_count: u32) {
        self.config.retry_count = retry_count;
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.link.close();
    }
}
