//! Protocol client
//!
//! Turns typed operations into request/response exchanges on a registered
//! port. Each attempt holds the port lock for one full exchange:
//!
//! 1. open the port if needed, flush stale bytes, write the request
//! 2. wait the Bluetooth settle delay (Bluetooth ports only)
//! 3. read until `}` with the response timeout
//! 4. validate header, field count, echoed arguments and the `-1` result
//! 5. decode the value
//!
//! Any failure in steps 3-5 (or an I/O error in step 1) retries, up to the
//! configured try count. When tries run out the operation returns
//! `(IoStatus::Failure, default)`; only misuse and open failures are `Err`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::frame::{split_frames, FRAME_TERMINATOR};
use super::{
    CanMaskType, CanMessage, CanReport, Command, ExchangeError, IoReport, IoReportEntry, IoStatus,
    IoType, PortHandle, PortRegistry, ProtectedPort, ProtocolError, Request, Response,
    SerialReport, SerialTransport,
};
use crate::board::{analog_to_voltage, voltage_to_analog};

fn default_io_try_count() -> u32 {
    3
}

fn default_read_try_count() -> u32 {
    1
}

fn default_response_timeout_ms() -> u64 {
    250
}

fn default_bluetooth_send_delay_ms() -> u64 {
    10
}

fn default_bluetooth_delay_multiplier() -> f64 {
    4.8
}

fn default_report_idle_limit_ms() -> u64 {
    200
}

fn default_report_overall_limit_ms() -> u64 {
    5000
}

fn default_max_response_len() -> usize {
    256
}

fn default_max_report_len() -> usize {
    16 * 1024
}

/// Retry and timing policy for [`ProtocolClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Attempts for commands
    #[serde(default = "default_io_try_count")]
    pub io_try_count: u32,
    /// Attempts for pure reads (`dread`, `aread`, `sdread`, `saread`, `canread`)
    #[serde(default = "default_read_try_count")]
    pub read_try_count: u32,
    /// Per-byte timeout while waiting for a response
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Base settle time after a write on a Bluetooth port
    #[serde(default = "default_bluetooth_send_delay_ms")]
    pub bluetooth_send_delay_ms: u64,
    /// Scale applied to `bluetooth_send_delay_ms`
    #[serde(default = "default_bluetooth_delay_multiplier")]
    pub bluetooth_delay_multiplier: f64,
    /// A report ends when nothing arrives for this long
    #[serde(default = "default_report_idle_limit_ms")]
    pub report_idle_limit_ms: u64,
    /// Hard ceiling on a report read
    #[serde(default = "default_report_overall_limit_ms")]
    pub report_overall_limit_ms: u64,
    /// Longest single response frame
    #[serde(default = "default_max_response_len")]
    pub max_response_len: usize,
    /// Longest report buffer
    #[serde(default = "default_max_report_len")]
    pub max_report_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            io_try_count: default_io_try_count(),
            read_try_count: default_read_try_count(),
            response_timeout_ms: default_response_timeout_ms(),
            bluetooth_send_delay_ms: default_bluetooth_send_delay_ms(),
            bluetooth_delay_multiplier: default_bluetooth_delay_multiplier(),
            report_idle_limit_ms: default_report_idle_limit_ms(),
            report_overall_limit_ms: default_report_overall_limit_ms(),
            max_response_len: default_max_response_len(),
            max_report_len: default_max_report_len(),
        }
    }
}

impl ClientConfig {
    /// Delay after each write on a Bluetooth port
    pub fn bluetooth_delay(&self) -> Duration {
        let ms = self.bluetooth_send_delay_ms as f64 * self.bluetooth_delay_multiplier;
        Duration::from_micros((ms.max(0.0) * 1000.0) as u64)
    }
}

/// Outcome of one attempt
enum AttemptError {
    Retry(ExchangeError),
    Fatal(ProtocolError),
}

impl From<ExchangeError> for AttemptError {
    fn from(e: ExchangeError) -> Self {
        AttemptError::Retry(e)
    }
}

impl From<ProtocolError> for AttemptError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::IoError(io) => AttemptError::Retry(ExchangeError::Io(io)),
            other => AttemptError::Fatal(other),
        }
    }
}

fn parse_int(field: Option<&str>) -> Result<i32, ExchangeError> {
    let text = field.unwrap_or("");
    text.trim()
        .parse::<i32>()
        .map_err(|_| ExchangeError::Decode(text.to_string()))
}

fn parse_flag(field: Option<&str>) -> Result<bool, ExchangeError> {
    parse_int(field).map(|v| v == 1)
}

fn parse_io_type(field: Option<&str>) -> Result<IoType, ExchangeError> {
    let text = field.unwrap_or("");
    text.parse()
        .map_err(|_| ExchangeError::Decode(text.to_string()))
}

fn mask_text(id: u32) -> String {
    format!("0x{:03x}", id)
}

/// Synchronous operations against ports held in a [`PortRegistry`]
#[derive(Clone)]
pub struct ProtocolClient {
    registry: Arc<PortRegistry>,
    config: ClientConfig,
}

impl ProtocolClient {
    /// Client with the default policy
    pub fn new(registry: Arc<PortRegistry>) -> Self {
        Self::with_config(registry, ClientConfig::default())
    }

    /// Client with an explicit policy
    pub fn with_config(registry: Arc<PortRegistry>, config: ClientConfig) -> Self {
        Self { registry, config }
    }

    /// Registry the client resolves handles in
    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    /// Active policy
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register a transport with the underlying registry
    pub fn register(&self, transport: SerialTransport) -> PortHandle {
        self.registry.register(transport)
    }

    fn tries_for(&self, command: Command) -> u32 {
        let tries = if command.is_pin_read() || command == Command::CanRead {
            self.config.read_try_count
        } else {
            self.config.io_try_count
        };
        tries.max(1)
    }

    fn arity_ok(command: Command, fields: usize) -> bool {
        match command {
            // An empty receive queue is answered with the result field only
            Command::CanRead => fields == command.response_fields() || fields == 1,
            _ => fields == command.response_fields(),
        }
    }

    fn transmit(&self, t: &mut SerialTransport, request: &Request) -> Result<(), AttemptError> {
        if !t.is_open() {
            t.open().map_err(AttemptError::Fatal)?;
        }
        t.flush_rx_tx()?;
        t.write_string(&request.encode())?;
        if t.is_bluetooth() {
            std::thread::sleep(self.config.bluetooth_delay());
        }
        Ok(())
    }

    fn receive_frame(&self, t: &mut SerialTransport) -> Result<String, AttemptError> {
        let previous = t.timeout_ms();
        t.set_timeout_ms(self.config.response_timeout_ms.max(1));
        let raw = t.read_until(FRAME_TERMINATOR, self.config.max_response_len.max(1));
        t.set_timeout_ms(previous);
        Ok(raw?)
    }

    fn attempt(
        &self,
        port: &ProtectedPort,
        command: Command,
        request: &Request,
        echoes: &[usize],
    ) -> Result<Response, AttemptError> {
        let raw = {
            let mut t = port.lock();
            self.transmit(&mut t, request)?;
            self.receive_frame(&mut t)?
        };
        tracing::debug!("{} -> {:?}", request, raw);

        let response = Response::parse(&raw, command.header())?;
        if !Self::arity_ok(command, response.len()) {
            return Err(ExchangeError::ArityMismatch {
                expected: command.response_fields(),
                actual: response.len(),
            }
            .into());
        }
        for &i in echoes {
            let sent = request.args().get(i).map(String::as_str).unwrap_or("");
            let echoed = response.field(i).unwrap_or("");
            if sent != echoed {
                return Err(ExchangeError::EchoMismatch {
                    sent: sent.to_string(),
                    echoed: echoed.to_string(),
                }
                .into());
            }
        }
        if response.is_failure() {
            return Err(ExchangeError::DeviceRejected.into());
        }
        Ok(response)
    }

    /// Run `request` with retries. `echoes` lists argument positions the
    /// device must repeat back at the same field position.
    fn exchange<T>(
        &self,
        handle: PortHandle,
        command: Command,
        request: Request,
        echoes: &[usize],
        default: T,
        decode: impl Fn(&Response) -> Result<T, ExchangeError>,
    ) -> Result<(IoStatus, T), ProtocolError> {
        let port = self.registry.get(handle)?;
        let tries = self.tries_for(command);

        for attempt in 1..=tries {
            let outcome = self
                .attempt(&port, command, &request, echoes)
                .and_then(|resp| decode(&resp).map_err(AttemptError::from));
            match outcome {
                Ok(value) => return Ok((IoStatus::Success, value)),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retry(e)) => {
                    tracing::warn!(
                        "{}: {} attempt {}/{} failed: {}",
                        handle,
                        request,
                        attempt,
                        tries,
                        e
                    );
                }
            }
        }

        tracing::warn!("{}: {} gave up after {} attempts", handle, request, tries);
        Ok((IoStatus::Failure, default))
    }

    fn status_only(
        &self,
        handle: PortHandle,
        command: Command,
    ) -> Result<IoStatus, ProtocolError> {
        self.exchange(handle, command, Request::command(command), &[], (), |_| Ok(()))
            .map(|(status, ())| status)
    }

    // --- Pin operations ---------------------------------------------------

    /// Hardware digital read
    pub fn digital_read(&self, handle: PortHandle, pin: u8) -> Result<(IoStatus, bool), ProtocolError> {
        let cmd = Command::DigitalRead;
        self.exchange(handle, cmd, Request::command(cmd).arg(pin), &[0], false, |r| {
            parse_flag(r.field(1))
        })
    }

    /// Drive a digital output; the device must echo both pin and state
    pub fn digital_write(
        &self,
        handle: PortHandle,
        pin: u8,
        state: bool,
    ) -> Result<(IoStatus, bool), ProtocolError> {
        let cmd = Command::DigitalWrite;
        let request = Request::command(cmd).arg(pin).flag(state);
        self.exchange(handle, cmd, request, &[0, 1], false, |r| parse_flag(r.field(1)))
    }

    /// Raw ADC reading (0..=1023)
    pub fn analog_read_raw(&self, handle: PortHandle, pin: u8) -> Result<(IoStatus, i32), ProtocolError> {
        let cmd = Command::AnalogRead;
        self.exchange(handle, cmd, Request::command(cmd).arg(pin), &[0], 0, |r| {
            parse_int(r.field(1))
        })
    }

    /// ADC reading in volts
    pub fn analog_read(&self, handle: PortHandle, pin: u8) -> Result<(IoStatus, f64), ProtocolError> {
        self.analog_read_raw(handle, pin)
            .map(|(status, raw)| (status, analog_to_voltage(raw)))
    }

    /// Write a raw analog/PWM value; returns the value the device applied
    pub fn analog_write_raw(
        &self,
        handle: PortHandle,
        pin: u8,
        value: i32,
    ) -> Result<(IoStatus, i32), ProtocolError> {
        let cmd = Command::AnalogWrite;
        let request = Request::command(cmd).arg(pin).arg(value);
        self.exchange(handle, cmd, request, &[0], 0, |r| parse_int(r.field(1)))
    }

    /// Write an analog value given in volts
    pub fn analog_write(
        &self,
        handle: PortHandle,
        pin: u8,
        volts: f64,
    ) -> Result<(IoStatus, f64), ProtocolError> {
        self.analog_write_raw(handle, pin, voltage_to_analog(volts))
            .map(|(status, raw)| (status, analog_to_voltage(raw)))
    }

    /// Last digital state the firmware recorded, without sampling the pin
    pub fn soft_digital_read(&self, handle: PortHandle, pin: u8) -> Result<(IoStatus, bool), ProtocolError> {
        let cmd = Command::SoftDigitalRead;
        self.exchange(handle, cmd, Request::command(cmd).arg(pin), &[0], false, |r| {
            parse_flag(r.field(1))
        })
    }

    /// Last analog value the firmware recorded
    pub fn soft_analog_read_raw(&self, handle: PortHandle, pin: u8) -> Result<(IoStatus, i32), ProtocolError> {
        let cmd = Command::SoftAnalogRead;
        self.exchange(handle, cmd, Request::command(cmd).arg(pin), &[0], 0, |r| {
            parse_int(r.field(1))
        })
    }

    /// [`soft_analog_read_raw`](Self::soft_analog_read_raw) in volts
    pub fn soft_analog_read(&self, handle: PortHandle, pin: u8) -> Result<(IoStatus, f64), ProtocolError> {
        self.soft_analog_read_raw(handle, pin)
            .map(|(status, raw)| (status, analog_to_voltage(raw)))
    }

    /// Change a pin's mode. A failed change reports [`IoType::Unspecified`].
    pub fn pin_mode(
        &self,
        handle: PortHandle,
        pin: u8,
        io_type: IoType,
    ) -> Result<(IoStatus, IoType), ProtocolError> {
        if io_type.wire_name().is_none() {
            return Err(ProtocolError::InvalidArgument(format!(
                "pin {} cannot be set to an unspecified mode",
                pin
            )));
        }
        let cmd = Command::PinTypeChange;
        let request = Request::command(cmd).arg(pin).arg(io_type);
        self.exchange(handle, cmd, request, &[0, 1], IoType::Unspecified, |r| {
            parse_io_type(r.field(1))
        })
    }

    /// Query a pin's mode; [`IoType::Unspecified`] when the query fails
    pub fn current_pin_mode(&self, handle: PortHandle, pin: u8) -> Result<(IoStatus, IoType), ProtocolError> {
        let cmd = Command::PinType;
        self.exchange(
            handle,
            cmd,
            Request::command(cmd).arg(pin),
            &[0],
            IoType::Unspecified,
            |r| parse_io_type(r.field(1)),
        )
    }

    /// Raw level above which analog pins read as high
    pub fn analog_to_digital_threshold(&self, handle: PortHandle) -> Result<(IoStatus, i32), ProtocolError> {
        let cmd = Command::AnalogToDigitalThreshold;
        self.exchange(handle, cmd, Request::command(cmd), &[], 0, |r| parse_int(r.field(0)))
    }

    /// Set the raw level at which analog pins read as logic high
    pub fn change_analog_to_digital_threshold(
        &self,
        handle: PortHandle,
        threshold: i32,
    ) -> Result<(IoStatus, i32), ProtocolError> {
        let cmd = Command::ChangeAnalogToDigitalThreshold;
        let request = Request::command(cmd).arg(threshold);
        self.exchange(handle, cmd, request, &[], 0, |r| parse_int(r.field(0)))
    }

    // --- Device queries ---------------------------------------------------

    /// Firmware version string
    pub fn firmware_version(&self, handle: PortHandle) -> Result<(IoStatus, String), ProtocolError> {
        let cmd = Command::FirmwareVersion;
        self.exchange(handle, cmd, Request::command(cmd), &[], String::new(), |r| {
            Ok(r.field(0).unwrap_or_default().to_string())
        })
    }

    /// Board identifier such as `arduino_uno`
    pub fn board_type(&self, handle: PortHandle) -> Result<(IoStatus, String), ProtocolError> {
        let cmd = Command::BoardType;
        self.exchange(handle, cmd, Request::command(cmd), &[], String::new(), |r| {
            Ok(r.field(0).unwrap_or_default().to_string())
        })
    }

    /// Whether the firmware has CAN support
    pub fn can_capability(&self, handle: PortHandle) -> Result<(IoStatus, bool), ProtocolError> {
        let cmd = Command::CanCapability;
        self.exchange(handle, cmd, Request::command(cmd), &[], false, |r| parse_flag(r.field(0)))
    }

    /// Liveness check
    pub fn heartbeat(&self, handle: PortHandle) -> Result<IoStatus, ProtocolError> {
        self.status_only(handle, Command::Heartbeat)
    }

    // --- CAN ----------------------------------------------------------------

    /// Bring up the CAN controller
    pub fn can_init(&self, handle: PortHandle) -> Result<IoStatus, ProtocolError> {
        self.status_only(handle, Command::CanInit)
    }

    /// Pop one received frame; an empty queue yields the empty message
    pub fn can_read(&self, handle: PortHandle) -> Result<(IoStatus, CanMessage), ProtocolError> {
        let cmd = Command::CanRead;
        self.exchange(handle, cmd, Request::command(cmd), &[], CanMessage::empty(), |r| {
            if r.len() == 1 {
                return Ok(CanMessage::empty());
            }
            let fields: Vec<&str> = r.fields()[..r.len() - 1]
                .iter()
                .map(String::as_str)
                .collect();
            CanMessage::from_fields(&fields)
                .ok_or_else(|| ExchangeError::Decode(fields.join(":")))
        })
    }

    /// Transmit a frame; the device echoes it back on success
    pub fn can_write(
        &self,
        handle: PortHandle,
        message: &CanMessage,
    ) -> Result<(IoStatus, CanMessage), ProtocolError> {
        if message.is_empty() {
            return Err(ProtocolError::InvalidArgument(
                "cannot transmit the empty CAN message".to_string(),
            ));
        }
        let cmd = Command::CanWrite;
        let request = Request::command(cmd).arg(message.encode());
        let expected = *message;
        self.exchange(handle, cmd, request, &[], CanMessage::empty(), |r| {
            let fields: Vec<&str> = r.fields()[..r.len() - 1]
                .iter()
                .map(String::as_str)
                .collect();
            let echoed = CanMessage::from_fields(&fields)
                .ok_or_else(|| ExchangeError::Decode(fields.join(":")))?;
            if echoed.id != expected.id || echoed.data != expected.data {
                return Err(ExchangeError::EchoMismatch {
                    sent: expected.encode(),
                    echoed: echoed.encode(),
                });
            }
            Ok(echoed)
        })
    }

    /// Turn unsolicited CAN frame updates on or off
    pub fn can_auto_update(&self, handle: PortHandle, enabled: bool) -> Result<(IoStatus, bool), ProtocolError> {
        let cmd = Command::CanLiveUpdate;
        let request = Request::command(cmd).flag(enabled);
        self.exchange(handle, cmd, request, &[0], false, |r| parse_flag(r.field(0)))
    }

    fn mask_exchange(&self, handle: PortHandle, cmd: Command, id: u32) -> Result<(IoStatus, u32), ProtocolError> {
        let request = Request::command(cmd).arg(mask_text(id));
        self.exchange(handle, cmd, request, &[], 0, |r| {
            let text = r.field(0).unwrap_or_default();
            match super::can::parse_can_id(text) {
                Some(echoed) if echoed == id => Ok(echoed),
                _ => Err(ExchangeError::EchoMismatch {
                    sent: mask_text(id),
                    echoed: text.to_string(),
                }),
            }
        })
    }

    /// Add an id to a CAN mask list
    pub fn add_can_mask(
        &self,
        handle: PortHandle,
        mask_type: CanMaskType,
        id: u32,
    ) -> Result<(IoStatus, u32), ProtocolError> {
        self.mask_exchange(handle, mask_type.add_command(), id)
    }

    /// Remove an id from a CAN mask list
    pub fn remove_can_mask(
        &self,
        handle: PortHandle,
        mask_type: CanMaskType,
        id: u32,
    ) -> Result<(IoStatus, u32), ProtocolError> {
        self.mask_exchange(handle, mask_type.remove_command(), id)
    }

    /// Clear one mask list, or both when `mask_type` is `None`
    pub fn remove_all_can_masks(
        &self,
        handle: PortHandle,
        mask_type: Option<CanMaskType>,
    ) -> Result<IoStatus, ProtocolError> {
        self.status_only(handle, CanMaskType::clear_command(mask_type))
    }

    // --- Reports ------------------------------------------------------------

    /// Read until `stop` matches, the idle limit passes with no data, or the
    /// overall limit expires
    fn listen(
        &self,
        t: &mut SerialTransport,
        stop: impl Fn(&str) -> bool,
    ) -> Result<String, ProtocolError> {
        let idle = Duration::from_millis(self.config.report_idle_limit_ms);
        let overall = Duration::from_millis(self.config.report_overall_limit_ms);
        let poll = idle.min(Duration::from_millis(10));
        let start = Instant::now();
        let mut last_data = Instant::now();
        let mut buf = String::new();

        while buf.len() < self.config.max_report_len
            && last_data.elapsed() <= idle
            && start.elapsed() <= overall
        {
            if let Some(b) = t.read_byte(poll)? {
                buf.push(b as char);
                last_data = Instant::now();
                if stop(&buf) {
                    break;
                }
            }
        }
        Ok(buf)
    }

    fn ensure_open(t: &mut SerialTransport) -> Result<(), ProtocolError> {
        if !t.is_open() {
            t.open()?;
        }
        Ok(())
    }

    /// State of every configured pin
    pub fn io_report(&self, handle: PortHandle) -> Result<(IoStatus, IoReport), ProtocolError> {
        let cmd = Command::IoReport;
        let port = self.registry.get(handle)?;
        let request = Request::command(cmd);
        let end_frame = format!("{{{}}}", cmd.end_header().unwrap_or_default());
        let tries = self.tries_for(cmd);

        for attempt in 1..=tries {
            let outcome = (|| -> Result<IoReport, AttemptError> {
                let raw = {
                    let mut t = port.lock();
                    self.transmit(&mut t, &request)?;
                    self.listen(&mut t, |buf| buf.ends_with(&end_frame))?
                };
                tracing::debug!("{} -> {} bytes", request, raw.len());
                Ok(parse_io_report(&raw, &end_frame)?)
            })();
            match outcome {
                Ok(report) => return Ok((IoStatus::Success, report)),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retry(e)) => {
                    tracing::warn!("{}: io report attempt {}/{} failed: {}", handle, attempt, tries, e);
                }
            }
        }
        Ok((IoStatus::Failure, IoReport::new()))
    }

    /// Collect whatever the device sends until `delimiter` is seen or the
    /// report limits expire
    pub fn serial_report(
        &self,
        handle: PortHandle,
        delimiter: Option<&str>,
    ) -> Result<(IoStatus, SerialReport), ProtocolError> {
        let port = self.registry.get(handle)?;
        let mut t = port.lock();
        Self::ensure_open(&mut t)?;
        let raw = match self.listen(&mut t, |buf| {
            delimiter.is_some_and(|d| !d.is_empty() && buf.ends_with(d))
        }) {
            Ok(raw) => raw,
            Err(ProtocolError::IoError(e)) => {
                tracing::warn!("{}: serial report interrupted: {}", handle, e);
                return Ok((IoStatus::Failure, SerialReport::new()));
            }
            Err(e) => return Err(e),
        };
        drop(t);

        let mut report = SerialReport::new();
        let frames = split_frames(&raw);
        if frames.is_empty() {
            let text = raw.trim();
            if !text.is_empty() {
                report.push(text);
            }
        } else {
            for frame in frames {
                report.push(frame);
            }
        }
        Ok((IoStatus::Success, report))
    }

    /// Collect CAN frames pushed by the device (see [`can_auto_update`](Self::can_auto_update))
    pub fn can_report(&self, handle: PortHandle) -> Result<(IoStatus, CanReport), ProtocolError> {
        let port = self.registry.get(handle)?;
        let mut t = port.lock();
        Self::ensure_open(&mut t)?;
        let raw = match self.listen(&mut t, |_| false) {
            Ok(raw) => raw,
            Err(ProtocolError::IoError(e)) => {
                tracing::warn!("{}: CAN report interrupted: {}", handle, e);
                return Ok((IoStatus::Failure, CanReport::new()));
            }
            Err(e) => return Err(e),
        };
        drop(t);

        let mut report = CanReport::new();
        for frame in split_frames(&raw) {
            let Ok(resp) = Response::parse(frame, Command::CanRead.header()) else {
                continue;
            };
            if resp.len() != Command::CanRead.response_fields() || resp.is_failure() {
                continue;
            }
            let fields: Vec<&str> = resp.fields()[..resp.len() - 1]
                .iter()
                .map(String::as_str)
                .collect();
            if let Some(msg) = CanMessage::from_fields(&fields) {
                report.push(msg);
            }
        }
        Ok((IoStatus::Success, report))
    }

    // --- Raw access -------------------------------------------------------

    /// Write text as-is (plus line ending), opening the port if needed
    pub fn write_raw_string(&self, handle: PortHandle, data: &str) -> Result<usize, ProtocolError> {
        let port = self.registry.get(handle)?;
        let mut t = port.lock();
        Self::ensure_open(&mut t)?;
        t.write_string(data)
    }

    /// Read up to `max_len` bytes as-is, opening the port if needed
    pub fn read_raw_string(&self, handle: PortHandle, max_len: usize) -> Result<String, ProtocolError> {
        let port = self.registry.get(handle)?;
        let mut t = port.lock();
        Self::ensure_open(&mut t)?;
        t.read_string(max_len)
    }

    /// Discard unread input
    pub fn flush_rx(&self, handle: PortHandle) -> Result<(), ProtocolError> {
        self.registry.with_port(handle, |t| t.flush_rx())?
    }

    /// Discard unsent output
    pub fn flush_tx(&self, handle: PortHandle) -> Result<(), ProtocolError> {
        self.registry.with_port(handle, |t| t.flush_tx())?
    }

    /// Discard both directions
    pub fn flush_rx_tx(&self, handle: PortHandle) -> Result<(), ProtocolError> {
        self.registry.with_port(handle, |t| t.flush_rx_tx())?
    }

    /// Open the port
    pub fn open(&self, handle: PortHandle) -> Result<(), ProtocolError> {
        self.registry.with_port(handle, |t| t.open())?
    }

    /// Close the port
    pub fn close(&self, handle: PortHandle) -> Result<(), ProtocolError> {
        self.registry.with_port(handle, |t| t.close())
    }

    /// Whether the port is open
    pub fn is_open(&self, handle: PortHandle) -> Result<bool, ProtocolError> {
        self.registry.with_port(handle, |t| t.is_open())
    }
}

fn parse_io_report(raw: &str, end_frame: &str) -> Result<IoReport, ExchangeError> {
    if !raw.contains(end_frame) {
        return Err(ExchangeError::Malformed(raw.to_string()));
    }
    let header = Command::IoReport.header();
    let mut report = IoReport::new();

    for frame in split_frames(raw) {
        if frame == end_frame {
            break;
        }
        let resp = match Response::parse(frame, header) {
            Ok(resp) => resp,
            // Unsolicited frames (e.g. live CAN updates) can be interleaved
            Err(ExchangeError::HeaderMismatch { .. }) => continue,
            Err(e) => return Err(e),
        };
        if resp.is_empty() {
            continue;
        }
        if resp.len() != Command::IoReport.response_fields() {
            return Err(ExchangeError::ArityMismatch {
                expected: Command::IoReport.response_fields(),
                actual: resp.len(),
            });
        }
        let pin_text = resp.field(0).unwrap_or_default();
        let pin = pin_text
            .parse::<u8>()
            .map_err(|_| ExchangeError::Decode(pin_text.to_string()))?;
        report.push(IoReportEntry {
            pin,
            io_type: parse_io_type(resp.field(1))?,
            state: parse_int(resp.field(2))?,
        });
    }
    Ok(report)
}
