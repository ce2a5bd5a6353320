//! Demo Mode - Simulated device firmware for testing
//!
//! [`SimulatedDevice`] implements [`SerialLink`] and answers the protocol the
//! way the firmware does, so the client can be exercised without hardware.
//! Analog inputs carry a little random noise around the level set with
//! [`SimulatedDevice::set_input`].
//!
//! The device is a cheap handle: clones share state, so a test can keep one
//! clone to drive inputs while the transport owns another.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serialport::ClearBuffer;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::board::{BoardType, ANALOG_MAX};
use crate::protocol::can::{parse_can_id, CAN_MESSAGE_FIELDS};
use crate::protocol::frame::FAILURE_SENTINEL;
use crate::protocol::{CanMessage, IoType, ProtocolError, SerialConfig, SerialLink};

/// Firmware version reported by the simulator
pub const SIMULATED_FIRMWARE_VERSION: &str = "0.3.0-sim";

const OK: &str = "1";

#[derive(Debug, Clone, Copy)]
struct SimPin {
    io_type: IoType,
    state: i32,
}

struct DeviceState {
    board: BoardType,
    open: bool,
    fail_open: bool,
    inbox: String,
    outbox: VecDeque<u8>,
    pins: BTreeMap<u8, SimPin>,
    threshold: i32,
    can_initialized: bool,
    can_live_update: bool,
    can_queue: VecDeque<CanMessage>,
    positive_masks: BTreeSet<u32>,
    negative_masks: BTreeSet<u32>,
    analog_noise: i32,
    requests: Vec<String>,
    rng: StdRng,
}

/// A simulated board speaking the PinLink protocol
#[derive(Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(BoardType::Uno)
    }
}

impl SimulatedDevice {
    /// Create a simulator for `board` with every pin a digital input at 0
    pub fn new(board: BoardType) -> Self {
        Self::with_rng(board, StdRng::from_entropy())
    }

    /// Same as [`new`](Self::new) with reproducible analog noise
    pub fn with_seed(board: BoardType, seed: u64) -> Self {
        Self::with_rng(board, StdRng::seed_from_u64(seed))
    }

    fn with_rng(board: BoardType, rng: StdRng) -> Self {
        let pins = board
            .available_pins()
            .map(|pin| {
                (
                    pin,
                    SimPin {
                        io_type: IoType::DigitalInput,
                        state: 0,
                    },
                )
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(DeviceState {
                board,
                open: false,
                fail_open: false,
                inbox: String::new(),
                outbox: VecDeque::new(),
                pins,
                threshold: ANALOG_MAX / 2,
                can_initialized: false,
                can_live_update: false,
                can_queue: VecDeque::new(),
                positive_masks: BTreeSet::new(),
                negative_masks: BTreeSet::new(),
                analog_noise: 2,
                requests: Vec::new(),
                rng,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Board this simulator answers as
    pub fn board(&self) -> BoardType {
        self.state().board
    }

    /// Level seen on an input pin: 0/1 for digital, raw ADC for analog
    pub fn set_input(&self, pin: u8, value: i32) {
        if let Some(p) = self.state().pins.get_mut(&pin) {
            p.state = value.clamp(0, ANALOG_MAX);
        }
    }

    /// Current raw state of a pin
    pub fn pin_state(&self, pin: u8) -> Option<i32> {
        self.state().pins.get(&pin).map(|p| p.state)
    }

    /// Current mode of a pin
    pub fn pin_type(&self, pin: u8) -> Option<IoType> {
        self.state().pins.get(&pin).map(|p| p.io_type)
    }

    /// Peak-to-peak noise added to analog reads
    pub fn set_analog_noise(&self, noise: i32) {
        self.state().analog_noise = noise.max(0);
    }

    /// Make the next opens fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Deliver a frame as if it arrived on the bus
    pub fn inject_can_message(&self, message: CanMessage) {
        let mut s = self.state();
        s.receive_can(message);
    }

    /// Every request frame received so far
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }
}

impl DeviceState {
    fn reply(&mut self, header: &str, fields: &[String]) {
        let mut frame = format!("{{{}", header);
        for f in fields {
            frame.push(':');
            frame.push_str(f);
        }
        frame.push('}');
        self.outbox.extend(frame.bytes());
    }

    fn passes_masks(&self, id: u32) -> bool {
        (self.positive_masks.is_empty() || self.positive_masks.contains(&id))
            && !self.negative_masks.contains(&id)
    }

    fn receive_can(&mut self, message: CanMessage) {
        if !self.passes_masks(message.id) {
            return;
        }
        if self.can_live_update {
            let mut fields: Vec<String> = message.encode().split(':').map(String::from).collect();
            fields.push(OK.to_string());
            self.reply("canread", &fields);
        } else {
            self.can_queue.push_back(message);
        }
    }

    fn digital_level(&self, pin: &SimPin) -> i32 {
        match pin.io_type {
            IoType::AnalogInput | IoType::AnalogOutput => i32::from(pin.state >= self.threshold),
            _ => i32::from(pin.state != 0),
        }
    }

    fn noisy(&mut self, raw: i32) -> i32 {
        let n = self.analog_noise;
        let jitter = if n > 0 { self.rng.gen_range(-n..=n) } else { 0 };
        (raw + jitter).clamp(0, ANALOG_MAX)
    }

    fn mode_allowed(&self, pin: u8, io_type: IoType) -> bool {
        match io_type {
            IoType::AnalogInput => self.board.is_analog_pin(pin),
            IoType::AnalogOutput => self.board.is_pwm_pin(pin),
            _ => self.board.is_valid_pin(pin),
        }
    }

    fn handle(&mut self, frame: &str) {
        self.requests.push(frame.to_string());
        let body = frame.trim_start_matches('{').trim_end_matches('}');
        let mut parts = body.split(':');
        let header = parts.next().unwrap_or_default().to_string();
        let args: Vec<String> = parts.map(|s| s.to_string()).collect();
        let fail = FAILURE_SENTINEL.to_string();
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        let pin_arg = args.first().and_then(|p| p.parse::<u8>().ok());

        match header.as_str() {
            "ardtype" => {
                let id = self.board.identifier().to_string();
                self.reply("ardtype", &[id, OK.into()]);
            }
            "version" => self.reply("version", &[SIMULATED_FIRMWARE_VERSION.into(), OK.into()]),
            "canbus" => self.reply("canbus", &[OK.into(), OK.into()]),
            "heartbeat" => self.reply("heartbeat", &[OK.into()]),
            "dread" | "sdread" => {
                let level = pin_arg
                    .and_then(|p| self.pins.get(&p).copied())
                    .map(|p| self.digital_level(&p));
                match level {
                    Some(level) => self.reply(&header, &[arg(0), level.to_string(), OK.into()]),
                    None => self.reply(&header, &[arg(0), "0".into(), fail]),
                }
            }
            "aread" | "saread" => {
                let pin = pin_arg.and_then(|p| self.pins.get(&p).copied());
                match pin {
                    Some(p) if p.io_type == IoType::AnalogInput => {
                        let raw = if header == "aread" { self.noisy(p.state) } else { p.state };
                        self.reply(&header, &[arg(0), raw.to_string(), OK.into()]);
                    }
                    _ => self.reply(&header, &[arg(0), "0".into(), fail]),
                }
            }
            "dwrite" => {
                let value = arg(1).parse::<i32>().ok().filter(|v| *v == 0 || *v == 1);
                let target = pin_arg.filter(|p| {
                    self.pins.get(p).map(|s| s.io_type) == Some(IoType::DigitalOutput)
                });
                match (target, value) {
                    (Some(p), Some(v)) => {
                        if let Some(s) = self.pins.get_mut(&p) {
                            s.state = v;
                        }
                        self.reply("dwrite", &[arg(0), v.to_string(), OK.into()]);
                    }
                    _ => self.reply("dwrite", &[arg(0), arg(1), fail]),
                }
            }
            "awrite" => {
                let value = arg(1).parse::<i32>().ok();
                let target = pin_arg.filter(|p| {
                    self.pins.get(p).map(|s| s.io_type) == Some(IoType::AnalogOutput)
                });
                match (target, value) {
                    (Some(p), Some(v)) => {
                        let v = v.clamp(0, ANALOG_MAX);
                        if let Some(s) = self.pins.get_mut(&p) {
                            s.state = v;
                        }
                        self.reply("awrite", &[arg(0), v.to_string(), OK.into()]);
                    }
                    _ => self.reply("awrite", &[arg(0), arg(1), fail]),
                }
            }
            "ptype" => match pin_arg.and_then(|p| self.pins.get(&p).copied()) {
                Some(p) => {
                    let t = p.io_type.to_string();
                    self.reply("ptype", &[arg(0), t, OK.into()]);
                }
                None => self.reply("ptype", &[arg(0), "din".into(), fail]),
            },
            "ptchange" => {
                let io_type = arg(1).parse::<IoType>().ok();
                match (pin_arg, io_type) {
                    (Some(p), Some(t)) if self.mode_allowed(p, t) => {
                        let state = if t == IoType::DigitalInputPullup { 1 } else { 0 };
                        self.pins.insert(p, SimPin { io_type: t, state });
                        self.reply("ptchange", &[arg(0), t.to_string(), OK.into()]);
                    }
                    _ => self.reply("ptchange", &[arg(0), arg(1), fail]),
                }
            }
            "atodthresh" => {
                let t = self.threshold.to_string();
                self.reply("atodthresh", &[t, OK.into()]);
            }
            "atodchange" => match arg(0).parse::<i32>() {
                Ok(t) => {
                    self.threshold = t.clamp(0, ANALOG_MAX);
                    let t = self.threshold.to_string();
                    self.reply("atodchange", &[t, OK.into()]);
                }
                Err(_) => self.reply("atodchange", &[arg(0), fail]),
            },
            "ioreport" => {
                let entries: Vec<(u8, SimPin)> = self.pins.iter().map(|(k, v)| (*k, *v)).collect();
                for (pin, p) in entries {
                    let state = if p.io_type.is_digital() {
                        self.digital_level(&p)
                    } else {
                        p.state
                    };
                    self.reply(
                        "ioreport",
                        &[pin.to_string(), p.io_type.to_string(), state.to_string()],
                    );
                }
                self.reply("ioreportend", &[]);
            }
            "caninit" => {
                self.can_initialized = true;
                self.reply("caninit", &[OK.into()]);
            }
            "canread" => {
                if !self.can_initialized {
                    self.reply("canread", &[fail]);
                } else if let Some(msg) = self.can_queue.pop_front() {
                    let mut fields: Vec<String> = msg.encode().split(':').map(String::from).collect();
                    fields.push(OK.into());
                    self.reply("canread", &fields);
                } else {
                    self.reply("canread", &[OK.into()]);
                }
            }
            "canwrite" => {
                let msg = if args.len() == CAN_MESSAGE_FIELDS {
                    CanMessage::decode(&args.join(":"))
                } else {
                    CanMessage::empty()
                };
                if !self.can_initialized || msg.is_empty() {
                    let mut fields = args.clone();
                    fields.push(fail);
                    self.reply("canwrite", &fields);
                } else {
                    let mut fields: Vec<String> = msg.encode().split(':').map(String::from).collect();
                    fields.push(OK.into());
                    self.reply("canwrite", &fields);
                    // Loopback mode: transmitted frames are received again
                    self.receive_can(msg);
                }
            }
            "canlup" => match arg(0).as_str() {
                "0" | "1" => {
                    self.can_live_update = arg(0) == "1";
                    self.reply("canlup", &[arg(0), OK.into()]);
                }
                _ => self.reply("canlup", &[arg(0), fail]),
            },
            "addpcanmask" | "addncanmask" | "rempcanmask" | "remncanmask" => {
                let Some(id) = parse_can_id(&arg(0)) else {
                    self.reply(&header, &[arg(0), fail]);
                    return;
                };
                let positive = matches!(header.as_str(), "addpcanmask" | "rempcanmask");
                let set = if positive {
                    &mut self.positive_masks
                } else {
                    &mut self.negative_masks
                };
                if header.starts_with("add") {
                    set.insert(id);
                } else {
                    set.remove(&id);
                }
                self.reply(&header, &[arg(0), OK.into()]);
            }
            "clearpcanmasks" => {
                self.positive_masks.clear();
                self.reply(&header, &[OK.into()]);
            }
            "clearncanmasks" => {
                self.negative_masks.clear();
                self.reply(&header, &[OK.into()]);
            }
            "clearallcanmasks" => {
                self.positive_masks.clear();
                self.negative_masks.clear();
                self.reply(&header, &[OK.into()]);
            }
            other => tracing::debug!("simulator ignoring unknown command {:?}", other),
        }
    }

    fn accept(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match b {
                b'{' => {
                    self.inbox.clear();
                    self.inbox.push('{');
                }
                b'}' if !self.inbox.is_empty() => {
                    self.inbox.push('}');
                    let frame = std::mem::take(&mut self.inbox);
                    self.handle(&frame);
                }
                b'\r' | b'\n' => {}
                _ if !self.inbox.is_empty() => self.inbox.push(b as char),
                _ => {}
            }
        }
    }
}

impl SerialLink for SimulatedDevice {
    fn open(&mut self, port_name: &str, _config: &SerialConfig) -> Result<(), ProtocolError> {
        let mut s = self.state();
        if s.fail_open {
            return Err(ProtocolError::OpenFailed {
                port: port_name.to_string(),
                reason: "simulated open failure".to_string(),
            });
        }
        s.open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut s = self.state();
        s.open = false;
        s.inbox.clear();
        s.outbox.clear();
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut s = self.state();
        if !s.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port is not open"));
        }
        let mut n = 0;
        while n < buf.len() {
            match s.outbox.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut s = self.state();
        if !s.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port is not open"));
        }
        s.accept(buf);
        Ok(())
    }

    fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
        let mut s = self.state();
        match buffer {
            ClearBuffer::Input => s.outbox.clear(),
            ClearBuffer::Output => {}
            ClearBuffer::All => {
                s.outbox.clear();
                s.inbox.clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(dev: &mut SimulatedDevice, request: &str) -> String {
        dev.write_all(request.as_bytes()).unwrap();
        let mut buf = [0u8; 512];
        let n = dev.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    fn open_device() -> SimulatedDevice {
        let mut dev = SimulatedDevice::with_seed(BoardType::Uno, 7);
        dev.open("sim", &SerialConfig::default()).unwrap();
        dev
    }

    #[test]
    fn test_digital_output_round_trip() {
        let mut dev = open_device();
        assert_eq!(exchange(&mut dev, "{ptchange:13:dout}"), "{ptchange:13:dout:1}");
        assert_eq!(exchange(&mut dev, "{dwrite:13:1}"), "{dwrite:13:1:1}");
        assert_eq!(exchange(&mut dev, "{dread:13}"), "{dread:13:1:1}");
        assert_eq!(dev.pin_state(13), Some(1));
    }

    #[test]
    fn test_write_to_input_is_rejected() {
        let mut dev = open_device();
        assert_eq!(exchange(&mut dev, "{dwrite:4:1}"), "{dwrite:4:1:-1}");
    }

    #[test]
    fn test_analog_mode_only_on_analog_pins() {
        let mut dev = open_device();
        assert_eq!(exchange(&mut dev, "{ptchange:4:ain}"), "{ptchange:4:ain:-1}");
        assert_eq!(exchange(&mut dev, "{ptchange:14:ain}"), "{ptchange:14:ain:1}");
    }

    #[test]
    fn test_noise_free_analog_read() {
        let mut dev = open_device();
        dev.set_analog_noise(0);
        exchange(&mut dev, "{ptchange:15:ain}");
        dev.set_input(15, 600);
        assert_eq!(exchange(&mut dev, "{aread:15}"), "{aread:15:600:1}");
    }

    #[test]
    fn test_can_requires_init() {
        let mut dev = open_device();
        assert_eq!(exchange(&mut dev, "{canread}"), "{canread:-1}");
        assert_eq!(exchange(&mut dev, "{caninit}"), "{caninit:1}");
        assert_eq!(exchange(&mut dev, "{canread}"), "{canread:1}");
    }

    #[test]
    fn test_negative_mask_drops_frames() {
        let mut dev = open_device();
        exchange(&mut dev, "{caninit}");
        exchange(&mut dev, "{addncanmask:0x100}");
        dev.inject_can_message(CanMessage::decode("0x100:1:2:3:4:5:6:7:8"));
        assert_eq!(exchange(&mut dev, "{canread}"), "{canread:1}");
    }

    #[test]
    fn test_unknown_command_is_silent() {
        let mut dev = open_device();
        assert_eq!(exchange(&mut dev, "{storestate}"), "");
        assert_eq!(dev.requests(), vec!["{storestate}".to_string()]);
    }
}
