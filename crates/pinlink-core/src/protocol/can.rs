//! CAN frame text codec
//!
//! CAN frames travel inside the serial protocol as colon-separated hex:
//! `0x<id, 3 digits>:0x<byte, 2 digits>` repeated for all eight data bytes.
//! The all-zero message is the "empty" sentinel and encodes to an empty string.

use std::fmt;
use std::ops::BitOr;

/// Number of data bytes carried by a frame
pub const CAN_DATA_LENGTH: usize = 8;

/// Hex digits used for the identifier on the wire
pub const CAN_ID_WIDTH: usize = 3;

/// Hex digits used for each data byte on the wire
pub const CAN_BYTE_WIDTH: usize = 2;

/// Fields in an encoded frame (id plus eight bytes)
pub const CAN_MESSAGE_FIELDS: usize = CAN_DATA_LENGTH + 1;

/// Eight data bytes of a CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CanDataPacket([u8; CAN_DATA_LENGTH]);

impl CanDataPacket {
    /// Create a packet from raw bytes
    pub const fn new(bytes: [u8; CAN_DATA_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Byte at `index`, or `None` past the end
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// Replace the byte at `index`; returns false when out of range
    pub fn set_byte(&mut self, index: usize, value: u8) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// All eight bytes
    pub fn bytes(&self) -> &[u8; CAN_DATA_LENGTH] {
        &self.0
    }

    /// Byte-wise OR of two packets
    pub fn combine(a: &CanDataPacket, b: &CanDataPacket) -> CanDataPacket {
        let mut out = [0u8; CAN_DATA_LENGTH];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = a.0[i] | b.0[i];
        }
        CanDataPacket(out)
    }

    /// True when every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl BitOr for CanDataPacket {
    type Output = CanDataPacket;

    fn bitor(self, rhs: Self) -> Self::Output {
        CanDataPacket::combine(&self, &rhs)
    }
}

impl From<[u8; CAN_DATA_LENGTH]> for CanDataPacket {
    fn from(bytes: [u8; CAN_DATA_LENGTH]) -> Self {
        Self(bytes)
    }
}

/// A CAN message as exchanged with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanMessage {
    /// 11-bit identifier (stored wider, printed with three hex digits)
    pub id: u32,
    /// Frame type; the device only uses standard frames (0)
    pub frame: u8,
    /// Data length code
    pub length: u8,
    /// Payload
    pub data: CanDataPacket,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self::empty()
    }
}

impl CanMessage {
    /// Standard frame with a full eight byte payload
    pub fn new(id: u32, data: CanDataPacket) -> Self {
        Self {
            id,
            frame: 0,
            length: CAN_DATA_LENGTH as u8,
            data,
        }
    }

    /// The all-zero sentinel meaning "no message"
    pub const fn empty() -> Self {
        Self {
            id: 0,
            frame: 0,
            length: 0,
            data: CanDataPacket([0; CAN_DATA_LENGTH]),
        }
    }

    /// True for the sentinel returned by [`CanMessage::empty`]
    pub fn is_empty(&self) -> bool {
        self.id == 0 && self.frame == 0 && self.length == 0 && self.data.is_zero()
    }

    /// Wire text, e.g. `0x7e0:0x01:0x00:...`; empty string for the sentinel
    pub fn encode(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = format!("0x{:0width$x}", self.id, width = CAN_ID_WIDTH);
        for b in self.data.bytes() {
            out.push_str(&format!(":0x{:0width$x}", b, width = CAN_BYTE_WIDTH));
        }
        out
    }

    /// Parse wire text. Anything that is not nine valid hex fields yields the sentinel.
    pub fn decode(text: &str) -> CanMessage {
        let fields: Vec<&str> = text.trim().split(':').collect();
        if fields.len() != CAN_MESSAGE_FIELDS {
            return CanMessage::empty();
        }
        Self::from_fields(&fields).unwrap_or_else(CanMessage::empty)
    }

    /// Build from already split fields (`id, b0..b7`)
    pub(crate) fn from_fields(fields: &[&str]) -> Option<CanMessage> {
        if fields.len() != CAN_MESSAGE_FIELDS {
            return None;
        }
        let id = parse_can_id(fields[0])?;
        let mut data = CanDataPacket::default();
        for (i, field) in fields[1..].iter().enumerate() {
            data.set_byte(i, parse_can_byte(field)?);
        }
        Some(CanMessage::new(id, data))
    }

    /// Human readable form with spaced separators
    pub fn to_pretty_string(&self) -> String {
        self.encode().replace(':', " : ")
    }
}

impl fmt::Display for CanMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a CAN identifier written in hex, with or without `0x`
pub fn parse_can_id(s: &str) -> Option<u32> {
    let digits = strip_hex_prefix(s);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Parse one data byte written in hex, with or without `0x`
pub fn parse_can_byte(s: &str) -> Option<u8> {
    let digits = strip_hex_prefix(s);
    if digits.is_empty() {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}
