//! Board models
//!
//! Pin maps for the supported boards, `A<n>` alias translation and the
//! raw ADC to voltage conversion used by the analog operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::protocol::ProtocolError;

/// Full-scale value of the 10-bit ADC
pub const ANALOG_MAX: i32 = 1023;

/// Reference voltage corresponding to [`ANALOG_MAX`]
pub const VOLTAGE_MAX: f64 = 5.0;

/// Raw ADC reading to volts
pub fn analog_to_voltage(raw: i32) -> f64 {
    f64::from(raw.clamp(0, ANALOG_MAX)) * VOLTAGE_MAX / f64::from(ANALOG_MAX)
}

/// Volts to the nearest raw ADC value, clamped to the valid range
pub fn voltage_to_analog(volts: f64) -> i32 {
    if !volts.is_finite() {
        return 0;
    }
    let raw = (volts * f64::from(ANALOG_MAX) / VOLTAGE_MAX).round();
    (raw as i32).clamp(0, ANALOG_MAX)
}

const STANDARD_PWM_PINS: &[u8] = &[3, 5, 6, 9, 10, 11];
const MEGA_PWM_PINS: &[u8] = &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 44, 45, 46];

/// Supported boards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardType {
    /// Arduino Uno
    Uno,
    /// Arduino Nano
    Nano,
    /// Arduino Mega 2560
    Mega,
}

impl BoardType {
    /// Identifier reported by the `ardtype` command
    pub fn identifier(&self) -> &'static str {
        match self {
            BoardType::Uno => "arduino_uno",
            BoardType::Nano => "arduino_nano",
            BoardType::Mega => "arduino_mega",
        }
    }

    /// Human-readable name
    pub fn long_name(&self) -> &'static str {
        match self {
            BoardType::Uno => "Arduino Uno",
            BoardType::Nano => "Arduino Nano",
            BoardType::Mega => "Arduino Mega",
        }
    }

    /// Every supported board
    pub fn all() -> [BoardType; 3] {
        [BoardType::Uno, BoardType::Nano, BoardType::Mega]
    }

    /// Pin numbers of the analog inputs, in `A0..` order
    pub fn analog_pins(&self) -> RangeInclusive<u8> {
        match self {
            BoardType::Uno => 14..=19,
            BoardType::Nano => 14..=21,
            BoardType::Mega => 54..=69,
        }
    }

    /// Pins with hardware PWM
    pub fn pwm_pins(&self) -> &'static [u8] {
        match self {
            BoardType::Uno | BoardType::Nano => STANDARD_PWM_PINS,
            BoardType::Mega => MEGA_PWM_PINS,
        }
    }

    /// Every usable IO pin (0 and 1 carry the serial link)
    pub fn available_pins(&self) -> RangeInclusive<u8> {
        2..=*self.analog_pins().end()
    }

    /// Whether `pin` is usable for IO
    pub fn is_valid_pin(&self, pin: u8) -> bool {
        self.available_pins().contains(&pin)
    }

    /// Whether `pin` has an ADC channel
    pub fn is_analog_pin(&self, pin: u8) -> bool {
        self.analog_pins().contains(&pin)
    }

    /// Whether `pin` can drive `aout`
    pub fn is_pwm_pin(&self, pin: u8) -> bool {
        self.pwm_pins().contains(&pin)
    }

    /// Translate `A3` (case-insensitive) to its pin number
    pub fn parse_analog_pin(&self, alias: &str) -> Result<u8, ProtocolError> {
        let invalid = || ProtocolError::InvalidPinAlias(alias.to_string());
        let trimmed = alias.trim();
        let index: u8 = trimmed
            .strip_prefix('A')
            .or_else(|| trimmed.strip_prefix('a'))
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let pins = self.analog_pins();
        let pin = pins.start().checked_add(index).ok_or_else(invalid)?;
        if pins.contains(&pin) {
            Ok(pin)
        } else {
            Err(invalid())
        }
    }

    /// Translate an analog pin number back to its `A<n>` alias
    pub fn analog_pin_from_number(&self, pin: u8) -> Result<String, ProtocolError> {
        let pins = self.analog_pins();
        if pins.contains(&pin) {
            Ok(format!("A{}", pin - pins.start()))
        } else {
            Err(ProtocolError::InvalidPinAlias(pin.to_string()))
        }
    }

    /// Accept either a plain pin number or an analog alias
    pub fn parse_pin(&self, text: &str) -> Result<u8, ProtocolError> {
        match text.trim().parse::<u8>() {
            Ok(pin) if self.is_valid_pin(pin) => Ok(pin),
            Ok(_) => Err(ProtocolError::InvalidPinAlias(text.to_string())),
            Err(_) => self.parse_analog_pin(text),
        }
    }
}

impl fmt::Display for BoardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}

impl FromStr for BoardType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        BoardType::all()
            .into_iter()
            .find(|b| b.identifier() == wanted || b.long_name().to_lowercase() == wanted)
            .ok_or_else(|| ProtocolError::UnknownSetting {
                kind: "board type",
                value: s.to_string(),
            })
    }
}
