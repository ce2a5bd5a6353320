//! Serial line settings
//!
//! Baud rate, framing and line-ending types with their textual names, plus the
//! [`SerialConfig`] bundle a transport is created from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT_MS};

/// Baud rates accepted by [`BaudRate::from_str`]
pub const STANDARD_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000, 2500000,
    3000000, 3500000, 4000000,
];

/// Line speed in bits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaudRate(pub u32);

impl BaudRate {
    /// Raw bits-per-second value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Every standard rate
    pub fn available() -> Vec<BaudRate> {
        STANDARD_BAUD_RATES.iter().copied().map(BaudRate).collect()
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        BaudRate(DEFAULT_BAUD_RATE)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BaudRate {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ProtocolError::UnknownSetting {
            kind: "baud rate",
            value: s.to_string(),
        };
        let rate: u32 = s.trim().parse().map_err(|_| unknown())?;
        if STANDARD_BAUD_RATES.contains(&rate) {
            Ok(BaudRate(rate))
        } else {
            Err(unknown())
        }
    }
}

/// Data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataBits {
    /// 5 bits
    Five,
    /// 6 bits
    Six,
    /// 7 bits
    Seven,
    /// 8 bits
    #[default]
    Eight,
}

impl DataBits {
    /// All supported values
    pub fn available() -> [DataBits; 4] {
        [DataBits::Five, DataBits::Six, DataBits::Seven, DataBits::Eight]
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        write!(f, "{}", n)
    }
}

impl FromStr for DataBits {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "5" | "five" => Ok(DataBits::Five),
            "6" | "six" => Ok(DataBits::Six),
            "7" | "seven" => Ok(DataBits::Seven),
            "8" | "eight" => Ok(DataBits::Eight),
            _ => Err(ProtocolError::UnknownSetting {
                kind: "data bits",
                value: s.to_string(),
            }),
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Stop bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StopBits {
    /// 1 stop bit
    #[default]
    One,
    /// 2 stop bits
    Two,
}

impl StopBits {
    /// All supported values
    pub fn available() -> [StopBits; 2] {
        [StopBits::One, StopBits::Two]
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopBits::One => f.write_str("1"),
            StopBits::Two => f.write_str("2"),
        }
    }
}

impl FromStr for StopBits {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "one" => Ok(StopBits::One),
            "2" | "two" => Ok(StopBits::Two),
            _ => Err(ProtocolError::UnknownSetting {
                kind: "stop bits",
                value: s.to_string(),
            }),
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl Parity {
    /// All supported values
    pub fn available() -> [Parity; 3] {
        [Parity::None, Parity::Odd, Parity::Even]
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::None => f.write_str("None"),
            Parity::Odd => f.write_str("Odd"),
            Parity::Even => f.write_str("Even"),
        }
    }
}

impl FromStr for Parity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            _ => Err(ProtocolError::UnknownSetting {
                kind: "parity",
                value: s.to_string(),
            }),
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Terminator appended to every outgoing string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LineEnding {
    /// Nothing appended
    #[default]
    None,
    /// `\r`
    CarriageReturn,
    /// `\n`
    LineFeed,
    /// `\r\n`
    CarriageReturnLineFeed,
}

impl LineEnding {
    /// The bytes this ending stands for
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::CarriageReturn => "\r",
            LineEnding::LineFeed => "\n",
            LineEnding::CarriageReturnLineFeed => "\r\n",
        }
    }

    /// All supported values
    pub fn available() -> [LineEnding; 4] {
        [
            LineEnding::None,
            LineEnding::CarriageReturn,
            LineEnding::LineFeed,
            LineEnding::CarriageReturnLineFeed,
        ]
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineEnding::None => "None",
            LineEnding::CarriageReturn => "CR",
            LineEnding::LineFeed => "LF",
            LineEnding::CarriageReturnLineFeed => "CRLF",
        };
        f.write_str(name)
    }
}

impl FromStr for LineEnding {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(LineEnding::None),
            "cr" | "\\r" => Ok(LineEnding::CarriageReturn),
            "lf" | "\\n" => Ok(LineEnding::LineFeed),
            "crlf" | "\\r\\n" => Ok(LineEnding::CarriageReturnLineFeed),
            _ => Err(ProtocolError::UnknownSetting {
                kind: "line ending",
                value: s.to_string(),
            }),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_boot_time_ms() -> u64 {
    super::DEFAULT_BOOT_TIME_MS
}

/// Settings a transport is opened with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Line speed
    #[serde(default)]
    pub baud_rate: BaudRate,
    /// Data bits per character
    #[serde(default)]
    pub data_bits: DataBits,
    /// Stop bits
    #[serde(default)]
    pub stop_bits: StopBits,
    /// Parity
    #[serde(default)]
    pub parity: Parity,
    /// Appended to every write
    #[serde(default)]
    pub line_ending: LineEnding,
    /// Per-byte read timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive empty reads tolerated by `read_string`
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Wait after opening a Bluetooth port before it is usable
    #[serde(default = "default_boot_time_ms")]
    pub boot_time_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::default(),
            data_bits: DataBits::default(),
            stop_bits: StopBits::default(),
            parity: Parity::default(),
            line_ending: LineEnding::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            boot_time_ms: super::DEFAULT_BOOT_TIME_MS,
        }
    }
}

/// Bluetooth serial bridges need a settle delay after open and between writes
pub fn is_bluetooth(port_name: &str) -> bool {
    let pn = port_name.to_lowercase();
    pn.contains("rfcomm") || pn.contains("bluetooth")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_115200_8n1() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.baud_rate, BaudRate(115200));
        assert_eq!(cfg.data_bits, DataBits::Eight);
        assert_eq!(cfg.stop_bits, StopBits::One);
        assert_eq!(cfg.parity, Parity::None);
        assert_eq!(cfg.line_ending, LineEnding::None);
        assert_eq!(cfg.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_name_aliases() {
        assert_eq!("eight".parse::<DataBits>().unwrap(), DataBits::Eight);
        assert_eq!("7".parse::<DataBits>().unwrap(), DataBits::Seven);
        assert_eq!("One".parse::<StopBits>().unwrap(), StopBits::One);
        assert_eq!("e".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("CRLF".parse::<LineEnding>().unwrap(), LineEnding::CarriageReturnLineFeed);
        assert_eq!("9600".parse::<BaudRate>().unwrap(), BaudRate(9600));
    }

    #[test]
    fn test_unknown_names_are_errors() {
        assert!("nine".parse::<DataBits>().is_err());
        assert!("mark".parse::<Parity>().is_err());
        assert!("12345".parse::<BaudRate>().is_err());
        assert!("fast".parse::<BaudRate>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for p in Parity::available() {
            assert_eq!(p.to_string().parse::<Parity>().unwrap(), p);
        }
        for l in LineEnding::available() {
            assert_eq!(l.to_string().parse::<LineEnding>().unwrap(), l);
        }
    }

    #[test]
    fn test_is_bluetooth() {
        assert!(is_bluetooth("/dev/rfcomm0"));
        assert!(is_bluetooth("COM7 (Bluetooth)"));
        assert!(!is_bluetooth("/dev/ttyACM0"));
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let cfg: SerialConfig = serde_json::from_str(r#"{"baud_rate": 9600}"#).unwrap();
        assert_eq!(cfg.baud_rate, BaudRate(9600));
        assert_eq!(cfg.retry_count, DEFAULT_RETRY_COUNT);
    }
}
