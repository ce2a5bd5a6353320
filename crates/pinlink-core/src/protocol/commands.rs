//! Protocol commands
//!
//! Every request the device understands, with its wire header and the number
//! of fields its response carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ProtocolError;

/// Commands understood by the device firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Board model identifier (`ardtype`)
    BoardType,
    /// Firmware version string (`version`)
    FirmwareVersion,
    /// Whether the firmware was built with CAN support (`canbus`)
    CanCapability,
    /// Liveness probe (`heartbeat`)
    Heartbeat,

    /// Hardware digital read (`dread`)
    DigitalRead,
    /// Digital write (`dwrite`)
    DigitalWrite,
    /// Hardware analog read (`aread`)
    AnalogRead,
    /// Analog/PWM write (`awrite`)
    AnalogWrite,
    /// Last known digital state without touching the pin (`sdread`)
    SoftDigitalRead,
    /// Last known analog state without touching the pin (`saread`)
    SoftAnalogRead,
    /// Query pin mode (`ptype`)
    PinType,
    /// Change pin mode (`ptchange`)
    PinTypeChange,
    /// Query analog-to-digital threshold (`atodthresh`)
    AnalogToDigitalThreshold,
    /// Change analog-to-digital threshold (`atodchange`)
    ChangeAnalogToDigitalThreshold,
    /// State of every configured pin (`ioreport`, terminated by `ioreportend`)
    IoReport,

    /// Initialise the CAN controller (`caninit`)
    CanInit,
    /// Pop one received CAN frame (`canread`)
    CanRead,
    /// Transmit a CAN frame (`canwrite`)
    CanWrite,
    /// Toggle unsolicited CAN frame updates (`canlup`)
    CanLiveUpdate,
    /// Accept frames with this id (`addpcanmask`)
    AddPositiveCanMask,
    /// Reject frames with this id (`addncanmask`)
    AddNegativeCanMask,
    /// `rempcanmask`
    RemovePositiveCanMask,
    /// `remncanmask`
    RemoveNegativeCanMask,
    /// `clearpcanmasks`
    ClearPositiveCanMasks,
    /// `clearncanmasks`
    ClearNegativeCanMasks,
    /// `clearallcanmasks`
    ClearAllCanMasks,
}

impl Command {
    /// Header text as it appears after the opening brace
    pub fn header(&self) -> &'static str {
        match self {
            Command::BoardType => "ardtype",
            Command::FirmwareVersion => "version",
            Command::CanCapability => "canbus",
            Command::Heartbeat => "heartbeat",
            Command::DigitalRead => "dread",
            Command::DigitalWrite => "dwrite",
            Command::AnalogRead => "aread",
            Command::AnalogWrite => "awrite",
            Command::SoftDigitalRead => "sdread",
            Command::SoftAnalogRead => "saread",
            Command::PinType => "ptype",
            Command::PinTypeChange => "ptchange",
            Command::AnalogToDigitalThreshold => "atodthresh",
            Command::ChangeAnalogToDigitalThreshold => "atodchange",
            Command::IoReport => "ioreport",
            Command::CanInit => "caninit",
            Command::CanRead => "canread",
            Command::CanWrite => "canwrite",
            Command::CanLiveUpdate => "canlup",
            Command::AddPositiveCanMask => "addpcanmask",
            Command::AddNegativeCanMask => "addncanmask",
            Command::RemovePositiveCanMask => "rempcanmask",
            Command::RemoveNegativeCanMask => "remncanmask",
            Command::ClearPositiveCanMasks => "clearpcanmasks",
            Command::ClearNegativeCanMasks => "clearncanmasks",
            Command::ClearAllCanMasks => "clearallcanmasks",
        }
    }

    /// Fields after the header in a successful response, result code included.
    ///
    /// For [`Command::IoReport`] this is the size of one report frame.
    pub fn response_fields(&self) -> usize {
        match self {
            Command::DigitalRead
            | Command::DigitalWrite
            | Command::AnalogRead
            | Command::AnalogWrite
            | Command::SoftDigitalRead
            | Command::SoftAnalogRead
            | Command::PinType
            | Command::PinTypeChange
            | Command::IoReport => 3,
            Command::BoardType
            | Command::FirmwareVersion
            | Command::CanCapability
            | Command::AnalogToDigitalThreshold
            | Command::ChangeAnalogToDigitalThreshold
            | Command::CanLiveUpdate
            | Command::AddPositiveCanMask
            | Command::AddNegativeCanMask
            | Command::RemovePositiveCanMask
            | Command::RemoveNegativeCanMask => 2,
            Command::Heartbeat
            | Command::CanInit
            | Command::ClearPositiveCanMasks
            | Command::ClearNegativeCanMasks
            | Command::ClearAllCanMasks => 1,
            Command::CanRead | Command::CanWrite => 10,
        }
    }

    /// Header of the frame that closes a multi-frame response
    pub fn end_header(&self) -> Option<&'static str> {
        match self {
            Command::IoReport => Some("ioreportend"),
            _ => None,
        }
    }

    /// Pure pin reads use the read try count instead of the command try count
    pub fn is_pin_read(&self) -> bool {
        matches!(
            self,
            Command::DigitalRead
                | Command::AnalogRead
                | Command::SoftDigitalRead
                | Command::SoftAnalogRead
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Pin mode as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoType {
    /// `din`
    DigitalInput,
    /// `dout`
    DigitalOutput,
    /// `ain`
    AnalogInput,
    /// `aout`
    AnalogOutput,
    /// `dinpup`, input with the internal pull-up enabled
    DigitalInputPullup,
    /// Mode could not be determined. Never sent to or parsed from the device.
    Unspecified,
}

impl IoType {
    /// Name used on the wire; `None` for [`IoType::Unspecified`]
    pub fn wire_name(&self) -> Option<&'static str> {
        match self {
            IoType::DigitalInput => Some("din"),
            IoType::DigitalOutput => Some("dout"),
            IoType::AnalogInput => Some("ain"),
            IoType::AnalogOutput => Some("aout"),
            IoType::DigitalInputPullup => Some("dinpup"),
            IoType::Unspecified => None,
        }
    }

    /// Wire name, or `unspecified`
    pub fn as_str(&self) -> &'static str {
        self.wire_name().unwrap_or("unspecified")
    }

    /// Every mode the device understands
    pub fn all() -> [IoType; 5] {
        [
            IoType::DigitalInput,
            IoType::DigitalOutput,
            IoType::AnalogInput,
            IoType::AnalogOutput,
            IoType::DigitalInputPullup,
        ]
    }

    /// Inputs whose state is reported as 0/1
    pub fn is_digital(&self) -> bool {
        matches!(
            self,
            IoType::DigitalInput | IoType::DigitalOutput | IoType::DigitalInputPullup
        )
    }
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IoType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        IoType::all()
            .into_iter()
            .find(|t| t.wire_name() == Some(wanted.as_str()))
            .ok_or_else(|| ProtocolError::UnknownIoType(s.to_string()))
    }
}

/// Which CAN mask list an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanMaskType {
    /// Frames with listed ids are accepted
    Positive,
    /// Frames with listed ids are dropped
    Negative,
}

impl CanMaskType {
    pub(crate) fn add_command(&self) -> Command {
        match self {
            CanMaskType::Positive => Command::AddPositiveCanMask,
            CanMaskType::Negative => Command::AddNegativeCanMask,
        }
    }

    pub(crate) fn remove_command(&self) -> Command {
        match self {
            CanMaskType::Positive => Command::RemovePositiveCanMask,
            CanMaskType::Negative => Command::RemoveNegativeCanMask,
        }
    }

    pub(crate) fn clear_command(mask: Option<CanMaskType>) -> Command {
        match mask {
            Some(CanMaskType::Positive) => Command::ClearPositiveCanMasks,
            Some(CanMaskType::Negative) => Command::ClearNegativeCanMasks,
            None => Command::ClearAllCanMasks,
        }
    }
}

/// Text accepted as a logic-high digital state
pub const DIGITAL_HIGH_IDENTIFIERS: &[&str] = &["1", "high", "true", "on"];

/// Text accepted as a logic-low digital state
pub const DIGITAL_LOW_IDENTIFIERS: &[&str] = &["0", "low", "false", "off"];

/// Parse a user-supplied digital state such as `"high"` or `"0"`
pub fn parse_digital_state(s: &str) -> Result<bool, ProtocolError> {
    let lower = s.trim().to_lowercase();
    if DIGITAL_HIGH_IDENTIFIERS.contains(&lower.as_str()) {
        Ok(true)
    } else if DIGITAL_LOW_IDENTIFIERS.contains(&lower.as_str()) {
        Ok(false)
    } else {
        Err(ProtocolError::InvalidArgument(format!(
            "'{}' is not a digital state",
            s
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_unique() {
        let all = [
            Command::BoardType,
            Command::FirmwareVersion,
            Command::CanCapability,
            Command::Heartbeat,
            Command::DigitalRead,
            Command::DigitalWrite,
            Command::AnalogRead,
            Command::AnalogWrite,
            Command::SoftDigitalRead,
            Command::SoftAnalogRead,
            Command::PinType,
            Command::PinTypeChange,
            Command::AnalogToDigitalThreshold,
            Command::ChangeAnalogToDigitalThreshold,
            Command::IoReport,
            Command::CanInit,
            Command::CanRead,
            Command::CanWrite,
            Command::CanLiveUpdate,
            Command::AddPositiveCanMask,
            Command::AddNegativeCanMask,
            Command::RemovePositiveCanMask,
            Command::RemoveNegativeCanMask,
            Command::ClearPositiveCanMasks,
            Command::ClearNegativeCanMasks,
            Command::ClearAllCanMasks,
        ];
        let mut headers: Vec<&str> = all.iter().map(|c| c.header()).collect();
        headers.sort();
        headers.dedup();
        assert_eq!(headers.len(), all.len());
    }

    #[test]
    fn test_pin_reads() {
        assert!(Command::DigitalRead.is_pin_read());
        assert!(Command::SoftAnalogRead.is_pin_read());
        assert!(!Command::DigitalWrite.is_pin_read());
        assert!(!Command::CanRead.is_pin_read());
    }

    #[test]
    fn test_io_type_names() {
        assert_eq!("dinpup".parse::<IoType>().unwrap(), IoType::DigitalInputPullup);
        assert_eq!("AOUT".parse::<IoType>().unwrap(), IoType::AnalogOutput);
        assert_eq!(IoType::AnalogInput.to_string(), "ain");
        assert!(matches!(
            "pwm".parse::<IoType>(),
            Err(ProtocolError::UnknownIoType(_))
        ));
        assert!("unspecified".parse::<IoType>().is_err());
        assert_eq!(IoType::Unspecified.wire_name(), None);
        assert!(!IoType::Unspecified.is_digital());
    }

    #[test]
    fn test_digital_state_identifiers() {
        assert!(parse_digital_state("HIGH").unwrap());
        assert!(parse_digital_state("on").unwrap());
        assert!(!parse_digital_state("0").unwrap());
        assert!(parse_digital_state("maybe").is_err());
    }
}
