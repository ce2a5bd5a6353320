//! Operation outcomes and aggregate reports

use serde::{Deserialize, Serialize};

use super::{CanMessage, IoType};

/// Outcome of a client operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoStatus {
    /// The device confirmed the operation
    Success,
    /// Tries ran out without a valid answer
    Failure,
}

impl IoStatus {
    /// `true` for [`IoStatus::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, IoStatus::Success)
    }
}

/// One pin in an IO report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoReportEntry {
    /// Pin number
    pub pin: u8,
    /// Mode the pin is in
    pub io_type: IoType,
    /// 0/1 for digital pins, raw ADC/PWM value for analog pins
    pub state: i32,
}

/// Snapshot of every configured pin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoReport {
    entries: Vec<IoReportEntry>,
}

impl IoReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: IoReportEntry) {
        self.entries.push(entry);
    }

    /// Entries in arrival order
    pub fn entries(&self) -> &[IoReportEntry] {
        &self.entries
    }

    /// Number of pins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pin was reported
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `pin`, if the device reported it
    pub fn get(&self, pin: u8) -> Option<&IoReportEntry> {
        self.entries.iter().find(|e| e.pin == pin)
    }

    /// Entries of one pin mode
    pub fn of_type(&self, io_type: IoType) -> impl Iterator<Item = &IoReportEntry> {
        self.entries.iter().filter(move |e| e.io_type == io_type)
    }

    /// `din` pins
    pub fn digital_inputs(&self) -> Vec<IoReportEntry> {
        self.of_type(IoType::DigitalInput).copied().collect()
    }

    /// `dout` pins
    pub fn digital_outputs(&self) -> Vec<IoReportEntry> {
        self.of_type(IoType::DigitalOutput).copied().collect()
    }

    /// `ain` pins
    pub fn analog_inputs(&self) -> Vec<IoReportEntry> {
        self.of_type(IoType::AnalogInput).copied().collect()
    }

    /// `aout` pins
    pub fn analog_outputs(&self) -> Vec<IoReportEntry> {
        self.of_type(IoType::AnalogOutput).copied().collect()
    }

    /// `dinpup` pins
    pub fn digital_input_pullups(&self) -> Vec<IoReportEntry> {
        self.of_type(IoType::DigitalInputPullup).copied().collect()
    }
}

/// Raw frames collected while listening on a port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialReport {
    results: Vec<String>,
}

impl SerialReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one result
    pub fn push(&mut self, result: impl Into<String>) {
        self.results.push(result.into());
    }

    /// Results in arrival order
    pub fn results(&self) -> &[String] {
        &self.results
    }

    /// Number of results
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// CAN frames collected while listening on a port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanReport {
    messages: Vec<CanMessage>,
}

impl CanReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame
    pub fn push(&mut self, message: CanMessage) {
        self.messages.push(message);
    }

    /// Frames in arrival order
    pub fn messages(&self) -> &[CanMessage] {
        &self.messages
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no frame arrived
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages with a given identifier
    pub fn with_id(&self, id: u32) -> Vec<CanMessage> {
        self.messages.iter().filter(|m| m.id == id).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_report_filters() {
        let mut report = IoReport::new();
        report.push(IoReportEntry { pin: 2, io_type: IoType::DigitalInput, state: 1 });
        report.push(IoReportEntry { pin: 3, io_type: IoType::DigitalOutput, state: 0 });
        report.push(IoReportEntry { pin: 14, io_type: IoType::AnalogInput, state: 512 });

        assert_eq!(report.len(), 3);
        assert_eq!(report.digital_inputs().len(), 1);
        assert_eq!(report.analog_inputs()[0].state, 512);
        assert!(report.analog_outputs().is_empty());
        assert_eq!(report.get(3).map(|e| e.io_type), Some(IoType::DigitalOutput));
        assert!(report.get(9).is_none());
    }
}
