//! Request/response framing
//!
//! Frame format:
//! - `{` opens a frame, `}` closes it
//! - the header comes first, then zero or more `:`-separated fields
//!
//! `{dwrite:13:1}` is a request, `{dwrite:13:1:1}` its response.

use std::fmt;

use super::{Command, ExchangeError};

/// Field value the device uses to signal that an operation failed
pub const FAILURE_SENTINEL: &str = "-1";

/// Closing delimiter of every frame
pub const FRAME_TERMINATOR: &str = "}";

/// An outgoing frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    header: String,
    args: Vec<String>,
}

impl Request {
    /// Start a request with an arbitrary header
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            args: Vec::new(),
        }
    }

    /// Start a request for a known command
    pub fn command(cmd: Command) -> Self {
        Self::new(cmd.header())
    }

    /// Append an argument
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Append a boolean as `1`/`0`
    pub fn flag(self, value: bool) -> Self {
        self.arg(if value { "1" } else { "0" })
    }

    /// Command header
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Arguments in order
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Wire text
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.header)?;
        for arg in &self.args {
            write!(f, ":{}", arg)?;
        }
        f.write_str(FRAME_TERMINATOR)
    }
}

/// A validated incoming frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    header: String,
    fields: Vec<String>,
}

impl Response {
    /// Parse `raw`, which must be exactly one frame with the given header
    pub fn parse(raw: &str, header: &str) -> Result<Response, ExchangeError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ExchangeError::Empty);
        }

        let body = text
            .strip_prefix('{')
            .and_then(|t| t.strip_prefix(header))
            .ok_or_else(|| ExchangeError::HeaderMismatch {
                expected: header.to_string(),
                raw: text.to_string(),
            })?;

        let body = body
            .strip_suffix(FRAME_TERMINATOR)
            .ok_or_else(|| ExchangeError::Malformed(text.to_string()))?;

        let fields = if body.is_empty() {
            Vec::new()
        } else if let Some(rest) = body.strip_prefix(':') {
            rest.split(':').map(|f| f.trim().to_string()).collect()
        } else {
            // Longer header sharing our prefix, e.g. `ioreportend` vs `ioreport`
            return Err(ExchangeError::HeaderMismatch {
                expected: header.to_string(),
                raw: text.to_string(),
            });
        };

        Ok(Response {
            header: header.to_string(),
            fields,
        })
    }

    /// Header of the frame
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Fields after the header, result field included
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Field by position
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the frame had no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when the trailing result field carries the failure sentinel
    pub fn is_failure(&self) -> bool {
        self.fields.last().map(String::as_str) == Some(FAILURE_SENTINEL)
    }
}

/// Every `{...}` frame in `raw`, braces included. Text outside frames is ignored.
pub fn split_frames(raw: &str) -> Vec<&str> {
    let mut frames = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find('{') {
        let candidate = &rest[start..];
        match candidate[1..].find(['{', '}']) {
            Some(i) if candidate.as_bytes()[i + 1] == b'}' => {
                frames.push(&candidate[..i + 2]);
                rest = &candidate[i + 2..];
            }
            // Unclosed frame interrupted by a new one
            Some(i) => rest = &candidate[i + 1..],
            None => break,
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_encoding() {
        assert_eq!(Request::command(Command::FirmwareVersion).encode(), "{version}");
        assert_eq!(
            Request::command(Command::DigitalWrite).arg(13).flag(true).encode(),
            "{dwrite:13:1}"
        );
    }

    #[test]
    fn test_parse_fields() {
        let resp = Response::parse("{dread:4:1:1}\r\n", "dread").unwrap();
        assert_eq!(resp.fields(), &["4", "1", "1"]);
        assert!(!resp.is_failure());
    }

    #[test]
    fn test_parse_no_fields() {
        let resp = Response::parse("{ioreport}", "ioreport").unwrap();
        assert!(resp.is_empty());
    }

    #[test]
    fn test_parse_rejects_wrong_header() {
        assert!(matches!(
            Response::parse("{aread:4:1:1}", "dread"),
            Err(ExchangeError::HeaderMismatch { .. })
        ));
        assert!(matches!(
            Response::parse("{ioreportend}", "ioreport"),
            Err(ExchangeError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unterminated() {
        assert!(matches!(
            Response::parse("{dread:4:1", "dread"),
            Err(ExchangeError::Malformed(_))
        ));
        assert!(matches!(Response::parse("  ", "dread"), Err(ExchangeError::Empty)));
    }

    #[test]
    fn test_failure_sentinel() {
        let resp = Response::parse("{heartbeat:-1}", "heartbeat").unwrap();
        assert!(resp.is_failure());
    }

    #[test]
    fn test_split_frames() {
        let raw = "junk{ioreport:2:din:1}{ioreport:3:dout:0}\r\n{ioreportend}";
        assert_eq!(
            split_frames(raw),
            vec!["{ioreport:2:din:1}", "{ioreport:3:dout:0}", "{ioreportend}"]
        );
    }

    #[test]
    fn test_split_frames_drops_broken_frames() {
        assert_eq!(split_frames("{dread:1{dread:2:0:1}{tail"), vec!["{dread:2:0:1}"]);
    }
}
