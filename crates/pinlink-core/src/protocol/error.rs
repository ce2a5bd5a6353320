//! Protocol errors
//!
//! Two tiers: [`ProtocolError`] is returned to callers for misuse and
//! unrecoverable port problems, [`ExchangeError`] describes a single bad
//! request/response exchange and is consumed by the client's retry loop.

use thiserror::Error;

/// Errors returned to callers of the transport, registry and client
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Driver or runtime failure outside a read/write
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The OS refused to open the port
    #[error("Failed to open '{port}': {reason}")]
    OpenFailed {
        /// Port name as given
        port: String,
        /// Driver message
        reason: String,
    },

    /// Read, write or flush on a closed port
    #[error("Port is not open")]
    NotConnected,

    /// A line setting was changed on an open port
    #[error("Cannot change {0} while the port is open")]
    PortOpen(&'static str),

    /// Handle outside the registry
    #[error("Invalid port handle {index} (registry holds {len} ports)")]
    InvalidPortHandle {
        /// Requested index
        index: usize,
        /// Ports registered at the time
        len: usize,
    },

    /// Caller passed a value the operation cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Text that names no pin mode
    #[error("Unknown IO type '{0}'")]
    UnknownIoType(String),

    /// Unparseable baud rate, parity, board name and similar
    #[error("Unknown {kind} '{value}'")]
    UnknownSetting {
        /// What was being parsed
        kind: &'static str,
        /// The rejected text
        value: String,
    },

    /// Not an analog alias for this board
    #[error("Invalid pin alias '{0}'")]
    InvalidPinAlias(String),

    /// Only one background operation runs per port
    #[error("An asynchronous operation is already running on this port")]
    OperationInFlight,

    /// The operation saw its cancellation token
    #[error("Asynchronous operation was cancelled")]
    Cancelled,

    /// Read or write failure on the link
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Why one request/response exchange was rejected
///
/// Every variant is retryable; none of them escape [`ProtocolClient`](super::ProtocolClient).
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Nothing arrived before the timeout
    #[error("No response received")]
    Empty,

    /// Not a `{...}` frame
    #[error("Malformed response: {0:?}")]
    Malformed(String),

    /// Frame answers a different command
    #[error("Expected header '{expected}', got {raw:?}")]
    HeaderMismatch {
        /// Header of the request
        expected: String,
        /// Frame as received
        raw: String,
    },

    /// Wrong number of response fields
    #[error("Expected {expected} fields, got {actual}")]
    ArityMismatch {
        /// Fields the command answers with
        expected: usize,
        /// Fields received
        actual: usize,
    },

    /// An argument came back different from what was sent
    #[error("Echo mismatch: sent '{sent}', device answered '{echoed}'")]
    EchoMismatch {
        /// Argument as sent
        sent: String,
        /// Field as answered
        echoed: String,
    },

    /// Result field was `-1`
    #[error("Device reported failure")]
    DeviceRejected,

    /// A field did not parse as the expected value
    #[error("Could not decode field {0:?}")]
    Decode(String),

    /// Link failure mid-exchange
    #[error("I/O error during exchange: {0}")]
    Io(#[from] std::io::Error),
}
