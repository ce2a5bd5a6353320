//! Serial Protocol Communication
//!
//! Implements the brace-framed text protocol spoken by the PinLink firmware:
//! requests look like `{dwrite:13:1}`, responses echo the header and append a
//! result field, e.g. `{dwrite:13:1:1}`. A result of `-1` means the device
//! rejected the operation.
//!
//! Layers, leaves first: [`can`] codec, [`SerialTransport`] over a
//! [`SerialLink`], [`PortRegistry`] for shared locked access, and
//! [`ProtocolClient`] for typed operations with bounded retries.

pub mod can;
mod client;
pub mod commands;
mod error;
pub mod frame;
mod link;
mod registry;
pub mod report;
pub mod serial;
mod transport;

pub use can::{CanDataPacket, CanMessage};
pub use client::{ClientConfig, ProtocolClient};
pub use commands::{CanMaskType, Command, IoType};
pub use error::{ExchangeError, ProtocolError};
pub use frame::{Request, Response};
pub use link::{NativeLink, SerialLink};
pub use registry::{AsyncOperation, PortHandle, PortRegistry, ProtectedPort};
pub use report::{CanReport, IoReport, IoReportEntry, IoStatus, SerialReport};
pub use serial::{BaudRate, DataBits, LineEnding, Parity, SerialConfig, StopBits};
pub use transport::SerialTransport;

/// Default baud rate of the firmware
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-byte read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 20;

/// Default number of consecutive empty reads tolerated by a string read
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default wait after opening a Bluetooth port
pub const DEFAULT_BOOT_TIME_MS: u64 = 2000;
