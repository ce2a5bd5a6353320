//! # PinLink Core Library
//!
//! Host side of the PinLink serial protocol for driving microcontroller GPIO
//! and CAN peripherals.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A serial transport with per-byte timeouts and Bluetooth handling
//! - A shared port registry with per-port locking and cancellable async reads
//! - Typed GPIO and CAN operations with bounded retries
//! - The CAN frame text codec
//! - A simulated device for running without hardware
//!
//! ## Supported Boards
//!
//! - Arduino Uno
//! - Arduino Nano
//! - Arduino Mega
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pinlink_core::prelude::*;
//!
//! let registry = Arc::new(PortRegistry::new());
//! let client = ProtocolClient::new(registry.clone());
//! let port = client.register(SerialTransport::new("/dev/ttyACM0", SerialConfig::default()));
//!
//! client.pin_mode(port, 13, IoType::DigitalOutput)?;
//! let (status, state) = client.digital_write(port, 13, true)?;
//! ```

pub mod board;
pub mod config;
pub mod demo;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::board::BoardType;
    pub use crate::config::{PinlinkConfig, PortEntry};
    pub use crate::demo::SimulatedDevice;
    pub use crate::protocol::{
        CanDataPacket, CanMaskType, CanMessage, ClientConfig, IoStatus, IoType, PortHandle,
        PortRegistry, ProtocolClient, ProtocolError, SerialConfig, SerialTransport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
