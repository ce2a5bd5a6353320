//! Configuration file
//!
//! A JSON document listing the ports to register and the client's retry and
//! timing policy. Every field is optional.
//!
//! ```json
//! {
//!   "client": { "io_try_count": 5 },
//!   "ports": [
//!     { "name": "/dev/ttyACM0", "baud_rate": 115200 },
//!     { "name": "/dev/rfcomm0", "boot_time_ms": 3000 }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::protocol::{
    ClientConfig, PortHandle, PortRegistry, ProtocolClient, SerialConfig, SerialTransport,
};

/// A port to register at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortEntry {
    /// OS port name, e.g. `/dev/ttyACM0` or `COM3`
    pub name: String,
    /// Line settings for this port
    #[serde(flatten)]
    pub serial: SerialConfig,
}

impl PortEntry {
    /// Port with default line settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial: SerialConfig::default(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinlinkConfig {
    /// Retry and timing policy
    #[serde(default)]
    pub client: ClientConfig,
    /// Ports registered in order
    #[serde(default)]
    pub ports: Vec<PortEntry>,
}

impl PinlinkConfig {
    /// Parse from JSON text
    pub fn from_json_str(text: &str) -> io::Result<Self> {
        serde_json::from_str(text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!(
            "Loaded {} port(s) from {}",
            config.ports.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    /// Write as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    /// Register every configured port (unopened) and return their handles in order
    pub fn register_ports(&self, registry: &PortRegistry) -> Vec<PortHandle> {
        self.ports
            .iter()
            .map(|p| registry.register(SerialTransport::new(p.name.clone(), p.serial.clone())))
            .collect()
    }

    /// Client over `registry` using this file's policy
    pub fn client(&self, registry: Arc<PortRegistry>) -> ProtocolClient {
        ProtocolClient::with_config(registry, self.client.clone())
    }
}
