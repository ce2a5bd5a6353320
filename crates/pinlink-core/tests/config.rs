//! Configuration file tests

use pinlink_core::config::{PinlinkConfig, PortEntry};
use pinlink_core::protocol::{BaudRate, ClientConfig, LineEnding, Parity, PortRegistry};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::tempdir;

fn sample_config() -> PinlinkConfig {
    let mut uno = PortEntry::new("/dev/ttyACM0");
    uno.serial.line_ending = LineEnding::LineFeed;
    let mut bt = PortEntry::new("/dev/rfcomm0");
    bt.serial.baud_rate = BaudRate(9600);
    bt.serial.parity = Parity::Even;
    bt.serial.boot_time_ms = 3000;

    PinlinkConfig {
        client: ClientConfig {
            io_try_count: 5,
            response_timeout_ms: 400,
            ..ClientConfig::default()
        },
        ports: vec![uno, bt],
    }
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pinlink.json");
    let config = sample_config();

    config.save(&path).unwrap();
    let loaded = PinlinkConfig::load(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_port_settings_are_flat_in_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pinlink.json");
    sample_config().save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let port = &value["ports"][1];
    assert_eq!(port["name"], "/dev/rfcomm0");
    assert_eq!(port["baud_rate"], 9600);
    assert_eq!(port["boot_time_ms"], 3000);
}

#[test]
fn test_load_missing_file_is_error() {
    let dir = tempdir().unwrap();
    let err = PinlinkConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_load_invalid_json_is_invalid_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"ports\": [").unwrap();

    let err = PinlinkConfig::load(&path).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn test_register_ports_in_order() {
    let registry = Arc::new(PortRegistry::new());
    let config = sample_config();

    let handles = config.register_ports(&registry);
    assert_eq!(handles.len(), 2);
    assert_eq!(registry.len(), 2);

    let names: Vec<String> = handles
        .iter()
        .map(|h| registry.with_port(*h, |t| t.port_name().to_string()).unwrap())
        .collect();
    assert_eq!(names, vec!["/dev/ttyACM0".to_string(), "/dev/rfcomm0".to_string()]);

    let bt_open = registry.with_port(handles[1], |t| t.is_open()).unwrap();
    assert!(!bt_open);

    let client = config.client(registry);
    assert_eq!(client.config().io_try_count, 5);
}
