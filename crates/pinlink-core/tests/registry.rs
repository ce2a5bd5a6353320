//! Port registry and background operation tests

use pinlink_core::board::BoardType;
use pinlink_core::demo::SimulatedDevice;
use pinlink_core::protocol::{
    PortHandle, PortRegistry, ProtocolError, SerialConfig, SerialTransport,
};
use std::sync::Arc;
use std::time::Duration;

fn sim_transport(device: &SimulatedDevice) -> SerialTransport {
    let config = SerialConfig {
        timeout_ms: 20,
        retry_count: 3,
        ..SerialConfig::default()
    };
    SerialTransport::with_link("sim0", config, Box::new(device.clone()))
}

fn open_port(registry: &PortRegistry, device: &SimulatedDevice) -> PortHandle {
    let handle = registry.register(sim_transport(device));
    registry.with_port(handle, |t| t.open()).unwrap().unwrap();
    handle
}

#[test]
fn test_handles_are_sequential() {
    let registry = PortRegistry::new();
    let device = SimulatedDevice::new(BoardType::Uno);
    let a = registry.register(sim_transport(&device));
    let b = registry.register(sim_transport(&device));

    assert_eq!(a.index(), 0);
    assert_eq!(b.index(), 1);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.handles(), vec![a, b]);
}

#[test]
fn test_invalid_handle() {
    let registry = PortRegistry::new();
    registry.register(sim_transport(&SimulatedDevice::default()));

    match registry.get(PortHandle::from_index(1)) {
        Err(ProtocolError::InvalidPortHandle { index, len }) => {
            assert_eq!(index, 1);
            assert_eq!(len, 1);
        }
        other => panic!("expected InvalidPortHandle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_with_port_locks_transport() {
    let registry = PortRegistry::new();
    let device = SimulatedDevice::default();
    let handle = open_port(&registry, &device);

    let name = registry.with_port(handle, |t| t.port_name().to_string()).unwrap();
    assert_eq!(name, "sim0");

    let port = registry.get(handle).unwrap();
    let guard = port.lock();
    assert!(guard.is_open());
}

#[tokio::test]
async fn test_async_write_then_read() {
    let registry = PortRegistry::new();
    let device = SimulatedDevice::default();
    let handle = open_port(&registry, &device);
    let port = registry.get(handle).unwrap();

    let written = port.async_write_string("{heartbeat}").unwrap().join().await.unwrap();
    assert_eq!(written, 11);

    let reply = port.async_read_until("}", 64).unwrap().join().await.unwrap();
    assert_eq!(reply, "{heartbeat:1}");
    assert!(!port.is_busy());
}

#[tokio::test]
async fn test_second_async_operation_rejected() {
    let registry = PortRegistry::new();
    let device = SimulatedDevice::default();
    let handle = open_port(&registry, &device);
    let port = registry.get(handle).unwrap();

    // Silent device: the read runs for retry_count * timeout
    let first = port.async_read_string(64).unwrap();
    assert!(matches!(
        port.async_read_string(64),
        Err(ProtocolError::OperationInFlight)
    ));

    assert_eq!(first.join().await.unwrap(), "");
    assert!(!port.is_busy());
    assert!(port.async_read_string(1).is_ok());
}

#[tokio::test]
async fn test_cancel_stops_read() {
    let registry = PortRegistry::new();
    let device = SimulatedDevice::default();
    let handle = registry.register(SerialTransport::with_link(
        "sim0",
        SerialConfig {
            timeout_ms: 10_000,
            ..SerialConfig::default()
        },
        Box::new(device.clone()),
    ));
    registry.with_port(handle, |t| t.open()).unwrap().unwrap();
    let port = registry.get(handle).unwrap();

    let op = port.async_read_until("}", 64).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    op.cancel();
    assert!(op.is_cancelled());

    let result = tokio::time::timeout(Duration::from_secs(5), op.join())
        .await
        .expect("cancelled read should finish promptly");
    assert!(matches!(result, Err(ProtocolError::Cancelled)));
}

#[test]
fn test_async_outside_runtime_is_error() {
    let registry = PortRegistry::new();
    let handle = registry.register(sim_transport(&SimulatedDevice::default()));
    let port: Arc<_> = registry.get(handle).unwrap();

    assert!(matches!(
        port.async_read_string(8),
        Err(ProtocolError::SerialError(_))
    ));
    assert!(!port.is_busy());
}
