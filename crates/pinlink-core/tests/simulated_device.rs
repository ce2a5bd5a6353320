//! Client against the simulated firmware

use pinlink_core::board::{analog_to_voltage, BoardType};
use pinlink_core::demo::{SimulatedDevice, SIMULATED_FIRMWARE_VERSION};
use pinlink_core::protocol::{
    CanDataPacket, CanMaskType, CanMessage, ClientConfig, IoStatus, IoType, PortHandle,
    PortRegistry, ProtocolClient, SerialConfig, SerialTransport,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn setup(board: BoardType) -> (ProtocolClient, PortHandle, SimulatedDevice) {
    let device = SimulatedDevice::with_seed(board, 42);
    device.set_analog_noise(0);
    let client = ProtocolClient::with_config(
        Arc::new(PortRegistry::new()),
        ClientConfig {
            report_idle_limit_ms: 50,
            ..ClientConfig::default()
        },
    );
    let handle = client.register(SerialTransport::with_link(
        "sim0",
        SerialConfig::default(),
        Box::new(device.clone()),
    ));
    (client, handle, device)
}

#[test]
fn test_device_queries() {
    let (client, port, _dev) = setup(BoardType::Mega);

    assert_eq!(
        client.board_type(port).unwrap(),
        (IoStatus::Success, BoardType::Mega.identifier().to_string())
    );
    assert_eq!(
        client.firmware_version(port).unwrap(),
        (IoStatus::Success, SIMULATED_FIRMWARE_VERSION.to_string())
    );
    assert_eq!(client.can_capability(port).unwrap(), (IoStatus::Success, true));
    assert_eq!(client.heartbeat(port).unwrap(), IoStatus::Success);
    assert!(client.is_open(port).unwrap());
}

#[test]
fn test_digital_output() {
    let (client, port, dev) = setup(BoardType::Uno);

    assert_eq!(
        client.pin_mode(port, 13, IoType::DigitalOutput).unwrap(),
        (IoStatus::Success, IoType::DigitalOutput)
    );
    assert_eq!(client.digital_write(port, 13, true).unwrap(), (IoStatus::Success, true));
    assert_eq!(dev.pin_state(13), Some(1));
    assert_eq!(client.digital_read(port, 13).unwrap(), (IoStatus::Success, true));
    assert_eq!(client.soft_digital_read(port, 13).unwrap(), (IoStatus::Success, true));
    assert_eq!(
        client.current_pin_mode(port, 13).unwrap(),
        (IoStatus::Success, IoType::DigitalOutput)
    );
}

#[test]
fn test_write_to_input_pin_fails() {
    let (client, port, dev) = setup(BoardType::Uno);

    let (status, _) = client.digital_write(port, 4, true).unwrap();
    assert_eq!(status, IoStatus::Failure);
    assert_eq!(dev.pin_state(4), Some(0));
}

#[test]
fn test_analog_input_in_volts() {
    let (client, port, dev) = setup(BoardType::Uno);

    client.pin_mode(port, 14, IoType::AnalogInput).unwrap();
    dev.set_input(14, 512);

    assert_eq!(client.analog_read_raw(port, 14).unwrap(), (IoStatus::Success, 512));
    let (status, volts) = client.analog_read(port, 14).unwrap();
    assert_eq!(status, IoStatus::Success);
    assert!((volts - analog_to_voltage(512)).abs() < 1e-9);
    assert!((volts - 2.5).abs() < 0.01);
}

#[test]
fn test_analog_output_on_pwm_pin() {
    let (client, port, dev) = setup(BoardType::Uno);

    assert_eq!(
        client.pin_mode(port, 9, IoType::AnalogOutput).unwrap().0,
        IoStatus::Success
    );
    let (status, volts) = client.analog_write(port, 9, 2.5).unwrap();
    assert_eq!(status, IoStatus::Success);
    assert!((volts - 2.5).abs() < 0.01);
    assert_eq!(dev.pin_state(9), Some(512));
}

#[test]
fn test_analog_mode_rejected_on_digital_pin() {
    let (client, port, dev) = setup(BoardType::Uno);

    let (status, _) = client.pin_mode(port, 4, IoType::AnalogInput).unwrap();
    assert_eq!(status, IoStatus::Failure);
    assert_eq!(dev.pin_type(4), Some(IoType::DigitalInput));
}

#[test]
fn test_threshold_controls_digital_view_of_analog_pin() {
    let (client, port, dev) = setup(BoardType::Uno);

    client.pin_mode(port, 15, IoType::AnalogInput).unwrap();
    dev.set_input(15, 300);

    assert_eq!(
        client.change_analog_to_digital_threshold(port, 250).unwrap(),
        (IoStatus::Success, 250)
    );
    assert_eq!(
        client.analog_to_digital_threshold(port).unwrap(),
        (IoStatus::Success, 250)
    );
    assert_eq!(client.digital_read(port, 15).unwrap(), (IoStatus::Success, true));

    client.change_analog_to_digital_threshold(port, 800).unwrap();
    assert_eq!(client.digital_read(port, 15).unwrap(), (IoStatus::Success, false));
}

#[test]
fn test_io_report_lists_every_pin() {
    let (client, port, dev) = setup(BoardType::Uno);

    client.pin_mode(port, 13, IoType::DigitalOutput).unwrap();
    client.digital_write(port, 13, true).unwrap();
    client.pin_mode(port, 14, IoType::AnalogInput).unwrap();
    dev.set_input(14, 700);

    let (status, report) = client.io_report(port).unwrap();
    assert_eq!(status, IoStatus::Success);
    assert_eq!(report.len(), BoardType::Uno.available_pins().count());

    let led = report.get(13).unwrap();
    assert_eq!(led.io_type, IoType::DigitalOutput);
    assert_eq!(led.state, 1);
    assert_eq!(report.analog_inputs().len(), 1);
    assert_eq!(report.get(14).unwrap().state, 700);
    assert_eq!(report.digital_outputs().len(), 1);
}

#[test]
fn test_can_loopback() {
    let (client, port, _dev) = setup(BoardType::Uno);
    let msg = CanMessage::new(0x7e0, CanDataPacket::new([2, 1, 0x0c, 0, 0, 0, 0, 0]));

    // Bus not initialized yet
    assert_eq!(client.can_read(port).unwrap().0, IoStatus::Failure);

    assert_eq!(client.can_init(port).unwrap(), IoStatus::Success);
    let (status, empty) = client.can_read(port).unwrap();
    assert_eq!(status, IoStatus::Success);
    assert!(empty.is_empty());

    let (status, echoed) = client.can_write(port, &msg).unwrap();
    assert_eq!(status, IoStatus::Success);
    assert_eq!(echoed.id, msg.id);

    let (status, received) = client.can_read(port).unwrap();
    assert_eq!(status, IoStatus::Success);
    assert_eq!(received.id, 0x7e0);
    assert_eq!(received.data, msg.data);
}

#[test]
fn test_can_masks_filter_reception() {
    let (client, port, dev) = setup(BoardType::Uno);
    client.can_init(port).unwrap();

    assert_eq!(
        client.add_can_mask(port, CanMaskType::Positive, 0x100).unwrap(),
        (IoStatus::Success, 0x100)
    );
    dev.inject_can_message(CanMessage::new(0x200, CanDataPacket::new([1; 8])));
    dev.inject_can_message(CanMessage::new(0x100, CanDataPacket::new([2; 8])));

    let (_, first) = client.can_read(port).unwrap();
    assert_eq!(first.id, 0x100);
    assert!(client.can_read(port).unwrap().1.is_empty());

    assert_eq!(
        client.remove_can_mask(port, CanMaskType::Positive, 0x100).unwrap(),
        (IoStatus::Success, 0x100)
    );
    client.add_can_mask(port, CanMaskType::Negative, 0x300).unwrap();
    assert_eq!(client.remove_all_can_masks(port, None).unwrap(), IoStatus::Success);

    dev.inject_can_message(CanMessage::new(0x300, CanDataPacket::new([3; 8])));
    assert_eq!(client.can_read(port).unwrap().1.id, 0x300);
}

#[test]
fn test_can_report_collects_live_frames() {
    let (client, port, dev) = setup(BoardType::Uno);
    client.can_init(port).unwrap();

    assert_eq!(client.can_auto_update(port, true).unwrap(), (IoStatus::Success, true));
    dev.inject_can_message(CanMessage::new(0x101, CanDataPacket::new([1; 8])));
    dev.inject_can_message(CanMessage::new(0x102, CanDataPacket::new([2; 8])));
    dev.inject_can_message(CanMessage::new(0x101, CanDataPacket::new([3; 8])));

    let (status, report) = client.can_report(port).unwrap();
    assert_eq!(status, IoStatus::Success);
    assert_eq!(report.len(), 3);
    assert_eq!(report.with_id(0x101).len(), 2);
    assert_eq!(report.messages()[1].data, CanDataPacket::new([2; 8]));

    assert_eq!(client.can_auto_update(port, false).unwrap(), (IoStatus::Success, false));
}

#[test]
fn test_requests_on_the_wire() {
    let (client, port, dev) = setup(BoardType::Uno);

    client.pin_mode(port, 13, IoType::DigitalOutput).unwrap();
    client.digital_write(port, 13, false).unwrap();
    client.add_can_mask(port, CanMaskType::Negative, 0xf).unwrap();

    assert_eq!(
        dev.requests(),
        vec![
            "{ptchange:13:dout}".to_string(),
            "{dwrite:13:0}".to_string(),
            "{addncanmask:0x00f}".to_string(),
        ]
    );
}
