//! PinLink Probe Tool
//!
//! Connects to a board running the PinLink firmware, prints what it reports
//! about itself, toggles a digital pin and dumps the IO report.
//!
//! Usage:
//!   cargo run --example pin_probe -- [OPTIONS]
//!
//! Options:
//!   --port PORT       Serial port (default: /dev/ttyACM0)
//!   --baud RATE       Baud rate (default: 115200)
//!   --pin PIN         Pin to toggle, number or alias like A2 (default: 13)
//!   --board BOARD     Board used to resolve aliases (default: arduino_uno)
//!   --config FILE     Load ports and client policy from a JSON file
//!   --can             Also initialise CAN and read one frame
//!   --simulate        Talk to a simulated board instead of hardware
//!
//! Set RUST_LOG=pinlink_core=debug to see every request and response.

use anyhow::{bail, Context, Result};
use pinlink_core::prelude::*;
use pinlink_core::protocol::{BaudRate, IoReport};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct Options {
    port: String,
    baud: BaudRate,
    pin: String,
    board: BoardType,
    config: Option<String>,
    can: bool,
    simulate: bool,
}

fn parse_args() -> Result<Option<Options>> {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options {
        port: "/dev/ttyACM0".to_string(),
        baud: BaudRate::default(),
        pin: "13".to_string(),
        board: BoardType::Uno,
        config: None,
        can: false,
        simulate: false,
    };

    let mut i = 1;
    while i < args.len() {
        let value = |i: usize| {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{} needs a value", args[i]))
        };
        match args[i].as_str() {
            "--port" | "-p" => {
                opts.port = value(i)?;
                i += 1;
            }
            "--baud" | "-b" => {
                opts.baud = value(i)?.parse()?;
                i += 1;
            }
            "--pin" => {
                opts.pin = value(i)?;
                i += 1;
            }
            "--board" => {
                opts.board = value(i)?.parse()?;
                i += 1;
            }
            "--config" | "-c" => {
                opts.config = Some(value(i)?);
                i += 1;
            }
            "--can" => opts.can = true,
            "--simulate" => opts.simulate = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other => bail!("unknown option {:?} (try --help)", other),
        }
        i += 1;
    }
    Ok(Some(opts))
}

fn print_help() {
    println!("PinLink Probe Tool");
    println!();
    println!("Usage: pin_probe [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port, -p PORT     Serial port (default: /dev/ttyACM0)");
    println!("  --baud, -b RATE     Baud rate (default: 115200)");
    println!("  --pin PIN           Pin to toggle (default: 13)");
    println!("  --board BOARD       arduino_uno, arduino_nano or arduino_mega");
    println!("  --config, -c FILE   JSON configuration file");
    println!("  --can               Exercise the CAN commands");
    println!("  --simulate          Use a simulated board");
    println!("  --help, -h          Show this help");
}

fn print_report(report: &IoReport) {
    println!("  {:>4}  {:<8}  {}", "pin", "type", "state");
    for entry in report.entries() {
        println!("  {:>4}  {:<8}  {}", entry.pin, entry.io_type, entry.state);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(opts) = parse_args()? else {
        return Ok(());
    };

    let registry = Arc::new(PortRegistry::new());
    let (client, port) = if opts.simulate {
        let device = SimulatedDevice::new(opts.board);
        let client = ProtocolClient::new(registry.clone());
        let port = client.register(SerialTransport::with_link(
            "simulated",
            SerialConfig::default(),
            Box::new(device),
        ));
        (client, port)
    } else if let Some(path) = &opts.config {
        let config = PinlinkConfig::load(path).with_context(|| format!("loading {}", path))?;
        let handles = config.register_ports(&registry);
        let Some(&first) = handles.first() else {
            bail!("{} lists no ports", path);
        };
        (config.client(registry.clone()), first)
    } else {
        let serial = SerialConfig {
            baud_rate: opts.baud,
            ..SerialConfig::default()
        };
        let client = ProtocolClient::new(registry.clone());
        let port = client.register(SerialTransport::new(opts.port.clone(), serial));
        (client, port)
    };

    let pin = opts.board.parse_pin(&opts.pin)?;

    println!("=== Device ===");
    client.open(port).context("opening port")?;
    let (_, board) = client.board_type(port)?;
    let (_, version) = client.firmware_version(port)?;
    let (_, can) = client.can_capability(port)?;
    println!("  board:    {}", board);
    println!("  firmware: {}", version);
    println!("  CAN:      {}", if can { "yes" } else { "no" });
    println!("  heartbeat: {:?}", client.heartbeat(port)?);

    println!();
    println!("=== Toggle pin {} ===", pin);
    let (status, mode) = client.pin_mode(port, pin, IoType::DigitalOutput)?;
    if !status.is_success() {
        bail!("pin {} cannot be an output", pin);
    }
    println!("  mode: {}", mode);
    for state in [true, false, true, false] {
        let (status, written) = client.digital_write(port, pin, state)?;
        println!("  write {} -> {:?} ({})", state, status, written);
        thread::sleep(Duration::from_millis(250));
    }

    println!();
    println!("=== IO report ===");
    match client.io_report(port)? {
        (IoStatus::Success, report) => print_report(&report),
        (IoStatus::Failure, _) => println!("  no report"),
    }

    if opts.can && can {
        println!();
        println!("=== CAN ===");
        println!("  init: {:?}", client.can_init(port)?);
        let (status, msg) = client.can_read(port)?;
        if msg.is_empty() {
            println!("  read: {:?}, queue empty", status);
        } else {
            println!("  read: {:?}, {}", status, msg.to_pretty_string());
        }
    }

    client.close(port)?;
    Ok(())
}
