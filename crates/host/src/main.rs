//! adk-host
//!
//! Switches an attached Android device into accessory mode and exchanges bulk
//! data with it.

use anyhow::{Context, Result};
use clap::Parser;
use common::{ThreadSleeper, setup_logging};
use host::config::{self, HostConfig, SessionMode, format_hex_id, parse_hex_id};
use host::usb::{ReadReport, RusbTransport};
use host::{RunOptions, run};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "adk-host")]
#[command(
    author,
    version,
    about = "AOA host diagnostic - put an Android device into accessory mode and talk to it"
)]
#[command(long_about = "
Negotiates the Android Open Accessory (AOA v1) protocol with an attached
device, waits for it to re-enumerate as an accessory and runs a bulk
transfer session over its endpoints.

EXAMPLES:
    # Run with default config
    adk-host

    # Run against a specific device
    adk-host --vid 0x18d1 --pid 0x4ee7

    # Device is already in accessory mode, run the loopback test
    adk-host --skip-negotiation --mode loopback

    # List USB devices
    adk-host --list-devices

    # Run with debug logging
    adk-host --log-level debug

CONFIGURATION:
    The host looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/adk-host/host.toml
    3. /etc/adk-host/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Vendor id of the device, e.g. 0x18d1
    #[arg(long, value_name = "HEX")]
    vid: Option<String>,

    /// Product id of the device in normal mode, e.g. 0x4e21
    #[arg(long, value_name = "HEX")]
    pid: Option<String>,

    /// Session to run once the accessory is up
    #[arg(long, value_enum)]
    mode: Option<SessionMode>,

    /// Bulk read timeout in milliseconds (0 = block)
    #[arg(long, value_name = "MS")]
    read_timeout_ms: Option<u64>,

    /// Device is already in accessory mode
    #[arg(long)]
    skip_negotiation: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };
    apply_overrides(&mut config, &args)?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.host.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("adk-host v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let mut transport = RusbTransport::new().context("Failed to initialize libusb")?;

    if args.list_devices {
        list_devices(&transport, &config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let options = RunOptions {
        skip_negotiation: args.skip_negotiation,
        cancel: None,
    };
    let mut sink = print_read;

    match run(
        &mut transport,
        &mut ThreadSleeper,
        &config,
        options,
        &mut sink,
    ) {
        Ok(summary) => {
            if let Some(report) = summary.loopback {
                println!("{}", report);
            }
            info!("Done");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            if let Some(kind) = e.kind() {
                error!("Error: {}", kind.name());
                error!("{}", kind.description());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Command line values win over the configuration file
fn apply_overrides(config: &mut HostConfig, args: &Args) -> Result<()> {
    if let Some(vid) = &args.vid {
        config.device.vendor_id = format_hex_id(parse_hex_id(vid, "--vid")?);
    }
    if let Some(pid) = &args.pid {
        config.device.product_id = format_hex_id(parse_hex_id(pid, "--pid")?);
    }
    if let Some(mode) = args.mode {
        config.session.mode = mode;
    }
    if let Some(timeout) = args.read_timeout_ms {
        config.session.read_timeout_ms = timeout;
    }
    config.validate()
}

fn print_read(report: ReadReport<'_>) {
    println!("read {} bytes", report.len());
    if !report.is_empty() {
        println!("{}", String::from_utf8_lossy(report.bytes));
    }
}

/// List USB devices and exit
fn list_devices(transport: &RusbTransport, config: &HostConfig) -> Result<()> {
    info!("Listing USB devices...");

    let vendor_id = config.device.vendor_id()?;
    let product_id = config.device.product_id()?;
    let accessory_product_id = config.device.accessory_product_id()?;

    let devices = transport
        .list_devices()
        .context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in devices {
        let marker = if device.matches(vendor_id, product_id) {
            " [configured device]"
        } else if device.matches(vendor_id, accessory_product_id) {
            " [accessory mode]"
        } else {
            ""
        };
        println!(
            "  {:04x}:{:04x} - {} {}{}",
            device.vendor_id,
            device.product_id,
            device
                .manufacturer
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            device.product.as_deref().unwrap_or("Unknown Product"),
            marker
        );
        println!(
            "      Bus {:03} Device {:03}",
            device.bus_number, device.device_address
        );
        if let Some(serial) = &device.serial_number {
            println!("      Serial: {}", serial);
        }
        println!();
    }

    Ok(())
}
