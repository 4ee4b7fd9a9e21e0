//! bitbox-usb CLI
//!
//! Diagnostic front end for the BitBox02 USB transport. Discovers the
//! device, acquires access, opens and claims its interface, and exchanges
//! framed 64-byte reports.

mod config;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;
use tracing::info;
use transport::{DeviceRegistry, PermissionBroker, PermissionState, SessionManager, setup_logging};

#[derive(Parser, Debug)]
#[command(name = "bitbox-usb")]
#[command(author, version, about = "BitBox02 USB transport diagnostics")]
#[command(long_about = "
Host-side transport diagnostics for a BitBox02 hardware security device.
Discovers the device, acquires access, opens and claims its interface, and
exchanges framed 64-byte reports.

EXAMPLES:
    # List matching devices
    bitbox-usb scan

    # Issue a permission request and wait for the decision
    bitbox-usb request 001-004

    # Send a framed payload and print the reply
    bitbox-usb send 001-004 --hex 80402103

    # Poll for device reports until Ctrl+C
    bitbox-usb listen

CONFIGURATION:
    The tool looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/bitbox-usb/cli.toml
    3. /etc/bitbox-usb/cli.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List matching devices on the bus
    Scan,
    /// Issue a permission request and await the decision
    Request {
        /// Device name from `scan` (defaults to the sole attached device)
        device: Option<String>,
    },
    /// Open the device, send a framed payload, and read one reply
    Send {
        /// Device name from `scan`
        device: Option<String>,
        /// Payload as a hex string
        #[arg(long, value_name = "HEX")]
        hex: String,
    },
    /// Open the device and poll for reports until Ctrl+C
    Listen {
        /// Device name from `scan`
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = CliConfig::default();
        let path = CliConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        let path = PathBuf::from(shellexpand::tilde(path).as_ref());
        CliConfig::load(Some(path)).context("Failed to load configuration")?
    } else {
        CliConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("bitbox-usb v{}", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Command::Scan) {
        Command::Scan => run_scan(),
        Command::Request { device } => run_request(&config, device).await,
        Command::Send { device, hex } => run_send(config, device, hex).await,
        Command::Listen { device } => run_listen(config, device).await,
    }
}

fn run_scan() -> Result<()> {
    let registry = DeviceRegistry::new()?;
    let devices = registry.scan()?;

    if devices.is_empty() {
        println!("No BitBox02 devices found");
        return Ok(());
    }

    println!("{} device(s):", devices.len());
    for device in devices {
        println!(
            "  {}  {}  serial {}",
            device.device_name, device.product, device.serial_number
        );
    }
    Ok(())
}

async fn run_request(config: &CliConfig, device: Option<String>) -> Result<()> {
    let registry = DeviceRegistry::new()?;
    let broker = PermissionBroker::new();
    let name = select_device(&registry, &broker, config, device)?;

    let ticket = broker.request(&registry, &name)?;
    println!("Permission request issued for {name}");

    let decision = ticket.resolved().await;
    broker.shutdown();

    match decision {
        PermissionState::Granted => {
            println!("Permission granted");
            Ok(())
        }
        PermissionState::Denied => bail!("permission denied for {name}; check your udev rules"),
        PermissionState::Unknown => bail!("permission request for {name} was not resolved"),
    }
}

async fn run_send(config: CliConfig, device: Option<String>, hex: String) -> Result<()> {
    let payload = parse_hex(&hex)?;
    if payload.is_empty() {
        bail!("payload is required");
    }

    // The transfer may block for the full 60 s timeout while the user
    // interacts with the device, so it runs off the async runtime.
    let (written, reply) = tokio::task::spawn_blocking(move || -> Result<(usize, Vec<u8>)> {
        let registry = DeviceRegistry::new()?;
        let broker = PermissionBroker::new();
        let name = select_device(&registry, &broker, &config, device)?;

        ensure_permission(&registry, &broker, &name)?;

        let mut manager = SessionManager::new();
        manager.open(&registry, &broker, &name)?;

        let result = (|| {
            let written = manager.send(&payload)?;
            let reply = manager.read_blocking()?;
            Ok::<_, anyhow::Error>((written, reply))
        })();

        manager.close();
        broker.shutdown();
        result
    })
    .await
    .context("transfer worker panicked")??;

    println!("Wrote {written} byte(s)");
    if reply.is_empty() {
        println!("Reply: (empty)");
    } else {
        println!("Reply ({} byte(s)): {}", reply.len(), to_hex(&reply));
    }
    Ok(())
}

async fn run_listen(config: CliConfig, device: Option<String>) -> Result<()> {
    let interval = Duration::from_millis(config.listen.poll_interval_ms);
    let running = Arc::new(AtomicBool::new(true));

    let stop = Arc::clone(&running);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Stopping listen loop");
            stop.store(false, Ordering::SeqCst);
        }
    });

    let worker = tokio::task::spawn_blocking(move || -> Result<()> {
        let registry = DeviceRegistry::new()?;
        let broker = PermissionBroker::new();
        let name = select_device(&registry, &broker, &config, device)?;

        ensure_permission(&registry, &broker, &name)?;

        let mut manager = SessionManager::new();
        manager.open(&registry, &broker, &name)?;
        println!("Listening on {name}; Ctrl+C to stop");

        while running.load(Ordering::SeqCst) {
            let report = manager.poll_nonblocking();
            if !report.is_empty() {
                println!("{}", to_hex(&report));
            }
            std::thread::sleep(interval);
        }

        manager.close();
        broker.shutdown();
        Ok(())
    });

    worker.await.context("listen worker panicked")?
}

/// Pick the device to operate on.
///
/// An explicit argument wins. Otherwise the configured serial is preferred,
/// then the sole attached device, then the last device a grant landed on.
fn select_device(
    registry: &DeviceRegistry,
    broker: &PermissionBroker,
    config: &CliConfig,
    requested: Option<String>,
) -> Result<String> {
    if let Some(name) = requested {
        if name.is_empty() {
            bail!("device name is required");
        }
        return Ok(name);
    }

    let devices = registry.scan()?;

    if let Some(serial) = &config.bridge.serial_filter
        && let Some(device) = devices.iter().find(|d| &d.serial_number == serial)
    {
        return Ok(device.device_name.clone());
    }

    match devices.len() {
        0 => {
            if let Some(device) = broker.last_permitted() {
                return Ok(device.device_name);
            }
            bail!("no BitBox02 device found; plug one in or pass a device name")
        }
        1 => Ok(devices[0].device_name.clone()),
        _ => {
            let names: Vec<_> = devices.iter().map(|d| d.device_name.as_str()).collect();
            bail!(
                "several devices attached ({}); pass a device name",
                names.join(", ")
            )
        }
    }
}

/// Make sure a grant is in place before opening, requesting one if needed
fn ensure_permission(
    registry: &DeviceRegistry,
    broker: &PermissionBroker,
    name: &str,
) -> Result<()> {
    if broker.state(name) == PermissionState::Granted {
        return Ok(());
    }

    info!("Requesting permission for {}", name);
    let ticket = broker.request(registry, name)?;

    match ticket.wait() {
        PermissionState::Granted => Ok(()),
        PermissionState::Denied => bail!("permission denied for {name}; check your udev rules"),
        PermissionState::Unknown => bail!("permission request for {name} was not resolved"),
    }
}

/// Parse a hex payload, tolerating whitespace and `:` separators
fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if compact.len() % 2 != 0 {
        bail!("hex payload must have an even number of digits");
    }

    (0..compact.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&compact[i..i + 2], 16)
                .map_err(|_| anyhow!("invalid hex digit in payload"))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("80402103").unwrap(), vec![0x80, 0x40, 0x21, 0x03]);
        assert_eq!(parse_hex("80 40:21 03").unwrap(), vec![0x80, 0x40, 0x21, 0x03]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_parse_hex_rejects_bad_input() {
        assert!(parse_hex("8").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0xff, 0x0a]), "00ff0a");
        assert_eq!(to_hex(&[]), "");
    }
}
