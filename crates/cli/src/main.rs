//! rawusb command line tool
//!
//! Lists vendor-specific USB interfaces with a bulk or interrupt endpoint
//! pair and moves raw bytes over them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{CliConfig, TransferRequest, commands};
use common::{parse_hex_bytes, parse_hex_id, setup_logging};
use rawusb::DeviceFilter;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "rawusb")]
#[command(
    author,
    version,
    about = "rawusb - Talk to raw bulk/interrupt USB interfaces"
)]
#[command(long_about = "
Discovers vendor-specific USB interfaces exposing a bulk or interrupt IN/OUT
endpoint pair, claims them and performs blocking transfers.

EXAMPLES:
    # List every raw interface
    rawusb list

    # Only devices from one vendor, as JSON
    rawusb list --vendor 0x1209 --json

    # Write four bytes to interface 0 on port 3 and read up to 64 back
    rawusb transfer --port 3 --interface 0 --write deadbeef --read 64

    # Save default configuration and exit
    rawusb --save-config

CONFIGURATION:
    Configuration files are searched in the following order:
    1. Path specified with --config
    2. ~/.config/rawusb/rawusb.toml
    3. /etc/rawusb/rawusb.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List matched raw interfaces
    List {
        /// Vendor id filter (e.g. 0x1209)
        #[arg(long, value_parser = hex_id)]
        vendor: Option<u16>,

        /// Product id filter (e.g. 0x0001)
        #[arg(long, value_parser = hex_id)]
        product: Option<u16>,

        /// Print a JSON array instead of text
        #[arg(long)]
        json: bool,
    },

    /// Open an interface, write a payload and optionally read a reply
    Transfer {
        /// Port number the device is plugged into
        #[arg(long)]
        port: u8,

        /// Interface number to claim
        #[arg(long, default_value_t = 0)]
        interface: u8,

        /// Vendor id filter (e.g. 0x1209)
        #[arg(long, value_parser = hex_id)]
        vendor: Option<u16>,

        /// Product id filter (e.g. 0x0001)
        #[arg(long, value_parser = hex_id)]
        product: Option<u16>,

        /// Hex payload to write (e.g. "de ad be ef")
        #[arg(long, value_name = "HEX")]
        write: String,

        /// Number of bytes to read back
        #[arg(long, value_name = "LEN")]
        read: Option<usize>,
    },
}

fn hex_id(s: &str) -> std::result::Result<u16, String> {
    parse_hex_id(s).map_err(|e| e.to_string())
}

/// Command line filter values override the configured ones
fn merge_filter(
    configured: DeviceFilter,
    vendor: Option<u16>,
    product: Option<u16>,
) -> DeviceFilter {
    DeviceFilter::new(
        vendor.or(configured.vendor_id),
        product.or(configured.product_id),
    )
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = CliConfig::default();
        let path = CliConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        CliConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        CliConfig::load_or_default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    setup_logging(log_level).context("Failed to setup logging")?;
    debug!("rawusb v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = args.command else {
        warn!("No command given, try --help");
        return Ok(());
    };

    let context = rawusb::global();
    let configured = config.filter()?;
    let mut stdout = std::io::stdout().lock();

    let result = match command {
        Command::List {
            vendor,
            product,
            json,
        } => {
            let filter = merge_filter(configured, vendor, product);
            commands::list(context, filter, json, &mut stdout).map(|_| ())
        }
        Command::Transfer {
            port,
            interface,
            vendor,
            product,
            write,
            read,
        } => {
            let payload = parse_hex_bytes(&write).context("Invalid --write payload")?;
            let request = TransferRequest {
                filter: merge_filter(configured, vendor, product),
                port,
                interface,
                payload,
                read_len: read,
                read_timeout: config.timeouts.read(),
                write_timeout: config.timeouts.write(),
            };
            commands::transfer(context, &request, &mut stdout).map(|_| ())
        }
    };

    context.shutdown();
    result
}
