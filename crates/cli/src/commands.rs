//! Subcommand implementations
//!
//! Generic over the USB backend so they can run against the mock in tests.

use anyhow::{Context as _, Result, anyhow};
use descriptor::DeviceInfo;
use rawusb::{Context, DeviceFilter, UsbBackend};
use std::io::Write;
use std::time::Duration;
use tracing::info;

/// Print every matched raw interface, one per line or as a JSON array
pub fn list<B: UsbBackend>(
    context: &Context<B>,
    filter: DeviceFilter,
    json: bool,
    out: &mut impl Write,
) -> Result<usize> {
    let devices = context
        .enumerate(filter)
        .context("Failed to enumerate USB devices")?;
    let infos: Vec<&DeviceInfo> = devices.iter().map(|d| d.info()).collect();

    if json {
        serde_json::to_writer_pretty(&mut *out, &infos).context("Failed to serialize devices")?;
        writeln!(out)?;
    } else if infos.is_empty() {
        writeln!(out, "No raw USB interfaces found")?;
    } else {
        for info in &infos {
            writeln!(out, "{}", info.describe())?;
            writeln!(out, "    {}", info)?;
        }
    }

    Ok(infos.len())
}

/// What `transfer` should do once the device is open
#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
    pub filter: DeviceFilter,
    pub port: u8,
    pub interface: u8,
    pub payload: Vec<u8>,
    /// Bytes to read back after writing; `None` skips the read
    pub read_len: Option<usize>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

/// Open the interface on `port`, write the payload, optionally read a reply
///
/// Returns the bytes read, empty when no read was requested.
pub fn transfer<B: UsbBackend>(
    context: &Context<B>,
    request: &TransferRequest,
    out: &mut impl Write,
) -> Result<Vec<u8>> {
    let devices = context
        .enumerate(request.filter)
        .context("Failed to enumerate USB devices")?;
    let target = devices
        .iter()
        .find(|d| d.info.port == request.port && d.info.interface == request.interface)
        .ok_or_else(|| {
            anyhow!(
                "No raw interface {} on port {}",
                request.interface,
                request.port
            )
        })?;

    let handle = context
        .open(&target.info)
        .with_context(|| format!("Failed to open {}", target.info.path))?;
    drop(devices);

    handle.set_read_timeout(request.read_timeout);
    handle.set_write_timeout(request.write_timeout);

    let written = handle.write(&request.payload).context("Write failed")?;
    writeln!(out, "wrote {} byte(s) to {:#04x}", written, handle.info().writer.address)?;

    let mut reply = Vec::new();
    if let Some(len) = request.read_len {
        reply.resize(len, 0);
        let read = handle.read(&mut reply).context("Read failed")?;
        reply.truncate(read);
        writeln!(
            out,
            "read {} byte(s) from {:#04x}: {}",
            read,
            handle.info().reader.address,
            common::format_hex(&reply)
        )?;
    }

    handle.close().context("Failed to close device")?;
    info!("Transfer on {} complete", handle.info().path);
    Ok(reply)
}
