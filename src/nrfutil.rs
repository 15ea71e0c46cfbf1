//! Adapter for nrfutil device management commands.
//!
//! Thin pass-through over the `nrfutil device` subcommands used by the
//! harness: reset, erase and device discovery. The actual device protocol
//! lives in the vendor tool.

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::runner::run_command;

/// One UART port exposed by a connected device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortEntry {
    pub path: String,
}

/// A connected device as reported by `nrfutil device list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub serial_number: String,
    #[serde(default)]
    pub serial_ports: Vec<SerialPortEntry>,
}

/// The device document returned by `nrfutil device list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl DeviceList {
    /// Return the UART port paths of the device with the given serial number.
    pub fn ports_for_serial(&self, serial_number: &str) -> Result<Vec<String>> {
        for device in &self.devices {
            if device.serial_number == serial_number {
                return Ok(device
                    .serial_ports
                    .iter()
                    .map(|p| p.path.clone())
                    .collect());
            }
        }
        Err(anyhow!(
            "Cannot find a device with serial number: {}",
            serial_number
        ))
    }
}

/// Reset device.
pub fn reset_board(serial_number: Option<&str>) -> Result<()> {
    info!("Resetting board");
    let mut args = vec!["device", "reset"];
    if let Some(sn) = serial_number {
        args.extend(["--serial-number", sn]);
    }
    run_command("nrfutil", &args)?;
    Ok(())
}

/// Run nrfutil device erase command.
pub fn erase_board(serial_number: Option<&str>) -> Result<()> {
    info!("Erasing board");
    let mut args = vec!["device", "erase"];
    if let Some(sn) = serial_number {
        args.extend(["--serial-number", sn]);
    }
    run_command("nrfutil", &args)?;
    Ok(())
}

/// Return all connected devices.
///
/// An empty or absent device array decodes to an empty list; output that is
/// not valid JSON is an error rather than being folded into "no devices".
pub fn list_devices() -> Result<DeviceList> {
    let output = run_command(
        "nrfutil",
        &["device", "list", "--json-pretty", "--skip-overhead"],
    )?;
    parse_device_list(&output.stdout)
}

pub(crate) fn parse_device_list(json: &str) -> Result<DeviceList> {
    if json.trim().is_empty() {
        debug!("nrfutil reported no devices");
        return Ok(DeviceList::default());
    }
    serde_json::from_str(json).context("Failed to parse nrfutil device list as JSON")
}
