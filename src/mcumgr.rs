//! MCUmgr client wrapper.
//!
//! Drives the `mcumgr` command-line tool over a serial transport to inspect
//! and upload firmware images. The management protocol itself lives in the
//! external tool and the device's SMP server.

use anyhow::{anyhow, Context, Result};
use log::info;
use regex::Regex;
use std::path::Path;

use crate::console::DEFAULT_BAUD_RATE;
use crate::runner::run_command;

/// One image slot as reported by `mcumgr image list`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSlot {
    pub image: u32,
    pub slot: u32,
    pub version: String,
    pub hash: String,
    pub bootable: bool,
    pub pending: bool,
    pub confirmed: bool,
    pub active: bool,
}

/// MCUmgr client bound to one serial connection
#[derive(Debug, Clone)]
pub struct Mcumgr {
    connstring: String,
}

impl Mcumgr {
    /// Create a client for a serial port at the default console baud rate.
    pub fn create_for_serial(port: &str) -> Self {
        Self::create_for_serial_with_baud(port, DEFAULT_BAUD_RATE)
    }

    pub fn create_for_serial_with_baud(port: &str, baud_rate: u32) -> Self {
        Self {
            connstring: format!("dev={},baud={}", port, baud_rate),
        }
    }

    pub fn connstring(&self) -> &str {
        &self.connstring
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let mut full_args = vec!["--conntype", "serial", "--connstring", self.connstring.as_str()];
        full_args.extend_from_slice(args);
        let output = run_command("mcumgr", &full_args)?;
        Ok(output.stdout)
    }

    /// List the image slots present on the device.
    pub fn image_list(&self) -> Result<Vec<ImageSlot>> {
        let stdout = self.run(&["image", "list"])?;
        parse_image_list(&stdout)
    }

    /// Upload a firmware image file to the device.
    pub fn image_upload(&self, image: &Path) -> Result<()> {
        if !image.is_file() {
            return Err(anyhow!("Image file not found: {}", image.display()));
        }
        let image_arg = image.to_string_lossy();
        info!("Uploading image: {}", image.display());
        self.run(&["image", "upload", image_arg.as_ref()])
            .with_context(|| format!("Failed to upload image {}", image.display()))?;
        Ok(())
    }

    /// Reset the device over the management transport.
    pub fn reset(&self) -> Result<()> {
        info!("Resetting device via mcumgr");
        self.run(&["reset"])?;
        Ok(())
    }
}

/// Parse the textual slot table printed by `mcumgr image list`.
pub(crate) fn parse_image_list(output: &str) -> Result<Vec<ImageSlot>> {
    // Header lines look like " image=0 slot=0", followed by indented
    // key/value lines until the next header.
    let header = Regex::new(r"image=(\d+)\s+slot=(\d+)").context("Invalid image list pattern")?;
    let mut slots: Vec<ImageSlot> = Vec::new();

    for line in output.lines() {
        if let Some(caps) = header.captures(line) {
            let image = caps[1].parse().context("Invalid image index")?;
            let slot = caps[2].parse().context("Invalid slot index")?;
            slots.push(ImageSlot {
                image,
                slot,
                ..Default::default()
            });
            continue;
        }

        let Some(current) = slots.last_mut() else {
            continue;
        };
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "version" => current.version = value.to_string(),
            "hash" => current.hash = value.to_string(),
            "bootable" => current.bootable = value == "true",
            "flags" => {
                for flag in value.split_whitespace() {
                    match flag {
                        "active" => current.active = true,
                        "confirmed" => current.confirmed = true,
                        "pending" => current.pending = true,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(slots)
}
