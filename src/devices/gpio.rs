// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! GPIO output through the kernel sysfs interface
//!
//! Buzzer, LED and relay boards on the Pi are usually active-low:
//! driving the line low switches the load on.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Device;
use crate::core::PinId;
use crate::error::DeviceError;

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Binary output on one BCM GPIO line
pub struct SysfsGpioDevice {
    name: String,
    pin: u8,
    active_low: bool,
    root: PathBuf,
    exported_here: bool,
    closed: bool,
}

impl SysfsGpioDevice {
    pub fn open(name: &str, pin: u8, active_low: bool) -> Result<Self, DeviceError> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), name, pin, active_low)
    }

    /// Open below a custom sysfs root
    pub fn open_at(root: &Path, name: &str, pin: u8, active_low: bool) -> Result<Self, DeviceError> {
        let mut device = Self {
            name: name.to_string(),
            pin,
            active_low,
            root: root.to_path_buf(),
            exported_here: false,
            closed: false,
        };

        if !device.line_dir().exists() {
            device.write_attr(&root.join("export"), &pin.to_string())?;
            device.exported_here = true;
        }
        device.write_attr(&device.line_dir().join("direction"), "out")?;
        // Start released
        device.drive(false)?;
        info!("Opened GPIO{} for {} (active_low={})", pin, name, active_low);
        Ok(device)
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn write_attr(&self, path: &Path, value: &str) -> Result<(), DeviceError> {
        fs::write(path, value)
            .map_err(|e| DeviceError::Driver(format!("{}: write {:?}: {}", self.name, path, e)))
    }

    fn drive(&self, active: bool) -> Result<(), DeviceError> {
        let high = active != self.active_low;
        debug!("GPIO{} <- {}", self.pin, u8::from(high));
        self.write_attr(&self.line_dir().join("value"), if high { "1" } else { "0" })
    }
}

impl Device for SysfsGpioDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn pin(&self) -> PinId {
        PinId::Gpio(self.pin)
    }

    fn on(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed(self.name.clone()));
        }
        self.drive(true)
    }

    fn off(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed(self.name.clone()));
        }
        self.drive(false)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let released = self.drive(false);
        if self.exported_here {
            if let Err(e) = self.write_attr(&self.root.join("unexport"), &self.pin.to_string()) {
                warn!("Failed to unexport GPIO{}: {}", self.pin, e);
            }
        }
        released
    }
}
