// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Device module - binary output collaborators

mod traits;
mod gpio;
mod virtual_line;

pub use traits::{Device, DeviceCommand, DeviceHandle, DeviceRole, DeviceState};
pub use gpio::{SysfsGpioDevice, SYSFS_GPIO_ROOT};
pub use virtual_line::{VirtualDevice, VirtualLine};
