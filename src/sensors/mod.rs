// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Sensor module - hardware interfaces and simulations

mod traits;
mod dht11;
#[cfg(feature = "hardware")]
mod pcf8591;
mod scripted;
mod simulator;

pub use traits::{Measurement, Reading, Sensor, SensorFamily, SensorKind};
pub use dht11::{Dht11Sensor, IIO_DEVICES_ROOT};
#[cfg(feature = "hardware")]
pub use pcf8591::{AdcChannelSensor, Pcf8591};
pub use scripted::{ScriptProbe, ScriptStep, ScriptedSensor, WhenExhausted};
pub use simulator::SensorSimulator;
