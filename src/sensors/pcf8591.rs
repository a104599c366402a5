// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! PCF8591 8-bit ADC/DAC on the I²C bus
//!
//! Light and smoke modules hang off different input channels of the same
//! converter, so the chip is shared between two polling loops. Selecting a
//! channel and reading it back must happen under one lock.

use std::sync::Arc;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Measurement, Sensor, SensorFamily, SensorKind};
use crate::core::{PinId, ADC_CHANNELS};
use crate::error::SensorError;

/// Control byte with the analog output enabled
const CONTROL_DAC_ENABLE: u8 = 0x40;

/// Control byte selecting `channel`; there is no wrap-around onto channel 0
fn control_byte(channel: u8) -> Result<u8, SensorError> {
    if channel >= ADC_CHANNELS {
        return Err(SensorError::fatal(format!("PCF8591 has no input channel {}", channel)));
    }
    Ok(CONTROL_DAC_ENABLE | channel)
}

pub struct Pcf8591 {
    bus: u8,
    address: u16,
    dev: Mutex<LinuxI2CDevice>,
}

impl Pcf8591 {
    pub fn open(bus: u8, address: u16) -> Result<Arc<Self>, SensorError> {
        let path = format!("/dev/i2c-{}", bus);
        let dev = LinuxI2CDevice::new(&path, address)
            .map_err(|e| SensorError::fatal(format!("open {} @ {:#04x}: {}", path, address, e)))?;
        info!("Opened PCF8591 on {} @ {:#04x}", path, address);
        Ok(Arc::new(Self {
            bus,
            address,
            dev: Mutex::new(dev),
        }))
    }

    /// Sample one input channel (0-3)
    pub fn read_channel(&self, channel: u8) -> Result<u8, SensorError> {
        let control = control_byte(channel)?;
        let mut dev = self.dev.lock();
        dev.smbus_write_byte(control)
            .map_err(|e| SensorError::transient(format!("select ch{}: {}", channel, e)))?;
        // First byte after a channel switch is the previous conversion
        dev.smbus_read_byte()
            .map_err(|e| SensorError::transient(format!("read ch{}: {}", channel, e)))?;
        dev.smbus_read_byte()
            .map_err(|e| SensorError::transient(format!("read ch{}: {}", channel, e)))
    }

    /// Set the analog output level
    pub fn write_dac(&self, value: u8) -> Result<(), SensorError> {
        self.dev
            .lock()
            .smbus_write_byte_data(CONTROL_DAC_ENABLE, value)
            .map_err(|e| SensorError::transient(format!("dac write: {}", e)))
    }

    pub fn pin(&self, channel: u8) -> Result<PinId, SensorError> {
        PinId::adc(self.bus, self.address, channel).map_err(|e| SensorError::fatal(e.to_string()))
    }
}

/// One analog input of a shared [`Pcf8591`]
pub struct AdcChannelSensor {
    id: String,
    family: SensorFamily,
    kind: SensorKind,
    channel: u8,
    pin: PinId,
    adc: Arc<Pcf8591>,
    closed: bool,
}

impl AdcChannelSensor {
    /// Fails for a family with no analog kind or a channel the chip lacks
    pub fn new(id: &str, family: SensorFamily, adc: Arc<Pcf8591>, channel: u8) -> Result<Self, SensorError> {
        let kind = family
            .analog_kind()
            .ok_or_else(|| SensorError::fatal(format!("{} sensors cannot sit on an ADC channel", family)))?;
        let pin = adc.pin(channel)?;
        Ok(Self {
            id: id.to_string(),
            family,
            kind,
            channel,
            pin,
            adc,
            closed: false,
        })
    }
}

impl Sensor for AdcChannelSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn pin(&self) -> PinId {
        self.pin
    }

    fn family(&self) -> SensorFamily {
        self.family
    }

    fn read(&mut self) -> Result<Vec<Measurement>, SensorError> {
        if self.closed {
            return Err(SensorError::fatal(format!("{} is closed", self.id)));
        }
        let raw = self.adc.read_channel(self.channel)?;
        debug!("{}: ch{} = {}", self.id, self.channel, raw);
        Ok(vec![Measurement::new(self.kind, f64::from(raw))])
    }

    fn write(&mut self, value: f64) -> Result<(), SensorError> {
        if self.closed {
            return Err(SensorError::fatal(format!("{} is closed", self.id)));
        }
        self.adc.write_dac(value.clamp(0.0, 255.0) as u8)
    }

    fn close(&mut self) -> Result<(), SensorError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_byte_refuses_missing_channels() {
        assert_eq!(control_byte(0).unwrap(), 0x40);
        assert_eq!(control_byte(3).unwrap(), 0x43);
        assert!(matches!(control_byte(4), Err(SensorError::Fatal(_))));
        assert!(matches!(control_byte(5), Err(SensorError::Fatal(_))));
    }
}
