// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! DHT11 temperature/humidity probe via the kernel `dht11` IIO driver
//!
//! The one-wire timing is done by the kernel (`dtoverlay=dht11,gpiopin=N`);
//! we only read the processed channels. Values are in milli-units.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Measurement, Sensor, SensorFamily, SensorKind};
use crate::core::PinId;
use crate::error::SensorError;

pub const IIO_DEVICES_ROOT: &str = "/sys/bus/iio/devices";

pub struct Dht11Sensor {
    id: String,
    data_pin: u8,
    device_dir: PathBuf,
    closed: bool,
}

impl Dht11Sensor {
    /// `iio_device` is the N in `iio:deviceN`
    pub fn new(id: &str, data_pin: u8, iio_device: u8) -> Self {
        let dir = Path::new(IIO_DEVICES_ROOT).join(format!("iio:device{}", iio_device));
        Self::at_path(id, data_pin, dir)
    }

    pub fn at_path(id: &str, data_pin: u8, device_dir: PathBuf) -> Self {
        info!("DHT11 '{}' on GPIO{} via {:?}", id, data_pin, device_dir);
        Self {
            id: id.to_string(),
            data_pin,
            device_dir,
            closed: false,
        }
    }

    fn read_channel(&self, file: &str) -> Result<f64, SensorError> {
        let path = self.device_dir.join(file);
        let raw = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                SensorError::fatal(format!("{}: {:?} disappeared", self.id, path))
            }
            // EIO / ETIMEDOUT on checksum or timing failures
            _ => SensorError::transient(format!("{}: {}", self.id, e)),
        })?;

        let milli: i64 = raw
            .trim()
            .parse()
            .map_err(|_| SensorError::transient(format!("{}: bad value '{}'", self.id, raw.trim())))?;
        Ok(milli as f64 / 1000.0)
    }
}

impl Sensor for Dht11Sensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn pin(&self) -> PinId {
        PinId::Gpio(self.data_pin)
    }

    fn family(&self) -> SensorFamily {
        SensorFamily::Climate
    }

    fn read(&mut self) -> Result<Vec<Measurement>, SensorError> {
        if self.closed {
            return Err(SensorError::fatal(format!("{} is closed", self.id)));
        }
        let temperature = self.read_channel("in_temp_input")?;
        let humidity = self.read_channel("in_humidityrelative_input")?;
        debug!("{}: {:.1}°C {:.1}%", self.id, temperature, humidity);

        Ok(vec![
            Measurement::new(SensorKind::Temperature, temperature),
            Measurement::new(SensorKind::Humidity, humidity),
        ])
    }

    fn close(&mut self) -> Result<(), SensorError> {
        self.closed = true;
        Ok(())
    }
}
