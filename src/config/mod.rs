// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Configuration module

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::core::ADC_CHANNELS;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated sensors, virtual outputs)
    pub demo_mode: bool,

    /// Polling cadence and retry policy
    pub polling: PollingConfig,

    /// Threshold defaults applied at startup
    pub thresholds: ThresholdConfig,

    /// Pin map
    pub hardware: HardwareConfig,

    /// Event output
    pub events: EventConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "EnvGuard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            demo_mode: false,
            polling: PollingConfig::default(),
            thresholds: ThresholdConfig::default(),
            hardware: HardwareConfig::default(),
            events: EventConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            bail!("polling.interval_ms must be greater than zero");
        }
        let limits = [
            ("temperature", Some(self.thresholds.temperature)),
            ("illuminance", Some(self.thresholds.illuminance)),
            ("smoke", Some(self.thresholds.smoke)),
            ("humidity", self.thresholds.humidity),
        ];
        for (name, value) in limits {
            if let Some(v) = value {
                if !v.is_finite() {
                    bail!("thresholds.{} must be a finite number, got {}", name, v);
                }
            }
        }
        let hw = &self.hardware;
        for (name, channel) in [("light_channel", hw.light_channel), ("smoke_channel", hw.smoke_channel)] {
            if channel >= ADC_CHANNELS {
                bail!("hardware.{} must be below {}, got {}", name, ADC_CHANNELS, channel);
            }
        }
        if hw.light_channel == hw.smoke_channel {
            bail!("hardware.light_channel and hardware.smoke_channel both use channel {}", hw.light_channel);
        }
        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("envguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Polling configuration, shared by every sensor loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between read cycles
    pub interval_ms: u64,

    /// Delay before retrying a transient read failure
    pub retry_backoff_ms: u64,

    /// Retries per cycle after the first failed read
    pub max_retries: u32,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            retry_backoff_ms: 500,
            max_retries: 3,
        }
    }
}

/// Startup thresholds. Runtime changes are not written back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Degrees Celsius
    pub temperature: f64,

    /// Raw ADC units, 0-255
    pub illuminance: f64,

    /// Raw ADC units, 0-255
    pub smoke: f64,

    /// Percent relative humidity; unset disables the check
    pub humidity: Option<f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temperature: 35.0,
            illuminance: 100.0,
            smoke: 100.0,
            humidity: None,
        }
    }
}

/// Physical wiring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HardwareConfig {
    /// DHT11 data line (BCM numbering)
    pub dht11_gpio: u8,

    /// IIO device index the dht11 kernel driver registers as
    pub dht11_iio_device: u8,

    /// I2C bus of the PCF8591
    pub i2c_bus: u8,

    /// PCF8591 address
    pub adc_address: u16,

    pub light_channel: u8,

    pub smoke_channel: u8,

    pub buzzer_gpio: u8,

    pub led_gpio: u8,

    pub relay_gpio: u8,

    /// Outputs are driven low to switch on
    pub active_low: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            dht11_gpio: 18,
            dht11_iio_device: 0,
            i2c_bus: 1,
            adc_address: 0x48,
            light_channel: 0,
            smoke_channel: 1,
            buzzer_gpio: 26,
            led_gpio: 5,
            relay_gpio: 6,
            active_low: true,
        }
    }
}

/// Event output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventConfig {
    /// Print each event as a JSON line instead of a log record
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
        assert_eq!(config.polling.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.polling.max_retries, 3);
        assert_eq!(config.thresholds.smoke, 100.0);
        assert_eq!(config.thresholds.humidity, None);
        assert_eq!(config.hardware.adc_address, 0x48);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.polling, created.polling);
        assert_eq!(loaded.thresholds, created.thresholds);
        assert_eq!(loaded.hardware, created.hardware);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[thresholds]\nsmoke = 80.0\nhumidity = 70.0\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.thresholds.smoke, 80.0);
        assert_eq!(config.thresholds.humidity, Some(70.0));
        assert_eq!(config.thresholds.temperature, 35.0);
        assert_eq!(config.polling, PollingConfig::default());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[polling]\ninterval_ms = 0\n").unwrap();

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let mut config = Config::default();
        config.thresholds.temperature = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_adc_channel_out_of_range_rejected() {
        let mut config = Config::default();
        config.hardware.smoke_channel = 4;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("smoke_channel"));

        config.hardware.smoke_channel = 3;
        assert!(config.validate().is_ok());

        config.hardware.light_channel = 3;
        assert!(config.validate().is_err());
    }
}
