// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Sensor traits and common types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::PinId;
use crate::error::SensorError;

/// Physical quantity a reading belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,    // °C
    Humidity,       // %RH
    Illuminance,    // raw ADC counts
    Smoke,          // raw ADC counts
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Illuminance,
        SensorKind::Smoke,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Illuminance => "illuminance",
            SensorKind::Smoke => "smoke",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
            SensorKind::Illuminance | SensorKind::Smoke => "",
        }
    }

    /// Parse a kind from user input, accepting a few short aliases
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" | "t" => Some(SensorKind::Temperature),
            "humidity" | "hum" | "h" => Some(SensorKind::Humidity),
            "illuminance" | "light" | "lux" | "l" => Some(SensorKind::Illuminance),
            "smoke" | "gas" | "s" => Some(SensorKind::Smoke),
            _ => None,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sensor families, one polling loop each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorFamily {
    /// Combined temperature/humidity probe (DHT11)
    Climate,
    Light,
    Smoke,
}

impl SensorFamily {
    pub fn name(&self) -> &'static str {
        match self {
            SensorFamily::Climate => "climate",
            SensorFamily::Light => "light",
            SensorFamily::Smoke => "smoke",
        }
    }

    /// Kinds a sensor of this family is expected to produce
    pub fn kinds(&self) -> &'static [SensorKind] {
        match self {
            SensorFamily::Climate => &[SensorKind::Temperature, SensorKind::Humidity],
            SensorFamily::Light => &[SensorKind::Illuminance],
            SensorFamily::Smoke => &[SensorKind::Smoke],
        }
    }

    /// Kind read from a single analog channel; climate probes are not analog
    pub fn analog_kind(&self) -> Option<SensorKind> {
        match self {
            SensorFamily::Light => Some(SensorKind::Illuminance),
            SensorFamily::Smoke => Some(SensorKind::Smoke),
            SensorFamily::Climate => None,
        }
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One raw value returned by [`Sensor::read`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: SensorKind,
    pub value: f64,
}

impl Measurement {
    pub fn new(kind: SensorKind, value: f64) -> Self {
        Self { kind, value }
    }
}

/// A single timestamped reading, immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub kind: SensorKind,
    pub value: f64,
    pub captured_at: DateTime<Utc>,
    /// Per-loop cycle counter
    pub sequence: u64,
}

impl Reading {
    pub fn new(sensor_id: &str, kind: SensorKind, value: f64) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            kind,
            value,
            captured_at: Utc::now(),
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Capability contract for every sensor collaborator.
///
/// Implementations are driven from exactly one polling thread, so `read`
/// may block. `close` must be idempotent.
pub trait Sensor: Send {
    /// Unique identifier, also used as the pin owner
    fn id(&self) -> &str;

    /// Physical resource this sensor occupies
    fn pin(&self) -> PinId;

    /// Family this sensor is polled under
    fn family(&self) -> SensorFamily;

    /// Sample the hardware once
    fn read(&mut self) -> Result<Vec<Measurement>, SensorError>;

    /// Drive an analog output, for sensors that have one
    fn write(&mut self, _value: f64) -> Result<(), SensorError> {
        Err(SensorError::Unsupported)
    }

    /// Release any driver-side handle
    fn close(&mut self) -> Result<(), SensorError>;
}
