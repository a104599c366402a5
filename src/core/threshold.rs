// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Threshold table and evaluator

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ThresholdConfig;
use crate::error::ThresholdError;
use crate::sensors::{Reading, SensorKind};

/// Emitted for every reading strictly above its limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEvent {
    pub kind: SensorKind,
    pub value: f64,
    pub limit: f64,
}

/// Current limits, one atomic slot per kind.
///
/// Limits are stored as `f64` bits so a concurrent reader never sees a torn
/// value. NaN marks an unset limit; `x > NaN` is always false.
pub struct ThresholdTable {
    slots: [AtomicU64; 4],
}

fn slot(kind: SensorKind) -> usize {
    match kind {
        SensorKind::Temperature => 0,
        SensorKind::Humidity => 1,
        SensorKind::Illuminance => 2,
        SensorKind::Smoke => 3,
    }
}

impl ThresholdTable {
    /// Table with no limits set
    pub fn empty() -> Self {
        let unset = f64::NAN.to_bits();
        Self {
            slots: [
                AtomicU64::new(unset),
                AtomicU64::new(unset),
                AtomicU64::new(unset),
                AtomicU64::new(unset),
            ],
        }
    }

    pub fn from_config(config: &ThresholdConfig) -> Self {
        let table = Self::empty();
        table.store(SensorKind::Temperature, config.temperature);
        table.store(SensorKind::Illuminance, config.illuminance);
        table.store(SensorKind::Smoke, config.smoke);
        if let Some(humidity) = config.humidity {
            table.store(SensorKind::Humidity, humidity);
        }
        table
    }

    fn store(&self, kind: SensorKind, limit: f64) {
        self.slots[slot(kind)].store(limit.to_bits(), Ordering::Release);
    }

    pub fn get(&self, kind: SensorKind) -> Option<f64> {
        let limit = f64::from_bits(self.slots[slot(kind)].load(Ordering::Acquire));
        (!limit.is_nan()).then_some(limit)
    }

    pub fn set(&self, kind: SensorKind, limit: f64) -> Result<(), ThresholdError> {
        if !limit.is_finite() {
            return Err(ThresholdError::NotFinite { kind, value: limit });
        }
        self.store(kind, limit);
        info!("Threshold for {} set to {}", kind, limit);
        Ok(())
    }

    pub fn clear(&self, kind: SensorKind) {
        self.store(kind, f64::NAN);
        info!("Threshold for {} cleared", kind);
    }

    /// All limits currently set
    pub fn snapshot(&self) -> Vec<(SensorKind, f64)> {
        SensorKind::ALL
            .iter()
            .filter_map(|k| self.get(*k).map(|limit| (*k, limit)))
            .collect()
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::from_config(&ThresholdConfig::default())
    }
}

/// Per-loop evaluator over a shared [`ThresholdTable`]
#[derive(Clone)]
pub struct ThresholdEvaluator {
    table: Arc<ThresholdTable>,
}

impl ThresholdEvaluator {
    pub fn new(table: Arc<ThresholdTable>) -> Self {
        Self { table }
    }

    /// Fires iff `reading.value > limit`; equal values never fire
    pub fn evaluate(&self, reading: &Reading) -> Option<ThresholdEvent> {
        let limit = self.table.get(reading.kind)?;
        (reading.value > limit).then(|| ThresholdEvent {
            kind: reading.kind,
            value: reading.value,
            limit,
        })
    }

    pub fn set_threshold(&self, kind: SensorKind, limit: f64) -> Result<(), ThresholdError> {
        self.table.set(kind, limit)
    }

    /// Parse operator input; invalid text leaves the limit untouched
    pub fn set_threshold_str(&self, kind: SensorKind, input: &str) -> Result<f64, ThresholdError> {
        let limit: f64 = input.trim().parse().map_err(|_| ThresholdError::Parse {
            kind,
            input: input.to_string(),
        })?;
        self.set_threshold(kind, limit)?;
        Ok(limit)
    }

    pub fn clear_threshold(&self, kind: SensorKind) {
        self.table.clear(kind);
    }

    pub fn threshold(&self, kind: SensorKind) -> Option<f64> {
        self.table.get(kind)
    }

    pub fn table(&self) -> &Arc<ThresholdTable> {
        &self.table
    }
}
