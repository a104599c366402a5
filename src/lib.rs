// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! EnvGuard - Environmental Sensor Monitoring and Actuation
//!
//! Headless monitor for a small Raspberry Pi sensor rig:
//! - DHT11 temperature/humidity, light and smoke modules on a PCF8591 ADC
//! - One polling thread per sensor family with local retry and fault isolation
//! - Runtime-adjustable thresholds backed by lock-free atomics
//! - Buzzer, indicator LED and relay driven on threshold breach
//! - Explicit pin ownership with an idempotent shutdown path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EnvGuard Engine                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌──────────┐  ┌───────────┐  ┌────────────┐  │
//! │  │ Sensors │→ │ Polling  │→ │ Threshold │→ │ Actuation  │  │
//! │  │         │  │ Loops    │  │ Evaluator │  │ Policy     │  │
//! │  └─────────┘  └──────────┘  └───────────┘  └────────────┘  │
//! │       ↓            ↓             ↓              ↓          │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                  Event Dispatcher                   │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │       ↓                                         ↓          │
//! │  ┌─────────────┐  ┌─────────────────────┐  ┌───────────┐   │
//! │  │ Pin Registry│← │ Shutdown Coordinator│  │  Console  │   │
//! │  └─────────────┘  └─────────────────────┘  └───────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod sensors;
pub mod shell;

// Re-exports for convenience
pub use config::Config;
pub use core::{Engine, EngineBuilder, EventDispatcher, PinRegistry, ShutdownReport, SystemState, Topic};
pub use devices::{Device, DeviceHandle, DeviceRole, DeviceState};
pub use error::{EngineError, Result};
pub use sensors::{Reading, Sensor, SensorFamily, SensorKind};

/// EnvGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// EnvGuard name
pub const NAME: &str = "EnvGuard";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Enabled features
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "hardware")]
    features.push("hardware".to_string());

    features
}
