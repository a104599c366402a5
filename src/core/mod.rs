// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Core engine module - polling, thresholds, actuation and pin ownership

mod actuation;
mod engine;
mod event_bus;
mod polling;
mod registry;
mod shutdown;
mod threshold;

pub use actuation::ActuationPolicy;
pub use engine::{Engine, EngineBuilder};
pub use event_bus::{
    DispatchStats, Event, EventDispatcher, EventPayload, EventType, StatusLevel, Subscription, Topic,
};
pub use polling::{LoopExit, LoopReport, LoopWiring, PollingLoop};
pub use registry::{PinClaim, PinId, PinRegistry, ReleaseOutcome, ADC_CHANNELS};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use threshold::{ThresholdEvaluator, ThresholdEvent, ThresholdTable};

use crate::sensors::SensorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub loops_configured: usize,
    /// Loops whose thread is still alive
    pub loops_active: usize,
    pub total_readings: u64,
    pub total_threshold_events: u64,
    pub total_actuations: u64,
    pub total_faults: u64,
    pub uptime_seconds: u64,
    pub last_breach: Option<DateTime<Utc>>,
    pub thresholds: Vec<(SensorKind, f64)>,
}
