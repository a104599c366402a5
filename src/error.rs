// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Error types shared by the engine and its collaborators

use thiserror::Error;

use crate::core::PinId;
use crate::sensors::{SensorFamily, SensorKind};

/// Failure reported by a [`Sensor`](crate::sensors::Sensor) collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorError {
    /// Sensor momentarily unreadable; the polling loop retries it locally
    #[error("transient sensor error: {0}")]
    Transient(String),

    /// Non-recoverable hardware fault; terminates the owning loop only
    #[error("fatal sensor error: {0}")]
    Fatal(String),

    /// The collaborator does not implement the requested capability
    #[error("operation not supported by this sensor")]
    Unsupported,
}

impl SensorError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Pin arbitration failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("resource conflict on {pin}: held by '{held_by}', requested by '{requested_by}'")]
    ResourceConflict {
        pin: PinId,
        held_by: String,
        requested_by: String,
    },

    #[error("no such pin {0}")]
    NoSuchPin(PinId),
}

/// Failure reported by a [`Device`](crate::devices::Device) or its handle
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device driver error: {0}")]
    Driver(String),

    #[error("device '{0}' is closed")]
    Closed(String),

    #[error("device '{0}' no longer owns its pin")]
    ClaimReleased(String),
}

/// Rejected threshold updates
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ThresholdError {
    #[error("threshold for {kind} must be a finite number, got {value}")]
    NotFinite { kind: SensorKind, value: f64 },

    #[error("invalid threshold for {kind}: '{input}'")]
    Parse { kind: SensorKind, input: String },
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("failed to spawn polling thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("no device registered for role {0}")]
    UnknownDevice(String),

    #[error("a {0} sensor is already registered")]
    DuplicateFamily(SensorFamily),

    #[error("a {0} device is already registered")]
    DuplicateDevice(String),

    #[error("engine already started")]
    AlreadyStarted,

    #[error("engine has been shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, EngineError>;
