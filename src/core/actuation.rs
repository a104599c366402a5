// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Actuation policy - threshold events to device commands

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::event_bus::{EventDispatcher, StatusLevel};
use super::threshold::ThresholdEvent;
use crate::devices::{DeviceCommand, DeviceHandle, DeviceRole};
use crate::error::DeviceError;
use crate::sensors::SensorKind;

/// Drives the output devices in response to threshold breaches.
///
/// Actuation is "turn on" only; nothing is switched off when a reading
/// falls back under its limit.
pub struct ActuationPolicy {
    devices: HashMap<DeviceRole, Arc<DeviceHandle>>,
    dispatcher: Arc<EventDispatcher>,
}

impl ActuationPolicy {
    pub fn new(devices: HashMap<DeviceRole, Arc<DeviceHandle>>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { devices, dispatcher }
    }

    /// Which device reacts to which kind
    pub fn command_for(event: &ThresholdEvent) -> Option<DeviceCommand> {
        match event.kind {
            SensorKind::Illuminance => Some(DeviceCommand::TurnOn(DeviceRole::Light)),
            SensorKind::Smoke => Some(DeviceCommand::TurnOn(DeviceRole::Buzzer)),
            SensorKind::Temperature => Some(DeviceCommand::TurnOn(DeviceRole::Relay)),
            SensorKind::Humidity => None,
        }
    }

    /// Publish the alert and drive the mapped device.
    ///
    /// Returns the issued command, or `None` when the kind has no mapping or
    /// no device is fitted for the role.
    pub fn on_threshold_event(&self, event: &ThresholdEvent) -> Result<Option<DeviceCommand>, DeviceError> {
        self.dispatcher.publish_status(
            StatusLevel::Alert,
            &format!(
                "{} value {} exceeds threshold {}",
                event.kind, event.value, event.limit
            ),
        );

        let Some(command) = Self::command_for(event) else {
            return Ok(None);
        };
        let Some(handle) = self.devices.get(&command.role()) else {
            debug!("No {} fitted, skipping {:?}", command.role(), command);
            return Ok(None);
        };

        match handle.execute(command) {
            Ok(state) => {
                self.dispatcher.publish_actuation(handle.role(), handle.name(), state);
                Ok(Some(command))
            }
            Err(e) => {
                warn!("Actuation of {} failed: {}", handle.name(), e);
                Err(e)
            }
        }
    }

    pub fn device(&self, role: DeviceRole) -> Option<&Arc<DeviceHandle>> {
        self.devices.get(&role)
    }
}
