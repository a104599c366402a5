// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Device traits and the shared device handle

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{PinClaim, PinId, PinRegistry};
use crate::error::DeviceError;

/// What a binary output is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Alert buzzer (smoke)
    Buzzer,
    /// Indicator LED (illuminance)
    Light,
    /// Cooling/ventilation relay (temperature)
    Relay,
}

impl DeviceRole {
    pub const ALL: [DeviceRole; 3] = [DeviceRole::Buzzer, DeviceRole::Light, DeviceRole::Relay];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceRole::Buzzer => "buzzer",
            DeviceRole::Light => "light",
            DeviceRole::Relay => "relay",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "buzzer" | "buzz" | "alarm" => Some(DeviceRole::Buzzer),
            "light" | "led" => Some(DeviceRole::Light),
            "relay" | "fan" => Some(DeviceRole::Relay),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mirrored output state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    On,
    Off,
    Closed,
}

/// Command produced by the actuation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCommand {
    TurnOn(DeviceRole),
    TurnOff(DeviceRole),
}

impl DeviceCommand {
    pub fn role(&self) -> DeviceRole {
        match self {
            DeviceCommand::TurnOn(role) | DeviceCommand::TurnOff(role) => *role,
        }
    }
}

/// Capability contract for binary output collaborators.
///
/// All three operations are idempotent and expected to return quickly.
pub trait Device: Send {
    fn name(&self) -> &str;

    fn pin(&self) -> PinId;

    fn on(&mut self) -> Result<(), DeviceError>;

    fn off(&mut self) -> Result<(), DeviceError>;

    /// Return the line to a safe default and release driver resources
    fn close(&mut self) -> Result<(), DeviceError>;
}

struct Slot {
    device: Box<dyn Device>,
    state: DeviceState,
}

/// Shared handle through which both the actuation policy and manual
/// toggles drive a device. Commands serialize on the handle and are refused
/// once the handle's pin claim is gone; last write wins.
pub struct DeviceHandle {
    name: String,
    role: DeviceRole,
    claim: PinClaim,
    registry: Arc<PinRegistry>,
    slot: Mutex<Slot>,
}

impl DeviceHandle {
    pub fn new(
        role: DeviceRole,
        device: Box<dyn Device>,
        claim: PinClaim,
        registry: Arc<PinRegistry>,
    ) -> Self {
        Self {
            name: device.name().to_string(),
            role,
            claim,
            registry,
            slot: Mutex::new(Slot {
                device,
                state: DeviceState::Off,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn pin(&self) -> PinId {
        self.claim.pin
    }

    pub fn claim(&self) -> &PinClaim {
        &self.claim
    }

    /// Best-effort mirror; the driver owns the real electrical state
    pub fn state(&self) -> DeviceState {
        self.slot.lock().state
    }

    pub fn is_on(&self) -> bool {
        self.state() == DeviceState::On
    }

    pub fn on(&self) -> Result<DeviceState, DeviceError> {
        self.set(DeviceState::On)
    }

    pub fn off(&self) -> Result<DeviceState, DeviceError> {
        self.set(DeviceState::Off)
    }

    /// Flip the mirrored state, as the shell's on/off button does
    pub fn toggle(&self) -> Result<DeviceState, DeviceError> {
        let mut slot = self.slot.lock();
        let target = match slot.state {
            DeviceState::On => DeviceState::Off,
            _ => DeviceState::On,
        };
        self.apply(&mut slot, target)
    }

    pub fn execute(&self, command: DeviceCommand) -> Result<DeviceState, DeviceError> {
        match command {
            DeviceCommand::TurnOn(_) => self.on(),
            DeviceCommand::TurnOff(_) => self.off(),
        }
    }

    fn set(&self, target: DeviceState) -> Result<DeviceState, DeviceError> {
        let mut slot = self.slot.lock();
        self.apply(&mut slot, target)
    }

    fn apply(&self, slot: &mut Slot, target: DeviceState) -> Result<DeviceState, DeviceError> {
        if slot.state == DeviceState::Closed {
            return Err(DeviceError::Closed(self.name.clone()));
        }
        if !self.registry.is_live(&self.claim) {
            return Err(DeviceError::ClaimReleased(self.name.clone()));
        }

        match target {
            DeviceState::On => slot.device.on()?,
            DeviceState::Off => slot.device.off()?,
            DeviceState::Closed => return Err(DeviceError::Closed(self.name.clone())),
        }
        if slot.state != target {
            debug!("Device {} ({}) -> {:?}", self.name, self.role, target);
        }
        slot.state = target;
        Ok(target)
    }

    /// Close the underlying device once.
    ///
    /// Returns `Ok(false)` when the handle was already closed. The handle is
    /// marked closed even when the driver reports an error.
    pub fn close(&self) -> Result<bool, DeviceError> {
        let mut slot = self.slot.lock();
        if slot.state == DeviceState::Closed {
            return Ok(false);
        }
        slot.state = DeviceState::Closed;
        match slot.device.close() {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Error closing device {}: {}", self.name, e);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("pin", &self.claim.pin)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::VirtualDevice;

    fn handle(role: DeviceRole, pin: u8) -> (DeviceHandle, Arc<crate::devices::VirtualLine>, Arc<PinRegistry>) {
        let registry = Arc::new(PinRegistry::new());
        let device = VirtualDevice::new(role.name(), PinId::Gpio(pin));
        let line = device.line();
        let claim = registry.acquire(PinId::Gpio(pin), role.name()).unwrap();
        (
            DeviceHandle::new(role, Box::new(device), claim, Arc::clone(&registry)),
            line,
            registry,
        )
    }

    #[test]
    fn test_toggle_flips_state() {
        let (h, line, _registry) = handle(DeviceRole::Light, 5);
        assert_eq!(h.toggle().unwrap(), DeviceState::On);
        assert!(line.is_active());
        assert_eq!(h.toggle().unwrap(), DeviceState::Off);
        assert!(!line.is_active());
        assert_eq!(line.on_calls(), 1);
        assert_eq!(line.off_calls(), 1);
    }

    #[test]
    fn test_repeated_on_forwards_and_stays_on() {
        let (h, line, _registry) = handle(DeviceRole::Buzzer, 26);
        h.on().unwrap();
        h.on().unwrap();
        assert!(h.is_on());
        assert_eq!(line.on_calls(), 2);
        assert_eq!(line.transitions(), 1);
    }

    #[test]
    fn test_close_once_then_refuse_commands() {
        let (h, line, _registry) = handle(DeviceRole::Relay, 6);
        h.on().unwrap();
        assert!(h.close().unwrap());
        assert!(!h.close().unwrap());
        assert_eq!(line.close_calls(), 1);
        assert_eq!(h.on(), Err(DeviceError::Closed("relay".to_string())));
    }

    #[test]
    fn test_commands_refused_after_claim_released() {
        let (h, line, registry) = handle(DeviceRole::Relay, 6);
        registry.release(h.claim());
        assert_eq!(h.on(), Err(DeviceError::ClaimReleased("relay".to_string())));
        assert_eq!(line.on_calls(), 0);
    }

    #[test]
    fn test_concurrent_toggles_leave_consistent_state() {
        let (h, line, _registry) = handle(DeviceRole::Light, 5);
        let h = Arc::new(h);
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let h = Arc::clone(&h);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            h.on().unwrap();
                        } else {
                            h.off().unwrap();
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(h.is_on(), line.is_active());
    }
}
