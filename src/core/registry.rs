// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Pin registry - exclusive ownership of physical signaling resources
//!
//! GPIO mode and I²C bus state are global to the board, so every sensor and
//! device goes through this registry before touching hardware. A pin has at
//! most one live claim; a second owner is refused instead of silently
//! sharing the line.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Input channels on one analog converter
pub const ADC_CHANNELS: u8 = 4;

/// Identifier of a physical resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinId {
    /// BCM-numbered GPIO line
    Gpio(u8),
    /// Single input channel of an I²C analog converter
    Adc { bus: u8, address: u16, channel: u8 },
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinId::Gpio(n) => write!(f, "GPIO{}", n),
            PinId::Adc { bus, address, channel } => {
                write!(f, "i2c-{}@{:#04x}/ch{}", bus, address, channel)
            }
        }
    }
}

impl PinId {
    /// ADC input, refusing channels the converter does not have
    pub fn adc(bus: u8, address: u16, channel: u8) -> Result<Self, RegistryError> {
        let pin = PinId::Adc { bus, address, channel };
        pin.check()?;
        Ok(pin)
    }

    fn check(&self) -> Result<(), RegistryError> {
        match *self {
            PinId::Adc { channel, .. } if channel >= ADC_CHANNELS => Err(RegistryError::NoSuchPin(*self)),
            _ => Ok(()),
        }
    }
}

/// Ownership record for one pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinClaim {
    pub pin: PinId,
    pub owner: String,
    generation: u64,
}

impl PinClaim {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of [`PinRegistry::release`]; neither variant is an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyReleased,
}

struct Entry {
    owner: String,
    generation: u64,
}

struct Inner {
    claims: HashMap<PinId, Entry>,
    next_generation: u64,
}

/// Process-wide pin registry
pub struct PinRegistry {
    inner: Mutex<Inner>,
}

impl PinRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                claims: HashMap::new(),
                next_generation: 1,
            }),
        }
    }

    /// Claim `pin` for `owner`.
    ///
    /// Re-acquiring a pin by its current owner returns the existing claim.
    pub fn acquire(&self, pin: PinId, owner: &str) -> Result<PinClaim, RegistryError> {
        if let Err(e) = pin.check() {
            warn!("Refusing '{}': {}", owner, e);
            return Err(e);
        }
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.claims.get(&pin) {
            if entry.owner == owner {
                return Ok(PinClaim {
                    pin,
                    owner: owner.to_string(),
                    generation: entry.generation,
                });
            }
            warn!("Pin conflict on {}: held by '{}', requested by '{}'", pin, entry.owner, owner);
            return Err(RegistryError::ResourceConflict {
                pin,
                held_by: entry.owner.clone(),
                requested_by: owner.to_string(),
            });
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.claims.insert(pin, Entry { owner: owner.to_string(), generation });
        debug!("Claimed {} for '{}'", pin, owner);

        Ok(PinClaim {
            pin,
            owner: owner.to_string(),
            generation,
        })
    }

    /// Release a claim. Releasing twice, or releasing a claim that has since
    /// been superseded, is a no-op.
    pub fn release(&self, claim: &PinClaim) -> ReleaseOutcome {
        let mut inner = self.inner.lock();
        match inner.claims.get(&claim.pin) {
            Some(entry) if entry.generation == claim.generation => {
                inner.claims.remove(&claim.pin);
                debug!("Released {} from '{}'", claim.pin, claim.owner);
                ReleaseOutcome::Released
            }
            _ => ReleaseOutcome::AlreadyReleased,
        }
    }

    /// True while `claim` is the live claim on its pin
    pub fn is_live(&self, claim: &PinClaim) -> bool {
        self.inner
            .lock()
            .claims
            .get(&claim.pin)
            .is_some_and(|e| e.generation == claim.generation)
    }

    pub fn owner_of(&self, pin: PinId) -> Option<String> {
        self.inner.lock().claims.get(&pin).map(|e| e.owner.clone())
    }

    /// Snapshot of all live claims
    pub fn claims(&self) -> Vec<PinClaim> {
        self.inner
            .lock()
            .claims
            .iter()
            .map(|(pin, e)| PinClaim {
                pin: *pin,
                owner: e.owner.clone(),
                generation: e.generation,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every remaining claim, returning what was released
    pub fn drain(&self) -> Vec<PinClaim> {
        let mut inner = self.inner.lock();
        inner
            .claims
            .drain()
            .map(|(pin, e)| PinClaim {
                pin,
                owner: e.owner,
                generation: e.generation,
            })
            .collect()
    }
}

impl Default for PinRegistry {
    fn default() -> Self {
        Self::new()
    }
}
