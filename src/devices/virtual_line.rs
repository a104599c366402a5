// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! In-memory output line for demo mode and tests

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::Device;
use crate::core::PinId;
use crate::error::DeviceError;

/// Observable state of a [`VirtualDevice`], shared with whoever built it
#[derive(Debug, Default)]
pub struct VirtualLine {
    active: AtomicBool,
    on_calls: AtomicU64,
    off_calls: AtomicU64,
    close_calls: AtomicU64,
    transitions: AtomicU64,
    fail_close: AtomicBool,
}

impl VirtualLine {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn on_calls(&self) -> u64 {
        self.on_calls.load(Ordering::SeqCst)
    }

    pub fn off_calls(&self) -> u64 {
        self.off_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u64 {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Actual level changes, as opposed to commands received
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::SeqCst)
    }

    /// Make the next `close` report a driver error
    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    fn drive(&self, level: bool) {
        if self.active.swap(level, Ordering::SeqCst) != level {
            self.transitions.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Binary output with no hardware behind it
pub struct VirtualDevice {
    name: String,
    pin: PinId,
    line: Arc<VirtualLine>,
    closed: bool,
}

impl VirtualDevice {
    pub fn new(name: &str, pin: PinId) -> Self {
        Self {
            name: name.to_string(),
            pin,
            line: Arc::new(VirtualLine::default()),
            closed: false,
        }
    }

    pub fn line(&self) -> Arc<VirtualLine> {
        Arc::clone(&self.line)
    }
}

impl Device for VirtualDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn pin(&self) -> PinId {
        self.pin
    }

    fn on(&mut self) -> Result<(), DeviceError> {
        self.line.on_calls.fetch_add(1, Ordering::SeqCst);
        if !self.line.is_active() {
            info!("[virtual] {} on {} -> ON", self.name, self.pin);
        }
        self.line.drive(true);
        Ok(())
    }

    fn off(&mut self) -> Result<(), DeviceError> {
        self.line.off_calls.fetch_add(1, Ordering::SeqCst);
        if self.line.is_active() {
            info!("[virtual] {} on {} -> OFF", self.name, self.pin);
        }
        self.line.drive(false);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.line.close_calls.fetch_add(1, Ordering::SeqCst);
        self.line.drive(false);
        if self.line.fail_close.load(Ordering::SeqCst) {
            return Err(DeviceError::Driver(format!("{}: simulated close failure", self.name)));
        }
        Ok(())
    }
}
