// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Shutdown coordinator - the single orderly exit path
//!
//! Order matters: every loop is joined before any device is closed, so no
//! loop can touch a pin while it is being released. A failing `close` is
//! recorded and the remaining resources are still released.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use super::event_bus::{EventDispatcher, StatusLevel};
use super::polling::{LoopExit, LoopReport, PollingLoop};
use super::registry::PinRegistry;
use crate::devices::DeviceHandle;
use crate::error::EngineError;

/// What a shutdown did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// Set when shutdown had already run; nothing was touched
    pub already_completed: bool,
    pub loops_stopped: usize,
    /// Loops that had already died on a fatal error or panic
    pub loops_failed: usize,
    pub devices_closed: usize,
    pub claims_released: usize,
    pub failures: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Resources {
    loops: Vec<PollingLoop>,
    devices: Vec<Arc<DeviceHandle>>,
}

pub struct ShutdownCoordinator {
    registry: Arc<PinRegistry>,
    dispatcher: Arc<EventDispatcher>,
    resources: Mutex<Option<Resources>>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<PinRegistry>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
            resources: Mutex::new(Some(Resources {
                loops: Vec::new(),
                devices: Vec::new(),
            })),
        }
    }

    pub fn register_loop(&self, polling_loop: PollingLoop) -> Result<(), EngineError> {
        let mut resources = self.resources.lock();
        let resources = resources.as_mut().ok_or(EngineError::ShutDown)?;
        resources.loops.push(polling_loop);
        Ok(())
    }

    pub fn register_device(&self, device: Arc<DeviceHandle>) -> Result<(), EngineError> {
        let mut resources = self.resources.lock();
        let resources = resources.as_mut().ok_or(EngineError::ShutDown)?;
        resources.devices.push(device);
        Ok(())
    }

    /// Start every registered loop
    pub fn start_loops(&self) -> Result<usize, EngineError> {
        let mut resources = self.resources.lock();
        let resources = resources.as_mut().ok_or(EngineError::ShutDown)?;
        for polling_loop in resources.loops.iter_mut() {
            polling_loop.start()?;
        }
        Ok(resources.loops.len())
    }

    pub fn loops_running(&self) -> usize {
        self.resources
            .lock()
            .as_ref()
            .map(|r| r.loops.iter().filter(|l| l.is_running()).count())
            .unwrap_or(0)
    }

    pub fn is_shut_down(&self) -> bool {
        self.resources.lock().is_none()
    }

    /// Stop loops, close devices, drain the registry. Runs once; later
    /// calls return a report with `already_completed` set.
    pub fn shutdown(&self) -> ShutdownReport {
        let Some(resources) = self.resources.lock().take() else {
            info!("Shutdown already completed");
            return ShutdownReport {
                already_completed: true,
                ..ShutdownReport::default()
            };
        };

        info!("Shutting down: {} loops, {} devices", resources.loops.len(), resources.devices.len());
        let mut report = ShutdownReport {
            claims_released: self.registry.len(),
            ..ShutdownReport::default()
        };

        // Phase 1: join every loop
        for mut polling_loop in resources.loops {
            if let Some(loop_report) = polling_loop.stop() {
                self.record_loop(&mut report, loop_report);
            }
        }

        // Phase 2: close devices and release their pins
        for device in resources.devices {
            match device.close() {
                Ok(true) => report.devices_closed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.devices_closed += 1;
                    report.failures.push(format!("device {}: {}", device.name(), e));
                }
            }
            self.registry.release(device.claim());
        }

        // Phase 3: anything still claimed
        let leftovers = self.registry.drain();
        if !leftovers.is_empty() {
            warn!("Released {} claims with no registered owner", leftovers.len());
        }

        for failure in &report.failures {
            warn!("Shutdown: {}", failure);
        }
        info!(
            "Shutdown complete: {} loops, {} devices, {} claims released",
            report.loops_stopped, report.devices_closed, report.claims_released
        );
        self.dispatcher.publish_status(StatusLevel::Info, "shutdown complete");
        report
    }

    fn record_loop(&self, report: &mut ShutdownReport, loop_report: LoopReport) {
        report.loops_stopped += 1;
        match &loop_report.exit {
            LoopExit::Stopped => {}
            LoopExit::Fatal(e) => {
                report.loops_failed += 1;
                report.failures.push(format!("{} loop: {}", loop_report.family, e));
            }
            LoopExit::Panicked(msg) => {
                report.loops_failed += 1;
                report.failures.push(format!("{} loop panicked: {}", loop_report.family, msg));
            }
        }
        if let Some(e) = loop_report.close_error {
            report.failures.push(format!("sensor {}: {}", loop_report.sensor_id, e));
        }
    }
}

impl Drop for ShutdownCoordinator {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            self.shutdown();
        }
    }
}
