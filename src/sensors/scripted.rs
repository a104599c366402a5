// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Sensor that replays a fixed script of outcomes

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{Measurement, Sensor, SensorFamily, SensorKind};
use crate::core::PinId;
use crate::error::SensorError;

/// One scripted `read()` result
pub type ScriptStep = Result<Vec<Measurement>, SensorError>;

/// What `read()` returns once the script runs out
#[derive(Debug, Clone, PartialEq)]
pub enum WhenExhausted {
    /// Report a fatal fault, ending the polling loop
    Fail,
    /// Keep returning the last successful step
    RepeatLast,
    /// Keep reporting transient errors
    Stall,
}

/// Call counters shared with the builder of a [`ScriptedSensor`]
#[derive(Debug, Default)]
pub struct ScriptProbe {
    reads: AtomicU64,
    closes: AtomicU64,
    writes: AtomicU64,
    fail_close: AtomicBool,
}

impl ScriptProbe {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `close` report a fatal error after releasing the sensor
    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }
}

pub struct ScriptedSensor {
    id: String,
    family: SensorFamily,
    pin: PinId,
    steps: VecDeque<ScriptStep>,
    last_ok: Option<Vec<Measurement>>,
    when_exhausted: WhenExhausted,
    probe: Arc<ScriptProbe>,
    closed: bool,
}

impl ScriptedSensor {
    pub fn new(id: &str, family: SensorFamily, pin: PinId) -> Self {
        Self {
            id: id.to_string(),
            family,
            pin,
            steps: VecDeque::new(),
            last_ok: None,
            when_exhausted: WhenExhausted::Fail,
            probe: Arc::new(ScriptProbe::default()),
            closed: false,
        }
    }

    /// Single-kind sensor replaying `values` in order
    pub fn with_values(id: &str, family: SensorFamily, pin: PinId, kind: SensorKind, values: &[f64]) -> Self {
        let mut sensor = Self::new(id, family, pin);
        for v in values {
            sensor = sensor.then_value(kind, *v);
        }
        sensor
    }

    pub fn then(mut self, step: ScriptStep) -> Self {
        self.steps.push_back(step);
        self
    }

    pub fn then_value(self, kind: SensorKind, value: f64) -> Self {
        self.then(Ok(vec![Measurement::new(kind, value)]))
    }

    pub fn then_transient(self, count: usize) -> Self {
        (0..count).fold(self, |s, i| s.then(Err(SensorError::transient(format!("scripted glitch {}", i + 1)))))
    }

    pub fn then_fatal(self, message: &str) -> Self {
        self.then(Err(SensorError::fatal(message)))
    }

    pub fn when_exhausted(mut self, behaviour: WhenExhausted) -> Self {
        self.when_exhausted = behaviour;
        self
    }

    pub fn probe(&self) -> Arc<ScriptProbe> {
        Arc::clone(&self.probe)
    }
}

impl Sensor for ScriptedSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn pin(&self) -> PinId {
        self.pin
    }

    fn family(&self) -> SensorFamily {
        self.family
    }

    fn read(&mut self) -> Result<Vec<Measurement>, SensorError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if self.closed {
            return Err(SensorError::fatal(format!("{} is closed", self.id)));
        }

        if let Some(step) = self.steps.pop_front() {
            if let Ok(values) = &step {
                self.last_ok = Some(values.clone());
            }
            return step;
        }

        match (&self.when_exhausted, &self.last_ok) {
            (WhenExhausted::RepeatLast, Some(values)) => Ok(values.clone()),
            (WhenExhausted::Stall, _) => Err(SensorError::transient("script stalled")),
            _ => Err(SensorError::fatal("script exhausted")),
        }
    }

    fn write(&mut self, _value: f64) -> Result<(), SensorError> {
        self.probe.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SensorError> {
        if !self.closed {
            self.closed = true;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
            if self.probe.fail_close.load(Ordering::SeqCst) {
                return Err(SensorError::fatal(format!("{}: simulated close failure", self.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_then_fails() {
        let mut s = ScriptedSensor::with_values(
            "mq2",
            SensorFamily::Smoke,
            PinId::Gpio(1),
            SensorKind::Smoke,
            &[1.0, 2.0],
        );
        assert_eq!(s.read().unwrap()[0].value, 1.0);
        assert_eq!(s.read().unwrap()[0].value, 2.0);
        assert!(matches!(s.read(), Err(SensorError::Fatal(_))));
        assert_eq!(s.probe().reads(), 3);
    }

    #[test]
    fn test_repeat_last_and_close_counts_once() {
        let mut s = ScriptedSensor::new("ldr", SensorFamily::Light, PinId::Gpio(2))
            .then_transient(1)
            .then_value(SensorKind::Illuminance, 7.0)
            .when_exhausted(WhenExhausted::RepeatLast);

        assert!(s.read().unwrap_err().is_transient());
        assert_eq!(s.read().unwrap()[0].value, 7.0);
        assert_eq!(s.read().unwrap()[0].value, 7.0);

        let probe = s.probe();
        s.close().unwrap();
        s.close().unwrap();
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn test_failing_close_still_counts() {
        let mut s = ScriptedSensor::new("dht11", SensorFamily::Climate, PinId::Gpio(18));
        let probe = s.probe();
        probe.set_fail_close(true);

        assert!(matches!(s.close(), Err(SensorError::Fatal(_))));
        assert_eq!(probe.closes(), 1);
        // already closed, nothing left to fail
        assert!(s.close().is_ok());
        assert_eq!(probe.closes(), 1);
    }
}
