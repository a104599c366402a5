// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Polling loop - one OS thread per sensor family
//!
//! Each cycle reads the sensor, evaluates every measurement, publishes it,
//! actuates on breach and then sleeps for the polling interval. Every wait
//! is a receive on the stop channel, so a stop request cuts a sleep or a
//! retry backoff short.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use super::actuation::ActuationPolicy;
use super::event_bus::{EventDispatcher, StatusLevel};
use super::registry::{PinClaim, PinRegistry};
use super::threshold::ThresholdEvaluator;
use crate::config::PollingConfig;
use crate::error::{EngineError, SensorError};
use crate::sensors::{Measurement, Reading, Sensor, SensorFamily};

/// Shared services a loop publishes into
#[derive(Clone)]
pub struct LoopWiring {
    pub registry: Arc<PinRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
    pub evaluator: ThresholdEvaluator,
    pub actuation: Arc<ActuationPolicy>,
}

/// Why a loop thread ended
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// Stop was requested (or the loop never started)
    Stopped,
    /// The sensor reported a non-recoverable fault
    Fatal(SensorError),
    /// The sensor collaborator panicked
    Panicked(String),
}

/// Outcome of [`PollingLoop::stop`]
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub family: SensorFamily,
    pub sensor_id: String,
    pub exit: LoopExit,
    pub cycles: u64,
    pub close_error: Option<SensorError>,
}

struct LoopContext {
    family: SensorFamily,
    sensor_id: String,
    claim: PinClaim,
    wiring: LoopWiring,
    config: PollingConfig,
}

/// Result of one sampling cycle
enum Cycle {
    Sampled(Vec<Measurement>),
    /// Retries ran out on transient errors
    Exhausted(SensorError),
    Fatal(SensorError),
    Stopped,
}

struct ThreadResult {
    sensor: Box<dyn Sensor>,
    exit: LoopExit,
    cycles: u64,
}

/// Thread entry; `None` if the sensor never reached the thread
type LoopBody = Box<dyn FnOnce() -> Option<ThreadResult> + Send>;

enum State {
    Idle(Box<dyn Sensor>, LoopContext),
    Running {
        stop_tx: Sender<()>,
        handle: JoinHandle<Option<ThreadResult>>,
    },
    Stopped,
}

pub struct PollingLoop {
    family: SensorFamily,
    sensor_id: String,
    claim: PinClaim,
    registry: Arc<PinRegistry>,
    state: State,
}

impl PollingLoop {
    pub fn new(sensor: Box<dyn Sensor>, claim: PinClaim, wiring: LoopWiring, config: PollingConfig) -> Self {
        let family = sensor.family();
        let sensor_id = sensor.id().to_string();
        let registry = Arc::clone(&wiring.registry);
        let ctx = LoopContext {
            family,
            sensor_id: sensor_id.clone(),
            claim: claim.clone(),
            wiring,
            config,
        };
        Self {
            family,
            sensor_id,
            claim,
            registry,
            state: State::Idle(sensor, ctx),
        }
    }

    pub fn family(&self) -> SensorFamily {
        self.family
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// True while the loop thread is alive
    pub fn is_running(&self) -> bool {
        matches!(&self.state, State::Running { handle, .. } if !handle.is_finished())
    }

    /// Spawn the loop thread
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.start_with(|name, body| thread::Builder::new().name(name).spawn(body))
    }

    fn start_with<S>(&mut self, spawn: S) -> Result<(), EngineError>
    where
        S: FnOnce(String, LoopBody) -> io::Result<JoinHandle<Option<ThreadResult>>>,
    {
        let (sensor, ctx) = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Idle(sensor, ctx) => (sensor, ctx),
            running @ State::Running { .. } => {
                self.state = running;
                return Err(EngineError::AlreadyStarted);
            }
            State::Stopped => return Err(EngineError::ShutDown),
        };

        // The sensor travels through a slot we keep a handle on, so a failed
        // spawn leaves it here to be closed.
        let (handoff_tx, handoff_rx) = channel::bounded::<(Box<dyn Sensor>, LoopContext)>(1);
        if handoff_tx.send((sensor, ctx)).is_err() {
            return Err(EngineError::ShutDown);
        }
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let slot = handoff_rx.clone();
        let body: LoopBody = Box::new(move || {
            let (sensor, ctx) = slot.try_recv().ok()?;
            Some(run_thread(sensor, ctx, stop_rx))
        });

        match spawn(format!("poll-{}", self.family), body) {
            Ok(handle) => {
                info!("Started {} polling loop for {}", self.family, self.sensor_id);
                self.state = State::Running { stop_tx, handle };
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn {} loop: {}", self.family, e);
                if let Ok((mut sensor, _)) = handoff_rx.try_recv() {
                    if let Err(close_err) = sensor.close() {
                        warn!("Error closing sensor {}: {}", self.sensor_id, close_err);
                    }
                }
                self.registry.release(&self.claim);
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Request termination, wait for the thread, then close the sensor and
    /// release its claim. Returns `None` if the loop was already stopped.
    pub fn stop(&mut self) -> Option<LoopReport> {
        let (mut sensor, exit, cycles) = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Stopped => return None,
            State::Idle(sensor, _) => (Some(sensor), LoopExit::Stopped, 0),
            State::Running { stop_tx, handle } => {
                // A full buffer means a stop is already pending
                let _ = stop_tx.try_send(());
                drop(stop_tx);
                match handle.join() {
                    Ok(Some(result)) => (Some(result.sensor), result.exit, result.cycles),
                    Ok(None) => (None, LoopExit::Stopped, 0),
                    Err(_) => (None, LoopExit::Panicked("polling thread panicked".to_string()), 0),
                }
            }
        };

        let close_error = sensor.as_mut().and_then(|s| match s.close() {
            Ok(()) => None,
            Err(e) => {
                warn!("Error closing sensor {}: {}", self.sensor_id, e);
                Some(e)
            }
        });
        self.registry.release(&self.claim);
        info!("Stopped {} polling loop ({:?})", self.family, exit);

        Some(LoopReport {
            family: self.family,
            sensor_id: self.sensor_id.clone(),
            exit,
            cycles,
            close_error,
        })
    }
}

impl Drop for PollingLoop {
    fn drop(&mut self) {
        if matches!(self.state, State::Running { .. }) {
            self.stop();
        }
    }
}

fn run_thread(mut sensor: Box<dyn Sensor>, ctx: LoopContext, stop_rx: Receiver<()>) -> ThreadResult {
    let mut cycles = 0;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run(sensor.as_mut(), &ctx, &stop_rx, &mut cycles)
    }));

    let exit = match outcome {
        Ok(exit) => exit,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Sensor {} panicked: {}", ctx.sensor_id, message);
            ctx.wiring.registry.release(&ctx.claim);
            ctx.wiring.dispatcher.publish_fault(ctx.family, &ctx.sensor_id, &message);
            LoopExit::Panicked(message)
        }
    };

    ThreadResult { sensor, exit, cycles }
}

fn run(sensor: &mut dyn Sensor, ctx: &LoopContext, stop_rx: &Receiver<()>, cycles: &mut u64) -> LoopExit {
    let dispatcher = &ctx.wiring.dispatcher;

    loop {
        match sample(sensor, ctx, stop_rx) {
            Cycle::Sampled(measurements) => {
                *cycles += 1;
                for m in measurements {
                    let reading = Reading::new(&ctx.sensor_id, m.kind, m.value).with_sequence(*cycles);
                    let breach = ctx.wiring.evaluator.evaluate(&reading);
                    dispatcher.publish_reading(reading);

                    if let Some(event) = breach {
                        debug!("{} breach: {} > {}", event.kind, event.value, event.limit);
                        dispatcher.publish_threshold(event.clone());
                        if let Err(e) = ctx.wiring.actuation.on_threshold_event(&event) {
                            dispatcher.publish_status(
                                StatusLevel::Warning,
                                &format!("actuation for {} failed: {}", event.kind, e),
                            );
                        }
                    }
                }
            }
            Cycle::Exhausted(e) => {
                *cycles += 1;
                warn!("{} unreadable after {} retries: {}", ctx.sensor_id, ctx.config.max_retries, e);
                dispatcher.publish_status(
                    StatusLevel::Warning,
                    &format!("{} unreadable after {} retries: {}", ctx.sensor_id, ctx.config.max_retries, e),
                );
            }
            Cycle::Fatal(e) => {
                error!("Fatal error on {}: {}", ctx.sensor_id, e);
                if let Err(close_err) = sensor.close() {
                    warn!("Error closing sensor {}: {}", ctx.sensor_id, close_err);
                }
                ctx.wiring.registry.release(&ctx.claim);
                dispatcher.publish_fault(ctx.family, &ctx.sensor_id, &e.to_string());
                return LoopExit::Fatal(e);
            }
            Cycle::Stopped => return LoopExit::Stopped,
        }

        if stop_requested(stop_rx, ctx.config.interval()) {
            return LoopExit::Stopped;
        }
    }
}

/// Read once, retrying transient failures with a fixed backoff
fn sample(sensor: &mut dyn Sensor, ctx: &LoopContext, stop_rx: &Receiver<()>) -> Cycle {
    let mut attempt = 0;
    loop {
        match sensor.read() {
            Ok(measurements) => return Cycle::Sampled(measurements),
            Err(e) if e.is_transient() => {
                if attempt >= ctx.config.max_retries {
                    return Cycle::Exhausted(e);
                }
                attempt += 1;
                debug!("{}: {} (retry {}/{})", ctx.sensor_id, e, attempt, ctx.config.max_retries);
                if stop_requested(stop_rx, ctx.config.retry_backoff()) {
                    return Cycle::Stopped;
                }
            }
            Err(e) => return Cycle::Fatal(e),
        }
    }
}

/// Sleep for `timeout` unless a stop arrives first
fn stop_requested(stop_rx: &Receiver<()>, timeout: Duration) -> bool {
    match stop_rx.recv_timeout(timeout) {
        Err(RecvTimeoutError::Timeout) => false,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Instant;

    use super::*;
    use crate::core::event_bus::{EventPayload, Topic};
    use crate::core::threshold::ThresholdTable;
    use crate::core::PinId;
    use crate::sensors::{ScriptedSensor, SensorKind, WhenExhausted};

    fn fast_config() -> PollingConfig {
        PollingConfig {
            interval_ms: 10,
            retry_backoff_ms: 5,
            max_retries: 3,
        }
    }

    fn wiring() -> LoopWiring {
        let registry = Arc::new(PinRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new());
        let table = Arc::new(ThresholdTable::empty());
        LoopWiring {
            registry,
            actuation: Arc::new(ActuationPolicy::new(HashMap::new(), Arc::clone(&dispatcher))),
            dispatcher,
            evaluator: ThresholdEvaluator::new(table),
        }
    }

    fn polling_loop(sensor: ScriptedSensor, wiring: &LoopWiring, config: PollingConfig) -> PollingLoop {
        let claim = wiring.registry.acquire(sensor.pin(), sensor.id()).unwrap();
        PollingLoop::new(Box::new(sensor), claim, wiring.clone(), config)
    }

    fn readings(events: &[crate::core::Event]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::Reading(r) => Some(r.value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_recovers_from_transient_errors() {
        let wiring = wiring();
        let sub = wiring.dispatcher.subscribe(Topic::Readings);
        let sensor = ScriptedSensor::new("ldr", SensorFamily::Light, PinId::Gpio(2))
            .then_transient(3)
            .then_value(SensorKind::Illuminance, 42.0)
            .when_exhausted(WhenExhausted::Stall);
        let probe = sensor.probe();

        let mut lp = polling_loop(sensor, &wiring, fast_config());
        lp.start().unwrap();
        let event = sub.recv_timeout(Duration::from_secs(2)).expect("reading delivered");
        assert!(lp.is_running());
        let report = lp.stop().unwrap();

        assert_eq!(readings(&[event]), vec![42.0]);
        assert_eq!(report.exit, LoopExit::Stopped);
        assert!(probe.reads() >= 4);
        assert_eq!(probe.closes(), 1);
        assert!(wiring.registry.is_empty());
    }

    #[test]
    fn test_exhausted_retries_keep_loop_alive() {
        let mut config = fast_config();
        config.max_retries = 1;
        let wiring = wiring();
        let status = wiring.dispatcher.subscribe(Topic::Status);
        let readings_sub = wiring.dispatcher.subscribe(Topic::Readings);
        let sensor = ScriptedSensor::new("dht11", SensorFamily::Climate, PinId::Gpio(18))
            .then_transient(2)
            .then_value(SensorKind::Temperature, 21.0)
            .when_exhausted(WhenExhausted::Stall);

        let mut lp = polling_loop(sensor, &wiring, config);
        lp.start().unwrap();

        let warning = status.recv_timeout(Duration::from_secs(2)).expect("warning");
        assert!(matches!(warning.payload, EventPayload::Status { level: StatusLevel::Warning, .. }));
        assert!(readings_sub.recv_timeout(Duration::from_secs(2)).is_some());
        lp.stop();
    }

    #[test]
    fn test_fatal_error_ends_loop_and_releases_claim() {
        let wiring = wiring();
        let faults = wiring.dispatcher.subscribe(Topic::Status);
        let sensor = ScriptedSensor::new("mq2", SensorFamily::Smoke, PinId::Gpio(3))
            .then_value(SensorKind::Smoke, 10.0)
            .then_fatal("adc gone");
        let probe = sensor.probe();

        let mut lp = polling_loop(sensor, &wiring, fast_config());
        lp.start().unwrap();

        let fault = faults.recv_timeout(Duration::from_secs(2)).expect("fault event");
        match fault.payload {
            EventPayload::SensorFault { family, sensor, message } => {
                assert_eq!(family, SensorFamily::Smoke);
                assert_eq!(sensor, "mq2");
                assert!(message.contains("adc gone"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let report = lp.stop().unwrap();
        assert_eq!(report.exit, LoopExit::Fatal(SensorError::fatal("adc gone")));
        assert_eq!(report.cycles, 1);
        assert!(wiring.registry.is_empty());
        assert_eq!(probe.closes(), 1);
        assert!(lp.stop().is_none());
    }

    #[test]
    fn test_stop_interrupts_long_interval() {
        let config = PollingConfig {
            interval_ms: 60_000,
            retry_backoff_ms: 60_000,
            max_retries: 3,
        };
        let wiring = wiring();
        let sub = wiring.dispatcher.subscribe(Topic::Readings);
        let sensor = ScriptedSensor::with_values(
            "ldr",
            SensorFamily::Light,
            PinId::Gpio(2),
            SensorKind::Illuminance,
            &[1.0],
        );

        let mut lp = polling_loop(sensor, &wiring, config);
        lp.start().unwrap();
        sub.recv_timeout(Duration::from_secs(2)).expect("first reading");

        let started = Instant::now();
        lp.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_stop_interrupts_retry_backoff() {
        let config = PollingConfig {
            interval_ms: 60_000,
            retry_backoff_ms: 60_000,
            max_retries: 10,
        };
        let wiring = wiring();
        let sensor = ScriptedSensor::new("dht11", SensorFamily::Climate, PinId::Gpio(18))
            .when_exhausted(WhenExhausted::Stall);
        let probe = sensor.probe();

        let mut lp = polling_loop(sensor, &wiring, config);
        lp.start().unwrap();
        while probe.reads() == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        let started = Instant::now();
        let report = lp.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.exit, LoopExit::Stopped);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let wiring = wiring();
        let sensor = ScriptedSensor::new("ldr", SensorFamily::Light, PinId::Gpio(2))
            .when_exhausted(WhenExhausted::Stall);
        let mut lp = polling_loop(sensor, &wiring, fast_config());

        lp.start().unwrap();
        assert!(matches!(lp.start(), Err(EngineError::AlreadyStarted)));
        lp.stop();
        assert!(matches!(lp.start(), Err(EngineError::ShutDown)));
    }

    #[test]
    fn test_failed_spawn_closes_sensor() {
        let wiring = wiring();
        let sensor = ScriptedSensor::new("ldr", SensorFamily::Light, PinId::Gpio(2));
        let probe = sensor.probe();
        let mut lp = polling_loop(sensor, &wiring, fast_config());

        let result = lp.start_with(|_, _body| Err(io::Error::new(io::ErrorKind::Other, "no threads left")));

        assert!(matches!(result, Err(EngineError::Spawn(_))));
        assert_eq!(probe.reads(), 0);
        assert_eq!(probe.closes(), 1);
        assert!(wiring.registry.is_empty());
        assert!(!lp.is_running());
        assert!(lp.stop().is_none());
        assert!(matches!(lp.start(), Err(EngineError::ShutDown)));
    }

    #[test]
    fn test_stop_before_start_closes_sensor() {
        let wiring = wiring();
        let sensor = ScriptedSensor::new("ldr", SensorFamily::Light, PinId::Gpio(2));
        let probe = sensor.probe();
        let mut lp = polling_loop(sensor, &wiring, fast_config());

        let report = lp.stop().unwrap();
        assert_eq!(report.exit, LoopExit::Stopped);
        assert_eq!(probe.reads(), 0);
        assert_eq!(probe.closes(), 1);
        assert!(wiring.registry.is_empty());
    }

    struct PanickingSensor;

    impl Sensor for PanickingSensor {
        fn id(&self) -> &str {
            "bad"
        }
        fn pin(&self) -> PinId {
            PinId::Gpio(9)
        }
        fn family(&self) -> SensorFamily {
            SensorFamily::Smoke
        }
        fn read(&mut self) -> Result<Vec<Measurement>, SensorError> {
            panic!("driver bug");
        }
        fn close(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
    }

    #[test]
    fn test_panicking_sensor_is_contained() {
        let wiring = wiring();
        let faults = wiring.dispatcher.subscribe(Topic::Status);
        let claim = wiring.registry.acquire(PinId::Gpio(9), "bad").unwrap();
        let mut lp = PollingLoop::new(Box::new(PanickingSensor), claim, wiring.clone(), fast_config());

        lp.start().unwrap();
        let fault = faults.recv_timeout(Duration::from_secs(2)).expect("fault event");
        assert!(matches!(fault.payload, EventPayload::SensorFault { .. }));

        let report = lp.stop().unwrap();
        assert_eq!(report.exit, LoopExit::Panicked("driver bug".to_string()));
        assert!(wiring.registry.is_empty());
    }
}
