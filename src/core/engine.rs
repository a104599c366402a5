// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Main monitoring engine
//!
//! [`EngineBuilder`] claims every pin up front. A conflict aborts the build
//! and releases whatever had already been claimed; the engine never runs with
//! an unowned pin.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::actuation::ActuationPolicy;
use super::event_bus::{EventDispatcher, StatusLevel, Subscription, Topic};
use super::polling::{LoopWiring, PollingLoop};
use super::registry::{PinClaim, PinId, PinRegistry};
use super::shutdown::{ShutdownCoordinator, ShutdownReport};
use super::threshold::{ThresholdEvaluator, ThresholdTable};
use super::SystemState;
use crate::config::{Config, PollingConfig};
use crate::devices::{Device, DeviceHandle, DeviceRole, VirtualDevice};
use crate::error::{EngineError, Result};
use crate::sensors::{Sensor, SensorFamily, SensorKind, SensorSimulator};

/// Collects collaborators and claims their pins
pub struct EngineBuilder {
    polling: PollingConfig,
    thresholds: Arc<ThresholdTable>,
    registry: Arc<PinRegistry>,
    dispatcher: Arc<EventDispatcher>,
    sensors: Vec<(Box<dyn Sensor>, PinClaim)>,
    devices: HashMap<DeviceRole, Arc<DeviceHandle>>,
}

impl EngineBuilder {
    pub fn new(polling: PollingConfig) -> Self {
        Self {
            polling,
            thresholds: Arc::new(ThresholdTable::empty()),
            registry: Arc::new(PinRegistry::new()),
            dispatcher: Arc::new(EventDispatcher::new()),
            sensors: Vec::new(),
            devices: HashMap::new(),
        }
    }

    /// Polling settings and startup thresholds from the config file
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.polling.clone()).thresholds(ThresholdTable::from_config(&config.thresholds))
    }

    pub fn thresholds(mut self, table: ThresholdTable) -> Self {
        self.thresholds = Arc::new(table);
        self
    }

    /// Register the sensor for its family and claim its pin
    pub fn sensor(mut self, mut sensor: Box<dyn Sensor>) -> Result<Self> {
        let family = sensor.family();
        if self.sensors.iter().any(|(s, _)| s.family() == family) {
            discard_sensor(&mut sensor);
            self.abort();
            return Err(EngineError::DuplicateFamily(family));
        }

        match self.registry.acquire(sensor.pin(), sensor.id()) {
            Ok(claim) => {
                info!("Registered {} sensor '{}' on {}", family, sensor.id(), claim.pin);
                self.sensors.push((sensor, claim));
                Ok(self)
            }
            Err(e) => {
                error!("Cannot register sensor '{}': {}", sensor.id(), e);
                discard_sensor(&mut sensor);
                self.abort();
                Err(e.into())
            }
        }
    }

    /// Register the output device for `role` and claim its pin
    pub fn device(mut self, role: DeviceRole, mut device: Box<dyn Device>) -> Result<Self> {
        if self.devices.contains_key(&role) {
            discard_device(&mut device);
            self.abort();
            return Err(EngineError::DuplicateDevice(role.name().to_string()));
        }

        match self.registry.acquire(device.pin(), device.name()) {
            Ok(claim) => {
                info!("Registered {} '{}' on {}", role, device.name(), claim.pin);
                let handle = DeviceHandle::new(role, device, claim, Arc::clone(&self.registry));
                self.devices.insert(role, Arc::new(handle));
                Ok(self)
            }
            Err(e) => {
                error!("Cannot register {} '{}': {}", role, device.name(), e);
                discard_device(&mut device);
                self.abort();
                Err(e.into())
            }
        }
    }

    pub fn registry(&self) -> &Arc<PinRegistry> {
        &self.registry
    }

    /// Wire loops, policy and coordinator together
    pub fn build(self) -> Result<Engine> {
        let evaluator = ThresholdEvaluator::new(Arc::clone(&self.thresholds));
        let actuation = Arc::new(ActuationPolicy::new(self.devices.clone(), Arc::clone(&self.dispatcher)));
        let coordinator = ShutdownCoordinator::new(Arc::clone(&self.registry), Arc::clone(&self.dispatcher));

        for handle in self.devices.values() {
            coordinator.register_device(Arc::clone(handle))?;
        }

        let loop_count = self.sensors.len();
        for (sensor, claim) in self.sensors {
            let wiring = LoopWiring {
                registry: Arc::clone(&self.registry),
                dispatcher: Arc::clone(&self.dispatcher),
                evaluator: evaluator.clone(),
                actuation: Arc::clone(&actuation),
            };
            coordinator.register_loop(PollingLoop::new(sensor, claim, wiring, self.polling.clone()))?;
        }

        info!("Engine built: {} loops, {} devices", loop_count, self.devices.len());
        Ok(Engine {
            registry: self.registry,
            dispatcher: self.dispatcher,
            evaluator,
            devices: self.devices,
            coordinator,
            loop_count,
            started_at: Mutex::new(None),
        })
    }

    /// Close and release everything claimed so far
    fn abort(self) {
        for (mut sensor, claim) in self.sensors {
            discard_sensor(&mut sensor);
            self.registry.release(&claim);
        }
        for handle in self.devices.values() {
            if let Err(e) = handle.close() {
                warn!("Error closing {} during abort: {}", handle.name(), e);
            }
        }
        self.registry.drain();
    }
}

fn discard_sensor(sensor: &mut Box<dyn Sensor>) {
    if let Err(e) = sensor.close() {
        warn!("Error closing sensor '{}' during abort: {}", sensor.id(), e);
    }
}

fn discard_device(device: &mut Box<dyn Device>) {
    if let Err(e) = device.close() {
        warn!("Error closing '{}' during abort: {}", device.name(), e);
    }
}

/// Main EnvGuard engine
pub struct Engine {
    registry: Arc<PinRegistry>,
    dispatcher: Arc<EventDispatcher>,
    evaluator: ThresholdEvaluator,
    devices: HashMap<DeviceRole, Arc<DeviceHandle>>,
    coordinator: ShutdownCoordinator,
    loop_count: usize,
    started_at: Mutex<Option<Instant>>,
}

impl Engine {
    pub fn builder(polling: PollingConfig) -> EngineBuilder {
        EngineBuilder::new(polling)
    }

    /// Simulated sensors and virtual outputs laid out on the configured pin map
    pub fn demo(config: &Config) -> Result<Self> {
        let hw = &config.hardware;
        let light_pin = PinId::adc(hw.i2c_bus, hw.adc_address, hw.light_channel)?;
        let smoke_pin = PinId::adc(hw.i2c_bus, hw.adc_address, hw.smoke_channel)?;

        EngineBuilder::from_config(config)
            .sensor(Box::new(SensorSimulator::new("dht11", SensorFamily::Climate, PinId::Gpio(hw.dht11_gpio))))?
            .sensor(Box::new(SensorSimulator::new("ldr", SensorFamily::Light, light_pin)))?
            .sensor(Box::new(SensorSimulator::new("mq2", SensorFamily::Smoke, smoke_pin)))?
            .device(DeviceRole::Buzzer, Box::new(VirtualDevice::new("buzzer", PinId::Gpio(hw.buzzer_gpio))))?
            .device(DeviceRole::Light, Box::new(VirtualDevice::new("led", PinId::Gpio(hw.led_gpio))))?
            .device(DeviceRole::Relay, Box::new(VirtualDevice::new("relay", PinId::Gpio(hw.relay_gpio))))?
            .build()
    }

    /// DHT11 over IIO, PCF8591 over I²C, outputs over sysfs GPIO
    #[cfg(feature = "hardware")]
    pub fn hardware(config: &Config) -> Result<Self> {
        use crate::devices::SysfsGpioDevice;
        use crate::sensors::{AdcChannelSensor, Dht11Sensor, Pcf8591};

        let hw = &config.hardware;
        let builder = EngineBuilder::from_config(config).sensor(Box::new(Dht11Sensor::new(
            "dht11",
            hw.dht11_gpio,
            hw.dht11_iio_device,
        )))?;

        let adc = match Pcf8591::open(hw.i2c_bus, hw.adc_address) {
            Ok(adc) => adc,
            Err(e) => {
                builder.abort();
                return Err(e.into());
            }
        };
        let channels = [
            ("ldr", SensorFamily::Light, hw.light_channel),
            ("mq2", SensorFamily::Smoke, hw.smoke_channel),
        ];
        let mut builder = builder;
        for (id, family, channel) in channels {
            match AdcChannelSensor::new(id, family, Arc::clone(&adc), channel) {
                Ok(sensor) => builder = builder.sensor(Box::new(sensor))?,
                Err(e) => {
                    builder.abort();
                    return Err(e.into());
                }
            }
        }

        let outputs = [
            (DeviceRole::Buzzer, "buzzer", hw.buzzer_gpio),
            (DeviceRole::Light, "led", hw.led_gpio),
            (DeviceRole::Relay, "relay", hw.relay_gpio),
        ];
        for (role, name, gpio) in outputs {
            if let Some(holder) = builder.registry().owner_of(PinId::Gpio(gpio)) {
                builder.abort();
                return Err(crate::error::RegistryError::ResourceConflict {
                    pin: PinId::Gpio(gpio),
                    held_by: holder,
                    requested_by: name.to_string(),
                }
                .into());
            }
            match SysfsGpioDevice::open(name, gpio, hw.active_low) {
                Ok(device) => builder = builder.device(role, Box::new(device))?,
                Err(e) => {
                    builder.abort();
                    return Err(e.into());
                }
            }
        }
        builder.build()
    }

    /// Start every polling loop together
    pub fn start(&self) -> Result<usize> {
        if self.coordinator.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        let mut started_at = self.started_at.lock();
        if started_at.is_some() {
            return Err(EngineError::AlreadyStarted);
        }

        info!("Starting EnvGuard engine...");
        let started = self.coordinator.start_loops()?;
        *started_at = Some(Instant::now());
        self.dispatcher
            .publish_status(StatusLevel::Info, &format!("monitoring started ({} loops)", started));
        info!("EnvGuard engine started");
        Ok(started)
    }

    /// Update a limit; loops see it from their next reading on
    pub fn set_threshold(&self, kind: SensorKind, limit: f64) -> Result<()> {
        self.evaluator.set_threshold(kind, limit)?;
        self.dispatcher
            .publish_status(StatusLevel::Info, &format!("{} threshold set to {}", kind, limit));
        Ok(())
    }

    /// Parse operator input; a bad value leaves the limit untouched
    pub fn set_threshold_str(&self, kind: SensorKind, input: &str) -> Result<f64> {
        let limit = self.evaluator.set_threshold_str(kind, input)?;
        self.dispatcher
            .publish_status(StatusLevel::Info, &format!("{} threshold set to {}", kind, limit));
        Ok(limit)
    }

    pub fn clear_threshold(&self, kind: SensorKind) {
        self.evaluator.clear_threshold(kind);
    }

    pub fn threshold(&self, kind: SensorKind) -> Option<f64> {
        self.evaluator.threshold(kind)
    }

    /// Handle for manual control of an output
    pub fn device(&self, role: DeviceRole) -> Result<Arc<DeviceHandle>> {
        self.devices
            .get(&role)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDevice(role.name().to_string()))
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.dispatcher.subscribe(topic)
    }

    pub fn state(&self) -> SystemState {
        let stats = self.dispatcher.stats();
        let uptime_seconds = self.uptime();
        let shut_down = self.coordinator.is_shut_down();

        SystemState {
            running: self.started_at.lock().is_some() && !shut_down,
            loops_configured: self.loop_count,
            loops_active: self.coordinator.loops_running(),
            total_readings: stats.readings,
            total_threshold_events: stats.threshold_events,
            total_actuations: stats.actuations,
            total_faults: stats.faults,
            uptime_seconds,
            last_breach: self.dispatcher.last_breach(),
            thresholds: self.evaluator.table().snapshot(),
        }
    }

    pub fn uptime(&self) -> u64 {
        self.started_at.lock().map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Orderly teardown; later calls are no-ops
    pub fn shutdown(&self) -> ShutdownReport {
        self.coordinator.shutdown()
    }

    pub fn registry(&self) -> &Arc<PinRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::event_bus::EventPayload;
    use crate::devices::DeviceState;
    use crate::error::RegistryError;
    use crate::sensors::{ScriptedSensor, WhenExhausted};

    fn fast() -> PollingConfig {
        PollingConfig {
            interval_ms: 10,
            retry_backoff_ms: 5,
            max_retries: 1,
        }
    }

    fn light_sensor(values: &[f64]) -> Box<ScriptedSensor> {
        Box::new(
            ScriptedSensor::with_values("ldr", SensorFamily::Light, PinId::Gpio(2), SensorKind::Illuminance, values)
                .when_exhausted(WhenExhausted::Stall),
        )
    }

    #[test]
    fn test_conflicting_device_aborts_build() {
        let led = VirtualDevice::new("led", PinId::Gpio(5));
        let led_line = led.line();

        let result = Engine::builder(fast())
            .sensor(light_sensor(&[]))
            .and_then(|b| b.device(DeviceRole::Light, Box::new(led)))
            .and_then(|b| b.device(DeviceRole::Buzzer, Box::new(VirtualDevice::new("buzzer", PinId::Gpio(5)))));

        match result {
            Err(EngineError::Registry(RegistryError::ResourceConflict { held_by, requested_by, .. })) => {
                assert_eq!(held_by, "led");
                assert_eq!(requested_by, "buzzer");
            }
            other => panic!("expected conflict, got {:?}", other.err()),
        }
        assert_eq!(led_line.close_calls(), 1);
    }

    #[test]
    fn test_duplicate_family_rejected() {
        let result = Engine::builder(fast())
            .sensor(light_sensor(&[]))
            .and_then(|b| {
                b.sensor(Box::new(ScriptedSensor::new("ldr2", SensorFamily::Light, PinId::Gpio(3))))
            });
        assert!(matches!(result, Err(EngineError::DuplicateFamily(SensorFamily::Light))));
    }

    #[test]
    fn test_start_twice_and_after_shutdown() {
        let engine = Engine::builder(fast()).sensor(light_sensor(&[])).unwrap().build().unwrap();

        assert_eq!(engine.start().unwrap(), 1);
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));
        assert!(engine.state().running);

        engine.shutdown();
        assert!(matches!(engine.start(), Err(EngineError::ShutDown)));
        assert!(!engine.state().running);
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_threshold_breach_drives_light() {
        let engine = Engine::builder(fast())
            .thresholds(ThresholdTable::empty())
            .sensor(light_sensor(&[20.0, 180.0]))
            .unwrap()
            .device(DeviceRole::Light, Box::new(VirtualDevice::new("led", PinId::Gpio(5))))
            .unwrap()
            .build()
            .unwrap();
        engine.set_threshold(SensorKind::Illuminance, 100.0).unwrap();
        let sub = engine.subscribe(Topic::Thresholds);

        engine.start().unwrap();
        let event = sub.recv_timeout(Duration::from_secs(2)).expect("threshold event");
        match event.payload {
            EventPayload::Threshold(t) => assert_eq!(t.value, 180.0),
            other => panic!("unexpected {:?}", other),
        }

        // the actuation follows the published threshold event
        let led = engine.device(DeviceRole::Light).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while led.state() != DeviceState::On && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(led.state(), DeviceState::On);
        assert!(engine.state().last_breach.is_some());
        engine.shutdown();
    }

    #[test]
    fn test_bad_threshold_input_keeps_limit() {
        let engine = Engine::builder(fast()).build().unwrap();
        engine.set_threshold(SensorKind::Smoke, 90.0).unwrap();

        assert!(engine.set_threshold_str(SensorKind::Smoke, "loud").is_err());
        assert!(engine.set_threshold(SensorKind::Smoke, f64::NAN).is_err());
        assert_eq!(engine.threshold(SensorKind::Smoke), Some(90.0));
        assert_eq!(engine.set_threshold_str(SensorKind::Smoke, " 75.5 ").unwrap(), 75.5);
    }

    #[test]
    fn test_unknown_device() {
        let engine = Engine::builder(fast()).build().unwrap();
        assert!(matches!(engine.device(DeviceRole::Relay), Err(EngineError::UnknownDevice(_))));
    }

    #[test]
    fn test_demo_engine_claims_pin_map() {
        let engine = Engine::demo(&Config::default()).unwrap();
        assert_eq!(engine.registry().len(), 6);
        assert_eq!(engine.registry().owner_of(PinId::Gpio(26)).as_deref(), Some("buzzer"));
        assert_eq!(engine.threshold(SensorKind::Temperature), Some(35.0));

        let report = engine.shutdown();
        assert_eq!(report.claims_released, 6);
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_abort_continues_past_close_failures() {
        let sensor = ScriptedSensor::new("ldr", SensorFamily::Light, PinId::Gpio(2));
        let sensor_probe = sensor.probe();
        sensor_probe.set_fail_close(true);
        let led = VirtualDevice::new("led", PinId::Gpio(5));
        let led_line = led.line();
        led_line.set_fail_close(true);
        let relay = VirtualDevice::new("relay", PinId::Gpio(6));
        let relay_line = relay.line();

        let builder = Engine::builder(fast())
            .sensor(Box::new(sensor))
            .and_then(|b| b.device(DeviceRole::Light, Box::new(led)))
            .and_then(|b| b.device(DeviceRole::Relay, Box::new(relay)))
            .unwrap();
        let registry = Arc::clone(builder.registry());

        let result = builder.device(DeviceRole::Buzzer, Box::new(VirtualDevice::new("buzzer", PinId::Gpio(6))));
        assert!(matches!(result, Err(EngineError::Registry(RegistryError::ResourceConflict { .. }))));
        assert_eq!(sensor_probe.closes(), 1);
        assert_eq!(led_line.close_calls(), 1);
        assert_eq!(relay_line.close_calls(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_demo_rejects_missing_adc_channel() {
        let mut config = Config::default();
        config.hardware.light_channel = 4;

        let result = Engine::demo(&config);
        assert!(matches!(result, Err(EngineError::Registry(RegistryError::NoSuchPin(_)))));
    }
}
