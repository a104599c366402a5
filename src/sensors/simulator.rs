// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Sensor simulator for demo/testing

use rand::prelude::*;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use super::{Measurement, Sensor, SensorFamily, SensorKind};
use crate::core::PinId;
use crate::error::SensorError;

/// Simulates realistic environmental data
pub struct SensorSimulator {
    id: String,
    family: SensorFamily,
    pin: PinId,
    rng: rand::rngs::StdRng,
    closed: bool,

    // Simulation state
    time: f64,
    anomaly_probability: f64,
    failure_probability: f64,
    noise_level: f64,
    drift: f64,
    /// Remaining cycles of an ongoing spike
    spike: u32,
}

impl SensorSimulator {
    pub fn new(id: &str, family: SensorFamily, pin: PinId) -> Self {
        Self::with_rng(id, family, pin, rand::rngs::StdRng::from_entropy())
    }

    /// Deterministic simulator
    pub fn seeded(id: &str, family: SensorFamily, pin: PinId, seed: u64) -> Self {
        Self::with_rng(id, family, pin, rand::rngs::StdRng::seed_from_u64(seed))
    }

    fn with_rng(id: &str, family: SensorFamily, pin: PinId, rng: rand::rngs::StdRng) -> Self {
        Self {
            id: id.to_string(),
            family,
            pin,
            rng,
            closed: false,
            time: 0.0,
            anomaly_probability: 0.05,
            failure_probability: 0.02,
            noise_level: 1.0,
            drift: 0.0,
            spike: 0,
        }
    }

    pub fn with_anomaly_probability(mut self, p: f64) -> Self {
        self.anomaly_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_failure_probability(mut self, p: f64) -> Self {
        self.failure_probability = p.clamp(0.0, 1.0);
        self
    }

    fn noise(&mut self, sigma: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * sigma * self.noise_level
    }

    fn spiking(&mut self) -> bool {
        if self.spike == 0 && self.rng.gen::<f64>() < self.anomaly_probability {
            self.spike = self.rng.gen_range(2..6);
        }
        if self.spike > 0 {
            self.spike -= 1;
            true
        } else {
            false
        }
    }

    fn generate_data(&mut self) -> Vec<Measurement> {
        self.time += 1.0;
        self.drift = (self.drift + self.rng.gen_range(-0.05..0.05)).clamp(-3.0, 3.0);

        match self.family {
            SensorFamily::Climate => self.generate_climate(),
            SensorFamily::Light => self.generate_light(),
            SensorFamily::Smoke => self.generate_smoke(),
        }
    }

    fn generate_climate(&mut self) -> Vec<Measurement> {
        // Slow day/night swing around 24 °C
        let mut temp = 24.0 + 3.0 * (2.0 * PI * self.time / 720.0).sin() + self.drift;
        temp += self.noise(0.3);
        if self.spiking() {
            temp += self.rng.gen_range(10.0..20.0);
        }

        let humidity = (55.0 - (temp - 24.0) * 1.5 + self.noise(2.0)).clamp(5.0, 95.0);

        // DHT11 resolution is 1 unit
        vec![
            Measurement::new(SensorKind::Temperature, temp.round()),
            Measurement::new(SensorKind::Humidity, humidity.round()),
        ]
    }

    fn generate_light(&mut self) -> Vec<Measurement> {
        // 8-bit ADC, lower is brighter on the usual LDR divider
        let mut raw = 80.0 + 30.0 * (2.0 * PI * self.time / 360.0).cos() + self.drift * 4.0;
        raw += self.noise(3.0);
        if self.spiking() {
            raw += self.rng.gen_range(60.0..120.0);
        }
        vec![Measurement::new(SensorKind::Illuminance, raw.clamp(0.0, 255.0).round())]
    }

    fn generate_smoke(&mut self) -> Vec<Measurement> {
        let mut raw = 40.0 + self.drift * 2.0 + self.noise(4.0);
        if self.spiking() {
            raw += self.rng.gen_range(80.0..180.0);
        }
        vec![Measurement::new(SensorKind::Smoke, raw.clamp(0.0, 255.0).round())]
    }
}

impl Sensor for SensorSimulator {
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
        if self.closed {
            return Err(SensorError::fatal(format!("{} is closed", self.id)));
        }
        // DHT11s miss their timing window every so often
        if self.rng.gen::<f64>() < self.failure_probability {
            return Err(SensorError::transient("simulated checksum mismatch"));
        }
        Ok(self.generate_data())
    }

    fn close(&mut self) -> Result<(), SensorError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_climate_produces_both_kinds() {
        let mut sim = SensorSimulator::seeded("dht11", SensorFamily::Climate, PinId::Gpio(18), 7)
            .with_failure_probability(0.0);
        let values = sim.read().unwrap();
        let kinds: Vec<_> = values.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![SensorKind::Temperature, SensorKind::Humidity]);
    }

    #[test]
    fn test_adc_values_stay_in_range() {
        let mut sim = SensorSimulator::seeded("mq2", SensorFamily::Smoke, PinId::Gpio(1), 42)
            .with_failure_probability(0.0)
            .with_anomaly_probability(0.5);
        for _ in 0..500 {
            let v = sim.read().unwrap()[0].value;
            assert!((0.0..=255.0).contains(&v));
        }
    }

    #[test]
    fn test_closed_simulator_is_fatal() {
        let mut sim = SensorSimulator::seeded("ldr", SensorFamily::Light, PinId::Gpio(2), 1);
        sim.close().unwrap();
        assert!(matches!(sim.read(), Err(SensorError::Fatal(_))));
    }

    #[test]
    fn test_failures_are_transient() {
        let mut sim = SensorSimulator::seeded("ldr", SensorFamily::Light, PinId::Gpio(2), 3)
            .with_failure_probability(1.0);
        assert!(sim.read().unwrap_err().is_transient());
    }
}
