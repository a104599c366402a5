// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Event dispatcher for pub/sub between polling loops and the shell

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::threshold::ThresholdEvent;
use crate::devices::{DeviceRole, DeviceState};
use crate::sensors::{Reading, SensorFamily};

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Reading,
    Threshold,
    Actuation,
    Status,
    SensorFault,
}

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Reading(Reading),
    Threshold(ThresholdEvent),
    Actuation {
        role: DeviceRole,
        device: String,
        state: DeviceState,
    },
    Status {
        level: StatusLevel,
        message: String,
    },
    SensorFault {
        family: SensorFamily,
        sensor: String,
        message: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Reading(_) => EventType::Reading,
            EventPayload::Threshold(_) => EventType::Threshold,
            EventPayload::Actuation { .. } => EventType::Actuation,
            EventPayload::Status { .. } => EventType::Status,
            EventPayload::SensorFault { .. } => EventType::SensorFault,
        }
    }
}

/// Generic event wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Process-wide publish order
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Which events a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    All,
    Readings,
    Thresholds,
    /// Status messages and sensor faults
    Status,
}

impl Topic {
    fn accepts(&self, event_type: EventType) -> bool {
        match self {
            Topic::All => true,
            Topic::Readings => event_type == EventType::Reading,
            Topic::Thresholds => event_type == EventType::Threshold,
            Topic::Status => matches!(event_type, EventType::Status | EventType::SensorFault),
        }
    }
}

/// Receiving end handed to subscribers
pub struct Subscription {
    rx: Receiver<Event>,
}

impl Subscription {
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued right now
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.rx.iter()
    }
}

struct Subscriber {
    topic: Topic,
    tx: Sender<Event>,
}

/// Counters kept by the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub readings: u64,
    pub threshold_events: u64,
    pub actuations: u64,
    pub faults: u64,
}

/// Central dispatcher.
///
/// Each subscriber gets its own unbounded channel, so nothing is dropped
/// while it is alive. Publishing holds the subscriber lock, which keeps the
/// per-loop publish order intact for every subscriber.
pub struct EventDispatcher {
    subscribers: Mutex<Vec<Subscriber>>,
    event_counter: AtomicU64,
    readings: AtomicU64,
    threshold_events: AtomicU64,
    actuations: AtomicU64,
    faults: AtomicU64,
    last_breach: Mutex<Option<DateTime<Utc>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            event_counter: AtomicU64::new(0),
            readings: AtomicU64::new(0),
            threshold_events: AtomicU64::new(0),
            actuations: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            last_breach: Mutex::new(None),
        }
    }

    pub fn publish_reading(&self, reading: Reading) {
        self.readings.fetch_add(1, Ordering::Relaxed);
        self.publish(EventPayload::Reading(reading));
    }

    pub fn publish_threshold(&self, event: ThresholdEvent) {
        self.threshold_events.fetch_add(1, Ordering::Relaxed);
        *self.last_breach.lock() = Some(Utc::now());
        self.publish(EventPayload::Threshold(event));
    }

    pub fn publish_actuation(&self, role: DeviceRole, device: &str, state: DeviceState) {
        self.actuations.fetch_add(1, Ordering::Relaxed);
        self.publish(EventPayload::Actuation {
            role,
            device: device.to_string(),
            state,
        });
    }

    pub fn publish_status(&self, level: StatusLevel, message: &str) {
        self.publish(EventPayload::Status {
            level,
            message: message.to_string(),
        });
    }

    pub fn publish_fault(&self, family: SensorFamily, sensor: &str, message: &str) {
        self.faults.fetch_add(1, Ordering::Relaxed);
        self.publish(EventPayload::SensorFault {
            family,
            sensor: sensor.to_string(),
            message: message.to_string(),
        });
    }

    fn publish(&self, payload: EventPayload) {
        let event_type = payload.event_type();
        let mut subscribers = self.subscribers.lock();
        let event = Event {
            id: self.event_counter.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            payload,
        };
        subscribers.retain(|sub| {
            if !sub.topic.accepts(event_type) {
                return true;
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(Subscriber { topic, tx });
        Subscription { rx }
    }

    pub fn subscribe_events(&self) -> Subscription {
        self.subscribe(Topic::All)
    }

    pub fn subscribe_readings(&self) -> Subscription {
        self.subscribe(Topic::Readings)
    }

    pub fn subscribe_thresholds(&self) -> Subscription {
        self.subscribe(Topic::Thresholds)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            readings: self.readings.load(Ordering::Relaxed),
            threshold_events: self.threshold_events.load(Ordering::Relaxed),
            actuations: self.actuations.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    pub fn last_breach(&self) -> Option<DateTime<Utc>> {
        *self.last_breach.lock()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
