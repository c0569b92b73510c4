//! Sensor module for the GOAP agent.
//!
//! Sensors read the live world. Each one returns an [`Observation`]: a flat
//! set of raw facts plus the expiry of any pending cooldown. The execution
//! loop turns raw facts into planning facts through the state calculator.
//!
//! This module provides:
//! - [`Observation`]: the data returned by one sensing pass
//! - [`SensorFn`]: trait for implementing custom sensors
//! - [`Sensor`]: a named `SensorFn` that remembers its last observation
//! - [`Sensors`]: an ordered collection whose readings are merged
//! - [`FnSensor`]: helper for creating sensors from closures
//!
//! # Example
//!
//! ```
//! use goap_agent::sensor::{FnSensor, Observation, SensorFn, Sensors};
//!
//! let mut sensors = Sensors::new();
//! sensors
//!     .add("character", FnSensor::new(|| {
//!         Ok(Observation::new([("hp", 80), ("max_hp", 100)].into_iter().collect()))
//!     }))
//!     .unwrap();
//!
//! let observation = sensors.sense().unwrap();
//! assert_eq!(observation.data.get("hp"), Some(&80.into()));
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::State;
use crate::{GoapError, Result};

/// Raw facts read from the world, plus the current cooldown if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub data: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_expires: Option<DateTime<Utc>>,
}

impl Observation {
    pub fn new(data: State) -> Self {
        Self {
            data,
            cooldown_expires: None,
        }
    }

    pub fn with_cooldown(mut self, expires: DateTime<Utc>) -> Self {
        self.cooldown_expires = Some(expires);
        self
    }

    /// Overlays `other` on top of this observation.
    ///
    /// Facts from `other` win, and so does the later of the two cooldowns.
    pub fn merge(&mut self, other: Observation) {
        self.data.apply_effects(&other.data);
        self.cooldown_expires = match (self.cooldown_expires, other.cooldown_expires) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Trait for sensor implementations.
///
/// # Examples
///
/// ```
/// use goap_agent::sensor::{Observation, SensorFn};
/// use goap_agent::{Result, State};
///
/// struct BankSensor;
///
/// impl SensorFn for BankSensor {
///     fn sense(&self) -> Result<Observation> {
///         let mut data = State::new();
///         data.set("bank_gold", 1200);
///         Ok(Observation::new(data))
///     }
/// }
/// ```
pub trait SensorFn: Send + Sync {
    fn sense(&self) -> Result<Observation>;
}

/// A named sensor that keeps its most recent observation.
#[derive(Clone)]
pub struct Sensor {
    name: String,
    func: Arc<dyn SensorFn>,
    last: Arc<Mutex<Option<Observation>>>,
}

impl Sensor {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: SensorFn + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the sensor and remembers what it saw.
    pub fn sense(&self) -> Result<Observation> {
        let observation = self.func.sense()?;
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(observation.clone());
        Ok(observation)
    }

    /// The observation from the last successful run, if any.
    pub fn last_observation(&self) -> Option<Observation> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sensor({})", self.name)
    }
}

/// An ordered collection of uniquely named sensors.
#[derive(Clone, Default)]
pub struct Sensors {
    sensors: Vec<Sensor>,
}

impl Sensors {
    pub fn new() -> Self {
        Self {
            sensors: Vec::new(),
        }
    }

    /// Adds a sensor; fails if the name is already taken.
    pub fn add<F>(&mut self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: SensorFn + 'static,
    {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(GoapError::Config(format!(
                "sensor '{}' is already registered",
                name
            )));
        }
        self.sensors.push(Sensor::new(name, func));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.name() == name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.sensors.len();
        self.sensors.retain(|s| s.name() != name);
        self.sensors.len() != before
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter()
    }
}

impl SensorFn for Sensors {
    /// Runs every sensor in order and merges the readings; later sensors
    /// overwrite facts reported by earlier ones.
    fn sense(&self) -> Result<Observation> {
        let mut merged = Observation::default();
        for sensor in &self.sensors {
            log::debug!("Reading sensor '{}'", sensor.name());
            merged.merge(sensor.sense()?);
        }
        Ok(merged)
    }
}

impl fmt::Debug for Sensors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.sensors.iter()).finish()
    }
}

/// A sensor built from a closure.
pub struct FnSensor<F> {
    func: F,
}

impl<F> FnSensor<F>
where
    F: Fn() -> Result<Observation> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> SensorFn for FnSensor<F>
where
    F: Fn() -> Result<Observation> + Send + Sync,
{
    fn sense(&self) -> Result<Observation> {
        (self.func)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestSensor(i64);

    impl SensorFn for TestSensor {
        fn sense(&self) -> Result<Observation> {
            let mut data = State::new();
            data.set("hp", self.0);
            Ok(Observation::new(data))
        }
    }

    #[test]
    fn test_sensor_remembers_last_observation() {
        let sensor = Sensor::new("character", TestSensor(42));
        assert!(sensor.last_observation().is_none());
        let observation = sensor.sense().unwrap();
        assert_eq!(observation.data.get("hp"), Some(&42.into()));
        assert_eq!(sensor.last_observation(), Some(observation));
    }

    #[test]
    fn test_sensors_collection() {
        let mut sensors = Sensors::new();
        sensors.add("test1", TestSensor(1)).unwrap();
        assert!(sensors.add("test1", TestSensor(2)).is_err());
        sensors.add("test2", TestSensor(2)).unwrap();

        assert_eq!(sensors.len(), 2);
        assert!(sensors.get("test1").is_some());
        assert!(sensors.get("nonexistent").is_none());

        assert!(sensors.remove("test1"));
        assert_eq!(sensors.len(), 1);
        assert!(!sensors.remove("nonexistent"));
    }

    #[test]
    fn test_later_sensors_win_and_latest_cooldown_kept() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(30);

        let mut sensors = Sensors::new();
        sensors
            .add("a", FnSensor::new(move || {
                let data: State = [("hp", 1), ("gold", 5)].into_iter().collect();
                Ok(Observation::new(data).with_cooldown(later))
            }))
            .unwrap();
        sensors
            .add("b", FnSensor::new(move || {
                let data: State = [("hp", 9)].into_iter().collect();
                Ok(Observation::new(data).with_cooldown(now))
            }))
            .unwrap();

        let merged = sensors.sense().unwrap();
        assert_eq!(merged.data.get("hp"), Some(&9.into()));
        assert_eq!(merged.data.get("gold"), Some(&5.into()));
        assert_eq!(merged.cooldown_expires, Some(later));
    }

    #[test]
    fn test_failing_sensor_propagates() {
        let mut sensors = Sensors::new();
        sensors
            .add("flaky", FnSensor::new(|| Err(GoapError::Transient("socket closed".into()))))
            .unwrap();
        assert!(sensors.sense().unwrap_err().is_transient());
    }
}
