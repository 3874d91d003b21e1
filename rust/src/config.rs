//! Configuration types for a simulation run.

use chrono::Duration;
use pyo3::prelude::*;

use crate::error::SimError;
use crate::time::Time;

/// Horizon and logging settings for a [`crate::Simulation`].
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// First simulated instant; every component is brought up to it on initialization
    pub start_time: Time,
    /// Last simulated instant that may still be processed (inclusive)
    pub end_time: Time,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: Time::zero(),
            end_time: Time::zero(),
            verbosity: 0,
        }
    }
}

impl SimulationConfig {
    pub fn with_horizon(start_time: Time, end_time: Time) -> Self {
        Self {
            start_time,
            end_time,
            ..Self::default()
        }
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Check that the horizon is usable.
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.start_time.is_finite() {
            return Err(SimError::Configuration(format!(
                "start time must be finite, got {}",
                self.start_time
            )));
        }
        if self.end_time < self.start_time {
            return Err(SimError::Configuration(format!(
                "end time {} is before start time {}",
                self.end_time, self.start_time
            )));
        }
        Ok(())
    }
}

/// Largest magnitude, in seconds, that converts to a finite duration.
const MAX_SECONDS: f64 = 9.0e15;

/// Convert seconds to a millisecond-resolution duration.
pub(crate) fn duration_from_secs_f64(secs: f64) -> Result<Duration, SimError> {
    if !secs.is_finite() || secs.abs() > MAX_SECONDS {
        return Err(SimError::Configuration(format!(
            "{} seconds is out of range",
            secs
        )));
    }
    Ok(Duration::milliseconds((secs * 1000.0).round() as i64))
}

/// Convert seconds to a time; infinities map to the unbounded times.
pub(crate) fn time_from_secs_f64(secs: f64) -> Result<Time, SimError> {
    if secs == f64::INFINITY {
        Ok(Time::PosInfinity)
    } else if secs == f64::NEG_INFINITY {
        Ok(Time::NegInfinity)
    } else {
        duration_from_secs_f64(secs).map(Time::At)
    }
}

#[pymethods]
impl SimulationConfig {
    #[new]
    #[pyo3(signature = (start_seconds=0.0, end_seconds=0.0, verbosity=0))]
    fn new(start_seconds: f64, end_seconds: f64, verbosity: u8) -> PyResult<Self> {
        Ok(Self {
            start_time: time_from_secs_f64(start_seconds)?,
            end_time: time_from_secs_f64(end_seconds)?,
            verbosity,
        })
    }

    #[getter]
    fn start_seconds(&self) -> Option<f64> {
        self.start_time.as_secs_f64()
    }

    #[getter]
    fn end_seconds(&self) -> Option<f64> {
        self.end_time.as_secs_f64()
    }

    fn __repr__(&self) -> String {
        format!(
            "SimulationConfig(start={}, end={}, verbosity={})",
            self.start_time, self.end_time, self.verbosity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.start_time, Time::zero());
        assert_eq!(config.end_time, Time::zero());
        assert_eq!(config.verbosity, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_horizon() {
        let backwards = SimulationConfig::with_horizon(Time::from_secs(5), Time::from_secs(1));
        assert!(matches!(
            backwards.validate(),
            Err(SimError::Configuration(_))
        ));

        let unbounded_start = SimulationConfig::with_horizon(Time::NegInfinity, Time::zero());
        assert!(unbounded_start.validate().is_err());

        let open_ended = SimulationConfig::with_horizon(Time::zero(), Time::PosInfinity).verbosity(2);
        assert!(open_ended.validate().is_ok());
        assert_eq!(open_ended.verbosity, 2);
    }

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(time_from_secs_f64(1.5), Ok(Time::from_millis(1500)));
        assert_eq!(time_from_secs_f64(f64::INFINITY), Ok(Time::PosInfinity));
        assert_eq!(time_from_secs_f64(f64::NEG_INFINITY), Ok(Time::NegInfinity));
        assert_eq!(duration_from_secs_f64(1.5), Ok(Duration::milliseconds(1500)));
        assert_eq!(duration_from_secs_f64(0.0), Ok(Duration::zero()));
    }

    #[test]
    fn test_out_of_range_seconds_are_rejected() {
        for secs in [-1e300, 1e300, f64::NAN] {
            assert!(matches!(
                time_from_secs_f64(secs),
                Err(SimError::Configuration(_))
            ));
        }
        assert!(duration_from_secs_f64(f64::INFINITY).is_err());
        assert!(duration_from_secs_f64(-9.1e15).is_err());
        assert!(duration_from_secs_f64(-9.0e15).is_ok());
    }
}
