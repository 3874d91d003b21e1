//! Error types for model construction and simulation.

use thiserror::Error;

use crate::time::Time;

/// Errors that can occur while building, validating or running a simulation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Component {0} occurs more than once in the model")]
    DuplicateComponent(String),
    #[error("Circular dependency detected among components: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),
    #[error("Component {id} cannot move backwards in time from {from} to {to}")]
    InvalidTimeOrder { id: String, from: Time, to: Time },
    #[error("Component not found: {0}")]
    ComponentNotFound(String),
    #[error("Component {id} is a {actual}, not the requested type")]
    ComponentTypeMismatch { id: String, actual: &'static str },
    #[error("Time series not found: {0}")]
    TimeSeriesNotFound(String),
    #[error("Time series {id} has values of type {actual}, not the requested type")]
    TimeSeriesTypeMismatch { id: String, actual: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SimError::CyclicDependency(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            err.to_string(),
            "Circular dependency detected among components: a, b"
        );

        let err = SimError::InvalidTimeOrder {
            id: "bus_1".to_string(),
            from: Time::from_secs(5),
            to: Time::from_secs(3),
        };
        assert_eq!(
            err.to_string(),
            "Component bus_1 cannot move backwards in time from 5s to 3s"
        );

        let err = SimError::TimeSeriesTypeMismatch {
            id: "price".to_string(),
            actual: "f64",
        };
        assert_eq!(
            err.to_string(),
            "Time series price has values of type f64, not the requested type"
        );
    }
}
