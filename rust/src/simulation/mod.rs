//! Simulation driver.
//!
//! Owns a validated [`crate::Registry`] and advances its components through
//! time, settling each instant to a fixed point before the clock moves on.

mod core;
mod queues;

pub use self::core::{Simulation, SimulationState};
