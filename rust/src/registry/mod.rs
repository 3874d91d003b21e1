//! Component ownership and dependency ranking.
//!
//! The registry owns every component, hands out typed handles, and on
//! `validate` assigns ranks so that each component is evaluated after
//! everything it depends on.

mod model;
pub mod ranking;

pub use model::Registry;
pub use ranking::{compute_ranks, CycleError};
