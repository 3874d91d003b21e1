//! A component that updates on a regular tick.

use chrono::Duration;

use crate::component::{ComponentCore, SimComponent};
use crate::error::SimError;
use crate::time::Time;

/// Updates every `period`, on a grid anchored at its first update.
///
/// Contingent updates between beats leave the grid alone: the next beat only
/// moves once the component has been brought up to it.
#[derive(Debug)]
pub struct Heartbeat {
    core: ComponentCore,
    period: Duration,
    next_beat: Time,
}

impl Heartbeat {
    pub fn new(id: impl Into<String>, period: Duration) -> Result<Self, SimError> {
        let core = ComponentCore::new(id);
        if period <= Duration::zero() {
            return Err(SimError::Configuration(format!(
                "Heartbeat {} needs a positive period",
                core.id()
            )));
        }
        Ok(Self {
            core,
            period,
            next_beat: Time::NegInfinity,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the period. Takes effect from the next beat onwards.
    pub fn set_period(&mut self, period: Duration) -> Result<(), SimError> {
        if period <= Duration::zero() {
            return Err(SimError::Configuration(format!(
                "Heartbeat {} needs a positive period",
                self.core.id()
            )));
        }
        self.period = period;
        Ok(())
    }

    pub fn next_beat(&self) -> Time {
        self.next_beat
    }

    /// First beat on the grid strictly after `target`.
    fn beat_after(&self, target: Time) -> Time {
        let (Time::At(next), Time::At(t)) = (self.next_beat, target) else {
            return target + self.period;
        };
        let skip = t
            .checked_sub(&next)
            .and_then(|behind| behind.num_nanoseconds())
            .zip(self.period.num_nanoseconds())
            .and_then(|(behind, period)| (behind / period).checked_add(1)?.checked_mul(period))
            .map(Duration::nanoseconds);
        match skip.and_then(|skip| next.checked_add(&skip)) {
            Some(beat) => Time::At(beat),
            // Beyond nanosecond range the grid is dropped.
            None => target + self.period,
        }
    }
}

impl SimComponent for Heartbeat {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn component_type(&self) -> &'static str {
        "heartbeat"
    }

    fn valid_until(&self) -> Time {
        self.next_beat
    }

    fn initialize_state(&mut self) {
        self.next_beat = Time::NegInfinity;
    }

    fn update_state(&mut self, _previous: Time, target: Time) {
        if !self.next_beat.is_finite() {
            self.next_beat = target + self.period;
            return;
        }
        if self.next_beat <= target {
            self.next_beat = self.beat_after(target);
        }
    }
}
