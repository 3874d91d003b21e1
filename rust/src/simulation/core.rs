//! The simulation driver.
//!
//! Work comes from two queues. Scheduled updates are clock driven: each
//! component is due again at its `valid_until`. Contingent updates are
//! requested through a component's `needs_update` event and are always taken
//! at the current time, before the clock may advance. Both queues order
//! components by (rank, id), so within an instant every dependency is brought
//! up to date before the components that depend on it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::ComponentRef;
use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::event::{ActionHandle, Event};
use crate::registry::Registry;
use crate::time::Time;
use crate::timeseries::{TimeSeries, TimeSeriesStore};
use crate::{log_changes, log_checks, log_debug};

use super::queues::{ContingentUpdates, ScheduledUpdates};

/// Lifecycle of a [`Simulation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Uninitialized,
    Initialized,
    Running,
    Finished,
}

/// Drives the components of a [`Registry`] through simulated time.
pub struct Simulation {
    model: Registry,
    config: SimulationConfig,
    state: SimulationState,
    current_time: Time,
    scheduled: ScheduledUpdates,
    contingent: Rc<RefCell<ContingentUpdates>>,
    /// `needs_update` actions installed by `initialize`.
    subscriptions: Vec<(Event, ActionHandle)>,
    timestep_will_start: Event,
    timestep_did_complete: Event,
    time_series: TimeSeriesStore,
}

impl Simulation {
    pub fn new(mut model: Registry, config: SimulationConfig) -> Self {
        model.set_verbosity(config.verbosity);
        Self {
            model,
            config,
            state: SimulationState::Uninitialized,
            current_time: Time::NegInfinity,
            scheduled: ScheduledUpdates::default(),
            contingent: Rc::new(RefCell::new(ContingentUpdates::default())),
            subscriptions: Vec::new(),
            timestep_will_start: Event::new("Simulation timestep will start"),
            timestep_did_complete: Event::new("Simulation timestep did complete"),
            time_series: TimeSeriesStore::new(),
        }
    }

    pub fn model(&self) -> &Registry {
        &self.model
    }

    /// Mutable access to the model. The simulation must be initialized again
    /// before it can continue.
    pub fn model_mut(&mut self) -> &mut Registry {
        self.state = SimulationState::Uninitialized;
        &mut self.model
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn current_time(&self) -> Time {
        self.current_time
    }

    pub fn start_time(&self) -> Time {
        self.config.start_time
    }

    pub fn end_time(&self) -> Time {
        self.config.end_time
    }

    /// Takes effect on the next `initialize`.
    pub fn set_start_time(&mut self, start_time: Time) {
        self.config.start_time = start_time;
        self.state = SimulationState::Uninitialized;
    }

    /// Move the horizon. A finished run resumes if work remains before the new end.
    pub fn set_end_time(&mut self, end_time: Time) {
        self.config.end_time = end_time;
        if self.state == SimulationState::Finished && !self.is_finished() {
            self.state = SimulationState::Running;
        }
    }

    pub fn set_verbosity(&mut self, verbosity: u8) {
        self.config.verbosity = verbosity;
        self.model.set_verbosity(verbosity);
    }

    /// Triggered at the start of every `do_timestep`.
    pub fn timestep_will_start(&self) -> &Event {
        &self.timestep_will_start
    }

    /// Triggered once every component at the new time has reached a fixed point.
    pub fn timestep_did_complete(&self) -> &Event {
        &self.timestep_did_complete
    }

    /// Share a time series under `id`, replacing any earlier one.
    pub fn acquire_time_series<S>(&mut self, id: impl Into<String>, series: S) -> bool
    where
        S: TimeSeries + 'static,
        S::Value: 'static,
    {
        let id = id.into();
        log_changes!(self.config.verbosity, "Acquiring time series {}", id);
        self.time_series.insert(id, series)
    }

    /// Typed time series lookup.
    pub fn time_series<V: 'static>(
        &self,
        id: &str,
    ) -> Result<Rc<dyn TimeSeries<Value = V>>, SimError> {
        self.time_series.get(id)
    }

    pub fn time_series_store(&self) -> &TimeSeriesStore {
        &self.time_series
    }

    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn contingent_len(&self) -> usize {
        self.contingent.borrow().len()
    }

    pub fn next_scheduled_time(&self) -> Option<Time> {
        self.scheduled.next_time()
    }

    /// Prepare for a run and bring every component up to the start time.
    ///
    /// Validates the model if needed. All components are reset, scheduled at
    /// the start time, and updated there in (rank, id) order.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        self.config.validate()?;
        self.validate()?;
        let v = self.config.verbosity;

        self.unsubscribe();
        self.contingent.borrow_mut().clear();
        self.scheduled = ScheduledUpdates::with_capacity(self.model.len());

        for component in self.model.components() {
            component.initialize();
        }

        for &slot in self.model.evaluation_order() {
            let Some(component) = self.model.component_at(slot) else {
                continue;
            };
            let ordinal = self.model.ordinal(slot);
            let needs_update = component.events().needs_update;
            let queue = Rc::downgrade(&self.contingent);
            let handle = needs_update.add_action(
                move || {
                    if let Some(queue) = queue.upgrade() {
                        queue.borrow_mut().insert(ordinal);
                    }
                },
                "Simulation: add contingent update",
            );
            self.subscriptions.push((needs_update, handle));
            self.scheduled.insert(ordinal, self.config.start_time);
        }

        log_changes!(
            v,
            "Initializing simulation of {} components from {} to {}",
            self.model.len(),
            self.config.start_time,
            self.config.end_time
        );

        self.current_time = self.config.start_time;
        self.state = SimulationState::Initialized;
        self.timestep_will_start.trigger();
        while !self.instant_complete() {
            if !self.do_next_update()? {
                break;
            }
        }
        self.complete_timestep();
        if self.state == SimulationState::Running {
            self.state = SimulationState::Initialized;
        }
        Ok(())
    }

    /// Validate the model if it has changed. A valid model is left alone, so
    /// an initialized simulation stays initialized.
    pub fn validate(&mut self) -> Result<(), SimError> {
        if !self.model.is_valid() {
            self.state = SimulationState::Uninitialized;
            self.model.validate()?;
        }
        Ok(())
    }

    /// Perform one component update.
    ///
    /// Contingent updates are taken at the current time, in (rank, id) order
    /// together with any scheduled updates still due at that time. Otherwise
    /// the earliest scheduled update is taken, advancing the clock. Returns
    /// `false` once nothing remains up to the end time; the clock then rests at
    /// the end time.
    pub fn do_next_update(&mut self) -> Result<bool, SimError> {
        if self.state == SimulationState::Uninitialized {
            return Err(SimError::Configuration(
                "Simulation must be initialized before updating".to_string(),
            ));
        }
        let v = self.config.verbosity;
        log_debug!(
            v,
            "Next update: {} scheduled, {} contingent",
            self.scheduled.len(),
            self.contingent.borrow().len()
        );

        let contingent = self.contingent.borrow().peek();
        if let Some(ordinal) = contingent.filter(|&c| !self.scheduled_now_before(c)) {
            self.contingent.borrow_mut().pop();
            let component = self.component_for(ordinal)?;
            log_checks!(
                v,
                "  Contingent update of {} at {}",
                component.id(),
                self.current_time
            );
            self.scheduled.remove(ordinal);
            component.update(self.current_time)?;
            self.reschedule(ordinal, &component);
            self.mark_running();
            return Ok(true);
        }

        match self.scheduled.peek() {
            Some((time, ordinal)) if time <= self.config.end_time => {
                let component = self.component_for(ordinal)?;
                if time < self.current_time {
                    return Err(SimError::InvalidTimeOrder {
                        id: component.id(),
                        from: self.current_time,
                        to: time,
                    });
                }
                self.scheduled.pop();
                if time > self.current_time {
                    log_changes!(v, "Time: {}", time);
                    self.current_time = time;
                }
                log_checks!(
                    v,
                    "  Scheduled update of {} (rank {:?}) at {}",
                    component.id(),
                    component.rank(),
                    time
                );
                component.update(time)?;
                self.reschedule(ordinal, &component);
                self.mark_running();
                Ok(true)
            }
            _ => {
                let end = self.config.end_time;
                if end.is_finite() && self.current_time < end {
                    self.current_time = end;
                }
                if self.state != SimulationState::Finished {
                    log_changes!(v, "Simulation finished at {}", self.current_time);
                }
                self.state = SimulationState::Finished;
                Ok(false)
            }
        }
    }

    /// Advance to the next instant at which anything happens and settle it.
    ///
    /// Pending contingent work at the current time is drained first. Returns
    /// `false`, with no completion events, when the horizon is reached.
    pub fn do_timestep(&mut self) -> Result<bool, SimError> {
        let start = self.current_time;
        self.timestep_will_start.trigger();
        loop {
            if !self.do_next_update()? {
                return Ok(false);
            }
            if self.current_time > start && self.instant_complete() {
                break;
            }
        }
        self.complete_timestep();
        Ok(true)
    }

    /// Run timesteps until the horizon. Returns the number completed.
    ///
    /// With an infinite end time this only returns once every component is
    /// valid forever.
    pub fn run(&mut self) -> Result<usize, SimError> {
        let mut timesteps = 0;
        while self.do_timestep()? {
            timesteps += 1;
        }
        log_changes!(
            self.config.verbosity,
            "Run complete after {} timesteps",
            timesteps
        );
        Ok(timesteps)
    }

    /// True once the clock is at the end time with no work left at or before it.
    pub fn is_finished(&self) -> bool {
        self.state != SimulationState::Uninitialized
            && self.current_time >= self.config.end_time
            && self.contingent.borrow().is_empty()
            && self
                .scheduled
                .next_time()
                .map_or(true, |t| t > self.config.end_time)
    }

    /// Whether a component ahead of `ordinal` in evaluation order is still due
    /// at the current time.
    fn scheduled_now_before(&self, ordinal: usize) -> bool {
        matches!(
            self.scheduled.peek(),
            Some((time, scheduled)) if time <= self.current_time && scheduled < ordinal
        )
    }

    /// No contingent work and nothing else scheduled at the current time.
    fn instant_complete(&self) -> bool {
        self.contingent.borrow().is_empty()
            && self
                .scheduled
                .next_time()
                .map_or(true, |t| t > self.current_time)
    }

    fn component_for(&self, ordinal: usize) -> Result<ComponentRef, SimError> {
        self.model
            .evaluation_order()
            .get(ordinal)
            .and_then(|&slot| self.model.component_at(slot))
            .cloned()
            .ok_or_else(|| {
                SimError::Configuration(format!("No component at evaluation position {}", ordinal))
            })
    }

    fn reschedule(&mut self, ordinal: usize, component: &ComponentRef) {
        let time = component.time();
        let valid_until = component.valid_until();
        debug_assert!(
            valid_until > time,
            "Component {} is valid until {}, which is not after its time {}",
            component.id(),
            valid_until,
            time
        );
        if valid_until.is_finite() {
            self.scheduled.insert(ordinal, valid_until);
        }
    }

    fn mark_running(&mut self) {
        if matches!(
            self.state,
            SimulationState::Initialized | SimulationState::Finished
        ) {
            self.state = SimulationState::Running;
        }
    }

    fn complete_timestep(&self) {
        log_checks!(
            self.config.verbosity,
            "Timestep complete at {}",
            self.current_time
        );
        for &slot in self.model.evaluation_order() {
            if let Some(component) = self.model.component_at(slot) {
                if component.time() == self.current_time {
                    component.events().did_complete_timestep.trigger();
                }
            }
        }
        self.timestep_did_complete.trigger();
    }

    fn unsubscribe(&mut self) {
        for (event, handle) in self.subscriptions.drain(..) {
            event.remove_action(handle);
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
