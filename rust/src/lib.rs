//! Rust core of the gridsim discrete-event simulation kernel.
//!
//! Components declare dependencies on each other, are ranked so that every
//! component is evaluated after what it depends on, and are advanced through
//! simulated time by a [`Simulation`] that settles each instant before the
//! clock moves on.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDateTime;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

pub mod component;
mod config;
mod error;
pub mod event;
pub mod heartbeat;
pub mod logging;
pub mod registry;
pub mod simulation;
pub mod time;
pub mod timeseries;

pub use component::{
    ComponentCore, ComponentEvents, ComponentId, ComponentRef, Handle, SimComponent,
    WeakComponentRef,
};
pub use config::SimulationConfig;
use config::{duration_from_secs_f64, time_from_secs_f64};
pub use error::SimError;
pub use event::{ActionHandle, Event, WeakEvent};
pub use heartbeat::Heartbeat;
pub use registry::{compute_ranks, CycleError, Registry};
pub use simulation::{Simulation, SimulationState};
pub use time::Time;
pub use timeseries::{
    ConstTimeSeries, FunctionTimeSeries, LerpTimeSeries, StepwiseTimeSeries, TimeSeries,
    TimeSeriesStore,
};

impl From<SimError> for PyErr {
    fn from(err: SimError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Rank components given by name.
///
/// Every name that appears, as a key or as a dependency, gets a rank.
fn ranks_by_name(
    dependencies: &HashMap<String, Vec<String>>,
) -> Result<HashMap<String, u32>, SimError> {
    let names: Vec<&String> = dependencies
        .iter()
        .flat_map(|(id, deps)| std::iter::once(id).chain(deps.iter()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: HashMap<&String, usize> = names.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    let mut graph = vec![Vec::new(); names.len()];
    for (id, deps) in dependencies {
        graph[index[id]].extend(deps.iter().map(|d| index[d]));
    }

    let ranks = compute_ranks(&graph).map_err(|err| {
        SimError::CyclicDependency(err.unordered.iter().map(|&i| names[i].clone()).collect())
    })?;
    Ok(names.into_iter().cloned().zip(ranks).collect())
}

/// Compute dependency ranks for a graph of named components.
///
/// # Arguments
/// * `dependencies` - Dict mapping component ID to the IDs it depends on
///
/// # Returns
/// * Dict mapping every component ID to its rank
///
/// # Raises
/// * ValueError if the dependencies are circular
#[pyfunction]
#[pyo3(name = "compute_ranks")]
fn py_compute_ranks(dependencies: HashMap<String, Vec<String>>) -> PyResult<HashMap<String, u32>> {
    Ok(ranks_by_name(&dependencies)?)
}

/// A simulation of heartbeat components, driven from Python.
#[pyclass(name = "Simulation", unsendable)]
pub struct PySimulation {
    sim: Simulation,
    updates: Rc<RefCell<Vec<(String, Time)>>>,
}

impl PySimulation {
    fn record_updates(&self, component: &ComponentRef) {
        let weak = component.downgrade();
        let updates = self.updates.clone();
        component.events().did_update.add_action(
            move || {
                if let Some(c) = weak.upgrade() {
                    updates.borrow_mut().push((c.id(), c.time()));
                }
            },
            "Record update",
        );
    }
}

#[pymethods]
impl PySimulation {
    #[new]
    #[pyo3(signature = (start_seconds=0.0, end_seconds=0.0, verbosity=0))]
    fn new(start_seconds: f64, end_seconds: f64, verbosity: u8) -> PyResult<Self> {
        let config = SimulationConfig::with_horizon(
            time_from_secs_f64(start_seconds)?,
            time_from_secs_f64(end_seconds)?,
        )
        .verbosity(verbosity);
        Ok(Self::from_config(config))
    }

    #[staticmethod]
    fn from_config(config: SimulationConfig) -> Self {
        Self {
            sim: Simulation::new(Registry::new(), config),
            updates: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Add a component that updates every `period_seconds`.
    fn add_heartbeat(&mut self, id: &str, period_seconds: f64) -> PyResult<()> {
        let heartbeat = Heartbeat::new(id, duration_from_secs_f64(period_seconds)?)?;
        let handle = self.sim.model_mut().insert(heartbeat)?;
        self.record_updates(&handle.component());
        Ok(())
    }

    /// Make `dependent` update after `dependency` at every shared instant.
    ///
    /// With `propagate_updates`, every update of `dependency` also triggers a
    /// contingent update of `dependent`.
    #[pyo3(signature = (dependent, dependency, propagate_updates=false))]
    fn depends_on(
        &mut self,
        dependent: &str,
        dependency: &str,
        propagate_updates: bool,
    ) -> PyResult<()> {
        let model = self.sim.model_mut();
        let dependent = model.id_of(dependent)?;
        let dependency = model.id_of(dependency)?;
        if propagate_updates {
            model.subscribe(dependent, dependency)?;
        } else {
            model.depends_on(dependent, dependency)?;
        }
        Ok(())
    }

    fn validate(&mut self) -> PyResult<()> {
        Ok(self.sim.validate()?)
    }

    /// Share a tabulated series of (seconds, value) points under `id`.
    ///
    /// `interpolation` is "step" (hold each value) or "linear".
    #[pyo3(signature = (id, points, interpolation="step"))]
    fn add_time_series(
        &mut self,
        id: &str,
        points: Vec<(f64, f64)>,
        interpolation: &str,
    ) -> PyResult<()> {
        match interpolation {
            "step" => {
                let mut series = StepwiseTimeSeries::new();
                for (secs, value) in points {
                    series.add_point(time_from_secs_f64(secs)?, value);
                }
                self.sim.acquire_time_series(id, series);
            }
            "linear" => {
                let mut series = LerpTimeSeries::new();
                for (secs, value) in points {
                    series.add_point(time_from_secs_f64(secs)?, value);
                }
                self.sim.acquire_time_series(id, series);
            }
            other => {
                return Err(SimError::Configuration(format!(
                    "Unknown interpolation {:?} for time series {}",
                    other, id
                ))
                .into())
            }
        }
        Ok(())
    }

    /// Value of a numeric time series at `seconds`.
    fn time_series_value(&self, id: &str, seconds: f64) -> PyResult<Option<f64>> {
        let series = self.sim.time_series::<f64>(id)?;
        Ok(series.value(time_from_secs_f64(seconds)?))
    }

    fn initialize(&mut self) -> PyResult<()> {
        Ok(self.sim.initialize()?)
    }

    fn do_next_update(&mut self) -> PyResult<bool> {
        Ok(self.sim.do_next_update()?)
    }

    fn do_timestep(&mut self) -> PyResult<bool> {
        Ok(self.sim.do_timestep()?)
    }

    /// Run to the end time, returning the number of completed timesteps.
    fn run(&mut self) -> PyResult<usize> {
        Ok(self.sim.run()?)
    }

    fn is_finished(&self) -> bool {
        self.sim.is_finished()
    }

    /// Current time in seconds, or None before the first update.
    #[getter]
    fn current_time(&self) -> Option<f64> {
        self.sim.current_time().as_secs_f64()
    }

    fn current_datetime(&self, epoch: NaiveDateTime) -> Option<NaiveDateTime> {
        self.sim.current_time().to_datetime(epoch)
    }

    #[getter]
    fn state(&self) -> String {
        format!("{:?}", self.sim.state()).to_lowercase()
    }

    #[getter]
    fn component_count(&self) -> usize {
        self.sim.model().len()
    }

    /// Rank of a component, or None if the model has not been validated.
    fn rank(&self, id: &str) -> PyResult<Option<u32>> {
        Ok(self.sim.model().component(id)?.rank())
    }

    /// Every component update so far, as (id, seconds) in execution order.
    fn update_log(&self) -> Vec<(String, f64)> {
        self.updates
            .borrow()
            .iter()
            .filter_map(|(id, t)| t.as_secs_f64().map(|s| (id.clone(), s)))
            .collect()
    }

    fn clear_update_log(&mut self) {
        self.updates.borrow_mut().clear();
    }

    fn __repr__(&self) -> String {
        format!(
            "Simulation(components={}, state={:?}, time={}, end={})",
            self.sim.model().len(),
            self.sim.state(),
            self.sim.current_time(),
            self.sim.end_time()
        )
    }
}

/// The gridsim.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Config types
    m.add_class::<SimulationConfig>()?;

    // Simulation
    m.add_class::<PySimulation>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(py_compute_ranks, m)?)?;

    Ok(())
}
