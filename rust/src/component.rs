//! Simulation components and their shared lifecycle.
//!
//! A concrete component embeds a [`ComponentCore`] (identity, rank, time,
//! dependencies and the five standard events) and implements [`SimComponent`]
//! for its hooks. The registry stores components as `Rc<RefCell<_>>`; the
//! lifecycle driver ([`ComponentRef::update`]) only borrows a component while
//! its hooks run, never while its events fire, so event actions are free to
//! inspect the component that triggered them.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::SimError;
use crate::event::Event;
use crate::time::Time;

/// Index of a component slot within its registry.
///
/// This is a relation, not ownership: it stays valid when the component in the
/// slot is replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The five events every component exposes.
#[derive(Clone, Debug)]
pub struct ComponentEvents {
    /// Triggered immediately prior to an update.
    pub will_update: Event,
    /// Triggered immediately after an update.
    pub did_update: Event,
    /// Triggered when the component must be re-evaluated at the current time.
    pub needs_update: Event,
    /// Triggered before the first update at a new time.
    pub will_start_new_timestep: Event,
    /// Triggered once the instant the component is at has reached a fixed point.
    pub did_complete_timestep: Event,
}

impl ComponentEvents {
    fn new(id: &str) -> Self {
        Self {
            will_update: Event::new(format!("{} will update", id)),
            did_update: Event::new(format!("{} did update", id)),
            needs_update: Event::new(format!("{} needs update", id)),
            will_start_new_timestep: Event::new(format!("{} will start new timestep", id)),
            did_complete_timestep: Event::new(format!("{} did complete timestep", id)),
        }
    }
}

/// State shared by every component.
#[derive(Debug)]
pub struct ComponentCore {
    id: String,
    rank: Option<u32>,
    time: Time,
    dependencies: Vec<ComponentId>,
    events: ComponentEvents,
}

impl ComponentCore {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let events = ComponentEvents::new(&id);
        Self {
            id,
            rank: None,
            time: Time::NegInfinity,
            dependencies: Vec::new(),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Evaluation rank. `None` until the registry has been validated.
    pub fn rank(&self) -> Option<u32> {
        self.rank
    }

    pub(crate) fn set_rank(&mut self, rank: u32) {
        self.rank = Some(rank);
    }

    /// The time to which this component is up to date.
    pub fn time(&self) -> Time {
        self.time
    }

    pub fn dependencies(&self) -> &[ComponentId] {
        &self.dependencies
    }

    /// Components on which I depend will update before me at any shared instant.
    pub fn depends_on(&mut self, other: ComponentId) {
        if !self.dependencies.contains(&other) {
            self.dependencies.push(other);
        }
    }

    pub fn events(&self) -> &ComponentEvents {
        &self.events
    }

    pub fn will_update(&self) -> &Event {
        &self.events.will_update
    }

    pub fn did_update(&self) -> &Event {
        &self.events.did_update
    }

    pub fn needs_update(&self) -> &Event {
        &self.events.needs_update
    }

    pub fn will_start_new_timestep(&self) -> &Event {
        &self.events.will_start_new_timestep
    }

    pub fn did_complete_timestep(&self) -> &Event {
        &self.events.did_complete_timestep
    }
}

/// Behaviour a component plugs into the lifecycle.
///
/// Only `core` and `core_mut` are required. The hooks are called by the
/// scheduler through [`ComponentRef`]; components should not call them
/// directly.
pub trait SimComponent: Any {
    fn core(&self) -> &ComponentCore;

    fn core_mut(&mut self) -> &mut ComponentCore;

    /// Short type label used in logs and lookup errors.
    fn component_type(&self) -> &'static str {
        "sim_component"
    }

    /// Latest time at which the current state stays valid without a
    /// `needs_update`. Must be strictly later than `core().time()`.
    fn valid_until(&self) -> Time {
        Time::PosInfinity
    }

    /// Reset state. Time is already at negative infinity.
    fn initialize_state(&mut self) {}

    /// Bring state from `previous` up to `target`.
    ///
    /// `previous` is `Time::NegInfinity` on the first update; there is no prior
    /// state to integrate from.
    fn update_state(&mut self, _previous: Time, _target: Time) {}
}

/// Type-erased shared handle to a registered component.
#[derive(Clone)]
pub struct ComponentRef(Rc<RefCell<dyn SimComponent>>);

impl ComponentRef {
    pub(crate) fn new<T: SimComponent>(cell: Rc<RefCell<T>>) -> Self {
        ComponentRef(cell)
    }

    pub fn borrow(&self) -> Ref<'_, dyn SimComponent> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn SimComponent> {
        self.0.borrow_mut()
    }

    /// Non-owning handle, for event actions that need to look back at the component.
    pub fn downgrade(&self) -> WeakComponentRef {
        WeakComponentRef(Rc::downgrade(&self.0))
    }

    pub fn id(&self) -> String {
        self.0.borrow().core().id().to_string()
    }

    pub fn rank(&self) -> Option<u32> {
        self.0.borrow().core().rank()
    }

    pub fn time(&self) -> Time {
        self.0.borrow().core().time()
    }

    pub fn valid_until(&self) -> Time {
        self.0.borrow().valid_until()
    }

    pub fn component_type(&self) -> &'static str {
        self.0.borrow().component_type()
    }

    /// Cloned event handles; triggering them needs no borrow of the component.
    pub fn events(&self) -> ComponentEvents {
        self.0.borrow().core().events().clone()
    }

    /// Reset time to negative infinity and run `initialize_state`.
    pub fn initialize(&self) {
        let mut component = self.0.borrow_mut();
        component.core_mut().time = Time::NegInfinity;
        component.initialize_state();
    }

    /// Bring the component up to `target`.
    pub fn update(&self, target: Time) -> Result<(), SimError> {
        let (previous, events) = {
            let component = self.0.borrow();
            let core = component.core();
            if target < core.time() {
                return Err(SimError::InvalidTimeOrder {
                    id: core.id().to_string(),
                    from: core.time(),
                    to: target,
                });
            }
            (core.time(), core.events().clone())
        };

        if previous < target {
            events.will_start_new_timestep.trigger();
        }
        events.will_update.trigger();
        {
            let mut component = self.0.borrow_mut();
            component.update_state(previous, target);
            component.core_mut().time = target;
        }
        events.did_update.trigger();
        Ok(())
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(c) => f
                .debug_struct("ComponentRef")
                .field("id", &c.core().id())
                .field("type", &c.component_type())
                .field("rank", &c.core().rank())
                .field("time", &c.core().time())
                .finish(),
            Err(_) => f.write_str("ComponentRef(<borrowed>)"),
        }
    }
}

#[derive(Clone)]
pub struct WeakComponentRef(Weak<RefCell<dyn SimComponent>>);

impl WeakComponentRef {
    pub fn upgrade(&self) -> Option<ComponentRef> {
        self.0.upgrade().map(ComponentRef)
    }
}

/// Statically typed handle to a registered component.
pub struct Handle<T: SimComponent> {
    id: ComponentId,
    cell: Rc<RefCell<T>>,
}

impl<T: SimComponent> Handle<T> {
    pub(crate) fn new(id: ComponentId, cell: Rc<RefCell<T>>) -> Self {
        Self { id, cell }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    /// Mutable access for setters. Must not be held across scheduler calls.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }

    pub fn component(&self) -> ComponentRef {
        ComponentRef::new(self.cell.clone())
    }
}

impl<T: SimComponent> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: self.cell.clone(),
        }
    }
}

impl<T: SimComponent> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("id", &self.id).finish()
    }
}
