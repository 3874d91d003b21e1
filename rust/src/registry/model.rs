//! The model: owner of all components.

use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::component::{ComponentId, ComponentRef, Handle, SimComponent};
use crate::error::SimError;
use crate::{log_changes, log_debug};

use super::ranking::compute_ranks;

struct Slot {
    component: ComponentRef,
    /// Same allocation as `component`, kept for checked downcasts.
    any: Rc<dyn Any>,
}

/// Owns every component of a simulation, in insertion order.
///
/// Components are referenced elsewhere by [`ComponentId`]. `validate` ranks the
/// components and fixes the evaluation order; any structural change afterwards
/// invalidates the model again.
pub struct Registry {
    slots: Vec<Slot>,
    index: FxHashMap<String, ComponentId>,
    /// Components sorted by (rank, id).
    evaluation_order: Vec<ComponentId>,
    /// Position of each component (by slot) in `evaluation_order`.
    ordinals: Vec<usize>,
    is_valid: bool,
    verbosity: u8,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_verbosity(0)
    }

    pub fn with_verbosity(verbosity: u8) -> Self {
        Self {
            slots: Vec::new(),
            index: FxHashMap::default(),
            evaluation_order: Vec::new(),
            ordinals: Vec::new(),
            is_valid: false,
            verbosity,
        }
    }

    pub fn set_verbosity(&mut self, verbosity: u8) {
        self.verbosity = verbosity;
    }

    /// Add a new component. Empty and duplicate ids are rejected.
    pub fn insert<T: SimComponent>(&mut self, component: T) -> Result<Handle<T>, SimError> {
        let id = Self::checked_id(&component)?;
        if self.index.contains_key(&id) {
            return Err(SimError::DuplicateComponent(id));
        }

        let slot_id = ComponentId(self.slots.len() as u32);
        log_changes!(
            self.verbosity,
            "Adding component {} of type {} to model",
            id,
            component.component_type()
        );
        let cell = Rc::new(RefCell::new(component));
        self.slots.push(Slot {
            component: ComponentRef::new(cell.clone()),
            any: cell.clone(),
        });
        self.index.insert(id, slot_id);
        self.is_valid = false;
        Ok(Handle::new(slot_id, cell))
    }

    /// Add a component, replacing any existing component with the same id.
    ///
    /// A replacement keeps the slot, so `ComponentId`s held elsewhere now refer
    /// to the new component. Event subscriptions made on the old component are
    /// not carried over.
    pub fn replace<T: SimComponent>(&mut self, component: T) -> Result<Handle<T>, SimError> {
        let id = Self::checked_id(&component)?;
        let Some(&slot_id) = self.index.get(&id) else {
            return self.insert(component);
        };

        log_changes!(self.verbosity, "Component {} replaced in model", id);
        let cell = Rc::new(RefCell::new(component));
        self.slots[slot_id.index()] = Slot {
            component: ComponentRef::new(cell.clone()),
            any: cell.clone(),
        };
        self.is_valid = false;
        Ok(Handle::new(slot_id, cell))
    }

    fn checked_id<T: SimComponent>(component: &T) -> Result<String, SimError> {
        let id = component.core().id();
        if id.is_empty() {
            return Err(SimError::Configuration(format!(
                "{} component has an empty id",
                component.component_type()
            )));
        }
        Ok(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn id_of(&self, id: &str) -> Result<ComponentId, SimError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| SimError::ComponentNotFound(id.to_string()))
    }

    pub fn component(&self, id: &str) -> Result<ComponentRef, SimError> {
        let slot_id = self.id_of(id)?;
        Ok(self.slots[slot_id.index()].component.clone())
    }

    pub fn component_at(&self, slot_id: ComponentId) -> Option<&ComponentRef> {
        self.slots.get(slot_id.index()).map(|s| &s.component)
    }

    /// Typed lookup by id.
    pub fn get<T: SimComponent>(&self, id: &str) -> Result<Handle<T>, SimError> {
        let slot_id = self.id_of(id)?;
        let slot = &self.slots[slot_id.index()];
        match slot.any.clone().downcast::<RefCell<T>>() {
            Ok(cell) => Ok(Handle::new(slot_id, cell)),
            Err(_) => Err(SimError::ComponentTypeMismatch {
                id: id.to_string(),
                actual: slot.component.component_type(),
            }),
        }
    }

    /// All components, in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentRef> + '_ {
        self.slots.iter().map(|s| &s.component)
    }

    fn check_slot(&self, slot_id: ComponentId) -> Result<&ComponentRef, SimError> {
        self.component_at(slot_id)
            .ok_or_else(|| SimError::ComponentNotFound(slot_id.to_string()))
    }

    /// Declare that `dependent` must be evaluated after `dependency`.
    pub fn depends_on(
        &mut self,
        dependent: ComponentId,
        dependency: ComponentId,
    ) -> Result<(), SimError> {
        self.check_slot(dependency)?;
        self.check_slot(dependent)?
            .borrow_mut()
            .core_mut()
            .depends_on(dependency);
        self.is_valid = false;
        Ok(())
    }

    /// Declare the dependency and re-evaluate `dependent` whenever
    /// `dependency` updates.
    pub fn subscribe(
        &mut self,
        dependent: ComponentId,
        dependency: ComponentId,
    ) -> Result<(), SimError> {
        self.depends_on(dependent, dependency)?;
        let target = self.slots[dependent.index()].component.events().needs_update;
        self.slots[dependency.index()]
            .component
            .events()
            .did_update
            .forward_to(&target);
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Resolve dependencies and assign ranks.
    ///
    /// On failure no rank is published and the model stays invalid.
    pub fn validate(&mut self) -> Result<(), SimError> {
        let n = self.slots.len();
        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(n);
        for slot in &self.slots {
            let component = slot.component.borrow();
            let mut deps = Vec::with_capacity(component.core().dependencies().len());
            for dep in component.core().dependencies() {
                if dep.index() >= n {
                    return Err(SimError::Configuration(format!(
                        "Component {} depends on unknown component {}",
                        component.core().id(),
                        dep
                    )));
                }
                deps.push(dep.index());
            }
            dependencies.push(deps);
        }

        let ranks = compute_ranks(&dependencies).map_err(|err| {
            SimError::CyclicDependency(
                err.unordered
                    .iter()
                    .map(|&i| self.slots[i].component.id())
                    .collect(),
            )
        })?;

        let ids: Vec<String> = self.slots.iter().map(|s| s.component.id()).collect();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| ranks[a].cmp(&ranks[b]).then_with(|| ids[a].cmp(&ids[b])));

        let mut ordinals = vec![0; n];
        for (ordinal, &slot) in order.iter().enumerate() {
            ordinals[slot] = ordinal;
        }
        for (slot, &rank) in self.slots.iter().zip(&ranks) {
            slot.component.borrow_mut().core_mut().set_rank(rank);
        }

        for &slot in &order {
            log_debug!(self.verbosity, "  rank {:>4}  {}", ranks[slot], ids[slot]);
        }
        log_changes!(
            self.verbosity,
            "Model validated: {} components, max rank {}",
            n,
            ranks.iter().max().copied().unwrap_or(0)
        );

        self.evaluation_order = order.into_iter().map(|i| ComponentId(i as u32)).collect();
        self.ordinals = ordinals;
        self.is_valid = true;
        Ok(())
    }

    /// Components sorted by (rank, id). Empty until validated.
    pub fn evaluation_order(&self) -> &[ComponentId] {
        &self.evaluation_order
    }

    /// Position of a component in the evaluation order.
    pub(crate) fn ordinal(&self, slot_id: ComponentId) -> usize {
        self.ordinals[slot_id.index()]
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentCore;
    use crate::heartbeat::Heartbeat;
    use chrono::Duration;

    struct Plain {
        core: ComponentCore,
        value: f64,
    }

    impl Plain {
        fn new(id: &str) -> Self {
            Self {
                core: ComponentCore::new(id),
                value: 0.0,
            }
        }
    }

    impl SimComponent for Plain {
        fn core(&self) -> &ComponentCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ComponentCore {
            &mut self.core
        }

        fn component_type(&self) -> &'static str {
            "plain"
        }
    }

    fn rank_of(model: &Registry, id: &str) -> u32 {
        model.component(id).unwrap().rank().unwrap()
    }

    #[test]
    fn test_insert_rejects_duplicates_and_empty_ids() {
        let mut model = Registry::new();
        model.insert(Plain::new("a")).unwrap();

        assert_eq!(
            model.insert(Plain::new("a")).unwrap_err(),
            SimError::DuplicateComponent("a".to_string())
        );
        assert!(matches!(
            model.insert(Plain::new("")),
            Err(SimError::Configuration(_))
        ));
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_replace_keeps_slot() {
        let mut model = Registry::new();
        let a = model.insert(Plain::new("a")).unwrap();
        let b = model.insert(Plain::new("b")).unwrap();
        model.depends_on(b.id(), a.id()).unwrap();
        model.validate().unwrap();

        let mut replacement = Plain::new("a");
        replacement.value = 4.0;
        let a2 = model.replace(replacement).unwrap();
        assert_eq!(a2.id(), a.id());
        assert!(!model.is_valid());

        let found: Handle<Plain> = model.get("a").unwrap();
        assert_eq!(found.borrow().value, 4.0);

        model.validate().unwrap();
        assert!(rank_of(&model, "a") < rank_of(&model, "b"));

        // Replacing an absent id inserts it.
        let c = model.replace(Plain::new("c")).unwrap();
        assert_eq!(c.id().index(), 2);
    }

    #[test]
    fn test_typed_lookup() {
        let mut model = Registry::new();
        model.insert(Plain::new("p")).unwrap();
        model
            .insert(Heartbeat::new("hb", Duration::seconds(1)).unwrap())
            .unwrap();

        let hb: Handle<Heartbeat> = model.get("hb").unwrap();
        assert_eq!(hb.borrow().period(), Duration::seconds(1));

        assert_eq!(
            model.get::<Heartbeat>("p").unwrap_err(),
            SimError::ComponentTypeMismatch {
                id: "p".to_string(),
                actual: "plain",
            }
        );
        assert_eq!(
            model.get::<Plain>("missing").unwrap_err(),
            SimError::ComponentNotFound("missing".to_string())
        );
    }

    #[test]
    fn test_insertion_order_iteration() {
        let mut model = Registry::new();
        for id in ["zeta", "alpha", "mid"] {
            model.insert(Plain::new(id)).unwrap();
        }
        let ids: Vec<String> = model.components().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_validate_ranks_and_evaluation_order() {
        let mut model = Registry::new();
        let load = model.insert(Plain::new("load")).unwrap();
        let bus = model.insert(Plain::new("bus")).unwrap();
        let network = model.insert(Plain::new("network")).unwrap();
        let weather = model.insert(Plain::new("weather")).unwrap();

        model.depends_on(bus.id(), load.id()).unwrap();
        model.depends_on(network.id(), bus.id()).unwrap();
        model.depends_on(load.id(), weather.id()).unwrap();
        model.validate().unwrap();

        assert_eq!(rank_of(&model, "weather"), 0);
        assert_eq!(rank_of(&model, "load"), 1);
        assert_eq!(rank_of(&model, "bus"), 2);
        assert_eq!(rank_of(&model, "network"), 3);

        let order: Vec<String> = model
            .evaluation_order()
            .iter()
            .map(|&id| model.component_at(id).unwrap().id())
            .collect();
        assert_eq!(order, vec!["weather", "load", "bus", "network"]);
        assert_eq!(model.ordinal(network.id()), 3);
    }

    #[test]
    fn test_equal_ranks_break_ties_by_id() {
        let mut model = Registry::new();
        for id in ["c", "a", "b"] {
            model.insert(Plain::new(id)).unwrap();
        }
        model.validate().unwrap();
        let order: Vec<String> = model
            .evaluation_order()
            .iter()
            .map(|&id| model.component_at(id).unwrap().id())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_reported_without_publishing_ranks() {
        let mut model = Registry::new();
        let a = model.insert(Plain::new("a")).unwrap();
        let b = model.insert(Plain::new("b")).unwrap();
        let c = model.insert(Plain::new("c")).unwrap();
        model.depends_on(a.id(), b.id()).unwrap();
        model.depends_on(b.id(), a.id()).unwrap();
        model.depends_on(c.id(), b.id()).unwrap();

        assert_eq!(
            model.validate().unwrap_err(),
            SimError::CyclicDependency(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert!(!model.is_valid());
        assert!(model.components().all(|c| c.rank().is_none()));
        assert!(model.evaluation_order().is_empty());
    }

    #[test]
    fn test_unresolved_dependency() {
        let mut model = Registry::new();
        let mut orphan = Plain::new("orphan");
        orphan.core.depends_on(ComponentId(9));
        model.insert(orphan).unwrap();

        assert!(matches!(
            model.validate(),
            Err(SimError::Configuration(_))
        ));
        assert!(model.depends_on(ComponentId(0), ComponentId(5)).is_err());
    }

    #[test]
    fn test_subscribe_forwards_did_update() {
        let mut model = Registry::new();
        let source = model.insert(Plain::new("source")).unwrap();
        let sink = model.insert(Plain::new("sink")).unwrap();
        model.subscribe(sink.id(), source.id()).unwrap();

        let fired = Rc::new(std::cell::Cell::new(0));
        let f = fired.clone();
        sink.borrow()
            .core()
            .needs_update()
            .add_action(move || f.set(f.get() + 1), "count");

        source.borrow().core().did_update().trigger();
        assert_eq!(fired.get(), 1);
        assert_eq!(sink.borrow().core().dependencies(), &[source.id()]);
    }
}
