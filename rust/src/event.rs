//! Ordered broadcast events.
//!
//! An [`Event`] is a shared handle to a list of named actions. Cloning the
//! handle does not copy the action list, so a component can hand out its events
//! and keep triggering them without holding any borrow of itself.
//!
//! Subscribers should capture only what they need. [`Event::downgrade`] and
//! [`Event::forward_to`] keep the subscription from extending the lifetime of
//! the target event: once it is dropped, forwarding is a no-op.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Identifies an action registered on a particular event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActionHandle(u64);

struct Action {
    handle: ActionHandle,
    description: String,
    callback: Rc<dyn Fn()>,
}

struct EventInner {
    description: String,
    actions: RefCell<Vec<Rc<Action>>>,
    enabled: Cell<bool>,
    next_handle: Cell<u64>,
}

/// An event that, when triggered, performs all of its registered actions.
#[derive(Clone)]
pub struct Event {
    inner: Rc<EventInner>,
}

impl Event {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(EventInner {
                description: description.into(),
                actions: RefCell::new(Vec::new()),
                enabled: Cell::new(true),
                next_handle: Cell::new(0),
            }),
        }
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Register an action. Actions run in registration order.
    pub fn add_action(
        &self,
        callback: impl Fn() + 'static,
        description: impl Into<String>,
    ) -> ActionHandle {
        let handle = ActionHandle(self.inner.next_handle.get());
        self.inner.next_handle.set(handle.0 + 1);
        self.inner.actions.borrow_mut().push(Rc::new(Action {
            handle,
            description: description.into(),
            callback: Rc::new(callback),
        }));
        handle
    }

    /// Unregister an action. Returns false if it was not registered here.
    pub fn remove_action(&self, handle: ActionHandle) -> bool {
        let mut actions = self.inner.actions.borrow_mut();
        let before = actions.len();
        actions.retain(|a| a.handle != handle);
        actions.len() != before
    }

    pub fn clear(&self) {
        self.inner.actions.borrow_mut().clear();
    }

    pub fn action_count(&self) -> usize {
        self.inner.actions.borrow().len()
    }

    /// Descriptions of the registered actions, in order.
    pub fn action_descriptions(&self) -> Vec<String> {
        self.inner
            .actions
            .borrow()
            .iter()
            .map(|a| a.description.clone())
            .collect()
    }

    /// Perform every registered action, synchronously and in order.
    ///
    /// The action list is snapshotted first: actions may add or remove actions
    /// on this event (or trigger it again) without invalidating the iteration.
    pub fn trigger(&self) {
        if !self.inner.enabled.get() {
            return;
        }
        let snapshot: Vec<Rc<Action>> = self.inner.actions.borrow().clone();
        for action in snapshot {
            (action.callback)();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.set(enabled);
    }

    pub fn downgrade(&self) -> WeakEvent {
        WeakEvent {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Trigger `target` whenever this event is triggered.
    pub fn forward_to(&self, target: &Event) -> ActionHandle {
        let weak = target.downgrade();
        let description = format!("forward to {}", target.description());
        self.add_action(
            move || {
                weak.trigger();
            },
            description,
        )
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("description", &self.inner.description)
            .field("actions", &self.action_count())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Non-owning handle to an [`Event`].
#[derive(Clone)]
pub struct WeakEvent {
    inner: Weak<EventInner>,
}

impl WeakEvent {
    pub fn upgrade(&self) -> Option<Event> {
        self.inner.upgrade().map(|inner| Event { inner })
    }

    /// Trigger the event if it is still alive. Returns whether it was.
    pub fn trigger(&self) -> bool {
        match self.upgrade() {
            Some(event) => {
                event.trigger();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, Event) {
        (Rc::new(RefCell::new(Vec::new())), Event::new("test event"))
    }

    #[test]
    fn test_actions_run_in_registration_order() {
        let (log, event) = recorder();
        for name in ["first", "second", "third"] {
            let log = log.clone();
            event.add_action(move || log.borrow_mut().push(name), name);
        }

        event.trigger();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
        assert_eq!(
            event.action_descriptions(),
            vec!["first".to_string(), "second".to_string(), "third".to_string()]
        );
    }

    #[test]
    fn test_disabled_event_does_nothing() {
        let (log, event) = recorder();
        let l = log.clone();
        event.add_action(move || l.borrow_mut().push("ran"), "record");

        event.set_enabled(false);
        event.trigger();
        assert!(log.borrow().is_empty());

        event.set_enabled(true);
        event.trigger();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_remove_action() {
        let (log, event) = recorder();
        let l1 = log.clone();
        let l2 = log.clone();
        let h1 = event.add_action(move || l1.borrow_mut().push("a"), "a");
        event.add_action(move || l2.borrow_mut().push("b"), "b");

        assert!(event.remove_action(h1));
        assert!(!event.remove_action(h1));
        event.trigger();
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn test_reentrant_trigger_and_registration() {
        let counter = Rc::new(Cell::new(0));
        let event = Event::new("reentrant");

        let c = counter.clone();
        let weak = event.downgrade();
        event.add_action(
            move || {
                c.set(c.get() + 1);
                if c.get() < 3 {
                    weak.trigger();
                }
            },
            "recurse twice",
        );
        let e = event.clone();
        event.add_action(
            move || {
                e.add_action(|| {}, "late");
            },
            "register during trigger",
        );

        event.trigger();
        assert_eq!(counter.get(), 3);
        // The nested triggers each registered one more action.
        assert_eq!(event.action_count(), 5);
    }

    #[test]
    fn test_forward_to_tolerates_dropped_target() {
        let (log, source) = recorder();
        let target = Event::new("target");
        let l = log.clone();
        target.add_action(move || l.borrow_mut().push("target"), "record");

        source.forward_to(&target);
        source.trigger();
        assert_eq!(log.borrow().len(), 1);

        drop(target);
        source.trigger();
        assert_eq!(log.borrow().len(), 1);
    }
}
