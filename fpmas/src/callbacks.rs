//! Callback registries, per spec §4.M.
//!
//! Four registries live on the graph (on-insert-node, on-erase-node,
//! on-insert-edge, on-erase-edge); two more live on the `LocationManager`
//! (on-set-local, on-set-distant). All six share the same shape, so they're
//! built on one generic `Registry<Event>`.
//!
//! Callbacks are invoked synchronously, in registration order, at the point
//! of the event (spec §5: "Callback registries are append-only during
//! setup; during a run, callbacks are invoked but never added."). A panic
//! inside a callback is fatal, matching spec §4.M ("exceptions from
//! callbacks are fatal") — we do not catch_unwind around them.

/// A single registered callback.
pub type Callback<Event> = Box<dyn Fn(&Event)>;

/// An ordered, append-only list of callbacks for one event type.
pub struct Registry<Event> {
    callbacks: Vec<Callback<Event>>,
}

impl<Event> Default for Registry<Event> {
    fn default() -> Self {
        Registry {
            callbacks: Vec::new(),
        }
    }
}

impl<Event> Registry<Event> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback. Intended for use during setup, before the first
    /// `Runtime::run`; nothing prevents calling it later, but doing so
    /// during a run violates spec §5's append-only-during-setup contract.
    pub fn register(&mut self, callback: impl Fn(&Event) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Invokes every registered callback, in registration order.
    pub fn fire(&self, event: &Event) {
        for callback in &self.callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// Borrowed handles to a graph's four node/edge registries, bundled so that
/// every path which imports or erases a node/edge on behalf of the active
/// sync mode (migration-driven or local) fires through the same place
/// instead of each call site deciding on its own whether callbacks apply.
/// `Copy` since it only ever holds shared references.
#[derive(Clone, Copy)]
pub struct CallbackRegistries<'a, Id> {
    pub on_insert_node: &'a Registry<Id>,
    pub on_erase_node: &'a Registry<Id>,
    pub on_insert_edge: &'a Registry<Id>,
    pub on_erase_edge: &'a Registry<Id>,
}

impl<'a, Id> CallbackRegistries<'a, Id> {
    pub fn new(
        on_insert_node: &'a Registry<Id>,
        on_erase_node: &'a Registry<Id>,
        on_insert_edge: &'a Registry<Id>,
        on_erase_edge: &'a Registry<Id>,
    ) -> Self {
        CallbackRegistries {
            on_insert_node,
            on_erase_node,
            on_insert_edge,
            on_erase_edge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry: Registry<i32> = Registry::new();
        for i in 0..3 {
            let seen = seen.clone();
            registry.register(move |event| seen.borrow_mut().push((i, *event)));
        }
        registry.fire(&42);
        assert_eq!(*seen.borrow(), vec![(0, 42), (1, 42), (2, 42)]);
    }
}
