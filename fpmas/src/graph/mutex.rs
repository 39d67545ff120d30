//! Mutex abstraction, per spec §4.F.
//!
//! A closed set of two mutex kinds, not an open inheritance hierarchy (spec
//! §9's redesign note): [`GhostMutex`] here for the epoch-batched mode, and
//! `sync::hard::HardSync`'s own request/response arbitration for the
//! on-demand mode (its request/reply traffic doesn't fit this trait's
//! purely local shape, so it is driven directly by `SyncMode` instead of
//! wrapped in a second `Mutex` impl). `DistributedGraph` never sees the
//! difference past `SyncMode`.

use crate::error::Error;
use crate::graph::node::Node;

/// Per-node access contract, independent of which sync mode backs it.
pub trait Mutex<D> {
    fn read(&mut self) -> Result<&D, Error>;
    fn release_read(&mut self) -> Result<(), Error>;
    fn acquire(&mut self) -> Result<&mut D, Error>;
    fn release_acquire(&mut self, new_value: D) -> Result<(), Error>;
    fn lock(&mut self) -> Result<(), Error>;
    fn unlock(&mut self) -> Result<(), Error>;
    fn lock_shared(&mut self) -> Result<(), Error>;
    fn unlock_shared(&mut self) -> Result<(), Error>;
    fn locked_shared(&self) -> u32;
}

/// Ghost mode never makes a live round trip for a mutex operation: a LOCAL
/// node is only ever touched by its owner, and a DISTANT node's cache is
/// read/written directly and reconciled at the next `synchronize()` (spec
/// §4.G). So `GhostMutex` is just `Node`'s own local primitives, used
/// identically whether the wrapped node happens to be LOCAL or DISTANT.
pub struct GhostMutex<'a, D> {
    node: &'a mut Node<D>,
}

impl<'a, D> GhostMutex<'a, D> {
    pub fn new(node: &'a mut Node<D>) -> Self {
        GhostMutex { node }
    }
}

fn state_violation(what: &str) -> Error {
    Error::StateViolation(what.to_string())
}

impl<'a, D> Mutex<D> for GhostMutex<'a, D> {
    fn read(&mut self) -> Result<&D, Error> {
        self.node
            .try_read()
            .ok_or_else(|| state_violation("read: node exclusively held"))
    }

    fn release_read(&mut self) -> Result<(), Error> {
        self.node.release_read()
    }

    fn acquire(&mut self) -> Result<&mut D, Error> {
        self.node
            .try_acquire()
            .ok_or_else(|| state_violation("acquire: node already held"))
    }

    fn release_acquire(&mut self, new_value: D) -> Result<(), Error> {
        self.node.release_acquire(new_value)
    }

    fn lock(&mut self) -> Result<(), Error> {
        if self.node.try_lock() {
            Ok(())
        } else {
            Err(state_violation("lock: node already held"))
        }
    }

    fn unlock(&mut self) -> Result<(), Error> {
        self.node.unlock()
    }

    fn lock_shared(&mut self) -> Result<(), Error> {
        if self.node.try_lock_shared() {
            Ok(())
        } else {
            Err(state_violation("lock_shared: node exclusively held"))
        }
    }

    fn unlock_shared(&mut self) -> Result<(), Error> {
        self.node.unlock_shared()
    }

    fn locked_shared(&self) -> u32 {
        self.node.locked_shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeState;
    use crate::id::IdCounter;

    #[test]
    fn ghost_mutex_delegates_to_node_state() {
        let counter = IdCounter::new(0);
        let mut node = Node::new(counter.new_on(0), 1.0, 0, 0, NodeState::Distant);
        let mut mutex = GhostMutex::new(&mut node);
        *mutex.acquire().unwrap() += 1;
        mutex.release_acquire(1).unwrap();
        assert_eq!(*mutex.read().unwrap(), 1);
        mutex.release_read().unwrap();
    }
}
