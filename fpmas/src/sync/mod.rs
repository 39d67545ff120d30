//! The two sync modes, per spec §4.G/§4.H.
//!
//! A closed enumeration rather than an open inheritance hierarchy (spec §9's
//! redesign note): [`SyncMode`] wraps exactly [`GhostSync`] or
//! [`HardSync`][hard::HardSync], and `DistributedGraph` drives whichever is
//! active through this one type without ever matching on it itself.

pub mod ghost;
pub mod hard;

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};

use fpmas_transport::{Rank, Transport};

use crate::callbacks::{CallbackRegistries, Registry};
use crate::error::Error;
use crate::graph::edge::Edge;
use crate::graph::location_manager::LocationManager;
use crate::graph::mutex::{GhostMutex, Mutex};
use crate::graph::node::Node;
use crate::id::DistributedId;

pub use ghost::GhostSync;
pub use hard::HardSync;

/// The active sync mode for one `DistributedGraph`. Ghost buffers link/
/// unlink and refreshes caches in epoch-sized batches; Hard applies both
/// immediately and answers mutex requests on demand.
pub enum SyncMode<D> {
    Ghost(GhostSync),
    Hard(HardSync<D>),
}

impl<D> SyncMode<D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    pub fn ghost() -> Self {
        SyncMode::Ghost(GhostSync::new())
    }

    pub fn hard() -> Self {
        SyncMode::Hard(HardSync::new())
    }

    /// Buffers (Ghost) or immediately sends (Hard) the creation of `edge`,
    /// whose endpoints are owned by `source_owner`/`target_owner`.
    pub fn link<T: Transport>(
        &mut self,
        edge: &Edge,
        source_owner: Rank,
        target_owner: Rank,
        source_data: D,
        target_data: D,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(ghost) => {
                if source_owner != transport.rank() || target_owner != transport.rank() {
                    ghost.buffer_link(edge.id());
                }
                Ok(())
            }
            SyncMode::Hard(hard) => hard.link(edge, source_owner, target_owner, source_data, target_data, transport),
        }
    }

    /// Buffers (Ghost) or immediately sends (Hard) the removal of the edge
    /// `edge_id`, owned by `owner`.
    pub fn unlink<T: Transport>(
        &mut self,
        edge_id: DistributedId,
        owner: Rank,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(ghost) => {
                if owner != transport.rank() {
                    ghost.buffer_unlink(edge_id, owner);
                }
                Ok(())
            }
            SyncMode::Hard(hard) => hard.unlink(edge_id, owner, transport),
        }
    }

    /// Reconciles distributed state: Ghost flushes its buffered links/
    /// unlinks and refreshes every DISTANT cache; Hard runs the four-color
    /// termination ring, confirming every process has stopped generating
    /// new mutex/link/unlink traffic since the last call.
    pub fn synchronize<T: Transport>(
        &mut self,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(ghost) => ghost.synchronize(nodes, edges, locations, callbacks, transport),
            SyncMode::Hard(hard) => hard.terminate(transport, nodes, edges, locations, callbacks),
        }
    }

    /// Drains one pending protocol message without blocking. Ghost has none
    /// in flight between synchronizes (everything is buffered), so this is
    /// always `Ok(false)`; Hard answers at most one inbound mutex/link
    /// message per call, per spec §5's cooperative suspension-point rule.
    pub fn poll<T: Transport>(
        &mut self,
        transport: &T,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
    ) -> Result<bool, Error> {
        match self {
            SyncMode::Ghost(_) => Ok(false),
            SyncMode::Hard(hard) => hard.poll(transport, nodes, edges, locations, callbacks),
        }
    }

    pub fn read<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<D, Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).read().map(|d| d.clone())
            }
            SyncMode::Hard(hard) => hard.read(id, owner, nodes, edges, locations, callbacks, transport),
        }
    }

    pub fn release_read<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).release_read()
            }
            SyncMode::Hard(hard) => {
                hard.release_read(id, owner, nodes, edges, locations, callbacks, transport)
            }
        }
    }

    pub fn acquire<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<D, Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).acquire().map(|d| d.clone())
            }
            SyncMode::Hard(hard) => hard.acquire(id, owner, nodes, edges, locations, callbacks, transport),
        }
    }

    pub fn release_acquire<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        new_value: D,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).release_acquire(new_value)
            }
            SyncMode::Hard(hard) => {
                hard.release_acquire(id, owner, new_value, nodes, edges, locations, callbacks, transport)
            }
        }
    }

    pub fn lock<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).lock()
            }
            SyncMode::Hard(hard) => hard.lock(id, owner, nodes, edges, locations, callbacks, transport),
        }
    }

    pub fn unlock<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).unlock()
            }
            SyncMode::Hard(hard) => hard.unlock(id, owner, nodes, edges, locations, callbacks, transport),
        }
    }

    pub fn lock_shared<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).lock_shared()
            }
            SyncMode::Hard(hard) => {
                hard.lock_shared(id, owner, nodes, edges, locations, callbacks, transport)
            }
        }
    }

    pub fn unlock_shared<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        match self {
            SyncMode::Ghost(_) => {
                let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
                GhostMutex::new(node).unlock_shared()
            }
            SyncMode::Hard(hard) => {
                hard.unlock_shared(id, owner, nodes, edges, locations, callbacks, transport)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeState;
    use crate::id::IdCounter;
    use fpmas_transport::ProcessTransport;

    #[test]
    fn ghost_mode_acquire_is_purely_local() {
        let cluster = ProcessTransport::new_cluster(1);
        let t = cluster.into_iter().next().unwrap();
        let counter = IdCounter::new(0);
        let id = counter.new_on(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(id, Node::new(id, 1.0, 0i32, 0, NodeState::Local));
        let mut edges = BTreeMap::new();
        let mut locations = LocationManager::new(0);
        locations.add_managed(id, 0);
        let mut mode: SyncMode<i32> = SyncMode::ghost();

        let on_insert_node = Registry::new();
        let on_erase_node = Registry::new();
        let on_insert_edge = Registry::new();
        let on_erase_edge = Registry::new();
        let callbacks = CallbackRegistries::new(
            &on_insert_node,
            &on_erase_node,
            &on_insert_edge,
            &on_erase_edge,
        );

        let current = mode
            .acquire(id, 0, &mut nodes, &mut edges, &mut locations, callbacks, &t)
            .unwrap();
        mode.release_acquire(
            id,
            0,
            current + 1,
            &mut nodes,
            &mut edges,
            &mut locations,
            callbacks,
            &t,
        )
        .unwrap();
        assert_eq!(*nodes.get(&id).unwrap().data(), 1);
    }
}
