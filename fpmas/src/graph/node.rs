//! In-memory node model, per spec §4.D.
//!
//! Per the redesign notes (spec §9), there is no shared-pointer graph of
//! `Node`s pointing at each other: a `Node` stores only ids. Its adjacency
//! lists hold `(edge_id, peer_node_id)` pairs so that `in_neighbors` /
//! `out_neighbors` are available without a round trip through the edge
//! arena, while `incoming_edges` / `outgoing_edges` still expose the edge
//! ids alone. Neighbor and edge lookups beyond that go through
//! `DistributedGraph`'s arenas.

use std::collections::BTreeMap;

use fpmas_transport::Rank;

use crate::error::Error;
use crate::id::DistributedId;

/// An integer channel; multiple edges between the same pair of nodes are
/// allowed provided they differ by layer or by id.
pub type LayerId = i32;

/// A node's classification on one process: authoritative replica vs
/// read-mostly cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Local,
    Distant,
}

/// Local lock bookkeeping. `exclusive` covers both `acquire()` (which also
/// hands out mutable data access) and the purely advisory `lock()`: spec
/// §4.F describes both as occupying the single "held-exclusive" state, and
/// a node cannot sensibly be both acquired and advisory-locked at once.
#[derive(Debug, Default)]
struct LocalLock {
    exclusive: bool,
    shared_count: u32,
}

impl LocalLock {
    fn can_read(&self) -> bool {
        !self.exclusive
    }

    fn can_take_exclusive(&self) -> bool {
        !self.exclusive && self.shared_count == 0
    }
}

/// An insertion-ordered, id-indexed multiset of `(edge_id, peer_id)` pairs.
/// Entries live in a slab so removal never has to shift or rescan: dropping
/// one tombstones its slot in O(1) (amortized with `index`'s O(log n)
/// lookup) instead of the O(n) scan a `Vec::retain` would need, and
/// iteration still walks the slab in insertion order.
#[derive(Debug, Default, Clone)]
struct AdjacencyList {
    slots: Vec<Option<(DistributedId, DistributedId)>>,
    index: BTreeMap<DistributedId, usize>,
}

impl AdjacencyList {
    fn push(&mut self, edge: DistributedId, peer: DistributedId) {
        let slot = self.slots.len();
        self.slots.push(Some((edge, peer)));
        self.index.insert(edge, slot);
    }

    fn remove(&mut self, edge: DistributedId) {
        if let Some(slot) = self.index.remove(&edge) {
            self.slots[slot] = None;
        }
    }

    fn iter(&self) -> impl Iterator<Item = &(DistributedId, DistributedId)> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
struct LayerAdjacency {
    incoming: AdjacencyList,
    outgoing: AdjacencyList,
}

/// A graph vertex carrying application data `D`, opaque to the core.
pub struct Node<D> {
    id: DistributedId,
    weight: f32,
    data: D,
    owner_rank: Rank,
    state: NodeState,
    lock: LocalLock,
    layers: BTreeMap<LayerId, LayerAdjacency>,
}

impl<D> Node<D> {
    pub fn new(id: DistributedId, weight: f32, data: D, owner_rank: Rank, state: NodeState) -> Self {
        Node {
            id,
            weight,
            data,
            owner_rank,
            state,
            lock: LocalLock::default(),
            layers: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> DistributedId {
        self.id
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub fn owner_rank(&self) -> Rank {
        self.owner_rank
    }

    pub fn set_owner_rank(&mut self, rank: Rank) {
        self.owner_rank = rank;
    }

    /// Direct access to the data payload. The caller must already hold a
    /// read or shared lock (spec §4.D); this is not enforced at the type
    /// level, matching how the teacher exposes worker-internal state
    /// through plain accessors and relies on call-site discipline.
    pub fn data(&self) -> &D {
        &self.data
    }

    fn layer(&self, layer: LayerId) -> Option<&LayerAdjacency> {
        self.layers.get(&layer)
    }

    fn layer_mut(&mut self, layer: LayerId) -> &mut LayerAdjacency {
        self.layers.entry(layer).or_default()
    }

    pub fn incoming_edges(&self, layer: LayerId) -> impl Iterator<Item = DistributedId> + '_ {
        self.layer(layer)
            .into_iter()
            .flat_map(|l| l.incoming.iter().map(|(edge, _)| *edge))
    }

    pub fn outgoing_edges(&self, layer: LayerId) -> impl Iterator<Item = DistributedId> + '_ {
        self.layer(layer)
            .into_iter()
            .flat_map(|l| l.outgoing.iter().map(|(edge, _)| *edge))
    }

    pub fn in_neighbors(&self, layer: LayerId) -> impl Iterator<Item = DistributedId> + '_ {
        self.layer(layer)
            .into_iter()
            .flat_map(|l| l.incoming.iter().map(|(_, peer)| *peer))
    }

    pub fn out_neighbors(&self, layer: LayerId) -> impl Iterator<Item = DistributedId> + '_ {
        self.layer(layer)
            .into_iter()
            .flat_map(|l| l.outgoing.iter().map(|(_, peer)| *peer))
    }

    pub fn link_in(&mut self, layer: LayerId, edge: DistributedId, peer: DistributedId) {
        self.layer_mut(layer).incoming.push(edge, peer);
    }

    pub fn link_out(&mut self, layer: LayerId, edge: DistributedId, peer: DistributedId) {
        self.layer_mut(layer).outgoing.push(edge, peer);
    }

    pub fn unlink_in(&mut self, layer: LayerId, edge: DistributedId) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.incoming.remove(edge);
        }
    }

    pub fn unlink_out(&mut self, layer: LayerId, edge: DistributedId) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.outgoing.remove(edge);
        }
    }

    /// `true` if this node has no edges referencing it on any layer.
    pub fn has_no_adjacency(&self) -> bool {
        self.layers
            .values()
            .all(|l| l.incoming.is_empty() && l.outgoing.is_empty())
    }

    // --- local mutex primitives (spec §4.F) -------------------------------
    //
    // These implement the LOCAL fast path only: "read is free if not
    // exclusively locked; otherwise waits. acquire waits until shared count
    // is zero and no other exclusive holder." The waiting itself (driving
    // the server loops at a suspension point) is the active sync mode's
    // job, not the node's; a node only ever reports whether the operation
    // can complete right now.

    pub fn try_read(&mut self) -> Option<&D> {
        if self.lock.can_read() {
            self.lock.shared_count += 1;
            Some(&self.data)
        } else {
            None
        }
    }

    pub fn release_read(&mut self) -> Result<(), Error> {
        if self.lock.shared_count == 0 {
            return Err(Error::StateViolation(format!(
                "release_read on node {:?} with no outstanding shared holder",
                self.id
            )));
        }
        self.lock.shared_count -= 1;
        Ok(())
    }

    pub fn try_acquire(&mut self) -> Option<&mut D> {
        if self.lock.can_take_exclusive() {
            self.lock.exclusive = true;
            Some(&mut self.data)
        } else {
            None
        }
    }

    pub fn release_acquire(&mut self, new_data: D) -> Result<(), Error> {
        if !self.lock.exclusive {
            return Err(Error::StateViolation(format!(
                "release_acquire on node {:?} without a prior acquire",
                self.id
            )));
        }
        self.data = new_data;
        self.lock.exclusive = false;
        Ok(())
    }

    pub fn try_lock(&mut self) -> bool {
        if self.lock.can_take_exclusive() {
            self.lock.exclusive = true;
            true
        } else {
            false
        }
    }

    pub fn unlock(&mut self) -> Result<(), Error> {
        if !self.lock.exclusive {
            return Err(Error::StateViolation(format!(
                "unlock on node {:?} that is not locked",
                self.id
            )));
        }
        self.lock.exclusive = false;
        Ok(())
    }

    pub fn try_lock_shared(&mut self) -> bool {
        if self.lock.can_read() {
            self.lock.shared_count += 1;
            true
        } else {
            false
        }
    }

    pub fn unlock_shared(&mut self) -> Result<(), Error> {
        self.release_read()
    }

    pub fn locked_shared(&self) -> u32 {
        self.lock.shared_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdCounter;

    fn node(data: i32) -> Node<i32> {
        let counter = IdCounter::new(0);
        Node::new(counter.new_on(0), 1.0, data, 0, NodeState::Local)
    }

    #[test]
    fn self_loop_appears_once_each_direction() {
        let mut n = node(0);
        let edge_id = n.id();
        n.link_in(0, edge_id, n.id());
        n.link_out(0, edge_id, n.id());
        assert_eq!(n.incoming_edges(0).count(), 1);
        assert_eq!(n.outgoing_edges(0).count(), 1);
        assert_eq!(n.in_neighbors(0).next(), Some(n.id()));
        assert_eq!(n.out_neighbors(0).next(), Some(n.id()));
    }

    #[test]
    fn acquire_blocks_further_acquire_until_released() {
        let mut n = node(10);
        assert!(n.try_acquire().is_some());
        assert!(n.try_acquire().is_none());
        n.release_acquire(11).unwrap();
        assert_eq!(*n.data(), 11);
        assert!(n.try_acquire().is_some());
    }

    #[test]
    fn release_acquire_without_acquire_is_a_state_violation() {
        let mut n = node(0);
        assert!(matches!(
            n.release_acquire(1),
            Err(Error::StateViolation(_))
        ));
    }

    #[test]
    fn shared_reads_stack_and_block_acquire() {
        let mut n = node(0);
        assert!(n.try_read().is_some());
        assert!(n.try_read().is_some());
        assert_eq!(n.locked_shared(), 2);
        assert!(n.try_acquire().is_none());
        n.release_read().unwrap();
        n.release_read().unwrap();
        assert!(n.try_acquire().is_some());
    }
}
