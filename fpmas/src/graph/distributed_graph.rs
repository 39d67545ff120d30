//! The orchestrating distributed graph, per spec §4.I.
//!
//! Owns the node/edge arenas, the [`LocationManager`], and the active
//! [`SyncMode`]; every public operation here is what a task actually calls
//! (`build_node`, `link`, `unlink`, `remove_node`, `distribute`,
//! `synchronize`) plus the import paths sync modes and `distribute` use to
//! apply inbound migrations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{de::DeserializeOwned, Serialize};

use fpmas_transport::{Rank, Transport};

use crate::callbacks::{CallbackRegistries, Registry};
use crate::codec::Pack;
use crate::error::Error;
use crate::graph::edge::Edge;
use crate::graph::location_manager::LocationManager;
use crate::graph::node::{LayerId, Node, NodeState};
use crate::id::{DistributedId, IdCounter};
use crate::partition::Partition;
use crate::sync::SyncMode;
use crate::wire::{EdgeWire, NodeWire};

/// The shared graph, as seen from one process. Generic over the opaque
/// application data payload `D` every node carries (spec §3).
pub struct DistributedGraph<D> {
    rank: Rank,
    id_counter: IdCounter,
    nodes: BTreeMap<DistributedId, Node<D>>,
    edges: BTreeMap<DistributedId, Edge>,
    locations: LocationManager,
    sync: SyncMode<D>,
    pub on_insert_node: Registry<DistributedId>,
    pub on_erase_node: Registry<DistributedId>,
    pub on_insert_edge: Registry<DistributedId>,
    pub on_erase_edge: Registry<DistributedId>,
}

impl<D> DistributedGraph<D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    pub fn new_ghost(rank: Rank) -> Self {
        Self::new(rank, SyncMode::ghost())
    }

    pub fn new_hard(rank: Rank) -> Self {
        Self::new(rank, SyncMode::hard())
    }

    fn new(rank: Rank, sync: SyncMode<D>) -> Self {
        DistributedGraph {
            rank,
            id_counter: IdCounter::new(rank),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            locations: LocationManager::new(rank),
            sync,
            on_insert_node: Registry::new(),
            on_erase_node: Registry::new(),
            on_insert_edge: Registry::new(),
            on_erase_edge: Registry::new(),
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn node(&self, id: DistributedId) -> Option<&Node<D>> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: DistributedId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<D>> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn locations(&self) -> &LocationManager {
        &self.locations
    }

    /// Creates a LOCAL node owned here. Fires `on_insert_node` then
    /// `on_set_local` (spec §4.I: "invokes on-insert callbacks and set-local
    /// callbacks").
    pub fn build_node(&mut self, data: D) -> DistributedId {
        let id = self.id_counter.new_on(self.rank);
        self.nodes
            .insert(id, Node::new(id, 1.0, data, self.rank, NodeState::Local));
        self.locations.set_local(id);
        self.on_insert_node.fire(&id);
        id
    }

    /// Creates an edge `source -> target` on `layer`. If either endpoint is
    /// DISTANT, routes the migration through the active sync mode
    /// (buffered under Ghost, sent immediately under Hard); callbacks fire
    /// here regardless, the peer fires its own on import (spec §4.I).
    pub fn link<T: Transport>(
        &mut self,
        source: DistributedId,
        target: DistributedId,
        layer: LayerId,
        transport: &T,
    ) -> Result<DistributedId, Error> {
        let edge_id = self.id_counter.new_on(self.rank);
        let source_owner = self.locations.location_of(source).ok_or(Error::UnknownNode(source))?;
        let target_owner = self.locations.location_of(target).ok_or(Error::UnknownNode(target))?;

        let mut edge = Edge::new(edge_id, layer, 1.0, source, target);
        let local = source_owner == self.rank && target_owner == self.rank;
        edge.set_state(if local { NodeState::Local } else { NodeState::Distant });

        if let Some(n) = self.nodes.get_mut(&source) {
            n.link_out(layer, edge_id, target);
        }
        if let Some(n) = self.nodes.get_mut(&target) {
            n.link_in(layer, edge_id, source);
        }
        self.edges.insert(edge_id, edge);
        self.on_insert_edge.fire(&edge_id);

        if !local {
            let source_data = self.nodes.get(&source).map(|n| n.data().clone()).unwrap_or_else(|| {
                unreachable!("an edge's endpoint always has at least a placeholder replica")
            });
            let target_data = self.nodes.get(&target).map(|n| n.data().clone()).unwrap_or_else(|| {
                unreachable!("an edge's endpoint always has at least a placeholder replica")
            });
            let edge_ref = self.edges.get(&edge_id).expect("just inserted");
            self.sync
                .link(edge_ref, source_owner, target_owner, source_data, target_data, transport)?;
        }
        Ok(edge_id)
    }

    /// Removes `edge_id`, mirroring the removal on both endpoints' adjacency
    /// lists and, if either endpoint is remote, notifying its owner through
    /// the active sync mode.
    pub fn unlink<T: Transport>(&mut self, edge_id: DistributedId, transport: &T) -> Result<(), Error> {
        let Some(edge) = self.edges.remove(&edge_id) else {
            return Err(Error::UnknownNode(edge_id));
        };
        if let Some(n) = self.nodes.get_mut(&edge.source()) {
            n.unlink_out(edge.layer(), edge_id);
        }
        if let Some(n) = self.nodes.get_mut(&edge.target()) {
            n.unlink_in(edge.layer(), edge_id);
        }
        self.on_erase_edge.fire(&edge_id);

        let source_owner = self.locations.location_of(edge.source()).unwrap_or(self.rank);
        let target_owner = self.locations.location_of(edge.target()).unwrap_or(self.rank);
        for owner in [source_owner, target_owner] {
            if owner != self.rank {
                self.sync.unlink(edge_id, owner, transport)?;
            }
        }

        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        erase_if_orphaned(edge.source(), &mut self.nodes, &self.edges, &mut self.locations, Some(callbacks));
        erase_if_orphaned(edge.target(), &mut self.nodes, &self.edges, &mut self.locations, Some(callbacks));
        Ok(())
    }

    /// Removes `id` after first unlinking every incident edge (spec §4.I).
    pub fn remove_node<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<(), Error> {
        let incident: Vec<DistributedId> = self
            .edges
            .values()
            .filter(|e| e.source() == id || e.target() == id)
            .map(|e| e.id())
            .collect();
        for edge_id in incident {
            self.unlink(edge_id, transport)?;
        }
        if self.nodes.remove(&id).is_some() {
            self.locations.remove_managed(id);
            self.on_erase_node.fire(&id);
        }
        Ok(())
    }

    /// Imports a node migrated during `distribute`. Deduplicates by id: an
    /// already-known id is reconciled rather than overwritten blindly
    /// (upgrading a DISTANT placeholder to LOCAL if this import is
    /// authoritative — i.e. this process is the node's new owner — and
    /// otherwise just updating the owner field, spec §4.I).
    pub fn import_node(&mut self, wire: NodeWire<D>, authoritative: bool) {
        match self.nodes.get_mut(&wire.id) {
            Some(existing) => {
                if authoritative {
                    existing.set_weight(wire.weight);
                    let _ = existing.try_acquire();
                    let _ = existing.release_acquire(wire.data);
                    existing.set_state(NodeState::Local);
                    existing.set_owner_rank(self.rank);
                    self.locations.set_local(wire.id);
                }
            }
            None => {
                let state = if authoritative { NodeState::Local } else { NodeState::Distant };
                let owner = if authoritative { self.rank } else { wire.id.origin_rank() };
                self.nodes
                    .insert(wire.id, Node::new(wire.id, wire.weight, wire.data, owner, state));
                if authoritative {
                    self.locations.set_local(wire.id);
                } else {
                    self.locations.set_distant(wire.id, owner);
                }
                self.on_insert_node.fire(&wire.id);
            }
        }
    }

    /// Imports an edge migrated during `distribute`, deduplicating by id
    /// (the same edge may arrive from both endpoints' origin processes in a
    /// single `distribute`, spec §4.I).
    pub fn import_edge(&mut self, wire: EdgeWire<D>) {
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        import_edge_wire(wire, &mut self.nodes, &mut self.edges, &mut self.locations, self.rank, Some(callbacks));
    }

    /// Re-creates an edge read back from a [`breakpoint`][crate::breakpoint]
    /// dump. Shares `import_edge`'s placeholder-creation and adjacency-
    /// linking logic but fires no callbacks: a restore re-establishes state
    /// that already existed at dump time, it doesn't create anything new.
    pub fn restore_edge(&mut self, wire: EdgeWire<D>) {
        import_edge_wire(wire, &mut self.nodes, &mut self.edges, &mut self.locations, self.rank, None);
    }

    /// Re-creates a node read back from a [`breakpoint`][crate::breakpoint]
    /// dump, classifying LOCAL/DISTANT by comparing `owner` to `self.rank`.
    /// Uses [`LocationManager::add_managed`] rather than `set_local`/
    /// `set_distant` so no callbacks fire: a restore re-establishes
    /// pre-existing state, it isn't a fresh creation.
    pub fn restore_node(&mut self, id: DistributedId, weight: f32, data: D, owner: Rank) {
        let state = if owner == self.rank { NodeState::Local } else { NodeState::Distant };
        self.nodes.insert(id, Node::new(id, weight, data, owner, state));
        self.locations.add_managed(id, owner);
    }

    /// Re-registers an id's owner with the [`LocationManager`] without the
    /// node itself (the locations table tracks every id the process has
    /// ever seen, not just the ones it has a replica for).
    pub fn restore_location(&mut self, id: DistributedId, owner: Rank) {
        self.locations.add_managed(id, owner);
    }

    /// Advances this process's id counter past `past`, so newly minted ids
    /// never collide with ones restored from a breakpoint dump.
    pub fn fast_forward_id_counter(&mut self, past: u64) {
        self.id_counter.fast_forward_past(past);
    }

    /// Collective rebalance (spec §4.I): exports every LOCAL node whose
    /// `partition` target differs from `self.rank`, together with its
    /// weight, data snapshot, and every LOCAL-here incident edge; imports
    /// whatever other processes ship us in turn; reconciles ownership
    /// cluster-wide; and synchronizes to settle links and data. Per §9's
    /// open question on distribute/synchronize ordering, `distribute` is
    /// self-sufficient and never requires a prior `synchronize()`.
    pub fn distribute<T: Transport>(&mut self, partition: &Partition, transport: &T) -> Result<(), Error> {
        let _span = crate::logging::rank_span("distribute", transport.rank()).entered();
        let my_rank = transport.rank();
        let mut exported_nodes: BTreeMap<Rank, Vec<Vec<u8>>> = BTreeMap::new();
        let mut exported_edges: BTreeMap<Rank, Vec<Vec<u8>>> = BTreeMap::new();
        let mut location_updates: BTreeMap<DistributedId, Rank> = BTreeMap::new();

        let to_export: Vec<DistributedId> = self
            .locations
            .local_nodes()
            .filter(|id| partition.target_of(*id).is_some_and(|target| target != my_rank))
            .collect();

        for id in &to_export {
            let target = partition.target_of(*id).unwrap();
            let node = self.nodes.get(id).expect("local_nodes tracks exactly the nodes map's LOCAL ids");
            let wire = NodeWire {
                id: *id,
                weight: node.weight(),
                data: node.data().clone(),
            };
            let mut pack = Pack::new();
            pack.put(&wire)?;
            exported_nodes.entry(target).or_default().push(pack.into_bytes());
            location_updates.insert(*id, target);
        }

        for edge in self.edges.values().filter(|e| e.state() == NodeState::Local) {
            let source_exported = to_export.contains(&edge.source());
            let target_exported = to_export.contains(&edge.target());
            if !source_exported && !target_exported {
                continue;
            }
            let source_owner = partition.target_of(edge.source()).unwrap_or(my_rank);
            let target_owner = partition.target_of(edge.target()).unwrap_or(my_rank);
            let wire = EdgeWire {
                id: edge.id(),
                layer: edge.layer(),
                weight: edge.weight(),
                source_id: edge.source(),
                source_owner,
                target_id: edge.target(),
                target_owner,
                source_data: self.nodes.get(&edge.source()).expect("endpoint known locally").data().clone(),
                target_data: self.nodes.get(&edge.target()).expect("endpoint known locally").data().clone(),
            };
            let mut pack = Pack::new();
            pack.put(&wire)?;
            let bytes = pack.into_bytes();
            for owner in [source_owner, target_owner] {
                if source_exported && owner == source_owner || target_exported && owner == target_owner {
                    exported_edges.entry(owner).or_default().push(bytes.clone());
                }
            }
        }

        // Step 3: an edge whose both endpoints are migrating away is not
        // retained here as DISTANT (spec §4.I): drop it outright, mirroring
        // its adjacency entries on whichever endpoint nodes still exist.
        // An edge with exactly one endpoint migrating stays, demoted to
        // DISTANT since one endpoint is no longer LOCAL here.
        let to_export_set: BTreeSet<DistributedId> = to_export.iter().copied().collect();
        let fully_migrated_edges: Vec<DistributedId> = self
            .edges
            .values()
            .filter(|e| to_export_set.contains(&e.source()) && to_export_set.contains(&e.target()))
            .map(|e| e.id())
            .collect();
        for edge_id in fully_migrated_edges {
            if let Some(edge) = self.edges.remove(&edge_id) {
                if let Some(n) = self.nodes.get_mut(&edge.source()) {
                    n.unlink_out(edge.layer(), edge_id);
                }
                if let Some(n) = self.nodes.get_mut(&edge.target()) {
                    n.unlink_in(edge.layer(), edge_id);
                }
            }
        }
        for edge in self.edges.values_mut() {
            if to_export_set.contains(&edge.source()) || to_export_set.contains(&edge.target()) {
                edge.set_state(NodeState::Distant);
            }
        }

        // Step 3 (cont'd): demote or drop exported nodes locally. A node
        // whose every incident edge also migrated away (pruned above) is
        // dropped entirely; otherwise it becomes a DISTANT cache of its new
        // owner.
        for id in &to_export {
            let target = partition.target_of(*id).unwrap();
            let still_referenced = self.edges.values().any(|e| e.source() == *id || e.target() == *id);
            if still_referenced {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.set_state(NodeState::Distant);
                    node.set_owner_rank(target);
                }
                self.locations.set_distant(*id, target);
            } else {
                self.nodes.remove(id);
                self.locations.remove_managed(*id);
                self.on_erase_node.fire(id);
            }
        }

        let incoming_nodes = transport.all_to_all(exported_nodes)?;
        for (_, batch) in &incoming_nodes {
            for bytes in batch {
                let mut pack = Pack::from_bytes(bytes.clone());
                let wire: NodeWire<D> = pack.get()?;
                self.import_node(wire, true);
            }
        }

        let incoming_edges = transport.all_to_all(exported_edges)?;
        for (_, batch) in &incoming_edges {
            for bytes in batch {
                let mut pack = Pack::from_bytes(bytes.clone());
                let wire: EdgeWire<D> = pack.get()?;
                self.import_edge(wire);
            }
        }

        self.locations.update_locations(transport, &location_updates)?;
        tracing::debug!(exported = to_export.len(), "distribute: exported nodes");
        self.synchronize(transport)?;
        Ok(())
    }

    /// Delegates to the active sync mode. Collective; must be called
    /// outside of any mutex operation (spec §4.I).
    pub fn synchronize<T: Transport>(&mut self, transport: &T) -> Result<(), Error> {
        let _span = crate::logging::rank_span("synchronize", transport.rank()).entered();
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .synchronize(&mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }

    /// Drains one pending protocol message, if any, without blocking; the
    /// Hard mode's answer to spec §5's cooperative suspension-point rule
    /// for callers that want to drive the server loop explicitly (e.g. a
    /// task that wants to stay responsive between its own mutex calls).
    pub fn poll<T: Transport>(&mut self, transport: &T) -> Result<bool, Error> {
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .poll(transport, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks)
    }

    pub fn read<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<D, Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .read(id, owner, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }

    pub fn release_read<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<(), Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .release_read(id, owner, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }

    pub fn acquire<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<D, Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .acquire(id, owner, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }

    pub fn release_acquire<T: Transport>(
        &mut self,
        id: DistributedId,
        new_value: D,
        transport: &T,
    ) -> Result<(), Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync.release_acquire(
            id,
            owner,
            new_value,
            &mut self.nodes,
            &mut self.edges,
            &mut self.locations,
            callbacks,
            transport,
        )
    }

    pub fn lock<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<(), Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .lock(id, owner, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }

    pub fn unlock<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<(), Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .unlock(id, owner, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }

    pub fn lock_shared<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<(), Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .lock_shared(id, owner, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }

    pub fn unlock_shared<T: Transport>(&mut self, id: DistributedId, transport: &T) -> Result<(), Error> {
        let owner = self.locations.location_of(id).ok_or(Error::UnknownNode(id))?;
        let callbacks = CallbackRegistries::new(
            &self.on_insert_node,
            &self.on_erase_node,
            &self.on_insert_edge,
            &self.on_erase_edge,
        );
        self.sync
            .unlock_shared(id, owner, &mut self.nodes, &mut self.edges, &mut self.locations, callbacks, transport)
    }
}

/// Imports an edge and, for whichever endpoints aren't already known, a
/// placeholder replica, deduplicating by id. Shared by `DistributedGraph`'s
/// own `distribute`/breakpoint-restore paths and by both sync modes' inbound
/// migration handling, so every source of a migrated edge fires the same
/// `on_insert_node`/`on_insert_edge` callbacks (or, for a breakpoint
/// restore, fires none: pass `callbacks: None`).
pub(crate) fn import_edge_wire<D>(
    wire: EdgeWire<D>,
    nodes: &mut BTreeMap<DistributedId, Node<D>>,
    edges: &mut BTreeMap<DistributedId, Edge>,
    locations: &mut LocationManager,
    my_rank: Rank,
    callbacks: Option<CallbackRegistries<DistributedId>>,
) {
    if edges.contains_key(&wire.id) {
        return;
    }
    ensure_placeholder(wire.source_id, wire.source_owner, wire.source_data, nodes, locations, my_rank, callbacks);
    ensure_placeholder(wire.target_id, wire.target_owner, wire.target_data, nodes, locations, my_rank, callbacks);

    let mut edge = Edge::new(wire.id, wire.layer, wire.weight, wire.source_id, wire.target_id);
    let local = wire.source_owner == my_rank && wire.target_owner == my_rank;
    edge.set_state(if local { NodeState::Local } else { NodeState::Distant });
    if let Some(source) = nodes.get_mut(&wire.source_id) {
        source.link_out(edge.layer(), edge.id(), wire.target_id);
    }
    if let Some(target) = nodes.get_mut(&wire.target_id) {
        target.link_in(edge.layer(), edge.id(), wire.source_id);
    }
    let edge_id = edge.id();
    edges.insert(wire.id, edge);
    if let Some(cb) = callbacks {
        cb.on_insert_edge.fire(&edge_id);
    }
}

fn ensure_placeholder<D>(
    id: DistributedId,
    owner: Rank,
    data: D,
    nodes: &mut BTreeMap<DistributedId, Node<D>>,
    locations: &mut LocationManager,
    my_rank: Rank,
    callbacks: Option<CallbackRegistries<DistributedId>>,
) {
    if nodes.contains_key(&id) {
        return;
    }
    let state = if owner == my_rank { NodeState::Local } else { NodeState::Distant };
    nodes.insert(id, Node::new(id, 0.0, data, owner, state));
    locations.add_managed(id, owner);
    if let Some(cb) = callbacks {
        cb.on_insert_node.fire(&id);
    }
}

/// Drops a replica that no longer has any edge referencing it, firing
/// `on_erase_node` when it actually does so (spec §4.M: callbacks fire
/// synchronously at the point of the event). A LOCAL node is never dropped
/// this way: only a DISTANT cache can become an orphan.
pub(crate) fn erase_if_orphaned<D>(
    id: DistributedId,
    nodes: &mut BTreeMap<DistributedId, Node<D>>,
    edges: &BTreeMap<DistributedId, Edge>,
    locations: &mut LocationManager,
    callbacks: Option<CallbackRegistries<DistributedId>>,
) {
    let is_local = nodes.get(&id).map(|n| n.state() == NodeState::Local).unwrap_or(false);
    if is_local {
        return;
    }
    let still_referenced = edges.values().any(|e| e.source() == id || e.target() == id);
    if !still_referenced && nodes.remove(&id).is_some() {
        locations.remove_managed(id);
        if let Some(cb) = callbacks {
            cb.on_erase_node.fire(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpmas_transport::ProcessTransport;

    #[test]
    fn single_process_self_loop() {
        // S1: P=1, build_node, link(n, n, 0), increment data once.
        let cluster = ProcessTransport::new_cluster(1);
        let t = cluster.into_iter().next().unwrap();
        let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
        let n = graph.build_node(0);
        graph.link(n, n, 0, &t).unwrap();

        let current = graph.acquire(n, &t).unwrap();
        graph.release_acquire(n, current + 1, &t).unwrap();

        assert_eq!(*graph.node(n).unwrap().data(), 1);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node(n).unwrap().in_neighbors(0).count(), 1);
        assert_eq!(graph.node(n).unwrap().out_neighbors(0).count(), 1);
    }

    #[test]
    fn two_process_distribute_produces_distant_replicas() {
        // S2: P=2, n0/n1 on rank 0, two edges, partition splits them.
        let cluster = ProcessTransport::new_cluster(2);
        std::thread::scope(|scope| {
            let mut transports: Vec<_> = cluster.into_iter().collect();
            let t1 = transports.pop().unwrap();
            let t0 = transports.pop().unwrap();

            scope.spawn(move || {
                let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
                let n0 = graph.build_node(10);
                let n1 = graph.build_node(11);
                graph.link(n0, n1, 0, &t0).unwrap();
                graph.link(n1, n0, 0, &t0).unwrap();

                let mut partition = Partition::new();
                partition.insert(n0, 0);
                partition.insert(n1, 1);
                graph.distribute(&partition, &t0).unwrap();

                assert_eq!(graph.node(n0).unwrap().state(), NodeState::Local);
                assert_eq!(graph.node(n1).unwrap().state(), NodeState::Distant);
                assert_eq!(graph.edge_count(), 2);
            });
            scope.spawn(move || {
                let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(1);
                let partition = Partition::new();
                graph.distribute(&partition, &t1).unwrap();

                assert_eq!(graph.node_count(), 2);
                assert_eq!(graph.edge_count(), 2);
            });
        });
    }

    #[test]
    fn distribute_drops_edges_whose_both_endpoints_migrate_away() {
        // P=3, rank 0 owns n0-n1-n2 (edges n0->n1, n1->n2), partitions
        // n1 to rank 1 and n2 to rank 2. n1->n2 has both endpoints migrating
        // away from rank 0 and must not survive there as a DISTANT edge
        // (spec §4.I step 3); n0->n1 has only one endpoint migrating and
        // must survive, demoted to DISTANT.
        crate::testing::run_cluster_indexed(3, |rank, t| {
            if rank == 0 {
                let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
                let n0 = graph.build_node(0);
                let n1 = graph.build_node(1);
                let n2 = graph.build_node(2);
                graph.link(n0, n1, 0, &t).unwrap();
                graph.link(n1, n2, 0, &t).unwrap();

                let mut partition = Partition::new();
                partition.insert(n0, 0);
                partition.insert(n1, 1);
                partition.insert(n2, 2);
                graph.distribute(&partition, &t).unwrap();

                assert_eq!(graph.node_count(), 2, "n2 should be fully dropped here");
                assert_eq!(graph.edge_count(), 1, "n1->n2 must not survive as DISTANT here");
                assert!(graph.node(n0).is_some());
                assert_eq!(graph.node(n0).unwrap().state(), NodeState::Local);
                assert_eq!(graph.node(n1).unwrap().state(), NodeState::Distant);
                assert!(graph.node(n2).is_none());
            } else {
                let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(rank as Rank);
                let partition = Partition::new();
                graph.distribute(&partition, &t).unwrap();
                if rank == 1 {
                    // Gets n1 (its own, LOCAL) plus a DISTANT placeholder
                    // for each of n0 (via n0->n1) and n2 (via n1->n2).
                    assert_eq!(graph.node_count(), 3);
                    assert_eq!(graph.edge_count(), 2);
                } else {
                    // rank 2 gets n2 (LOCAL) plus a DISTANT placeholder for
                    // n1 (via n1->n2 only; n0->n1 was never routed here).
                    assert_eq!(graph.node_count(), 2);
                    assert_eq!(graph.edge_count(), 1);
                }
            }
        });
    }

    #[test]
    fn remove_node_unlinks_every_incident_edge_first() {
        let cluster = ProcessTransport::new_cluster(1);
        let t = cluster.into_iter().next().unwrap();
        let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
        let a = graph.build_node(0);
        let b = graph.build_node(1);
        graph.link(a, b, 0, &t).unwrap();
        graph.link(b, a, 0, &t).unwrap();

        graph.remove_node(a, &t).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node(b).unwrap().in_neighbors(0).count(), 0);
        assert_eq!(graph.node(b).unwrap().out_neighbors(0).count(), 0);
    }
}
