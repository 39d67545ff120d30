//! Ghost sync mode: epoch-batched, eventually consistent (spec §4.G).
//!
//! Between two `synchronize()` calls, reads of a DISTANT node return the
//! snapshot taken at the last synchronize; writes to LOCAL nodes are
//! locally visible immediately but only reach other processes at the next
//! synchronize. Link/unlink are buffered and flushed by synchronize's first
//! two phases; the third phase refreshes every DISTANT replica's cached
//! data from its owner.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};

use fpmas_transport::{Rank, Transport};

use crate::callbacks::CallbackRegistries;
use crate::codec::Pack;
use crate::error::Error;
use crate::graph::distributed_graph::{erase_if_orphaned, import_edge_wire};
use crate::graph::edge::Edge;
use crate::graph::location_manager::LocationManager;
use crate::graph::node::Node;
use crate::id::DistributedId;
use crate::wire::{EdgeWire, NodeUpdatePack};

/// A buffered edge creation awaiting the next synchronize's link-migration
/// phase.
#[derive(Debug, Clone, Copy)]
struct PendingLink {
    edge_id: DistributedId,
}

/// A buffered unlink: the edge is already gone from local storage by the
/// time synchronize flushes this, so the owner it must be reported to is
/// captured at buffering time.
#[derive(Debug, Clone, Copy)]
struct PendingUnlink {
    edge_id: DistributedId,
    owner: Rank,
}

pub struct GhostSync {
    pending_links: Vec<PendingLink>,
    pending_unlinks: Vec<PendingUnlink>,
}

impl Default for GhostSync {
    fn default() -> Self {
        GhostSync {
            pending_links: Vec::new(),
            pending_unlinks: Vec::new(),
        }
    }
}

impl GhostSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a locally-created edge for migration at the next synchronize.
    /// A no-op if both endpoints are LOCAL (nothing to migrate).
    pub fn buffer_link(&mut self, edge_id: DistributedId) {
        self.pending_links.push(PendingLink { edge_id });
    }

    /// Buffers an unlink whose endpoint at `owner` must learn about it.
    pub fn buffer_unlink(&mut self, edge_id: DistributedId, owner: Rank) {
        self.pending_unlinks.push(PendingUnlink { edge_id, owner });
    }

    pub fn synchronize<D, T>(
        &mut self,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error>
    where
        D: Serialize + DeserializeOwned + Clone,
        T: Transport,
    {
        tracing::debug!(
            pending_links = self.pending_links.len(),
            pending_unlinks = self.pending_unlinks.len(),
            "ghost synchronize: flushing buffered migrations"
        );
        self.migrate_links(nodes, edges, locations, callbacks, transport)?;
        self.migrate_unlinks(edges, nodes, locations, callbacks, transport)?;
        self.refresh_distant_data(nodes, locations, transport)?;
        Ok(())
    }

    fn migrate_links<D, T>(
        &mut self,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error>
    where
        D: Serialize + DeserializeOwned + Clone,
        T: Transport,
    {
        let my_rank = transport.rank();
        let mut outgoing: BTreeMap<Rank, Vec<Vec<u8>>> = BTreeMap::new();

        for pending in self.pending_links.drain(..) {
            let Some(edge) = edges.get(&pending.edge_id) else {
                continue;
            };
            let source_owner = locations.location_of(edge.source()).unwrap_or(my_rank);
            let target_owner = locations.location_of(edge.target()).unwrap_or(my_rank);
            let source_data = nodes.get(&edge.source()).map(|n| n.data().clone());
            let target_data = nodes.get(&edge.target()).map(|n| n.data().clone());
            let (Some(source_data), Some(target_data)) = (source_data, target_data) else {
                continue;
            };
            let wire = EdgeWire {
                id: edge.id(),
                layer: edge.layer(),
                weight: edge.weight(),
                source_id: edge.source(),
                source_owner,
                target_id: edge.target(),
                target_owner,
                source_data,
                target_data,
            };
            let mut pack = Pack::new();
            pack.put(&wire)?;
            let bytes = pack.into_bytes();
            for owner in [source_owner, target_owner] {
                if owner != my_rank {
                    outgoing.entry(owner).or_default().push(bytes.clone());
                }
            }
        }

        let incoming = transport.all_to_all(outgoing)?;
        for (_, batch) in incoming {
            for bytes in batch {
                let mut pack = Pack::from_bytes(bytes);
                let wire: EdgeWire<D> = pack.get()?;
                import_edge_wire(wire, nodes, edges, locations, my_rank, Some(callbacks));
            }
        }
        Ok(())
    }

    fn migrate_unlinks<D, T>(
        &mut self,
        edges: &mut BTreeMap<DistributedId, Edge>,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error>
    where
        T: Transport,
    {
        let my_rank = transport.rank();
        let mut outgoing: BTreeMap<Rank, Vec<DistributedId>> = BTreeMap::new();
        for pending in self.pending_unlinks.drain(..) {
            if pending.owner != my_rank {
                outgoing.entry(pending.owner).or_default().push(pending.edge_id);
            }
        }

        let incoming = transport.all_to_all(outgoing)?;
        for (_, ids) in incoming {
            for edge_id in ids {
                if let Some(edge) = edges.remove(&edge_id) {
                    erase_if_orphaned(edge.source(), nodes, edges, locations, Some(callbacks));
                    erase_if_orphaned(edge.target(), nodes, edges, locations, Some(callbacks));
                }
            }
        }
        Ok(())
    }

    fn refresh_distant_data<D, T>(
        &mut self,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        locations: &mut LocationManager,
        transport: &T,
    ) -> Result<(), Error>
    where
        D: Serialize + DeserializeOwned + Clone,
        T: Transport,
    {
        // Ask every owner we hold a DISTANT replica for, for a refresh.
        let mut requests: BTreeMap<Rank, Vec<DistributedId>> = BTreeMap::new();
        for id in locations.distant_nodes() {
            if let Some(owner) = locations.location_of(id) {
                requests.entry(owner).or_default().push(id);
            }
        }
        let incoming_requests = transport.all_to_all(requests)?;

        // Answer requests for our own LOCAL nodes.
        let mut replies: BTreeMap<Rank, Vec<NodeUpdatePack<D>>> = BTreeMap::new();
        for (requester, ids) in &incoming_requests {
            for &id in ids {
                if let Some(node) = nodes.get(&id) {
                    replies.entry(*requester).or_default().push(NodeUpdatePack {
                        id,
                        data: node.data().clone(),
                        weight: node.weight(),
                    });
                }
            }
        }
        let outgoing: BTreeMap<Rank, Vec<Vec<u8>>> = replies
            .into_iter()
            .map(|(rank, updates)| {
                let encoded = updates
                    .into_iter()
                    .map(|update| {
                        let mut pack = Pack::new();
                        pack.put(&update).expect("NodeUpdatePack always encodes");
                        pack.into_bytes()
                    })
                    .collect();
                (rank, encoded)
            })
            .collect();
        let incoming_replies = transport.all_to_all(outgoing)?;

        for (_, batch) in incoming_replies {
            for bytes in batch {
                let mut pack = Pack::from_bytes(bytes);
                let update: NodeUpdatePack<D> = pack.get()?;
                if let Some(node) = nodes.get_mut(&update.id) {
                    node.set_weight(update.weight);
                    // Ghost mode overwrites caches outright; there is no
                    // outstanding local lock to conflict with since a
                    // DISTANT node is never held exclusively under Ghost.
                    let _ = node.try_acquire();
                    node.release_acquire(update.data)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Registry;
    use crate::graph::node::NodeState;
    use crate::id::IdCounter;
    use fpmas_transport::ProcessTransport;

    #[test]
    fn link_migration_creates_placeholder_on_the_peer() {
        let cluster = ProcessTransport::new_cluster(2);
        let counter = IdCounter::new(0);
        let a = counter.new_on(0);
        let b_counter = IdCounter::new(1);

        std::thread::scope(|scope| {
            let mut transports: Vec<_> = cluster.into_iter().collect();
            let t1 = transports.pop().unwrap();
            let t0 = transports.pop().unwrap();

            let a_for_rank0 = a;
            scope.spawn(move || {
                let mut nodes: BTreeMap<DistributedId, Node<i32>> = BTreeMap::new();
                let mut edges: BTreeMap<DistributedId, Edge> = BTreeMap::new();
                let mut locations = LocationManager::new(0);
                let mut sync = GhostSync::new();

                nodes.insert(a_for_rank0, Node::new(a_for_rank0, 1.0, 7, 0, NodeState::Local));
                locations.add_managed(a_for_rank0, 0);
                // b is owned by rank 1; give it a DISTANT placeholder so an
                // edge can reference it.
                let b = b_counter.new_on(1);
                nodes.insert(b, Node::new(b, 1.0, 9, 1, NodeState::Distant));
                locations.add_managed(b, 1);

                let edge_id = IdCounter::new(0).new_on(0);
                edges.insert(edge_id, Edge::new(edge_id, 0, 1.0, a_for_rank0, b));
                sync.buffer_link(edge_id);
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
                sync.synchronize(&mut nodes, &mut edges, &mut locations, callbacks, &t0)
                    .unwrap();
            });
            scope.spawn(move || {
                let mut nodes: BTreeMap<DistributedId, Node<i32>> = BTreeMap::new();
                let mut edges: BTreeMap<DistributedId, Edge> = BTreeMap::new();
                let mut locations = LocationManager::new(1);
                let mut sync = GhostSync::new();
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
                sync.synchronize(&mut nodes, &mut edges, &mut locations, callbacks, &t1)
                    .unwrap();

                assert!(nodes.contains_key(&a));
                assert_eq!(edges.len(), 1);
            });
        });
    }
}
