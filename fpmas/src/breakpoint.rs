//! Breakpointing: dumping and restoring one process's share of the graph to
//! a byte buffer, per spec §6.
//!
//! A breakpoint captures exactly what this process is authoritative for —
//! its LOCAL nodes, its LOCAL edges, and the locations map it has accrued —
//! as a length-prefixed sequence of node records then edge records then
//! location records, using the same [`Pack`] codec as the wire (spec §6:
//! "dumps the LOCAL nodes and edges of this process plus the locations map
//! into a length-prefixed sequence of node records then edge records").
//! `bincode`'s own `Vec<T>` encoding already length-prefixes, so three
//! `pack.put(&Vec<_>)` calls are enough; no hand-rolled framing is needed.
//!
//! Loading only re-establishes LOCAL/DISTANT classification from owner-rank
//! comparisons (spec §6): a `synchronize()` afterwards is required before
//! any read on a restored DISTANT node returns meaningful data.

use serde::{de::DeserializeOwned, Serialize};

use crate::codec::Pack;
use crate::error::Result;
use crate::graph::node::NodeState;
use crate::graph::DistributedGraph;
use crate::wire::{EdgeWire, NodeWire};

/// Dumps every LOCAL node and edge this process owns, plus its full
/// locations table, to a byte buffer suitable for [`load`].
pub fn dump<D>(graph: &DistributedGraph<D>) -> Result<Vec<u8>>
where
    D: Serialize + DeserializeOwned + Clone,
{
    let nodes: Vec<NodeWire<D>> = graph
        .nodes()
        .filter(|n| n.state() == NodeState::Local)
        .map(|n| NodeWire {
            id: n.id(),
            weight: n.weight(),
            data: n.data().clone(),
        })
        .collect();

    let edges: Vec<EdgeWire<D>> = graph
        .edges()
        .filter(|e| e.state() == NodeState::Local)
        .map(|e| EdgeWire {
            id: e.id(),
            layer: e.layer(),
            weight: e.weight(),
            source_id: e.source(),
            source_owner: graph.rank(),
            target_id: e.target(),
            target_owner: graph.rank(),
            source_data: graph.node(e.source()).expect("local edge endpoint known locally").data().clone(),
            target_data: graph.node(e.target()).expect("local edge endpoint known locally").data().clone(),
        })
        .collect();

    let locations: Vec<(crate::id::DistributedId, fpmas_transport::Rank)> = graph.locations().entries().collect();

    let mut pack = Pack::new();
    pack.put(&nodes)?;
    pack.put(&edges)?;
    pack.put(&locations)?;
    Ok(pack.into_bytes())
}

/// Restores `graph` from a buffer previously produced by [`dump`].
/// Classifies each record LOCAL/DISTANT by comparing its owner rank to
/// `graph.rank()`, fast-forwards the id counter past the highest
/// `local_counter` seen among this rank's own ids (so future `build_node`/
/// `link` calls never reissue a restored id), and fires no callbacks: a
/// restore re-establishes state, it doesn't create anything new.
pub fn load<D>(bytes: Vec<u8>, graph: &mut DistributedGraph<D>) -> Result<()>
where
    D: Serialize + DeserializeOwned + Clone,
{
    let mut pack = Pack::from_bytes(bytes);
    let nodes: Vec<NodeWire<D>> = pack.get()?;
    let edges: Vec<EdgeWire<D>> = pack.get()?;
    let locations: Vec<(crate::id::DistributedId, fpmas_transport::Rank)> = pack.get()?;

    let mut highest_own_counter = None;
    for node in nodes {
        if node.id.origin_rank() == graph.rank() {
            highest_own_counter = Some(highest_own_counter.map_or(node.id.local_counter(), |h: u64| h.max(node.id.local_counter())));
        }
        graph.restore_node(node.id, node.weight, node.data, node.id.origin_rank());
    }
    for edge in edges {
        if edge.id.origin_rank() == graph.rank() {
            highest_own_counter = Some(highest_own_counter.map_or(edge.id.local_counter(), |h: u64| h.max(edge.id.local_counter())));
        }
        graph.restore_edge(edge);
    }
    for (id, owner) in locations {
        graph.restore_location(id, owner);
    }
    if let Some(past) = highest_own_counter {
        graph.fast_forward_id_counter(past);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpmas_transport::ProcessTransport;

    #[test]
    fn dump_and_load_round_trip_preserves_local_state() {
        let cluster = ProcessTransport::new_cluster(1);
        let t = cluster.into_iter().next().unwrap();
        let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
        let a = graph.build_node(7);
        let b = graph.build_node(9);
        graph.link(a, b, 0, &t).unwrap();

        let bytes = dump(&graph).unwrap();

        let mut restored: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
        load(bytes, &mut restored).unwrap();

        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 1);
        assert_eq!(*restored.node(a).unwrap().data(), 7);
        assert_eq!(*restored.node(b).unwrap().data(), 9);
        assert_eq!(restored.node(a).unwrap().out_neighbors(0).count(), 1);
        assert_eq!(restored.node(b).unwrap().in_neighbors(0).count(), 1);
    }

    #[test]
    fn load_fast_forwards_id_counter_past_restored_ids() {
        let mut graph: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
        let mut last = None;
        for i in 0..5 {
            last = Some(graph.build_node(i));
        }
        let bytes = dump(&graph).unwrap();

        let mut restored: DistributedGraph<i32> = DistributedGraph::new_ghost(0);
        load(bytes, &mut restored).unwrap();
        let fresh = restored.build_node(99);
        assert!(fresh.local_counter() > last.unwrap().local_counter());
    }
}
