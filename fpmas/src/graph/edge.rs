//! In-memory edge model, per spec §4.D/§3.
//!
//! An `Edge` stores the ids of its endpoints, not references to the nodes
//! themselves (spec §9's arena redesign): lookups go through
//! `DistributedGraph`'s node arena, keyed by `DistributedId`. Unlike `Node`,
//! an edge carries no opaque application payload (spec §3 lists only id,
//! layer, weight, the two endpoint references, and state).

use crate::graph::node::{LayerId, NodeState};
use crate::id::DistributedId;

/// A directed edge on one layer, connecting `source` to `target`.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    id: DistributedId,
    layer: LayerId,
    weight: f32,
    source: DistributedId,
    target: DistributedId,
    state: NodeState,
}

impl Edge {
    pub fn new(
        id: DistributedId,
        layer: LayerId,
        weight: f32,
        source: DistributedId,
        target: DistributedId,
    ) -> Self {
        Edge {
            id,
            layer,
            weight,
            source,
            target,
            // Computed by the graph once both endpoints are known to it;
            // Distant is the conservative default for a freshly built edge.
            state: NodeState::Distant,
        }
    }

    pub fn id(&self) -> DistributedId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    pub fn source(&self) -> DistributedId {
        self.source
    }

    pub fn target(&self) -> DistributedId {
        self.target
    }

    /// `true` for a self-loop (source and target are the same node).
    pub fn is_loop(&self) -> bool {
        self.source == self.target
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// An edge is LOCAL iff both endpoints currently are; the graph
    /// recomputes and sets this whenever either endpoint's state changes.
    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdCounter;

    #[test]
    fn loop_detection() {
        let counter = IdCounter::new(0);
        let a = counter.new_on(0);
        let e = counter.new_on(0);
        let loop_edge = Edge::new(e, 0, 1.0, a, a);
        assert!(loop_edge.is_loop());

        let b = counter.new_on(0);
        let f = counter.new_on(0);
        let non_loop = Edge::new(f, 0, 1.0, a, b);
        assert!(!non_loop.is_loop());
    }
}
