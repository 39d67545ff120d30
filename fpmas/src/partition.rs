//! Partitioner interface, per spec §4.J.
//!
//! The core treats a partitioner as a black box that consumes a `NodeMap`
//! and produces a `PartitionMap`; the actual balancing algorithm (METIS,
//! Zoltan, or anything else) is explicitly out of scope (spec §1). What
//! ships here is the trait, a `Partition` value type, and the one concrete
//! implementation the core itself needs: the degenerate static partitioner
//! used to opt a time step out of rebalancing.

use std::collections::BTreeMap;

use fpmas_transport::Rank;

use crate::id::DistributedId;

/// A mapping `id -> target_rank`, produced by a [`Partitioner`].
#[derive(Debug, Clone, Default)]
pub struct Partition {
    targets: BTreeMap<DistributedId, Rank>,
}

impl Partition {
    pub fn new() -> Self {
        Partition::default()
    }

    pub fn insert(&mut self, id: DistributedId, rank: Rank) {
        self.targets.insert(id, rank);
    }

    /// The target rank for `id`, if the partitioner assigned one.
    pub fn target_of(&self, id: DistributedId) -> Option<Rank> {
        self.targets.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DistributedId, Rank)> + '_ {
        self.targets.iter().map(|(id, rank)| (*id, *rank))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A hint describing one node to balance: its id, its current owner, and its
/// weight (the partitioner "may use node weights and edge weights as
/// hints" per spec §4.J).
#[derive(Debug, Clone, Copy)]
pub struct NodeHint {
    pub id: DistributedId,
    pub current_owner: Rank,
    pub weight: f32,
}

/// A pinning constraint for the `FixedVertices` balancing variant: these ids
/// must land on the given rank regardless of what the balancing heuristic
/// would otherwise choose.
pub type FixedVertices = BTreeMap<DistributedId, Rank>;

/// Collective, blocking: called once per load-balancing step.
pub trait Partitioner {
    /// Balances `nodes` freely.
    fn balance(&mut self, nodes: &[NodeHint]) -> Partition;

    /// Balances `nodes`, but every id present in `fixed` must be assigned to
    /// `fixed[id]`. The default implementation runs the free balance and
    /// then overwrites the pinned entries, which is correct but not
    /// necessarily what a weight-aware partitioner would produce; real
    /// partitioners should override this directly.
    fn balance_fixed(&mut self, nodes: &[NodeHint], fixed: &FixedVertices) -> Partition {
        let mut partition = self.balance(nodes);
        for (&id, &rank) in fixed {
            partition.insert(id, rank);
        }
        partition
    }
}

/// The degenerate partitioner: returns the current owner for every node.
/// Used to support rebalancing opt-out for a given time step (spec §4.J).
pub struct StaticPartitioner;

impl Partitioner for StaticPartitioner {
    fn balance(&mut self, nodes: &[NodeHint]) -> Partition {
        let mut partition = Partition::new();
        for hint in nodes {
            partition.insert(hint.id, hint.current_owner);
        }
        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdCounter;

    #[test]
    fn static_partitioner_is_a_no_op() {
        let counter = IdCounter::new(0);
        let a = counter.new_on(0);
        let b = counter.new_on(0);
        let nodes = vec![
            NodeHint {
                id: a,
                current_owner: 0,
                weight: 1.0,
            },
            NodeHint {
                id: b,
                current_owner: 1,
                weight: 1.0,
            },
        ];
        let partition = StaticPartitioner.balance(&nodes);
        assert_eq!(partition.target_of(a), Some(0));
        assert_eq!(partition.target_of(b), Some(1));
    }

    #[test]
    fn fixed_vertices_override_the_free_balance() {
        let counter = IdCounter::new(0);
        let a = counter.new_on(0);
        let nodes = vec![NodeHint {
            id: a,
            current_owner: 0,
            weight: 1.0,
        }];
        let mut fixed = FixedVertices::new();
        fixed.insert(a, 7);
        let partition = StaticPartitioner.balance_fixed(&nodes, &fixed);
        assert_eq!(partition.target_of(a), Some(7));
    }
}
