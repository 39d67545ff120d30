//! Wire record shapes, per spec §6.
//!
//! Field order within each struct is the mandatory prefix order from the
//! spec; `serde`/`bincode` serialize struct fields in declaration order, so
//! matching that order here is enough to match the wire contract without
//! hand-rolled encoding.

use serde::{Deserialize, Serialize};

use fpmas_transport::Rank;

use crate::graph::node::LayerId;
use crate::id::DistributedId;

/// A node as migrated standalone during `distribute`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeWire<D> {
    pub id: DistributedId,
    pub weight: f32,
    pub data: D,
}

/// An edge as migrated by a sync mode's link machinery. Ships a full
/// snapshot of both endpoints so the receiver can stand up a placeholder
/// DISTANT node for whichever endpoint it does not already know.
#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeWire<D> {
    pub id: DistributedId,
    pub layer: LayerId,
    pub weight: f32,
    pub source_id: DistributedId,
    pub source_owner: Rank,
    pub target_id: DistributedId,
    pub target_owner: Rank,
    pub source_data: D,
    pub target_data: D,
}

/// `id ∥ source(i32) ∥ kind(i32)`, per spec §6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MutexRequestWire {
    pub id: DistributedId,
    pub source: Rank,
    pub kind: i32,
}

/// `id ∥ pack(T)`, the payload a `release_acquire` publishes to the owner.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataUpdatePack<D> {
    pub id: DistributedId,
    pub data: D,
}

/// `id ∥ pack(T) ∥ weight(f32)`, the payload a Ghost data-refresh round
/// answers with: unlike `DataUpdatePack`, it also carries the current
/// weight, since Ghost's data refresh is the only place a DISTANT replica's
/// weight gets updated (grounded in the original's `DataUpdatePack`
/// weight-bearing variant used by its ghost synchronization).
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeUpdatePack<D> {
    pub id: DistributedId,
    pub data: D,
    pub weight: f32,
}

/// An edge id together with the owner it must be reported to when
/// unlinked while buffered (Ghost mode only needs the id; the owner is
/// recorded at buffering time since the edge itself is gone by flush time).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnlinkWire {
    pub edge_id: DistributedId,
}
