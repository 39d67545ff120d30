//! The in-memory graph core: nodes, edges, location tracking, the local
//! mutex primitive, and the orchestrating `DistributedGraph` (spec §4.D,
//! §4.E, §4.F, §4.I).

pub mod distributed_graph;
pub mod edge;
pub mod location_manager;
pub mod mutex;
pub mod node;

pub use distributed_graph::DistributedGraph;
pub use edge::Edge;
pub use location_manager::LocationManager;
pub use mutex::{GhostMutex, Mutex};
pub use node::{LayerId, Node, NodeState};
