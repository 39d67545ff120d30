//! A distributed agent-based modeling kernel: a shared graph partitioned
//! across cooperating processes, advanced through scheduled jobs of tasks.
//!
//! The graph ([`graph::DistributedGraph`]) is the core: nodes and edges
//! carrying opaque application data, replicated as LOCAL (owned here) or
//! DISTANT (a read-mostly cache of another process's copy) and kept
//! consistent by one of two sync modes (`sync::SyncMode`). A `Scheduler`
//! composes application behavior into tasks, jobs, and epochs; a `Runtime`
//! drives them across a date range. `context` wires a process into a
//! cluster; `breakpoint` checkpoints a graph to storage; `testing` spins up
//! an in-process multi-rank cluster for exercising all of the above without
//! a real network.

pub mod breakpoint;
pub mod callbacks;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod id;
pub mod logging;
pub mod partition;
pub mod runtime;
pub mod scheduler;
pub mod sync;
pub mod testing;
pub mod wire;

pub use callbacks::Registry;
pub use config::RuntimeConfig;
pub use error::{CodecError, Error};
pub use graph::{DistributedGraph, Edge, LayerId, Node, NodeState};
pub use id::{DistributedId, IdCounter};
pub use partition::{FixedVertices, NodeHint, Partition, Partitioner, StaticPartitioner};
pub use runtime::Runtime;
pub use scheduler::{task, Epoch, Job, JobId, Scheduler, Task, TaskHandle, TimeStep};
pub use sync::SyncMode;

pub use fpmas_transport::{Rank, Transport};
