//! Rank-addressed point-to-point transport abstraction.
//!
//! This crate is the communication layer of `fpmas`. It is deliberately
//! ignorant of graphs, nodes, or scheduling: it offers exactly the contract
//! the core relies on (send/recv, nonblocking probe, barrier, all-to-all,
//! gather, reductions) and nothing more. The concrete wire transport (real
//! sockets, MPI, ...) is out of scope for this system; what ships here is the
//! trait plus an in-process implementation (`ProcessTransport`) built on
//! `crossbeam-channel`, used by every test in the workspace and by
//! `fpmas::testing`, the same role the teacher's `allocator::process::Process`
//! plays for `timely`'s in-process tests.

mod error;
mod process;
mod status;
mod tag;

use std::any::Any;
use std::collections::BTreeMap;

pub use error::TransportError;
pub use process::ProcessTransport;
pub use status::Status;
pub use tag::{Tag, TagKind};

/// A process rank. Matches the `int32` origin-rank used by `DistributedId`.
pub type Rank = i32;

/// Types that may travel across the transport.
///
/// The real wire transport would additionally require `Serialize`; that
/// bound lives on `fpmas::codec::Pack`, the component which actually owns
/// the wire format (spec §4.C). The transport itself only needs to move
/// values between threads.
pub trait Data: Send + 'static {}
impl<T: Send + 'static> Data for T {}

/// A handle to a nonblocking send. `ProcessTransport`'s channel sends
/// complete immediately, so `wait` is infallible once issued, but the type
/// exists so that a future real-network transport can make the handle
/// actually asynchronous without changing the trait.
pub struct SendHandle {
    pub(crate) result: Result<(), TransportError>,
}

impl SendHandle {
    pub fn wait(self) -> Result<(), TransportError> {
        self.result
    }
}

/// The contract the distributed graph core relies on. See spec §4.B.
pub trait Transport {
    /// This process's rank.
    fn rank(&self) -> Rank;
    /// Total number of ranks in the cluster.
    fn size(&self) -> usize;

    /// Blocking send of `value` to `dest` on `tag`.
    fn send<T: Data>(&self, value: T, dest: Rank, tag: Tag) -> Result<(), TransportError>;

    /// Nonblocking send; for the in-process transport this always completes
    /// before returning, but callers must still treat the handle as the
    /// only way to observe completion.
    fn send_nonblocking<T: Data>(
        &self,
        value: T,
        dest: Rank,
        tag: Tag,
    ) -> Result<SendHandle, TransportError>;

    /// Blocking receive. `source`/`tag` of `None` match anything.
    fn recv<T: Data>(
        &self,
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<(T, Status), TransportError>;

    /// Nonblocking probe: returns immediately with `Some(status)` if a
    /// matching message is already queued, `None` otherwise. Never consumes
    /// the message.
    fn probe(&self, source: Option<Rank>, tag: Option<Tag>) -> Result<Option<Status>, TransportError>;

    /// Collective barrier: returns only once every rank has called it.
    fn barrier(&self) -> Result<(), TransportError>;

    /// Collective all-to-all exchange: every rank supplies a (possibly
    /// empty) list of values destined for every other rank (including
    /// itself) and receives back the lists addressed to it, keyed by
    /// origin rank.
    fn all_to_all<T: Data>(
        &self,
        outgoing: BTreeMap<Rank, Vec<T>>,
    ) -> Result<BTreeMap<Rank, Vec<T>>, TransportError>;

    /// Collective gather: every rank contributes one value; `root` receives
    /// all of them ordered by rank, everyone else receives `None`.
    fn gather<T: Data>(&self, value: T, root: Rank) -> Result<Option<Vec<T>>, TransportError>;

    /// Collective reduction with a user-supplied associative operator.
    /// Implemented as a gather followed by a local fold on `root`; every
    /// non-root rank receives `None`.
    fn reduce<T: Data, F: Fn(T, T) -> T>(
        &self,
        value: T,
        op: F,
        root: Rank,
    ) -> Result<Option<T>, TransportError>;
}

pub(crate) type AnyPayload = Box<dyn Any + Send>;
