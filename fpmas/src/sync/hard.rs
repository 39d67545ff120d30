//! Hard sync mode: on-demand, request/response, with four-color termination
//! detection (spec §4.H).
//!
//! Every process runs a `MutexServer` (arbitrates READ/ACQUIRE/LOCK/
//! LOCK_SHARED against its LOCAL nodes) and a link/unlink path that applies
//! inbound migration messages immediately. Both the mutex requester and the
//! server loop live on the one thread per process (spec §5): a blocking
//! `read`/`acquire` on a DISTANT node is cooperative — while waiting for a
//! reply it keeps calling [`HardSync::poll`] so this process can still
//! answer peers.
//!
//! Grounded on `original_source/src/synchro/hard/termination.h` (the
//! four-color ring) and `src/fpmas/api/synchro/hard/client_server.h` (the
//! `MutexRequest`/`MutexServer`/`LinkServer` split, including the
//! `LOCAL = -1` sentinel source used to interleave the owning process's own
//! requests with remote ones in the same FIFO).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{de::DeserializeOwned, Serialize};

use fpmas_transport::{Rank, Tag, TagKind, Transport};

use crate::callbacks::CallbackRegistries;
use crate::codec::Pack;
use crate::error::Error;
use crate::graph::distributed_graph::{erase_if_orphaned, import_edge_wire};
use crate::graph::edge::Edge;
use crate::graph::location_manager::LocationManager;
use crate::graph::node::Node;
use crate::id::DistributedId;
use crate::wire::{DataUpdatePack, EdgeWire, MutexRequestWire, UnlinkWire};

/// Sentinel source rank meaning "this process's own task", per spec §4.H.
pub const LOCAL: Rank = -1;

/// The six request kinds spec §4.H names. READ/LOCK_SHARED both grant a
/// shared hold and are released (by whichever process holds it) via
/// UNLOCK_SHARED; ACQUIRE/LOCK both grant an exclusive hold, released via
/// UNLOCK for LOCK and via the `DataUpdatePack`-carrying release-acquire
/// path for ACQUIRE (spec §4.H: "on release_acquire, the client sends a
/// DataUpdatePack... the server installs it, and then awakens the next
/// waiter").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Acquire,
    Lock,
    LockShared,
    Unlock,
    UnlockShared,
}

impl RequestKind {
    fn to_i32(self) -> i32 {
        match self {
            RequestKind::Read => 0,
            RequestKind::Acquire => 1,
            RequestKind::Lock => 2,
            RequestKind::LockShared => 3,
            RequestKind::Unlock => 4,
            RequestKind::UnlockShared => 5,
        }
    }

    fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(RequestKind::Read),
            1 => Some(RequestKind::Acquire),
            2 => Some(RequestKind::Lock),
            3 => Some(RequestKind::LockShared),
            4 => Some(RequestKind::Unlock),
            5 => Some(RequestKind::UnlockShared),
            _ => None,
        }
    }

    fn wants_data_reply(self) -> bool {
        matches!(self, RequestKind::Read | RequestKind::Acquire)
    }
}

struct PendingRequest {
    ticket: u64,
    source: Rank,
    kind: RequestKind,
}

/// Per-node FIFO arbitration plus the two servers (mutex, link) for this
/// process's LOCAL nodes. One `MutexServer` instance is shared by every
/// node this process owns.
#[derive(Default)]
struct MutexServer {
    next_ticket: u64,
    queues: BTreeMap<DistributedId, VecDeque<PendingRequest>>,
}

/// `(ticket, source, kind)` of one request the dispatcher granted.
type Grant = (u64, Rank, RequestKind);

impl MutexServer {
    /// Enqueues a grant-type request (Read/Acquire/Lock/LockShared) and
    /// immediately attempts to dispatch the queue against `node`'s current
    /// lock state. Returns this request's own ticket (so the caller can
    /// later recognize its own grant) plus every request the dispatch
    /// round granted, in queue order.
    fn request<D>(
        &mut self,
        id: DistributedId,
        source: Rank,
        kind: RequestKind,
        node: &mut Node<D>,
    ) -> (u64, Vec<Grant>) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.queues
            .entry(id)
            .or_default()
            .push_back(PendingRequest { ticket, source, kind });
        (ticket, self.dispatch(id, node))
    }

    /// Unlock/UnlockShared always proceed immediately (the caller already
    /// held the corresponding lock) and are never queued; applying one may
    /// free up the front of the queue, so we re-dispatch right after.
    fn release<D>(
        &mut self,
        id: DistributedId,
        kind: RequestKind,
        node: &mut Node<D>,
    ) -> Result<Vec<Grant>, Error> {
        match kind {
            RequestKind::Unlock => node.unlock()?,
            RequestKind::UnlockShared => node.unlock_shared()?,
            _ => unreachable!("only Unlock/UnlockShared release directly"),
        }
        Ok(self.dispatch(id, node))
    }

    fn dispatch<D>(&mut self, id: DistributedId, node: &mut Node<D>) -> Vec<Grant> {
        let mut granted = Vec::new();
        let queue = self.queues.entry(id).or_default();
        loop {
            let Some(front) = queue.front() else { break };
            let ok = match front.kind {
                RequestKind::Read => node.try_read().is_some(),
                RequestKind::Acquire => node.try_acquire().is_some(),
                RequestKind::Lock => node.try_lock(),
                RequestKind::LockShared => node.try_lock_shared(),
                RequestKind::Unlock | RequestKind::UnlockShared => {
                    unreachable!("release kinds are never queued")
                }
            };
            if !ok {
                break;
            }
            let req = queue.pop_front().unwrap();
            granted.push((req.ticket, req.source, req.kind));
        }
        granted
    }
}

/// Token color carried around the termination ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Color {
    White,
    Black,
}

/// The synchronize-epoch parity bit: toggled every time termination
/// completes, so messages from a just-finished synchronize can't be
/// consumed by the next one (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochParity {
    Even,
    Odd,
}

impl EpochParity {
    fn toggle(self) -> Self {
        match self {
            EpochParity::Even => EpochParity::Odd,
            EpochParity::Odd => EpochParity::Even,
        }
    }

    fn bit(self) -> bool {
        matches!(self, EpochParity::Odd)
    }
}

/// Hard sync mode's process-local state: the mutex arbiter for LOCAL
/// nodes, the termination color, and the bookkeeping a blocking client call
/// needs to recognize its own grant/reply.
pub struct HardSync<D> {
    server: MutexServer,
    color: Color,
    epoch: EpochParity,
    /// Tickets granted to `LOCAL` requests this process issued, not yet
    /// claimed by the waiting call.
    local_grants: BTreeSet<u64>,
    /// Data replies to in-flight remote READ/ACQUIRE requests, keyed by
    /// node id (one in flight per id at a time, since a caller blocks on
    /// its own request before issuing another for the same id).
    pending_replies: BTreeMap<DistributedId, D>,
}

impl<D> Default for HardSync<D> {
    fn default() -> Self {
        HardSync {
            server: MutexServer::default(),
            color: Color::White,
            epoch: EpochParity::Even,
            local_grants: BTreeSet::new(),
            pending_replies: BTreeMap::new(),
        }
    }
}

fn tag(kind: TagKind, epoch: EpochParity) -> Tag {
    Tag::new(kind, epoch.bit())
}

impl<D> HardSync<D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_black(&mut self) {
        self.color = Color::Black;
    }

    /// Drains at most one inbound protocol message (a mutex request, a
    /// mutex reply, a link, or an unlink), applying its effect. Called at
    /// every suspension point so this process keeps answering peers while
    /// a local call blocks (spec §5).
    pub fn poll<T: Transport>(
        &mut self,
        transport: &T,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
    ) -> Result<bool, Error> {
        let my_rank = transport.rank();
        let req_tag = tag(TagKind::MutexReq, self.epoch);
        if transport.probe(None, Some(req_tag))?.is_some() {
            let (bytes, status): (Vec<u8>, _) = transport.recv(None, Some(req_tag))?;
            let mut pack = Pack::from_bytes(bytes);
            let wire: MutexRequestWire = pack.get()?;
            let Some(kind) = RequestKind::from_i32(wire.kind) else {
                return Err(Error::TerminationViolation(format!(
                    "unknown mutex request kind {} from rank {}",
                    wire.kind, status.source
                )));
            };
            self.handle_remote_request(wire.id, wire.source, kind, nodes, locations, transport)?;
            return Ok(true);
        }

        let reply_tag = tag(TagKind::MutexReply, self.epoch);
        if transport.probe(None, Some(reply_tag))?.is_some() {
            let (bytes, _) = transport.recv::<Vec<u8>>(None, Some(reply_tag))?;
            let mut pack = Pack::from_bytes(bytes);
            let update: DataUpdatePack<D> = pack.get()?;
            self.pending_replies.insert(update.id, update.data);
            return Ok(true);
        }

        let data_tag = tag(TagKind::Data, self.epoch);
        if transport.probe(None, Some(data_tag))?.is_some() {
            let (bytes, _) = transport.recv::<Vec<u8>>(None, Some(data_tag))?;
            let mut pack = Pack::from_bytes(bytes);
            let update: DataUpdatePack<D> = pack.get()?;
            if let Some(node) = nodes.get_mut(&update.id) {
                node.release_acquire(update.data)?;
                let granted = self.server.dispatch(update.id, node);
                self.settle_grants(update.id, granted, node, transport)?;
            }
            return Ok(true);
        }

        let link_tag = tag(TagKind::Link, self.epoch);
        if transport.probe(None, Some(link_tag))?.is_some() {
            let (bytes, _) = transport.recv::<Vec<u8>>(None, Some(link_tag))?;
            let mut pack = Pack::from_bytes(bytes);
            let wire: EdgeWire<D> = pack.get()?;
            import_edge_wire(wire, nodes, edges, locations, my_rank, Some(callbacks));
            return Ok(true);
        }

        let unlink_tag = tag(TagKind::Unlink, self.epoch);
        if transport.probe(None, Some(unlink_tag))?.is_some() {
            let (wire, _) = transport.recv::<UnlinkWire>(None, Some(unlink_tag))?;
            if let Some(edge) = edges.remove(&wire.edge_id) {
                erase_if_orphaned(edge.source(), nodes, edges, locations, Some(callbacks));
                erase_if_orphaned(edge.target(), nodes, edges, locations, Some(callbacks));
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Applies an inbound mutex request against a node we own. Per spec §9's
    /// open question on stale-owner requests (recommended policy: forward
    /// via the locations map, up to one hop), a request for an id we no
    /// longer hold LOCAL is forwarded once to whoever `locations` currently
    /// believes owns it; if that process doesn't have it either (a second
    /// migration landed in between), it's a termination violation.
    fn handle_remote_request<T: Transport>(
        &mut self,
        id: DistributedId,
        source: Rank,
        kind: RequestKind,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        locations: &LocationManager,
        transport: &T,
    ) -> Result<(), Error> {
        if !nodes.contains_key(&id) {
            let my_rank = transport.rank();
            return match locations.location_of(id) {
                Some(new_owner) if new_owner != my_rank => {
                    let wire = MutexRequestWire {
                        id,
                        source,
                        kind: kind.to_i32(),
                    };
                    let mut pack = Pack::new();
                    pack.put(&wire)?;
                    transport.send(pack.into_bytes(), new_owner, tag(TagKind::MutexReq, self.epoch))?;
                    Ok(())
                }
                _ => Err(Error::TerminationViolation(format!(
                    "mutex request for {id:?} on a process that no longer owns it"
                ))),
            };
        }
        let node = nodes.get_mut(&id).unwrap();
        let granted = match kind {
            RequestKind::Unlock | RequestKind::UnlockShared => self.server.release(id, kind, node)?,
            _ => {
                let (_, granted) = self.server.request(id, source, kind, node);
                granted
            }
        };
        self.settle_grants(id, granted, node, transport)
    }

    /// Applies the outcome of a dispatch round: local grants are recorded
    /// by ticket so `request_local`'s wait loop can recognize its own
    /// grant; remote grants get their reply sent over the wire right away
    /// (Lock/LockShared need no data, just the implicit ack of not erroring).
    fn settle_grants<T: Transport>(
        &mut self,
        id: DistributedId,
        granted: Vec<Grant>,
        node: &Node<D>,
        transport: &T,
    ) -> Result<(), Error> {
        for (ticket, source, kind) in granted {
            if source == LOCAL {
                self.local_grants.insert(ticket);
            } else if kind.wants_data_reply() {
                let update = DataUpdatePack {
                    id,
                    data: node.data().clone(),
                };
                let mut pack = Pack::new();
                pack.put(&update)?;
                transport.send(pack.into_bytes(), source, tag(TagKind::MutexReply, self.epoch))?;
            }
        }
        Ok(())
    }

    /// Issues a LOCAL-sourced request against a node this process owns,
    /// blocking (cooperatively, via `poll`) until the FIFO arbitration
    /// grants it.
    fn request_local<T: Transport>(
        &mut self,
        id: DistributedId,
        kind: RequestKind,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        let ticket = {
            let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
            let (ticket, granted) = self.server.request(id, LOCAL, kind, node);
            self.settle_grants(id, granted, node, transport)?;
            ticket
        };
        while !self.local_grants.remove(&ticket) {
            self.poll(transport, nodes, edges, locations, callbacks)?;
        }
        Ok(())
    }

    /// `read()` on a node (spec §4.F): local fast path if owned here,
    /// otherwise a round trip to the owner.
    pub fn read<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<D, Error> {
        if owner == transport.rank() {
            self.request_local(id, RequestKind::Read, nodes, edges, locations, callbacks, transport)?;
            return Ok(nodes.get(&id).ok_or(Error::UnknownNode(id))?.data().clone());
        }
        self.remote_grant_request(id, owner, RequestKind::Read, nodes, edges, locations, callbacks, transport)
    }

    pub fn release_read<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        _callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        self.release(id, owner, RequestKind::UnlockShared, nodes, edges, locations, transport)
    }

    pub fn acquire<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<D, Error> {
        if owner == transport.rank() {
            self.request_local(id, RequestKind::Acquire, nodes, edges, locations, callbacks, transport)?;
            return Ok(nodes.get(&id).ok_or(Error::UnknownNode(id))?.data().clone());
        }
        self.remote_grant_request(id, owner, RequestKind::Acquire, nodes, edges, locations, callbacks, transport)
    }

    /// Publishes the write and releases. Local: applies directly, then
    /// re-dispatches the queue. Remote: ships a `DataUpdatePack` to the
    /// owner, which installs it and wakes the next waiter (spec §4.H).
    pub fn release_acquire<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        new_value: D,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        _callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        if owner == transport.rank() {
            let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
            node.release_acquire(new_value)?;
            let granted = self.server.dispatch(id, node);
            self.settle_grants(id, granted, node, transport)?;
            return Ok(());
        }
        self.mark_black();
        let update = DataUpdatePack { id, data: new_value };
        let mut pack = Pack::new();
        pack.put(&update)?;
        transport.send(pack.into_bytes(), owner, tag(TagKind::Data, self.epoch))?;
        let _ = (nodes, edges, locations);
        Ok(())
    }

    pub fn lock<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        if owner == transport.rank() {
            return self.request_local(id, RequestKind::Lock, nodes, edges, locations, callbacks, transport);
        }
        self.remote_grant_request(id, owner, RequestKind::Lock, nodes, edges, locations, callbacks, transport)
            .map(|_| ())
    }

    pub fn unlock<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        _callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        self.release(id, owner, RequestKind::Unlock, nodes, edges, locations, transport)
    }

    pub fn lock_shared<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        if owner == transport.rank() {
            return self.request_local(id, RequestKind::LockShared, nodes, edges, locations, callbacks, transport);
        }
        self.remote_grant_request(id, owner, RequestKind::LockShared, nodes, edges, locations, callbacks, transport)
            .map(|_| ())
    }

    pub fn unlock_shared<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        _callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<(), Error> {
        self.release(id, owner, RequestKind::UnlockShared, nodes, edges, locations, transport)
    }

    fn release<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        kind: RequestKind,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        transport: &T,
    ) -> Result<(), Error> {
        if owner == transport.rank() {
            let node = nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
            let granted = self.server.release(id, kind, node)?;
            return self.settle_grants(id, granted, node, transport);
        }
        self.mark_black();
        let wire = MutexRequestWire {
            id,
            source: transport.rank(),
            kind: kind.to_i32(),
        };
        let mut pack = Pack::new();
        pack.put(&wire)?;
        transport.send(pack.into_bytes(), owner, tag(TagKind::MutexReq, self.epoch))?;
        let _ = (edges, locations);
        Ok(())
    }

    fn remote_grant_request<T: Transport>(
        &mut self,
        id: DistributedId,
        owner: Rank,
        kind: RequestKind,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
        transport: &T,
    ) -> Result<D, Error> {
        let _span = crate::logging::rank_span("mutex_request", transport.rank()).entered();
        self.mark_black();
        let wire = MutexRequestWire {
            id,
            source: transport.rank(),
            kind: kind.to_i32(),
        };
        let mut pack = Pack::new();
        pack.put(&wire)?;
        transport.send(pack.into_bytes(), owner, tag(TagKind::MutexReq, self.epoch))?;
        loop {
            if let Some(data) = self.pending_replies.remove(&id) {
                return Ok(data);
            }
            self.poll(transport, nodes, edges, locations, callbacks)?;
        }
    }

    /// Sends a newly created edge to whichever endpoint owner(s) are
    /// remote, immediately (Hard mode does not buffer, spec §4.H).
    pub fn link<T: Transport>(
        &mut self,
        edge: &Edge,
        source_owner: Rank,
        target_owner: Rank,
        source_data: D,
        target_data: D,
        transport: &T,
    ) -> Result<(), Error> {
        let my_rank = transport.rank();
        if source_owner == my_rank && target_owner == my_rank {
            return Ok(());
        }
        self.mark_black();
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
                transport.send(bytes.clone(), owner, tag(TagKind::Link, self.epoch))?;
            }
        }
        Ok(())
    }

    pub fn unlink<T: Transport>(
        &mut self,
        edge_id: DistributedId,
        owner: Rank,
        transport: &T,
    ) -> Result<(), Error> {
        if owner == transport.rank() {
            return Ok(());
        }
        self.mark_black();
        transport.send(UnlinkWire { edge_id }, owner, tag(TagKind::Unlink, self.epoch))?;
        Ok(())
    }

    /// Runs the four-color termination algorithm (spec §4.H), polling the
    /// server loop while waiting so this process keeps answering peers. One
    /// pass covers mutex requests, links, and unlinks together: `mark_black`
    /// fires for all three, so a single ring detects quiescence across the
    /// whole protocol rather than running separate rings per message kind
    /// (our resolution of spec §9's open question; see DESIGN.md).
    pub fn terminate<T: Transport>(
        &mut self,
        transport: &T,
        nodes: &mut BTreeMap<DistributedId, Node<D>>,
        edges: &mut BTreeMap<DistributedId, Edge>,
        locations: &mut LocationManager,
        callbacks: CallbackRegistries<DistributedId>,
    ) -> Result<(), Error> {
        let _span = crate::logging::rank_span("terminate", transport.rank()).entered();
        let my_rank = transport.rank();
        let size = transport.size() as Rank;
        let epoch_tag_token = tag(TagKind::Token, self.epoch);
        let epoch_tag_end = tag(TagKind::End, self.epoch);

        if my_rank == 0 {
            self.color = Color::White;
            transport.send(Color::White, size - 1, epoch_tag_token)?;
        }

        // Each rank receives the token from its successor in rank order and
        // forwards it to its predecessor, per the original's ring direction.
        let successor = (my_rank + 1) % size;

        loop {
            if transport.probe(Some(successor), Some(epoch_tag_token))?.is_some() {
                let (token, _) = transport.recv::<Color>(Some(successor), Some(epoch_tag_token))?;
                if my_rank == 0 {
                    if token == Color::White && self.color == Color::White {
                        tracing::debug!("terminate: ring quiescent, broadcasting END");
                        for dest in 1..size {
                            transport.send((), dest, epoch_tag_end)?;
                        }
                        self.epoch = self.epoch.toggle();
                        return Ok(());
                    } else {
                        self.color = Color::White;
                        transport.send(Color::White, size - 1, epoch_tag_token)?;
                    }
                } else {
                    let forwarded = if self.color == Color::Black {
                        Color::Black
                    } else {
                        token
                    };
                    transport.send(forwarded, my_rank - 1, epoch_tag_token)?;
                    self.color = Color::White;
                }
            }

            if my_rank > 0 && transport.probe(Some(0), Some(epoch_tag_end))?.is_some() {
                let (_, _) = transport.recv::<()>(Some(0), Some(epoch_tag_end))?;
                self.epoch = self.epoch.toggle();
                return Ok(());
            }

            self.poll(transport, nodes, edges, locations, callbacks)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Registry;
    use crate::graph::node::NodeState;
    use crate::id::IdCounter;
    use fpmas_transport::ProcessTransport;

    fn empty_callbacks() -> (Registry<DistributedId>, Registry<DistributedId>, Registry<DistributedId>, Registry<DistributedId>) {
        (Registry::new(), Registry::new(), Registry::new(), Registry::new())
    }

    #[test]
    fn termination_completes_when_quiescent() {
        let cluster = ProcessTransport::new_cluster(3);
        std::thread::scope(|scope| {
            let mut transports: Vec<_> = cluster.into_iter().collect();
            let handles: Vec<_> = (0..3)
                .map(|_| transports.remove(0))
                .map(|t| {
                    scope.spawn(move || {
                        let mut sync = HardSync::<i32>::new();
                        let mut nodes = BTreeMap::new();
                        let mut edges = BTreeMap::new();
                        let mut locations = LocationManager::new(t.rank());
                        let (a, b, c, d) = empty_callbacks();
                        let callbacks = CallbackRegistries::new(&a, &b, &c, &d);
                        sync.terminate(&t, &mut nodes, &mut edges, &mut locations, callbacks)
                            .unwrap();
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });
    }

    #[test]
    fn remote_acquire_round_trip() {
        // Rank 0 owns the node; rank 1 acquires, increments, releases.
        let cluster = ProcessTransport::new_cluster(2);
        let counter = IdCounter::new(0);
        let node_id = counter.new_on(0);

        std::thread::scope(|scope| {
            let mut transports: Vec<_> = cluster.into_iter().collect();
            let t1 = transports.pop().unwrap();
            let t0 = transports.pop().unwrap();

            scope.spawn(move || {
                let mut nodes = BTreeMap::new();
                nodes.insert(node_id, Node::new(node_id, 1.0, 0i32, 0, NodeState::Local));
                let mut edges = BTreeMap::new();
                let mut locations = LocationManager::new(0);
                locations.add_managed(node_id, 0);
                let mut sync = HardSync::<i32>::new();
                let (a, b, c, d) = empty_callbacks();
                let callbacks = CallbackRegistries::new(&a, &b, &c, &d);

                // Serve one remote acquire/release round.
                loop {
                    if sync
                        .poll(&t0, &mut nodes, &mut edges, &mut locations, callbacks)
                        .unwrap()
                    {
                        if *nodes.get(&node_id).unwrap().data() == 1 {
                            break;
                        }
                    }
                }
                sync.terminate(&t0, &mut nodes, &mut edges, &mut locations, callbacks)
                    .unwrap();
            });
            scope.spawn(move || {
                let mut nodes = BTreeMap::new();
                nodes.insert(node_id, Node::new(node_id, 1.0, 0i32, 0, NodeState::Distant));
                let mut edges = BTreeMap::new();
                let mut locations = LocationManager::new(1);
                locations.add_managed(node_id, 0);
                let mut sync = HardSync::<i32>::new();
                let (a, b, c, d) = empty_callbacks();
                let callbacks = CallbackRegistries::new(&a, &b, &c, &d);

                let current = sync
                    .acquire(node_id, 0, &mut nodes, &mut edges, &mut locations, callbacks, &t1)
                    .unwrap();
                sync.release_acquire(
                    node_id,
                    0,
                    current + 1,
                    &mut nodes,
                    &mut edges,
                    &mut locations,
                    callbacks,
                    &t1,
                )
                .unwrap();
                sync.terminate(&t1, &mut nodes, &mut edges, &mut locations, callbacks)
                    .unwrap();
            });
        });
    }
}
