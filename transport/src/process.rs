//! An in-process, multi-rank `Transport` built on `crossbeam-channel`.
//!
//! This is the direct analogue of the teacher's `allocator::process::Process`:
//! rather than opening sockets, every rank gets a channel endpoint to every
//! other rank (including itself), all living in the same OS process. It is
//! what every test in this workspace, and `fpmas::testing`, run against.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{AnyPayload, Data, Rank, SendHandle, Status, Tag, TransportError};

struct Envelope {
    from: Rank,
    tag: Tag,
    payload: AnyPayload,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CollectiveKind {
    Barrier,
    AllToAll,
    Gather,
}

struct SystemEnvelope {
    from: Rank,
    seq: u64,
    kind: CollectiveKind,
    payload: AnyPayload,
}

/// One rank's view of an in-process cluster.
///
/// Built via [`ProcessTransport::new_cluster`], which hands back one
/// `ProcessTransport` per rank, each already wired to every peer.
pub struct ProcessTransport {
    rank: Rank,
    size: usize,
    user_senders: Vec<Sender<Envelope>>,
    user_receiver: Receiver<Envelope>,
    user_inbox: Mutex<VecDeque<Envelope>>,
    system_senders: Vec<Sender<SystemEnvelope>>,
    system_receiver: Receiver<SystemEnvelope>,
    system_inbox: Mutex<VecDeque<SystemEnvelope>>,
    collective_seq: AtomicU64,
}

impl ProcessTransport {
    /// Builds `size` transports wired to each other, one per rank.
    pub fn new_cluster(size: usize) -> Vec<ProcessTransport> {
        assert!(size > 0, "a cluster needs at least one rank");

        let mut user_senders = Vec::with_capacity(size);
        let mut user_receivers = Vec::with_capacity(size);
        let mut system_senders = Vec::with_capacity(size);
        let mut system_receivers = Vec::with_capacity(size);
        for _ in 0..size {
            let (us, ur) = unbounded();
            user_senders.push(us);
            user_receivers.push(ur);
            let (ss, sr) = unbounded();
            system_senders.push(ss);
            system_receivers.push(sr);
        }

        user_receivers
            .into_iter()
            .zip(system_receivers)
            .enumerate()
            .map(|(index, (user_receiver, system_receiver))| ProcessTransport {
                rank: index as Rank,
                size,
                user_senders: user_senders.clone(),
                user_receiver,
                user_inbox: Mutex::new(VecDeque::new()),
                system_senders: system_senders.clone(),
                system_receiver,
                system_inbox: Mutex::new(VecDeque::new()),
                collective_seq: AtomicU64::new(0),
            })
            .collect()
    }

    fn check_rank(&self, dest: Rank) -> Result<(), TransportError> {
        if dest < 0 || dest as usize >= self.size {
            Err(TransportError::RankOutOfRange(dest, self.size))
        } else {
            Ok(())
        }
    }

    fn drain_user(&self) {
        let mut inbox = self.user_inbox.lock().unwrap();
        while let Ok(envelope) = self.user_receiver.try_recv() {
            inbox.push_back(envelope);
        }
    }

    fn drain_system(&self) {
        let mut inbox = self.system_inbox.lock().unwrap();
        while let Ok(envelope) = self.system_receiver.try_recv() {
            inbox.push_back(envelope);
        }
    }

    fn next_seq(&self) -> u64 {
        self.collective_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn downcast<T: Data>(payload: AnyPayload, tag: Tag) -> Result<T, TransportError> {
        payload
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| TransportError::TypeMismatch(tag))
    }
}

impl crate::Transport for ProcessTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send<T: Data>(&self, value: T, dest: Rank, tag: Tag) -> Result<(), TransportError> {
        self.check_rank(dest)?;
        let envelope = Envelope {
            from: self.rank,
            tag,
            payload: Box::new(value),
        };
        self.user_senders[dest as usize]
            .send(envelope)
            .map_err(|_| TransportError::PeerUnreachable(dest))
    }

    fn send_nonblocking<T: Data>(
        &self,
        value: T,
        dest: Rank,
        tag: Tag,
    ) -> Result<SendHandle, TransportError> {
        let result = self.send(value, dest, tag);
        Ok(SendHandle { result })
    }

    fn recv<T: Data>(
        &self,
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<(T, Status), TransportError> {
        loop {
            self.drain_user();
            let mut inbox = self.user_inbox.lock().unwrap();
            let position = inbox.iter().position(|e| {
                source.map_or(true, |s| s == e.from) && tag.map_or(true, |t| t == e.tag)
            });
            if let Some(index) = position {
                let envelope = inbox.remove(index).unwrap();
                drop(inbox);
                let status = Status {
                    source: envelope.from,
                    tag: envelope.tag,
                };
                return Self::downcast::<T>(envelope.payload, envelope.tag).map(|v| (v, status));
            }
            drop(inbox);
            std::thread::yield_now();
        }
    }

    fn probe(&self, source: Option<Rank>, tag: Option<Tag>) -> Result<Option<Status>, TransportError> {
        self.drain_user();
        let inbox = self.user_inbox.lock().unwrap();
        Ok(inbox
            .iter()
            .find(|e| source.map_or(true, |s| s == e.from) && tag.map_or(true, |t| t == e.tag))
            .map(|e| Status {
                source: e.from,
                tag: e.tag,
            }))
    }

    fn barrier(&self) -> Result<(), TransportError> {
        let seq = self.next_seq();
        for dest in 0..self.size {
            self.system_senders[dest]
                .send(SystemEnvelope {
                    from: self.rank,
                    seq,
                    kind: CollectiveKind::Barrier,
                    payload: Box::new(()),
                })
                .map_err(|_| TransportError::PeerUnreachable(dest as Rank))?;
        }
        let mut seen = 0;
        while seen < self.size {
            self.drain_system();
            let mut inbox = self.system_inbox.lock().unwrap();
            if let Some(pos) = inbox
                .iter()
                .position(|e| e.seq == seq && e.kind == CollectiveKind::Barrier)
            {
                inbox.remove(pos);
                seen += 1;
            } else {
                drop(inbox);
                std::thread::yield_now();
            }
        }
        Ok(())
    }

    fn all_to_all<T: Data>(
        &self,
        mut outgoing: BTreeMap<Rank, Vec<T>>,
    ) -> Result<BTreeMap<Rank, Vec<T>>, TransportError> {
        let seq = self.next_seq();
        for dest in 0..self.size as Rank {
            let items = outgoing.remove(&dest).unwrap_or_default();
            self.system_senders[dest as usize]
                .send(SystemEnvelope {
                    from: self.rank,
                    seq,
                    kind: CollectiveKind::AllToAll,
                    payload: Box::new(items) as AnyPayload,
                })
                .map_err(|_| TransportError::PeerUnreachable(dest))?;
        }
        let mut incoming = BTreeMap::new();
        while incoming.len() < self.size {
            self.drain_system();
            let mut inbox = self.system_inbox.lock().unwrap();
            if let Some(pos) = inbox
                .iter()
                .position(|e| e.seq == seq && e.kind == CollectiveKind::AllToAll)
            {
                let envelope = inbox.remove(pos).unwrap();
                drop(inbox);
                let items: Vec<T> = *envelope
                    .payload
                    .downcast::<Vec<T>>()
                    .map_err(|_| TransportError::TypeMismatch(Tag::new(crate::TagKind::Data, false)))?;
                incoming.insert(envelope.from, items);
            } else {
                drop(inbox);
                std::thread::yield_now();
            }
        }
        Ok(incoming)
    }

    fn gather<T: Data>(&self, value: T, root: Rank) -> Result<Option<Vec<T>>, TransportError> {
        self.check_rank(root)?;
        let seq = self.next_seq();
        self.system_senders[root as usize]
            .send(SystemEnvelope {
                from: self.rank,
                seq,
                kind: CollectiveKind::Gather,
                payload: Box::new(value) as AnyPayload,
            })
            .map_err(|_| TransportError::PeerUnreachable(root))?;

        if self.rank != root {
            return Ok(None);
        }

        let mut by_rank: BTreeMap<Rank, T> = BTreeMap::new();
        while by_rank.len() < self.size {
            self.drain_system();
            let mut inbox = self.system_inbox.lock().unwrap();
            if let Some(pos) = inbox
                .iter()
                .position(|e| e.seq == seq && e.kind == CollectiveKind::Gather)
            {
                let envelope = inbox.remove(pos).unwrap();
                drop(inbox);
                let value: T = Self::downcast(envelope.payload, Tag::new(crate::TagKind::Data, false))?;
                by_rank.insert(envelope.from, value);
            } else {
                drop(inbox);
                std::thread::yield_now();
            }
        }
        Ok(Some(by_rank.into_values().collect()))
    }

    fn reduce<T: Data, F: Fn(T, T) -> T>(
        &self,
        value: T,
        op: F,
        root: Rank,
    ) -> Result<Option<T>, TransportError> {
        let gathered = self.gather(value, root)?;
        Ok(gathered.map(|mut values| {
            let mut acc = values.remove(0);
            for v in values {
                acc = op(acc, v);
            }
            acc
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tag, TagKind, Transport};

    #[test]
    fn point_to_point() {
        let mut ranks = ProcessTransport::new_cluster(2);
        let t1 = ranks.pop().unwrap();
        let t0 = ranks.pop().unwrap();

        let tag = Tag::new(TagKind::Data, false);
        t0.send(42i32, 1, tag).unwrap();
        let (value, status) = t1.recv::<i32>(Some(0), Some(tag)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(status.source, 0);
    }

    #[test]
    fn probe_does_not_consume() {
        let mut ranks = ProcessTransport::new_cluster(2);
        let t1 = ranks.pop().unwrap();
        let t0 = ranks.pop().unwrap();
        let tag = Tag::new(TagKind::Data, false);
        t0.send(7i32, 1, tag).unwrap();
        assert!(t1.probe(None, None).unwrap().is_some());
        assert!(t1.probe(None, None).unwrap().is_some());
        let (value, _) = t1.recv::<i32>(None, None).unwrap();
        assert_eq!(value, 7);
        assert!(t1.probe(None, None).unwrap().is_none());
    }

    #[test]
    fn barrier_releases_all_ranks() {
        let ranks = ProcessTransport::new_cluster(4);
        std::thread::scope(|scope| {
            for t in &ranks {
                scope.spawn(move || t.barrier().unwrap());
            }
        });
    }

    #[test]
    fn all_to_all_exchanges_every_pair() {
        let ranks = ProcessTransport::new_cluster(3);
        let results: Vec<_> = std::thread::scope(|scope| {
            ranks
                .iter()
                .map(|t| {
                    scope.spawn(move || {
                        let mut outgoing = BTreeMap::new();
                        for dest in 0..t.size() as Rank {
                            outgoing.insert(dest, vec![t.rank() * 10 + dest]);
                        }
                        t.all_to_all(outgoing).unwrap()
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        for (dest, incoming) in results.into_iter().enumerate() {
            for (src, items) in incoming {
                assert_eq!(items, vec![src * 10 + dest as Rank]);
            }
        }
    }

    #[test]
    fn gather_orders_by_rank() {
        let ranks = ProcessTransport::new_cluster(3);
        let results: Vec<_> = std::thread::scope(|scope| {
            ranks
                .iter()
                .map(|t| scope.spawn(move || t.gather(t.rank(), 0).unwrap()))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        assert_eq!(results[0], Some(vec![0, 1, 2]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], None);
    }
}
