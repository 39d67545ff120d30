//! Globally unique node/edge identity.

use std::fmt;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use fpmas_transport::Rank;

/// `(origin_rank, local_counter)`, total-ordered lexicographically.
///
/// Stable for the lifetime of a node or edge, even across migration: a
/// node's id never changes when it moves owner. No id is ever reused after
/// the node or edge that carried it is erased, because the counter only
/// moves forward.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct DistributedId {
    origin_rank: Rank,
    local_counter: u64,
}

impl DistributedId {
    pub fn origin_rank(&self) -> Rank {
        self.origin_rank
    }

    pub fn local_counter(&self) -> u64 {
        self.local_counter
    }

    /// Fixed-width wire encoding: rank (32-bit LE) then counter (64-bit LE).
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.write_i32::<LittleEndian>(self.origin_rank)
            .expect("Vec<u8> writes never fail");
        out.write_u64::<LittleEndian>(self.local_counter)
            .expect("Vec<u8> writes never fail");
    }

    /// Inverse of [`encode`](Self::encode). Returns `None` if fewer than 12
    /// bytes remain.
    pub fn decode(bytes: &[u8]) -> Option<(Self, &[u8])> {
        if bytes.len() < 12 {
            return None;
        }
        let mut cursor = Cursor::new(bytes);
        let origin_rank = cursor.read_i32::<LittleEndian>().ok()?;
        let local_counter = cursor.read_u64::<LittleEndian>().ok()?;
        let consumed = cursor.position() as usize;
        Some((
            DistributedId {
                origin_rank,
                local_counter,
            },
            &bytes[consumed..],
        ))
    }
}

impl fmt::Debug for DistributedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}:{})", self.origin_rank, self.local_counter)
    }
}

/// A process-local, monotonically increasing counter used to mint
/// [`DistributedId`]s on behalf of one rank.
///
/// Each `DistributedGraph` owns exactly one of these. Keeping the counter
/// separate from any single graph instance (rather than a single process-wide
/// global) lets multiple graphs coexist within one process, which is how the
/// in-process multi-rank test harness runs several "processes" as ordinary
/// values in one address space.
pub struct IdCounter {
    rank: Rank,
    next: AtomicU64,
}

impl IdCounter {
    pub fn new(rank: Rank) -> Self {
        IdCounter {
            rank,
            next: AtomicU64::new(0),
        }
    }

    /// Mints the next id owned by `rank`.
    pub fn new_on(&self, rank: Rank) -> DistributedId {
        debug_assert_eq!(rank, self.rank, "IdCounter minted an id for a foreign rank");
        let local_counter = self.next.fetch_add(1, Ordering::Relaxed);
        DistributedId {
            origin_rank: rank,
            local_counter,
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Advances the counter so the next minted id's `local_counter` is
    /// strictly greater than `past`, used when restoring from a
    /// [`breakpoint`][crate::breakpoint] dump to avoid re-minting an id that
    /// was already handed out before the dump was taken. A no-op if the
    /// counter is already past `past`.
    pub fn fast_forward_past(&self, past: u64) {
        let mut current = self.next.load(Ordering::Relaxed);
        while current <= past {
            match self
                .next
                .compare_exchange_weak(current, past + 1, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}
