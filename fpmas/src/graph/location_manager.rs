//! Tracks which rank owns every node this process knows about, per spec
//! §4.E.
//!
//! A node managed by this process is either LOCAL (this rank owns it) or
//! DISTANT (some other rank does, and what we hold is a cache). Every
//! managed id also has a recorded `location`: the rank currently believed
//! to be authoritative for it, which is `self.rank` for LOCAL nodes and the
//! owner for DISTANT ones.

use std::collections::{BTreeMap, BTreeSet};

use fpmas_transport::{Rank, Transport};

use crate::callbacks::Registry;
use crate::error::Error;
use crate::id::DistributedId;

pub struct LocationManager {
    rank: Rank,
    locations: BTreeMap<DistributedId, Rank>,
    local: BTreeSet<DistributedId>,
    distant: BTreeSet<DistributedId>,
    pub on_set_local: Registry<DistributedId>,
    pub on_set_distant: Registry<DistributedId>,
}

impl LocationManager {
    pub fn new(rank: Rank) -> Self {
        LocationManager {
            rank,
            locations: BTreeMap::new(),
            local: BTreeSet::new(),
            distant: BTreeSet::new(),
            on_set_local: Registry::new(),
            on_set_distant: Registry::new(),
        }
    }

    /// Registers a newly created or imported node at `owner`. Does not fire
    /// `on_set_local`/`on_set_distant`: those cover transitions of an
    /// already-managed node, not its initial classification.
    pub fn add_managed(&mut self, id: DistributedId, owner: Rank) {
        self.locations.insert(id, owner);
        if owner == self.rank {
            self.distant.remove(&id);
            self.local.insert(id);
        } else {
            self.local.remove(&id);
            self.distant.insert(id);
        }
    }

    pub fn remove_managed(&mut self, id: DistributedId) {
        self.locations.remove(&id);
        self.local.remove(&id);
        self.distant.remove(&id);
    }

    pub fn location_of(&self, id: DistributedId) -> Option<Rank> {
        self.locations.get(&id).copied()
    }

    pub fn is_local(&self, id: DistributedId) -> bool {
        self.local.contains(&id)
    }

    pub fn is_distant(&self, id: DistributedId) -> bool {
        self.distant.contains(&id)
    }

    pub fn local_nodes(&self) -> impl Iterator<Item = DistributedId> + '_ {
        self.local.iter().copied()
    }

    pub fn distant_nodes(&self) -> impl Iterator<Item = DistributedId> + '_ {
        self.distant.iter().copied()
    }

    /// Every id this process tracks an owner for, regardless of LOCAL/
    /// DISTANT classification — used by [`breakpoint::dump`][crate::breakpoint::dump]
    /// to snapshot the full locations table.
    pub fn entries(&self) -> impl Iterator<Item = (DistributedId, Rank)> + '_ {
        self.locations.iter().map(|(&id, &rank)| (id, rank))
    }

    /// Marks `id` as LOCAL, firing `on_set_local` if it was not already.
    pub fn set_local(&mut self, id: DistributedId) {
        let was_local = self.local.contains(&id);
        self.distant.remove(&id);
        self.local.insert(id);
        self.locations.insert(id, self.rank);
        if !was_local {
            self.on_set_local.fire(&id);
        }
    }

    /// Marks `id` as DISTANT, owned by `owner`, firing `on_set_distant` if
    /// it was not already distant (or its owner changed).
    pub fn set_distant(&mut self, id: DistributedId, owner: Rank) {
        let previous_owner = self.locations.get(&id).copied();
        self.local.remove(&id);
        self.distant.insert(id);
        self.locations.insert(id, owner);
        if previous_owner != Some(owner) {
            self.on_set_distant.fire(&id);
        }
    }

    /// Collective: reconciles location knowledge across every rank.
    ///
    /// `updates` lists the locations this rank has learned changed since
    /// the last call (typically because it migrated nodes it owned).
    /// Every rank broadcasts its updates to every other rank; when two
    /// ranks disagree about the same id's new owner in the same round, the
    /// update reported by the lower rank wins, which is deterministic and
    /// requires no extra negotiation round.
    pub fn update_locations<T: Transport>(
        &mut self,
        transport: &T,
        updates: &BTreeMap<DistributedId, Rank>,
    ) -> Result<(), Error> {
        let my_rank = transport.rank();
        let payload: Vec<(DistributedId, Rank)> =
            updates.iter().map(|(&id, &rank)| (id, rank)).collect();

        let mut outgoing = BTreeMap::new();
        for dest in 0..transport.size() as Rank {
            if dest != my_rank {
                outgoing.insert(dest, payload.clone());
            }
        }
        let incoming = transport.all_to_all(outgoing)?;

        let mut resolved: BTreeMap<DistributedId, (Rank, Rank)> = BTreeMap::new();
        for (&id, &rank) in updates {
            resolved.insert(id, (my_rank, rank));
        }
        for (reporter, batch) in incoming {
            for (id, rank) in batch {
                resolved
                    .entry(id)
                    .and_modify(|(current_reporter, current_rank)| {
                        if reporter < *current_reporter {
                            *current_reporter = reporter;
                            *current_rank = rank;
                        }
                    })
                    .or_insert((reporter, rank));
            }
        }

        for (id, (_, new_owner)) in resolved {
            if new_owner == my_rank {
                self.set_local(id);
            } else if self.local.contains(&id) || self.distant.contains(&id) {
                self.set_distant(id, new_owner);
            }
        }
        Ok(())
    }
}
