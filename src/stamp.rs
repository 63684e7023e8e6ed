//! STAMP: the Status, Time, Author, Module and Path that tag every version.
//!
//! Stamps are interned by a [StampStore] so that a 32-bit [StampSequence] stands in for the whole
//! tuple. Uncommitted work carries [UNCOMMITTED_TIME]; committing swaps each uncommitted stamp
//! for a committed twin and canceling swaps it for a twin at [CANCELED_TIME], which no coordinate
//! can ever reach.
use dashmap::{mapref::entry::Entry, DashMap};
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{error::KometError, identity::Nid};

/// Time of a stamp that has not been committed yet.
pub const UNCOMMITTED_TIME: i64 = i64::MAX;
/// Time of a stamp whose uncommitted work was abandoned.
pub const CANCELED_TIME: i64 = i64::MIN;

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(serialize_repr = "list")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

pub type StatusSet = EnumSet<Status>;

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Active => write!(f, "active"),
            Status::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub status: Status,
    pub time: i64,
    pub author: Nid,
    pub module: Nid,
    pub path: Nid,
}

impl Stamp {
    pub fn new(
        status: Status,
        time: i64,
        author: Nid,
        module: Nid,
        path: Nid,
    ) -> Result<Stamp, KometError> {
        if time == 0 {
            return Err(KometError::illegal_state(format!(
                "Stamp time cannot be zero (author {author}, module {module}, path {path})"
            )));
        }
        Ok(Stamp {
            status,
            time,
            author,
            module,
            path,
        })
    }

    pub fn uncommitted(status: Status, author: Nid, module: Nid, path: Nid) -> Stamp {
        Stamp {
            status,
            time: UNCOMMITTED_TIME,
            author,
            module,
            path,
        }
    }

    pub fn is_uncommitted(&self) -> bool {
        self.time == UNCOMMITTED_TIME
    }

    pub fn is_canceled(&self) -> bool {
        self.time == CANCELED_TIME
    }

    fn with_time(&self, time: i64) -> Stamp {
        Stamp { time, ..*self }
    }
}

impl Display for Stamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let time = match self.time {
            UNCOMMITTED_TIME => "uncommitted".to_string(),
            CANCELED_TIME => "canceled".to_string(),
            t => t.to_string(),
        };
        write!(
            f,
            "[{} t:{} a:{} m:{} p:{}]",
            self.status, time, self.author, self.module, self.path
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StampSequence(pub u32);

impl StampSequence {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Display for StampSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StampRecord {
    pub sequence: StampSequence,
    pub stamp: Stamp,
    /// Uncommitted stamps that were committed or canceled. They still resolve by sequence but
    /// are no longer handed out for new work.
    pub retired: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StampSnapshot {
    pub next_sequence: u32,
    pub stamps: Vec<StampRecord>,
}

impl Default for StampSnapshot {
    fn default() -> Self {
        StampSnapshot {
            next_sequence: 1,
            stamps: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct StampStore {
    next_sequence: AtomicU32,
    stamp_to_sequence: DashMap<Stamp, StampSequence>,
    sequence_to_stamp: DashMap<StampSequence, Stamp>,
}

impl Default for StampStore {
    fn default() -> Self {
        StampStore {
            next_sequence: AtomicU32::new(1),
            stamp_to_sequence: DashMap::new(),
            sequence_to_stamp: DashMap::new(),
        }
    }
}

impl StampStore {
    /// Intern `stamp`, returning the sequence every equal stamp shares.
    pub fn stamp_sequence(&self, stamp: Stamp) -> Result<StampSequence, KometError> {
        if stamp.time == 0 {
            return Err(KometError::illegal_state(format!(
                "Stamp time cannot be zero: {stamp}"
            )));
        }
        let sequence = match self.stamp_to_sequence.entry(stamp) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let sequence = StampSequence(self.next_sequence.fetch_add(1, Ordering::SeqCst));
                self.sequence_to_stamp.insert(sequence, stamp);
                entry.insert(sequence);
                sequence
            }
        };
        Ok(sequence)
    }

    pub fn stamp(&self, sequence: StampSequence) -> Result<Stamp, KometError> {
        self.sequence_to_stamp
            .get(&sequence)
            .map(|stamp| *stamp)
            .ok_or_else(|| KometError::NotFound(format!("No stamp for sequence {sequence}")))
    }

    pub fn status_for(&self, sequence: StampSequence) -> Result<Status, KometError> {
        Ok(self.stamp(sequence)?.status)
    }

    pub fn time_for(&self, sequence: StampSequence) -> Result<i64, KometError> {
        Ok(self.stamp(sequence)?.time)
    }

    pub fn author_for(&self, sequence: StampSequence) -> Result<Nid, KometError> {
        Ok(self.stamp(sequence)?.author)
    }

    pub fn module_for(&self, sequence: StampSequence) -> Result<Nid, KometError> {
        Ok(self.stamp(sequence)?.module)
    }

    pub fn path_for(&self, sequence: StampSequence) -> Result<Nid, KometError> {
        Ok(self.stamp(sequence)?.path)
    }

    pub fn is_uncommitted(&self, sequence: StampSequence) -> Result<bool, KometError> {
        Ok(self.stamp(sequence)?.is_uncommitted())
    }

    pub fn len(&self) -> usize {
        self.sequence_to_stamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence_to_stamp.is_empty()
    }

    /// Live uncommitted stamps, in sequence order.
    pub fn pending(&self) -> Vec<StampSequence> {
        let mut pending: Vec<StampSequence> = self
            .stamp_to_sequence
            .iter()
            .filter(|entry| entry.key().is_uncommitted())
            .map(|entry| *entry.value())
            .collect();
        pending.sort();
        pending
    }

    /// Replace every live uncommitted stamp with a committed twin at `time`, returning the
    /// old → new sequence mapping chronologies must apply.
    pub fn commit_pending(
        &self,
        time: i64,
    ) -> Result<BTreeMap<StampSequence, StampSequence>, KometError> {
        if time == 0 || time == UNCOMMITTED_TIME || time == CANCELED_TIME {
            return Err(KometError::illegal_state(format!(
                "Cannot commit at reserved time {time}"
            )));
        }
        self.retire(|_| true, time)
    }

    /// Pending stamps whose committed twin at `time` is already interned, mapped to that twin.
    pub fn commit_collisions(
        &self,
        time: i64,
    ) -> Result<BTreeMap<StampSequence, StampSequence>, KometError> {
        let mut collisions = BTreeMap::new();
        for sequence in self.pending() {
            let twin = self.stamp(sequence)?.with_time(time);
            if let Some(existing) = self.stamp_to_sequence.get(&twin).map(|s| *s) {
                if existing != sequence {
                    collisions.insert(sequence, existing);
                }
            }
        }
        Ok(collisions)
    }

    /// Cancel the live uncommitted stamps authored by `author`.
    pub fn cancel_pending(
        &self,
        author: Nid,
    ) -> Result<BTreeMap<StampSequence, StampSequence>, KometError> {
        self.retire(|stamp| stamp.author == author, CANCELED_TIME)
    }

    fn retire<F: Fn(&Stamp) -> bool>(
        &self,
        selected: F,
        time: i64,
    ) -> Result<BTreeMap<StampSequence, StampSequence>, KometError> {
        let mut remapped = BTreeMap::new();
        for sequence in self.pending() {
            let stamp = self.stamp(sequence)?;
            if !selected(&stamp) {
                continue;
            }
            let twin = self.stamp_sequence(stamp.with_time(time))?;
            self.stamp_to_sequence.remove(&stamp);
            remapped.insert(sequence, twin);
        }
        tracing::debug!(
            "retired {} uncommitted stamps to time {time}",
            remapped.len()
        );
        Ok(remapped)
    }

    /// One-line, human readable description of a stamp sequence.
    pub fn describe(&self, sequence: StampSequence) -> String {
        match self.stamp(sequence) {
            Ok(stamp) => format!("{sequence} {stamp}"),
            Err(_) => format!("{sequence} [unknown]"),
        }
    }

    pub fn snapshot(&self) -> StampSnapshot {
        let mut stamps: Vec<StampRecord> = self
            .sequence_to_stamp
            .iter()
            .map(|entry| {
                let (sequence, stamp) = (*entry.key(), *entry.value());
                let retired = self
                    .stamp_to_sequence
                    .get(&stamp)
                    .map(|live| *live != sequence)
                    .unwrap_or(true);
                StampRecord {
                    sequence,
                    stamp,
                    retired,
                }
            })
            .collect();
        stamps.sort_by_key(|record| record.sequence);
        StampSnapshot {
            next_sequence: self.next_sequence.load(Ordering::SeqCst),
            stamps,
        }
    }

    pub fn from_snapshot(snapshot: StampSnapshot) -> Result<StampStore, KometError> {
        let store = StampStore::default();
        let mut highest = 0;
        for record in snapshot.stamps {
            if record.stamp.time == 0 {
                return Err(KometError::illegal_state(format!(
                    "Snapshot holds {} with time zero",
                    record.sequence
                )));
            }
            highest = highest.max(record.sequence.get());
            store.sequence_to_stamp.insert(record.sequence, record.stamp);
            if !record.retired {
                if let Some(previous) = store
                    .stamp_to_sequence
                    .insert(record.stamp, record.sequence)
                {
                    return Err(KometError::illegal_state(format!(
                        "Snapshot interns {} twice, as {previous} and {}",
                        record.stamp, record.sequence
                    )));
                }
            }
        }
        store
            .next_sequence
            .store(snapshot.next_sequence.max(highest + 1), Ordering::SeqCst);
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid(n: i32) -> Nid {
        Nid::new(n).unwrap()
    }

    fn stamp(time: i64) -> Stamp {
        Stamp::new(Status::Active, time, nid(-1), nid(-2), nid(-3)).unwrap()
    }

    #[test]
    fn zero_time_is_illegal() {
        let err = Stamp::new(Status::Active, 0, nid(-1), nid(-2), nid(-3)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn interning_is_idempotent() {
        let stamps = StampStore::default();
        let a = stamps.stamp_sequence(stamp(10)).unwrap();
        let b = stamps.stamp_sequence(stamp(20)).unwrap();
        assert_eq!(a, StampSequence(1));
        assert_eq!(b, StampSequence(2));
        assert_eq!(stamps.stamp_sequence(stamp(10)).unwrap(), a);
        assert_eq!(stamps.time_for(b).unwrap(), 20);
        assert_eq!(stamps.path_for(a).unwrap(), nid(-3));
        assert_eq!(stamps.status_for(a).unwrap(), Status::Active);
        assert!(stamps.stamp(StampSequence(99)).is_err());
    }

    #[test]
    fn commit_swaps_pending_stamps_for_committed_twins() {
        let stamps = StampStore::default();
        let pending = stamps
            .stamp_sequence(Stamp::uncommitted(Status::Active, nid(-1), nid(-2), nid(-3)))
            .unwrap();
        assert!(stamps.is_uncommitted(pending).unwrap());
        assert_eq!(stamps.pending(), vec![pending]);

        let remapped = stamps.commit_pending(500).unwrap();
        let committed = remapped[&pending];
        assert_eq!(stamps.time_for(committed).unwrap(), 500);
        assert!(stamps.pending().is_empty());
        // The retired sequence still resolves for anything that has not been rewritten.
        assert!(stamps.is_uncommitted(pending).unwrap());

        let fresh = stamps
            .stamp_sequence(Stamp::uncommitted(Status::Active, nid(-1), nid(-2), nid(-3)))
            .unwrap();
        assert_ne!(fresh, pending);
        assert!(stamps.commit_pending(UNCOMMITTED_TIME).is_err());
    }

    #[test]
    fn commit_collisions_name_already_interned_twins() {
        let stamps = StampStore::default();
        let committed = stamps
            .stamp_sequence(Stamp::new(Status::Active, 500, nid(-1), nid(-2), nid(-3)).unwrap())
            .unwrap();
        let pending = stamps
            .stamp_sequence(Stamp::uncommitted(Status::Active, nid(-1), nid(-2), nid(-3)))
            .unwrap();
        assert_eq!(
            stamps.commit_collisions(500).unwrap(),
            BTreeMap::from([(pending, committed)])
        );
        assert!(stamps.commit_collisions(600).unwrap().is_empty());
        assert_eq!(stamps.commit_pending(500).unwrap()[&pending], committed);
        assert!(stamps.describe(committed).starts_with("s1 [active t:500"));
        assert_eq!(stamps.describe(StampSequence(42)), "s42 [unknown]");
    }

    #[test]
    fn cancel_only_touches_one_author() {
        let stamps = StampStore::default();
        let mine = stamps
            .stamp_sequence(Stamp::uncommitted(Status::Active, nid(-1), nid(-2), nid(-3)))
            .unwrap();
        let theirs = stamps
            .stamp_sequence(Stamp::uncommitted(Status::Active, nid(-9), nid(-2), nid(-3)))
            .unwrap();
        let remapped = stamps.cancel_pending(nid(-1)).unwrap();
        assert_eq!(remapped.len(), 1);
        assert!(stamps.stamp(remapped[&mine]).unwrap().is_canceled());
        assert_eq!(stamps.pending(), vec![theirs]);
    }

    #[test]
    fn snapshot_keeps_retired_sequences_resolvable() {
        let stamps = StampStore::default();
        let committed = stamps.stamp_sequence(stamp(10)).unwrap();
        let pending = stamps
            .stamp_sequence(Stamp::uncommitted(Status::Inactive, nid(-1), nid(-2), nid(-3)))
            .unwrap();
        stamps.commit_pending(99).unwrap();

        let snapshot = stamps.snapshot();
        let restored = StampStore::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.stamp(pending).unwrap(), stamps.stamp(pending).unwrap());
        assert_eq!(restored.stamp_sequence(stamp(10)).unwrap(), committed);
        assert!(restored.pending().is_empty());
        assert!(restored.stamp_sequence(stamp(11)).unwrap().get() > 3);
    }

    #[test]
    fn snapshots_with_zero_time_stamps_are_refused() {
        let stamps = StampStore::default();
        stamps.stamp_sequence(stamp(10)).unwrap();
        let mut snapshot = stamps.snapshot();
        snapshot.stamps[0].stamp.time = 0;
        let err = StampStore::from_snapshot(snapshot).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn status_sets_serialize_as_lists() {
        let set: StatusSet = Status::Active | Status::Inactive;
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["active","inactive"]"#);
        let back: StatusSet = serde_json::from_str(r#"["inactive"]"#).unwrap();
        assert_eq!(back, EnumSet::only(Status::Inactive));
    }
}
