//! The identifier service: UUID ↔ nid bindings, nid → assemblage bindings and per-assemblage
//! element sequences.
//!
//! Every map here is read far more often than written, so lookups go through [DashMap] shards
//! and never take a global lock. Writers claim entries with the entry API: a vacant entry is the
//! compare-and-set winner, an occupied entry hands back whatever the first writer stored.
use dashmap::{mapref::entry::Entry, DashMap};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicI32, AtomicU32, Ordering},
    Arc,
};
use uuid::Uuid;

use super::nid::{ElementSequence, Nid, ObjectChronologyType, VersionType};
use crate::error::KometError;

/// What [IdentifierService::assign_nid] does when the supplied UUIDs are already bound to more
/// than one nid.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UuidMergePolicy {
    /// Refuse with [KometError::UuidConflict].
    #[default]
    Strict,
    /// Keep the first nid found and move the remaining UUIDs onto it, logging every move.
    FirstFound,
}

#[derive(Debug)]
struct Assemblage {
    types: OnceCell<(ObjectChronologyType, VersionType)>,
    next_sequence: AtomicU32,
    nid_to_sequence: DashMap<Nid, ElementSequence>,
    sequence_to_nid: DashMap<ElementSequence, Nid>,
}

impl Default for Assemblage {
    fn default() -> Self {
        Assemblage {
            types: OnceCell::new(),
            next_sequence: AtomicU32::new(1),
            nid_to_sequence: DashMap::new(),
            sequence_to_nid: DashMap::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssemblageSnapshot {
    pub assemblage: Nid,
    pub types: Option<(ObjectChronologyType, VersionType)>,
    pub next_sequence: u32,
    pub members: Vec<(ElementSequence, Nid)>,
}

/// Serializable image of an [IdentifierService], ordered so that equal services produce equal
/// snapshots.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentifierSnapshot {
    pub next_nid: i32,
    pub uuids: Vec<(Nid, Vec<Uuid>)>,
    pub assemblages: Vec<AssemblageSnapshot>,
}

impl Default for IdentifierSnapshot {
    fn default() -> Self {
        IdentifierSnapshot {
            next_nid: Nid::FIRST.get(),
            uuids: Vec::new(),
            assemblages: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct IdentifierService {
    merge_policy: UuidMergePolicy,
    /// Serializes the scan-then-bind step of assignments that change the UUID map.
    assigning: Mutex<()>,
    next_nid: AtomicI32,
    uuid_to_nid: DashMap<Uuid, Nid>,
    nid_to_uuids: DashMap<Nid, Vec<Uuid>>,
    nid_to_assemblage: DashMap<Nid, Nid>,
    assemblages: DashMap<Nid, Arc<Assemblage>>,
}

impl Default for IdentifierService {
    fn default() -> Self {
        IdentifierService::new(UuidMergePolicy::default())
    }
}

impl IdentifierService {
    pub fn new(merge_policy: UuidMergePolicy) -> Self {
        IdentifierService {
            merge_policy,
            assigning: Mutex::new(()),
            next_nid: AtomicI32::new(Nid::FIRST.get()),
            uuid_to_nid: DashMap::new(),
            nid_to_uuids: DashMap::new(),
            nid_to_assemblage: DashMap::new(),
            assemblages: DashMap::new(),
        }
    }

    pub fn merge_policy(&self) -> UuidMergePolicy {
        self.merge_policy
    }

    fn mint(&self) -> Result<Nid, KometError> {
        match self
            .next_nid
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next < 0).then_some(next + 1)
            }) {
            Ok(minted) => Nid::new(minted),
            Err(_) => Err(KometError::illegal_state("Nid space exhausted")),
        }
    }

    /// Return the nid for `uuids`, minting one if none of them is known yet. Every UUID in the
    /// call ends up bound to the returned nid.
    ///
    /// Calls whose UUIDs are already bound to one nid never lock. Anything that mints or binds
    /// scans again under the assignment lock, so concurrent calls with overlapping UUIDs (in any
    /// order) agree on one nid and a refused call changes nothing.
    pub fn assign_nid(&self, uuids: &[Uuid]) -> Result<Nid, KometError> {
        if uuids.is_empty() {
            return Err(KometError::illegal_state(
                "assign_nid requires at least one UUID",
            ));
        }
        if let Some(nid) = self.fully_bound(uuids) {
            return Ok(nid);
        }

        let _assigning = self.assigning.lock();
        let nid = match self.bound_nid(uuids)? {
            Some(nid) => nid,
            None => {
                let nid = self.mint()?;
                tracing::trace!("minted nid {nid} for {}", uuids[0]);
                nid
            }
        };
        for uuid in uuids {
            self.bind_uuid(uuid, nid)?;
        }
        Ok(nid)
    }

    /// The nid every one of `uuids` is bound to, if they all share one.
    fn fully_bound(&self, uuids: &[Uuid]) -> Option<Nid> {
        let mut bound = uuids.iter().map(|uuid| self.nid_for_uuid(uuid));
        let first = bound.next()??;
        bound.all(|nid| nid == Some(first)).then_some(first)
    }

    /// The first nid bound to any of `uuids`, refusing under [UuidMergePolicy::Strict] when they
    /// are bound to more than one.
    fn bound_nid(&self, uuids: &[Uuid]) -> Result<Option<Nid>, KometError> {
        let mut found: Option<Nid> = None;
        for uuid in uuids {
            let Some(existing) = self.nid_for_uuid(uuid) else {
                continue;
            };
            match found {
                None => found = Some(existing),
                Some(first) if first != existing => {
                    if self.merge_policy == UuidMergePolicy::Strict {
                        return Err(KometError::UuidConflict {
                            uuid: uuid.to_string(),
                            existing: existing.get(),
                            requested: first.get(),
                        });
                    }
                }
                Some(_) => {}
            }
        }
        Ok(found)
    }

    fn bind_uuid(&self, uuid: &Uuid, nid: Nid) -> Result<(), KometError> {
        match self.uuid_to_nid.entry(*uuid) {
            Entry::Vacant(entry) => {
                self.nid_to_uuids.entry(nid).or_default().push(*uuid);
                entry.insert(nid);
            }
            Entry::Occupied(mut entry) => {
                let existing = *entry.get();
                if existing == nid {
                    return Ok(());
                }
                match self.merge_policy {
                    UuidMergePolicy::Strict => {
                        return Err(KometError::UuidConflict {
                            uuid: uuid.to_string(),
                            existing: existing.get(),
                            requested: nid.get(),
                        });
                    }
                    UuidMergePolicy::FirstFound => {
                        tracing::warn!(
                            "UUID {uuid} was bound to nid {existing}; merging onto nid {nid}"
                        );
                        if let Some(mut previous) = self.nid_to_uuids.get_mut(&existing) {
                            previous.retain(|u| u != uuid);
                        }
                        self.nid_to_uuids
                            .remove_if(&existing, |_, remaining| remaining.is_empty());
                        self.nid_to_uuids.entry(nid).or_default().push(*uuid);
                        entry.insert(nid);
                    }
                }
            }
        }
        Ok(())
    }

    /// The first nid bound to any of `uuids`.
    pub fn nid_for_uuids(&self, uuids: &[Uuid]) -> Result<Nid, KometError> {
        uuids
            .iter()
            .find_map(|uuid| self.nid_for_uuid(uuid))
            .ok_or_else(|| KometError::NotFound(format!("No nid for UUIDs {uuids:?}")))
    }

    pub fn nid_for_uuid(&self, uuid: &Uuid) -> Option<Nid> {
        self.uuid_to_nid.get(uuid).map(|nid| *nid)
    }

    pub fn is_uuid_assigned(&self, uuid: &Uuid) -> bool {
        self.uuid_to_nid.contains_key(uuid)
    }

    /// UUIDs bound to `nid`, primordial first.
    pub fn uuids_for_nid(&self, nid: Nid) -> Result<Vec<Uuid>, KometError> {
        self.nid_to_uuids
            .get(&nid)
            .map(|uuids| uuids.clone())
            .filter(|uuids| !uuids.is_empty())
            .ok_or_else(|| KometError::NotFound(format!("No UUIDs for nid {nid}")))
    }

    pub fn primordial_uuid(&self, nid: Nid) -> Result<Uuid, KometError> {
        self.nid_to_uuids
            .get(&nid)
            .and_then(|uuids| uuids.first().copied())
            .ok_or_else(|| KometError::NotFound(format!("No UUIDs for nid {nid}")))
    }

    /// The most recently minted nid.
    pub fn max_nid(&self) -> Option<Nid> {
        let next = self.next_nid.load(Ordering::SeqCst);
        (next > Nid::FIRST.get())
            .then(|| Nid::new(next - 1).ok())
            .flatten()
    }

    pub fn nid_count(&self) -> usize {
        self.nid_to_uuids.len()
    }

    fn assemblage_state(&self, assemblage: Nid) -> Arc<Assemblage> {
        Arc::clone(self.assemblages.entry(assemblage).or_default().value())
    }

    /// Permanently bind `nid` to `assemblage` and record the kinds of chronology the assemblage
    /// holds.
    pub fn setup_nid(
        &self,
        nid: Nid,
        assemblage: Nid,
        object_type: ObjectChronologyType,
        version_type: VersionType,
    ) -> Result<(), KometError> {
        if version_type.object_type() != object_type {
            return Err(KometError::TypeMismatch(format!(
                "{version_type:?} versions cannot live in a {object_type:?} chronology"
            )));
        }
        let state = self.assemblage_state(assemblage);
        let requested = (object_type, version_type);
        let registered = *state.types.get_or_init(|| requested);
        if registered != requested {
            return Err(KometError::illegal_state(format!(
                "Assemblage {assemblage} holds {registered:?}, cannot re-register as {requested:?}"
            )));
        }
        self.bind_assemblage(nid, assemblage)
    }

    fn bind_assemblage(&self, nid: Nid, assemblage: Nid) -> Result<(), KometError> {
        let bound = *self.nid_to_assemblage.entry(nid).or_insert(assemblage);
        if bound != assemblage {
            return Err(KometError::illegal_state(format!(
                "Nid {nid} already assigned to assemblage {bound}, cannot assign to {assemblage}"
            )));
        }
        Ok(())
    }

    pub fn assemblage_of(&self, nid: Nid) -> Option<Nid> {
        self.nid_to_assemblage.get(&nid).map(|a| *a)
    }

    pub fn version_type_for_assemblage(&self, assemblage: Nid) -> Option<VersionType> {
        self.assemblages
            .get(&assemblage)
            .and_then(|state| state.types.get().map(|(_, vt)| *vt))
    }

    pub fn object_type_for_assemblage(&self, assemblage: Nid) -> Option<ObjectChronologyType> {
        self.assemblages
            .get(&assemblage)
            .and_then(|state| state.types.get().map(|(ot, _)| *ot))
    }

    /// Dense sequence of `nid` within `assemblage`, assigned on first request. Racing callers
    /// for the same nid all observe the first writer's sequence.
    pub fn element_sequence_for_nid(
        &self,
        nid: Nid,
        assemblage: Nid,
    ) -> Result<ElementSequence, KometError> {
        self.bind_assemblage(nid, assemblage)?;
        let state = self.assemblage_state(assemblage);
        let sequence = match state.nid_to_sequence.entry(nid) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let sequence =
                    ElementSequence(state.next_sequence.fetch_add(1, Ordering::SeqCst));
                state.sequence_to_nid.insert(sequence, nid);
                entry.insert(sequence);
                sequence
            }
        };
        Ok(sequence)
    }

    pub fn nid_for_element_sequence(
        &self,
        assemblage: Nid,
        sequence: ElementSequence,
    ) -> Result<Nid, KometError> {
        self.assemblages
            .get(&assemblage)
            .and_then(|state| state.sequence_to_nid.get(&sequence).map(|nid| *nid))
            .ok_or_else(|| {
                KometError::NotFound(format!(
                    "No nid at sequence {sequence} in assemblage {assemblage}"
                ))
            })
    }

    /// Members of `assemblage` in element-sequence order.
    pub fn nids_for_assemblage(&self, assemblage: Nid) -> Vec<Nid> {
        let Some(state) = self.assemblages.get(&assemblage).map(|s| Arc::clone(&s)) else {
            return Vec::new();
        };
        let mut members: Vec<(ElementSequence, Nid)> = state
            .sequence_to_nid
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        members.sort();
        members.into_iter().map(|(_, nid)| nid).collect()
    }

    pub fn snapshot(&self) -> IdentifierSnapshot {
        let mut uuids: Vec<(Nid, Vec<Uuid>)> = self
            .nid_to_uuids
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        uuids.sort_by_key(|(nid, _)| *nid);

        let mut assemblages: Vec<AssemblageSnapshot> = self
            .assemblages
            .iter()
            .map(|entry| {
                let state = entry.value();
                let mut members: Vec<(ElementSequence, Nid)> = state
                    .sequence_to_nid
                    .iter()
                    .map(|m| (*m.key(), *m.value()))
                    .collect();
                members.sort();
                AssemblageSnapshot {
                    assemblage: *entry.key(),
                    types: state.types.get().copied(),
                    next_sequence: state.next_sequence.load(Ordering::SeqCst),
                    members,
                }
            })
            .collect();
        assemblages.sort_by_key(|a| a.assemblage);

        // Members registered without a sequence still carry an assemblage binding.
        let sequenced: std::collections::BTreeSet<Nid> = assemblages
            .iter()
            .flat_map(|a| a.members.iter().map(|(_, nid)| *nid))
            .collect();
        for entry in self.nid_to_assemblage.iter() {
            if sequenced.contains(entry.key()) {
                continue;
            }
            if let Ok(idx) = assemblages.binary_search_by_key(entry.value(), |a| a.assemblage) {
                assemblages[idx].members.push((ElementSequence(0), *entry.key()));
            }
        }
        for assemblage in assemblages.iter_mut() {
            assemblage.members.sort();
        }

        IdentifierSnapshot {
            next_nid: self.next_nid.load(Ordering::SeqCst),
            uuids,
            assemblages,
        }
    }

    pub fn from_snapshot(
        merge_policy: UuidMergePolicy,
        snapshot: IdentifierSnapshot,
    ) -> Result<IdentifierService, KometError> {
        let service = IdentifierService::new(merge_policy);
        if snapshot.next_nid > 0 || snapshot.next_nid < Nid::FIRST.get() {
            return Err(KometError::illegal_state(format!(
                "Snapshot next nid {} is outside the nid space",
                snapshot.next_nid
            )));
        }
        service.next_nid.store(snapshot.next_nid, Ordering::SeqCst);
        for (nid, uuids) in snapshot.uuids {
            for uuid in &uuids {
                if let Some(previous) = service.uuid_to_nid.insert(*uuid, nid) {
                    return Err(KometError::illegal_state(format!(
                        "Snapshot binds UUID {uuid} to both {previous} and {nid}"
                    )));
                }
            }
            service.nid_to_uuids.insert(nid, uuids);
        }
        for assemblage in snapshot.assemblages {
            let state = Assemblage::default();
            if let Some(types) = assemblage.types {
                let _ = state.types.set(types);
            }
            state
                .next_sequence
                .store(assemblage.next_sequence.max(1), Ordering::SeqCst);
            for (sequence, nid) in assemblage.members {
                service.bind_assemblage(nid, assemblage.assemblage)?;
                // Sequence 0 marks a nid bound to the assemblage before it was sequenced.
                if sequence.get() > 0 {
                    state.nid_to_sequence.insert(nid, sequence);
                    state.sequence_to_nid.insert(sequence, nid);
                }
            }
            service
                .assemblages
                .insert(assemblage.assemblage, Arc::new(state));
        }
        Ok(service)
    }
}
