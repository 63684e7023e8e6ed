//! TerminologyStore: the explicitly constructed owner of every shared registry.
//!
//! A store is opened from a [StoreConfig], handed around by reference, and shut down when the
//! session ends. Nothing in this crate reaches for global state: two stores in one process are
//! completely independent.
//!
//! Version resolution is synchronous and in-memory. Persistence is explicit: [TerminologyStore::sync]
//! snapshots the registries and writes them out as JSON without blocking resolution.
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

use crate::{
    calculator::{PositionCache, RelativePositionCalculator},
    chronology::{Chronology, LatestVersion, Version, VersionData},
    config::StoreConfig,
    coordinate::{RelativePosition, StampCoordinate},
    error::KometError,
    identity::{well_known, IdentifierService, IdentifierSnapshot, Nid, VersionType},
    paths::{PathRegistry, PathSnapshot, Position},
    stamp::{Stamp, StampSequence, StampSnapshot, StampStore},
};

pub const IDENTIFIERS_FILE: &str = "identifiers.json";
pub const STAMPS_FILE: &str = "stamps.json";
pub const PATHS_FILE: &str = "paths.json";
pub const CHRONOLOGIES_FILE: &str = "chronologies.json";

/// Nids of the components every bootstrapped store carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WellKnownNids {
    pub master_path: Nid,
    pub development_path: Nid,
    pub user: Nid,
    pub core_module: Nid,
    pub concept_assemblage: Nid,
    pub description_assemblage: Nid,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub identifiers: IdentifierSnapshot,
    pub stamps: StampSnapshot,
    pub paths: PathSnapshot,
    pub chronologies: Vec<Chronology>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub files: Vec<PathBuf>,
    pub bytes: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub nids: usize,
    pub stamps: usize,
    pub pending_stamps: usize,
    pub paths: usize,
    pub chronologies: usize,
    pub versions: usize,
    pub cached_segment_maps: usize,
}

#[derive(Debug)]
pub struct TerminologyStore {
    config: StoreConfig,
    identifiers: Arc<IdentifierService>,
    stamps: Arc<StampStore>,
    paths: Arc<PathRegistry>,
    positions: PositionCache,
    chronologies: DashMap<Nid, Chronology>,
    /// Read by version writers, written by commit and cancel: a stamp rewrite never runs between
    /// interning a stamp and storing the version that uses it.
    rewriting: RwLock<()>,
    well_known: Option<WellKnownNids>,
}

impl TerminologyStore {
    /// Open a store, restoring the snapshot in `config.data_dir` when there is one.
    pub fn open(config: StoreConfig) -> Result<TerminologyStore, KometError> {
        let snapshot = match config.data_dir.as_deref() {
            Some(dir) => load_snapshot(dir)?,
            None => None,
        };
        let mut store = match snapshot {
            Some(snapshot) => {
                tracing::info!(
                    "Restoring store: {} nids, {} stamps, {} paths, {} chronologies",
                    snapshot.identifiers.uuids.len(),
                    snapshot.stamps.stamps.len(),
                    snapshot.paths.paths.len(),
                    snapshot.chronologies.len()
                );
                TerminologyStore::from_snapshot(config.clone(), snapshot)?
            }
            None => TerminologyStore::empty(config.clone()),
        };
        if config.bootstrap_well_known {
            store.well_known = Some(store.bootstrap()?);
        }
        Ok(store)
    }

    fn empty(config: StoreConfig) -> TerminologyStore {
        TerminologyStore {
            identifiers: Arc::new(IdentifierService::new(config.uuid_merge)),
            config,
            stamps: Arc::new(StampStore::default()),
            paths: Arc::new(PathRegistry::default()),
            positions: PositionCache::default(),
            chronologies: DashMap::new(),
            rewriting: RwLock::new(()),
            well_known: None,
        }
    }

    fn from_snapshot(
        config: StoreConfig,
        snapshot: StoreSnapshot,
    ) -> Result<TerminologyStore, KometError> {
        let chronologies = DashMap::new();
        for chronology in snapshot.chronologies {
            chronologies.insert(chronology.nid, chronology);
        }
        Ok(TerminologyStore {
            identifiers: Arc::new(IdentifierService::from_snapshot(
                config.uuid_merge,
                snapshot.identifiers,
            )?),
            config,
            stamps: Arc::new(StampStore::from_snapshot(snapshot.stamps)?),
            paths: Arc::new(PathRegistry::from_snapshot(snapshot.paths)?),
            positions: PositionCache::default(),
            chronologies,
            rewriting: RwLock::new(()),
            well_known: None,
        })
    }

    fn bootstrap(&self) -> Result<WellKnownNids, KometError> {
        let nid = |uuid: &Uuid| self.identifiers.assign_nid(&[*uuid]);
        let well_known = WellKnownNids {
            master_path: nid(&well_known::MASTER_PATH)?,
            development_path: nid(&well_known::DEVELOPMENT_PATH)?,
            user: nid(&well_known::USER)?,
            core_module: nid(&well_known::CORE_MODULE)?,
            concept_assemblage: nid(&well_known::CONCEPT_ASSEMBLAGE)?,
            description_assemblage: nid(&well_known::DESCRIPTION_ASSEMBLAGE)?,
        };
        if !self.paths.exists(well_known.master_path) {
            self.paths.add_path(well_known.master_path, &[])?;
        }
        if !self.paths.exists(well_known.development_path) {
            self.paths.add_path(
                well_known.development_path,
                &[Position::latest(well_known.master_path)],
            )?;
        }
        Ok(well_known)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Nids of the bootstrap components; `None` when the store was opened without them.
    pub fn well_known(&self) -> Option<WellKnownNids> {
        self.well_known
    }

    pub fn identifiers(&self) -> &IdentifierService {
        &self.identifiers
    }

    pub fn stamps(&self) -> &StampStore {
        &self.stamps
    }

    pub fn paths(&self) -> &PathRegistry {
        &self.paths
    }

    pub fn positions(&self) -> &PositionCache {
        &self.positions
    }

    pub fn assign_nid(&self, uuids: &[Uuid]) -> Result<Nid, KometError> {
        self.identifiers.assign_nid(uuids)
    }

    pub fn nid_for_uuids(&self, uuids: &[Uuid]) -> Result<Nid, KometError> {
        self.identifiers.nid_for_uuids(uuids)
    }

    /// Register the path identified by `uuid`, forking from `origins`.
    pub fn add_path(&self, uuid: Uuid, origins: &[Position]) -> Result<Nid, KometError> {
        let path = self.identifiers.assign_nid(&[uuid])?;
        self.paths.add_path(path, origins)?;
        Ok(path)
    }

    /// Create (or return) the chronology identified by `uuids` inside `assemblage`.
    pub fn create_chronology(
        &self,
        uuids: &[Uuid],
        assemblage: Nid,
        version_type: VersionType,
    ) -> Result<Nid, KometError> {
        let nid = self.identifiers.assign_nid(uuids)?;
        self.identifiers
            .setup_nid(nid, assemblage, version_type.object_type(), version_type)?;
        self.identifiers.element_sequence_for_nid(nid, assemblage)?;
        self.chronologies
            .entry(nid)
            .or_insert_with(|| Chronology::new(nid, assemblage, version_type));
        Ok(nid)
    }

    /// Record a version of `nid`. Writing identical data again is a no-op. A second write at the
    /// same uncommitted stamp replaces the earlier data; committed versions are immutable.
    pub fn add_version(
        &self,
        nid: Nid,
        stamp: Stamp,
        data: VersionData,
    ) -> Result<StampSequence, KometError> {
        if !self.paths.exists(stamp.path) {
            return Err(KometError::NotFound(format!(
                "Stamp {stamp} is on an unregistered path"
            )));
        }
        let _rewriting = self.rewriting.read();
        let sequence = self.stamps.stamp_sequence(stamp)?;
        let mut chronology = self
            .chronologies
            .get_mut(&nid)
            .ok_or_else(|| KometError::NotFound(format!("No chronology for nid {nid}")))?;
        let version = Version {
            stamp: sequence,
            data,
        };
        match chronology.version_for_stamp(sequence) {
            Some(existing) if existing == &version => {}
            Some(_) if stamp.is_uncommitted() => chronology.replace_version(version)?,
            _ => chronology.add_version(version)?,
        }
        Ok(sequence)
    }

    pub fn chronology(&self, nid: Nid) -> Result<Chronology, KometError> {
        self.chronologies
            .get(&nid)
            .map(|c| c.clone())
            .ok_or_else(|| KometError::NotFound(format!("No chronology for nid {nid}")))
    }

    pub fn chronology_count(&self) -> usize {
        self.chronologies.len()
    }

    pub fn calculator(
        &self,
        coordinate: &StampCoordinate,
    ) -> Result<RelativePositionCalculator, KometError> {
        let segments = self
            .positions
            .segment_map(coordinate.position, &self.paths)?;
        Ok(RelativePositionCalculator::new(
            coordinate.clone(),
            segments,
            Arc::clone(&self.stamps),
        ))
    }

    pub fn latest_version(
        &self,
        nid: Nid,
        coordinate: &StampCoordinate,
    ) -> Result<LatestVersion, KometError> {
        let calculator = self.calculator(coordinate)?;
        let chronology = self
            .chronologies
            .get(&nid)
            .ok_or_else(|| KometError::NotFound(format!("No chronology for nid {nid}")))?;
        calculator.latest_version(&chronology)
    }

    pub fn relative_position(
        &self,
        coordinate: &StampCoordinate,
        s1: StampSequence,
        s2: StampSequence,
    ) -> Result<RelativePosition, KometError> {
        self.calculator(coordinate)?.relative_position(s1, s2)
    }

    /// Commit every pending stamp at `time`. Returns how many versions moved.
    ///
    /// Refused with nothing changed when a pending edit would land on a committed stamp that
    /// already carries different data for the same chronology.
    pub fn commit(&self, time: i64) -> Result<usize, KometError> {
        let _rewriting = self.rewriting.write();
        self.check_commit_collisions(time)?;
        let remapped = self.stamps.commit_pending(time)?;
        let moved = self.rewrite(&remapped);
        tracing::info!(
            "Committed {} stamps ({moved} versions) at {time}",
            remapped.len()
        );
        Ok(moved)
    }

    /// Cancel `author`'s pending stamps. Returns how many versions moved.
    pub fn cancel(&self, author: Nid) -> Result<usize, KometError> {
        let _rewriting = self.rewriting.write();
        let remapped = self.stamps.cancel_pending(author)?;
        let moved = self.rewrite(&remapped);
        tracing::info!(
            "Canceled {} stamps ({moved} versions) for author {author}",
            remapped.len()
        );
        Ok(moved)
    }

    fn check_commit_collisions(&self, time: i64) -> Result<(), KometError> {
        let collisions = self.stamps.commit_collisions(time)?;
        if collisions.is_empty() {
            return Ok(());
        }
        for chronology in self.chronologies.iter() {
            for (pending, committed) in &collisions {
                let (Some(edit), Some(existing)) = (
                    chronology.version_for_stamp(*pending),
                    chronology.version_for_stamp(*committed),
                ) else {
                    continue;
                };
                if edit.data != existing.data {
                    return Err(KometError::illegal_state(format!(
                        "Committing at {time} would move the pending version of {} at {} onto {}, \
                         which already holds different data",
                        chronology.nid,
                        self.stamps.describe(*pending),
                        self.stamps.describe(*committed)
                    )));
                }
            }
        }
        Ok(())
    }

    fn rewrite(&self, remapped: &BTreeMap<StampSequence, StampSequence>) -> usize {
        if remapped.is_empty() {
            return 0;
        }
        self.chronologies
            .iter_mut()
            .map(|mut chronology| chronology.rewrite_stamps(remapped))
            .sum()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            nids: self.identifiers.nid_count(),
            stamps: self.stamps.len(),
            pending_stamps: self.stamps.pending().len(),
            paths: self.paths.len(),
            chronologies: self.chronologies.len(),
            versions: self
                .chronologies
                .iter()
                .map(|c| c.versions().len())
                .sum(),
            cached_segment_maps: self.positions.len(),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut chronologies: Vec<Chronology> =
            self.chronologies.iter().map(|c| c.clone()).collect();
        chronologies.sort_by_key(|c| c.nid);
        StoreSnapshot {
            identifiers: self.identifiers.snapshot(),
            stamps: self.stamps.snapshot(),
            paths: self.paths.snapshot(),
            chronologies,
        }
    }

    /// Write a snapshot of every registry to `data_dir`. The snapshot is taken synchronously;
    /// the returned future serializes on a blocking task and then performs file IO.
    pub fn sync(&self) -> impl std::future::Future<Output = Result<SyncReport, KometError>> {
        let snapshot = self.snapshot();
        let data_dir = self.config.data_dir.clone();
        async move {
            let Some(data_dir) = data_dir else {
                tracing::debug!("In-memory store, nothing to sync");
                return Ok(SyncReport::default());
            };
            let files = tokio::task::spawn_blocking(move || -> Result<_, KometError> {
                Ok([
                    (IDENTIFIERS_FILE, serde_json::to_vec_pretty(&snapshot.identifiers)?),
                    (STAMPS_FILE, serde_json::to_vec_pretty(&snapshot.stamps)?),
                    (PATHS_FILE, serde_json::to_vec_pretty(&snapshot.paths)?),
                    (CHRONOLOGIES_FILE, serde_json::to_vec_pretty(&snapshot.chronologies)?),
                ])
            })
            .await??;
            tokio::fs::create_dir_all(&data_dir).await?;
            let mut report = SyncReport::default();
            for (name, bytes) in files {
                report.files.push(write_file(&data_dir, name, &bytes).await?);
                report.bytes += bytes.len();
            }
            tracing::info!(
                "Synced {} files ({} bytes) to {:?}",
                report.files.len(),
                report.bytes,
                data_dir
            );
            Ok(report)
        }
    }

    /// End the session, syncing first when the configuration asks for it.
    pub async fn shutdown(self) -> Result<Option<SyncReport>, KometError> {
        if self.config.sync_on_shutdown && self.config.data_dir.is_some() {
            return Ok(Some(self.sync().await?));
        }
        Ok(None)
    }
}

async fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, KometError> {
    let target = dir.join(name);
    let staging = dir.join(format!("{name}.tmp"));
    // Readers only ever see a complete file.
    tokio::fs::write(&staging, bytes).await?;
    tokio::fs::rename(&staging, &target).await?;
    tracing::debug!("wrote {} bytes to {:?}", bytes.len(), target);
    Ok(target)
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T, KometError> {
    let content = std::fs::read_to_string(dir.join(name))?;
    Ok(serde_json::from_str(&content)?)
}

/// Read the snapshot in `dir`, or `None` when no snapshot has been written there yet.
pub fn load_snapshot(dir: &Path) -> Result<Option<StoreSnapshot>, KometError> {
    if !dir.join(IDENTIFIERS_FILE).exists() {
        tracing::debug!("No snapshot in {:?}", dir);
        return Ok(None);
    }
    Ok(Some(StoreSnapshot {
        identifiers: read_json(dir, IDENTIFIERS_FILE)?,
        stamps: read_json(dir, STAMPS_FILE)?,
        paths: read_json(dir, PATHS_FILE)?,
        chronologies: read_json(dir, CHRONOLOGIES_FILE)?,
    }))
}
