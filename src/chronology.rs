//! Chronologies: the append-only version history of one component.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::{
    error::KometError,
    identity::{Nid, VersionType},
    stamp::StampSequence,
};

/// Payload of a single version. The set of kinds is closed; every consumer matches exhaustively.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VersionData {
    Concept,
    Description {
        text: String,
        language: Nid,
        type_nid: Nid,
    },
    ComponentNid {
        value: Nid,
    },
    String {
        value: String,
    },
    Long {
        value: i64,
    },
    Member,
    Uuid {
        value: Uuid,
    },
}

impl VersionData {
    pub fn version_type(&self) -> VersionType {
        match self {
            VersionData::Concept => VersionType::Concept,
            VersionData::Description { .. } => VersionType::Description,
            VersionData::ComponentNid { .. } => VersionType::ComponentNid,
            VersionData::String { .. } => VersionType::String,
            VersionData::Long { .. } => VersionType::Long,
            VersionData::Member => VersionType::Member,
            VersionData::Uuid { .. } => VersionType::Uuid,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub stamp: StampSequence,
    pub data: VersionData,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chronology {
    pub nid: Nid,
    pub assemblage: Nid,
    pub version_type: VersionType,
    versions: Vec<Version>,
}

impl Chronology {
    pub fn new(nid: Nid, assemblage: Nid, version_type: VersionType) -> Self {
        Chronology {
            nid,
            assemblage,
            version_type,
            versions: Vec::new(),
        }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn stamps(&self) -> Vec<StampSequence> {
        self.versions.iter().map(|v| v.stamp).collect()
    }

    pub fn version_for_stamp(&self, stamp: StampSequence) -> Option<&Version> {
        self.versions.iter().find(|v| v.stamp == stamp)
    }

    fn check_type(&self, data: &VersionData) -> Result<(), KometError> {
        if data.version_type() != self.version_type {
            return Err(KometError::TypeMismatch(format!(
                "chronology {} holds {:?} versions, got {:?}",
                self.nid,
                self.version_type,
                data.version_type()
            )));
        }
        Ok(())
    }

    pub fn add_version(&mut self, version: Version) -> Result<(), KometError> {
        self.check_type(&version.data)?;
        if self.version_for_stamp(version.stamp).is_some() {
            return Err(KometError::illegal_state(format!(
                "chronology {} already has a version at stamp {}",
                self.nid, version.stamp
            )));
        }
        self.versions.push(version);
        Ok(())
    }

    /// Overwrite the data of the version at `version.stamp`. Only meaningful for uncommitted
    /// stamps; the store enforces that.
    pub fn replace_version(&mut self, version: Version) -> Result<(), KometError> {
        self.check_type(&version.data)?;
        let existing = self
            .versions
            .iter_mut()
            .find(|v| v.stamp == version.stamp)
            .ok_or_else(|| {
                KometError::NotFound(format!(
                    "chronology {} has no version at stamp {}",
                    self.nid, version.stamp
                ))
            })?;
        existing.data = version.data;
        Ok(())
    }

    /// Apply a commit or cancel remapping. Returns how many versions moved.
    ///
    /// A version remapped onto a stamp the chronology already holds is folded into the existing
    /// version. The store refuses commits where the two carry different data.
    pub fn rewrite_stamps(&mut self, remapped: &BTreeMap<StampSequence, StampSequence>) -> usize {
        let mut moved = 0;
        for version in self.versions.iter_mut() {
            if let Some(next) = remapped.get(&version.stamp) {
                version.stamp = *next;
                moved += 1;
            }
        }
        if moved > 0 {
            let mut seen = BTreeSet::new();
            self.versions.retain(|version| seen.insert(version.stamp));
        }
        moved
    }
}

/// The visible version(s) of a chronology under one coordinate.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LatestVersion {
    pub value: Option<Version>,
    /// Other versions that are equally latest and could not be ordered against `value`.
    pub contradictions: Vec<Version>,
}

impl LatestVersion {
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_contradicted(&self) -> bool {
        !self.contradictions.is_empty()
    }

    pub fn all(&self) -> Vec<&Version> {
        self.value.iter().chain(self.contradictions.iter()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid(n: i32) -> Nid {
        Nid::new(n).unwrap()
    }

    #[test]
    fn version_kinds_must_match_the_chronology() {
        let mut chronology = Chronology::new(nid(-1), nid(-2), VersionType::String);
        chronology
            .add_version(Version {
                stamp: StampSequence(1),
                data: VersionData::String {
                    value: "heart".into(),
                },
            })
            .unwrap();
        let err = chronology
            .add_version(Version {
                stamp: StampSequence(2),
                data: VersionData::Long { value: 3 },
            })
            .unwrap_err();
        assert!(matches!(err, KometError::TypeMismatch(_)));
        assert_eq!(chronology.versions().len(), 1);
    }

    #[test]
    fn duplicate_stamps_are_refused_but_replaceable() {
        let mut chronology = Chronology::new(nid(-1), nid(-2), VersionType::Long);
        let version = Version {
            stamp: StampSequence(7),
            data: VersionData::Long { value: 1 },
        };
        chronology.add_version(version.clone()).unwrap();
        assert!(chronology.add_version(version).unwrap_err().is_fatal());
        chronology
            .replace_version(Version {
                stamp: StampSequence(7),
                data: VersionData::Long { value: 2 },
            })
            .unwrap();
        assert_eq!(
            chronology.version_for_stamp(StampSequence(7)).unwrap().data,
            VersionData::Long { value: 2 }
        );
    }

    #[test]
    fn rewrite_moves_only_remapped_stamps() {
        let mut chronology = Chronology::new(nid(-1), nid(-2), VersionType::Member);
        for s in [1, 2, 3] {
            chronology
                .add_version(Version {
                    stamp: StampSequence(s),
                    data: VersionData::Member,
                })
                .unwrap();
        }
        let remapped = BTreeMap::from([(StampSequence(2), StampSequence(9))]);
        assert_eq!(chronology.rewrite_stamps(&remapped), 1);
        assert_eq!(
            chronology.stamps(),
            vec![StampSequence(1), StampSequence(9), StampSequence(3)]
        );

        // Landing on a stamp the chronology already holds folds the two versions together.
        let onto_existing = BTreeMap::from([(StampSequence(3), StampSequence(1))]);
        assert_eq!(chronology.rewrite_stamps(&onto_existing), 1);
        assert_eq!(
            chronology.stamps(),
            vec![StampSequence(1), StampSequence(9)]
        );
    }

    #[test]
    fn version_data_serializes_with_a_type_tag() {
        let data = VersionData::Description {
            text: "Myocardial infarction".into(),
            language: nid(-4),
            type_nid: nid(-5),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["type"], "description");
        assert_eq!(serde_json::from_value::<VersionData>(json).unwrap(), data);
    }
}
