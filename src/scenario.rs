//! Declarative scenarios: a TOML description of paths, versions and queries that can be applied to
//! a [TerminologyStore] and evaluated against it.
//!
//! Everything in a scenario is referred to by name. Names are hashed into stable UUIDs with
//! [name_uuid], so applying the same scenario twice touches the same components, and the
//! well-known components ("master path", "development path", "user", ...) can be referred to by
//! their names directly.
//!
//! ```toml
//! [[paths]]
//! name = "release"
//! origins = [{ path = "master path", time = 100 }]
//!
//! [[versions]]
//! component = "heart"
//! path = "release"
//! time = 150
//! data = { type = "concept" }
//!
//! [[queries]]
//! name = "heart on release"
//! component = "heart"
//! path = "release"
//! ```
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    fs::read_to_string,
    path::Path,
};
use uuid::Uuid;

use crate::{
    chronology::{Version, VersionData},
    coordinate::{RelativePosition, StampCoordinate, StampPrecedence},
    error::KometError,
    identity::{well_known::name_uuid, Nid, VersionType},
    paths::Position,
    stamp::{Stamp, StampSequence, Status, StatusSet},
    store::TerminologyStore,
};

const DEFAULT_AUTHOR: &str = "user";
const DEFAULT_MODULE: &str = "core module";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scenario {
    pub paths: Vec<PathEntry>,
    pub versions: Vec<VersionEntry>,
    pub queries: Vec<QueryEntry>,
    /// Commit all uncommitted versions at this time once every version has been applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_at: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathEntry {
    pub name: String,
    #[serde(default)]
    pub origins: Vec<PointEntry>,
}

/// A named path and an optional time; no time means the latest point on the path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionEntry {
    pub component: String,
    /// Defaults to the concept or description assemblage, depending on the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assemblage: Option<String>,
    pub path: String,
    /// No time records the version as uncommitted work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default = "default_status")]
    pub status: Status,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_module")]
    pub module: String,
    pub data: DataEntry,
}

/// Version payloads with component references spelled as names.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DataEntry {
    Concept,
    Description {
        text: String,
        language: String,
        description_type: String,
    },
    ComponentNid {
        value: String,
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

impl DataEntry {
    fn version_type(&self) -> VersionType {
        match self {
            DataEntry::Concept => VersionType::Concept,
            DataEntry::Description { .. } => VersionType::Description,
            DataEntry::ComponentNid { .. } => VersionType::ComponentNid,
            DataEntry::String { .. } => VersionType::String,
            DataEntry::Long { .. } => VersionType::Long,
            DataEntry::Member => VersionType::Member,
            DataEntry::Uuid { .. } => VersionType::Uuid,
        }
    }

    fn resolve(&self, store: &TerminologyStore) -> Result<VersionData, KometError> {
        Ok(match self {
            DataEntry::Concept => VersionData::Concept,
            DataEntry::Description {
                text,
                language,
                description_type,
            } => VersionData::Description {
                text: text.clone(),
                language: named_nid(store, language)?,
                type_nid: named_nid(store, description_type)?,
            },
            DataEntry::ComponentNid { value } => VersionData::ComponentNid {
                value: named_nid(store, value)?,
            },
            DataEntry::String { value } => VersionData::String {
                value: value.clone(),
            },
            DataEntry::Long { value } => VersionData::Long { value: *value },
            DataEntry::Member => VersionData::Member,
            DataEntry::Uuid { value } => VersionData::Uuid { value: *value },
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryEntry {
    pub name: String,
    pub component: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default)]
    pub precedence: StampPrecedence,
    /// Empty means every status.
    #[serde(default)]
    pub statuses: Vec<Status>,
    /// Empty means every module.
    #[serde(default)]
    pub modules: Vec<String>,
}

fn default_status() -> Status {
    Status::Active
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

fn default_module() -> String {
    DEFAULT_MODULE.to_string()
}

/// The nid `name` resolves to in `store`, assigning one if the name is new.
pub fn named_nid(store: &TerminologyStore, name: &str) -> Result<Nid, KometError> {
    store.assign_nid(&[name_uuid(name)])
}

/// The nid of a name that must already be known to `store`.
pub fn existing_nid(store: &TerminologyStore, name: &str) -> Result<Nid, KometError> {
    store
        .nid_for_uuids(&[name_uuid(name)])
        .map_err(|_| KometError::NotFound(format!("Nothing named '{name}'")))
}

/// Parse `path:time` (or a bare `path`, meaning its latest point) into a position.
pub fn parse_point(store: &TerminologyStore, point: &str) -> Result<Position, KometError> {
    match point.rsplit_once(':') {
        Some((path, time)) => {
            let time: i64 = time.trim().parse().map_err(|_| {
                KometError::Config(format!("'{time}' in point '{point}' is not a time"))
            })?;
            Ok(Position::new(existing_nid(store, path.trim())?, time))
        }
        None => Ok(Position::latest(existing_nid(store, point.trim())?)),
    }
}

/// Summary of what a scenario changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub paths: usize,
    pub components: BTreeSet<Nid>,
    pub stamps: Vec<StampSequence>,
    pub committed: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub stamp: Stamp,
    pub data: VersionData,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryOutcome {
    pub name: String,
    pub component: String,
    pub coordinate: StampCoordinate,
    pub latest: Option<ResolvedVersion>,
    pub contradictions: Vec<ResolvedVersion>,
}

impl QueryOutcome {
    pub fn is_present(&self) -> bool {
        self.latest.is_some()
    }

    pub fn is_contradicted(&self) -> bool {
        !self.contradictions.is_empty()
    }
}

impl Display for QueryOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} from {}): ", self.name, self.component, self.coordinate)?;
        match &self.latest {
            None => write!(f, "absent"),
            Some(latest) => {
                write!(f, "{:?} {}", latest.data, latest.stamp)?;
                if self.is_contradicted() {
                    write!(f, " {}", RelativePosition::Contradiction)?;
                    for other in &self.contradictions {
                        write!(f, " | {:?} {}", other.data, other.stamp)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl Scenario {
    pub fn from_toml(content: &str) -> Result<Scenario, KometError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Scenario, KometError> {
        let path = path.as_ref();
        tracing::debug!("Loading scenario from {:?}", path);
        Scenario::from_toml(&read_to_string(path)?)
    }

    /// Register the scenario's paths and record its versions in `store`.
    pub fn apply(&self, store: &TerminologyStore) -> Result<ApplyReport, KometError> {
        let mut report = ApplyReport::default();
        for entry in &self.paths {
            let origins = entry
                .origins
                .iter()
                .map(|origin| {
                    let path = existing_nid(store, &origin.path)?;
                    Ok(match origin.time {
                        Some(time) => Position::new(path, time),
                        None => Position::latest(path),
                    })
                })
                .collect::<Result<Vec<Position>, KometError>>()?;
            store.add_path(name_uuid(&entry.name), &origins)?;
            report.paths += 1;
        }

        for entry in &self.versions {
            let version_type = entry.data.version_type();
            let assemblage = match (&entry.assemblage, version_type) {
                (Some(name), _) => named_nid(store, name)?,
                (None, VersionType::Concept) => named_nid(store, "concept assemblage")?,
                (None, VersionType::Description) => named_nid(store, "description assemblage")?,
                (None, other) => {
                    return Err(KometError::Config(format!(
                        "Version of '{}' holds {other:?} data and needs an explicit assemblage",
                        entry.component
                    )))
                }
            };
            let component =
                store.create_chronology(&[name_uuid(&entry.component)], assemblage, version_type)?;
            let path = existing_nid(store, &entry.path)?;
            let author = named_nid(store, &entry.author)?;
            let module = named_nid(store, &entry.module)?;
            let stamp = match entry.time {
                Some(time) => Stamp::new(entry.status, time, author, module, path)?,
                None => Stamp::uncommitted(entry.status, author, module, path),
            };
            let sequence = store.add_version(component, stamp, entry.data.resolve(store)?)?;
            report.components.insert(component);
            report.stamps.push(sequence);
        }

        if let Some(time) = self.commit_at {
            report.committed = store.commit(time)?;
        }
        tracing::info!(
            "Applied scenario: {} paths, {} components, {} versions",
            report.paths,
            report.components.len(),
            report.stamps.len()
        );
        Ok(report)
    }

    pub fn coordinate(
        &self,
        store: &TerminologyStore,
        query: &QueryEntry,
    ) -> Result<StampCoordinate, KometError> {
        let path = existing_nid(store, &query.path)?;
        let position = match query.time {
            Some(time) => Position::new(path, time),
            None => Position::latest(path),
        };
        let statuses: StatusSet = if query.statuses.is_empty() {
            StatusSet::all()
        } else {
            query.statuses.iter().copied().collect()
        };
        let modules = query
            .modules
            .iter()
            .map(|module| existing_nid(store, module))
            .collect::<Result<Vec<Nid>, KometError>>()?;
        Ok(StampCoordinate::new(position)
            .with_precedence(query.precedence)
            .with_statuses(statuses)
            .with_modules(modules))
    }

    /// Run every query against `store`, in declaration order.
    pub fn evaluate(&self, store: &TerminologyStore) -> Result<Vec<QueryOutcome>, KometError> {
        self.queries
            .iter()
            .map(|query| {
                let coordinate = self.coordinate(store, query)?;
                let component = existing_nid(store, &query.component)?;
                let latest = store.latest_version(component, &coordinate)?;
                let resolve = |version: &Version| -> Result<ResolvedVersion, KometError> {
                    Ok(ResolvedVersion {
                        stamp: store.stamps().stamp(version.stamp)?,
                        data: version.data.clone(),
                    })
                };
                Ok(QueryOutcome {
                    name: query.name.clone(),
                    component: query.component.clone(),
                    latest: latest.value.as_ref().map(&resolve).transpose()?,
                    contradictions: latest
                        .contradictions
                        .iter()
                        .map(&resolve)
                        .collect::<Result<Vec<_>, _>>()?,
                    coordinate,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    const FORKED: &str = r#"
[[paths]]
name = "release"
origins = [{ path = "master path", time = 100 }]

[[versions]]
component = "heart"
path = "master path"
time = 50
data = { type = "concept" }

[[versions]]
component = "heart"
path = "master path"
time = 150
status = "inactive"
data = { type = "concept" }

[[versions]]
component = "heart name"
path = "release"
time = 120
data = { type = "description", text = "Heart", language = "english", description_type = "fully qualified name" }

[[queries]]
name = "release sees the fork point"
component = "heart"
path = "release"

[[queries]]
name = "master sees the retirement"
component = "heart"
path = "master path"
statuses = ["active"]

[[queries]]
name = "name"
component = "heart name"
path = "release"
"#;

    fn store() -> TerminologyStore {
        TerminologyStore::open(StoreConfig::in_memory()).unwrap()
    }

    #[test]
    fn forked_scenario_resolves_per_path() {
        let store = store();
        let scenario = Scenario::from_toml(FORKED).unwrap();
        let report = scenario.apply(&store).unwrap();
        assert_eq!(report.paths, 1);
        assert_eq!(report.components.len(), 2);

        let outcomes = scenario.evaluate(&store).unwrap();
        assert_eq!(outcomes.len(), 3);
        let on_release = outcomes[0].latest.as_ref().unwrap();
        assert_eq!(on_release.stamp.time, 50);
        assert_eq!(on_release.stamp.status, Status::Active);
        assert!(!outcomes[1].is_present());
        assert!(matches!(
            outcomes[2].latest.as_ref().map(|v| &v.data),
            Some(VersionData::Description { text, .. }) if text == "Heart"
        ));
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let store = store();
        let scenario = Scenario::from_toml(FORKED).unwrap();
        let first = scenario.apply(&store).unwrap();
        let second = scenario.apply(&store).unwrap();
        assert_eq!(first.components, second.components);
        assert_eq!(first.stamps, second.stamps);
        assert_eq!(store.chronology_count(), 2);
    }

    #[test]
    fn unknown_names_are_not_found() {
        let store = store();
        let scenario = Scenario::from_toml(
            r#"
[[versions]]
component = "x"
path = "nowhere"
time = 5
data = { type = "concept" }
"#,
        )
        .unwrap();
        assert!(matches!(
            scenario.apply(&store),
            Err(KometError::NotFound(_))
        ));
    }

    #[test]
    fn semantic_data_without_assemblage_is_a_config_error() {
        let store = store();
        let scenario = Scenario::from_toml(
            r#"
[[versions]]
component = "weight"
path = "master path"
time = 5
data = { type = "long", value = 70 }
"#,
        )
        .unwrap();
        assert!(matches!(scenario.apply(&store), Err(KometError::Config(_))));
    }

    #[test]
    fn points_parse_with_and_without_time() {
        let store = store();
        let master = existing_nid(&store, "master path").unwrap();
        assert_eq!(
            parse_point(&store, "master path:40").unwrap(),
            Position::new(master, 40)
        );
        assert_eq!(
            parse_point(&store, "master path").unwrap(),
            Position::latest(master)
        );
        assert!(matches!(
            parse_point(&store, "master path:soon"),
            Err(KometError::Config(_))
        ));
    }
}
