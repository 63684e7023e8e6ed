use parking_lot::RwLock;
use petgraph::{algo::is_cyclic_directed, graphmap::DiGraphMap};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use super::Position;
use crate::{error::KometError, identity::Nid};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathSnapshot {
    pub paths: Vec<(Nid, Vec<Position>)>,
}

#[derive(Clone, Debug, Default)]
struct PathGraph {
    origins: BTreeMap<Nid, Vec<Position>>,
    /// Edges run from a path to each path it forked from.
    graph: DiGraphMap<Nid, ()>,
}

/// Collapse `origins` so each origin path appears once, at its most recent time.
pub fn normalize_origins<I: IntoIterator<Item = Position>>(origins: I) -> Vec<Position> {
    let mut latest: BTreeMap<Nid, i64> = BTreeMap::new();
    for origin in origins {
        latest
            .entry(origin.path)
            .and_modify(|time| *time = (*time).max(origin.time))
            .or_insert(origin.time);
    }
    latest
        .into_iter()
        .map(|(path, time)| Position::new(path, time))
        .collect()
}

/// The branch graph. Writes are rare (paths are created a handful of times per session) so a
/// single [RwLock] guards it; every change bumps [PathRegistry::generation] so cached segment
/// maps know to rebuild.
#[derive(Debug, Default)]
pub struct PathRegistry {
    inner: RwLock<PathGraph>,
    generation: AtomicU64,
}

impl PathRegistry {
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn exists(&self, path: Nid) -> bool {
        self.inner.read().origins.contains_key(&path)
    }

    pub fn paths(&self) -> Vec<Nid> {
        self.inner.read().origins.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().origins.is_empty()
    }

    /// Register `path` with `origins`. Registering a known path merges the new origins into the
    /// existing ones.
    pub fn add_path(&self, path: Nid, origins: &[Position]) -> Result<(), KometError> {
        let mut inner = self.inner.write();
        let mut candidate = inner.clone();
        candidate.origins.entry(path).or_default();
        candidate.graph.add_node(path);
        for origin in origins {
            Self::link(&mut candidate, path, *origin)?;
        }
        if is_cyclic_directed(&candidate.graph) {
            return Err(KometError::illegal_state(format!(
                "Origins {origins:?} would make path {path} its own ancestor"
            )));
        }
        *inner = candidate;
        self.generation.fetch_add(1, Ordering::AcqRel);
        tracing::debug!("registered path {path} with origins {origins:?}");
        Ok(())
    }

    pub fn add_origin(&self, path: Nid, origin: Position) -> Result<(), KometError> {
        if !self.exists(path) {
            return Err(KometError::NotFound(format!("No path {path}")));
        }
        self.add_path(path, &[origin])
    }

    fn link(graph: &mut PathGraph, path: Nid, origin: Position) -> Result<(), KometError> {
        if origin.path == path {
            return Err(KometError::illegal_state(format!(
                "Path {path} cannot originate from itself"
            )));
        }
        if !graph.origins.contains_key(&origin.path) {
            return Err(KometError::NotFound(format!(
                "Origin path {} of path {path} is not registered",
                origin.path
            )));
        }
        let entry = graph.origins.entry(path).or_default();
        entry.push(origin);
        let merged = normalize_origins(entry.drain(..));
        *entry = merged;
        graph.graph.add_edge(path, origin.path, ());
        Ok(())
    }

    /// Run `f` against a consistent view of the origin table and the generation it belongs to.
    pub(crate) fn view<R, F: FnOnce(&BTreeMap<Nid, Vec<Position>>, u64) -> R>(&self, f: F) -> R {
        let inner = self.inner.read();
        f(&inner.origins, self.generation())
    }

    /// Direct origins of `path`, one per origin path.
    pub fn origins(&self, path: Nid) -> Result<Vec<Position>, KometError> {
        self.inner
            .read()
            .origins
            .get(&path)
            .cloned()
            .ok_or_else(|| KometError::NotFound(format!("No path {path}")))
    }

    /// Every origin reachable from `path`, normalized so each ancestor path appears once at the
    /// most recent time it is reached.
    pub fn inherited_origins(&self, path: Nid) -> Result<Vec<Position>, KometError> {
        let inner = self.inner.read();
        let direct = inner
            .origins
            .get(&path)
            .ok_or_else(|| KometError::NotFound(format!("No path {path}")))?;
        let mut latest: BTreeMap<Nid, i64> = BTreeMap::new();
        let mut stack: Vec<Position> = direct.clone();
        while let Some(origin) = stack.pop() {
            match latest.get(&origin.path) {
                Some(time) if *time >= origin.time => continue,
                _ => {
                    latest.insert(origin.path, origin.time);
                }
            }
            if let Some(next) = inner.origins.get(&origin.path) {
                stack.extend(next.iter().copied());
            }
        }
        Ok(latest
            .into_iter()
            .map(|(path, time)| Position::new(path, time))
            .collect())
    }

    pub fn snapshot(&self) -> PathSnapshot {
        PathSnapshot {
            paths: self
                .inner
                .read()
                .origins
                .iter()
                .map(|(path, origins)| (*path, origins.clone()))
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: PathSnapshot) -> Result<PathRegistry, KometError> {
        let registry = PathRegistry::default();
        {
            let mut inner = registry.inner.write();
            for (path, _) in &snapshot.paths {
                inner.origins.entry(*path).or_default();
                inner.graph.add_node(*path);
            }
            for (path, origins) in &snapshot.paths {
                for origin in origins {
                    Self::link(&mut inner, *path, *origin)?;
                }
            }
            if is_cyclic_directed(&inner.graph) {
                return Err(KometError::illegal_state(
                    "Snapshot path origins contain a cycle",
                ));
            }
        }
        Ok(registry)
    }
}
