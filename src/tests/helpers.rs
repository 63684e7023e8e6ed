//! Shared test utilities for registry and resolution testing

use crate::{
    identity::Nid,
    paths::{PathRegistry, Position},
    stamp::{Stamp, Status},
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn nid(n: i32) -> Nid {
    Nid::new(n).unwrap()
}

pub const AUTHOR: i32 = -1000;
pub const MODULE: i32 = -1001;

/// A committed stamp by the shared test author and module.
pub fn stamp(status: Status, time: i64, path: Nid) -> Stamp {
    Stamp::new(status, time, nid(AUTHOR), nid(MODULE), path).unwrap()
}

/// Build a path registry from generated origin lists. Path `i` gets nid `-(i + 1)` and may only
/// fork from paths declared before it, so the result is always acyclic.
pub fn registry_from(specs: &[Vec<(usize, i64)>]) -> (PathRegistry, Vec<Nid>) {
    init_logging();
    let paths = PathRegistry::default();
    let nids: Vec<Nid> = (0..specs.len()).map(|i| nid(-(i as i32) - 1)).collect();
    for (i, origins) in specs.iter().enumerate() {
        let origins: Vec<Position> = if i == 0 {
            Vec::new()
        } else {
            origins
                .iter()
                .map(|(j, time)| Position::new(nids[j % i], *time))
                .collect()
        };
        paths.add_path(nids[i], &origins).unwrap();
    }
    (paths, nids)
}

/// A diamond: B and C fork from A, D merges B and C.
pub struct Diamond {
    pub paths: PathRegistry,
    pub a: Nid,
    pub b: Nid,
    pub c: Nid,
    pub d: Nid,
}

pub fn diamond(b_fork: i64, c_fork: i64, b_merge: i64, c_merge: i64) -> Diamond {
    init_logging();
    let (a, b, c, d) = (nid(-1), nid(-2), nid(-3), nid(-4));
    let paths = PathRegistry::default();
    paths.add_path(a, &[]).unwrap();
    paths.add_path(b, &[Position::new(a, b_fork)]).unwrap();
    paths.add_path(c, &[Position::new(a, c_fork)]).unwrap();
    paths
        .add_path(d, &[Position::new(b, b_merge), Position::new(c, c_merge)])
        .unwrap();
    Diamond { paths, a, b, c, d }
}
