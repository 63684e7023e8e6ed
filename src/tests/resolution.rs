//! Latest-version resolution across merged branches

use super::helpers::*;
use crate::{
    calculator::{PositionCache, RelativePositionCalculator},
    chronology::{Chronology, Version, VersionData},
    coordinate::{StampCoordinate, StampPrecedence},
    identity::VersionType,
    paths::Position,
    stamp::{StampStore, Status},
};
use std::sync::Arc;
use test_log::test;

fn long_chronology(
    stamps: &StampStore,
    entries: &[(crate::identity::Nid, i64, Status, i64)],
) -> Chronology {
    let mut chronology = Chronology::new(nid(-50), nid(-51), VersionType::Long);
    for (path, time, status, value) in entries {
        let sequence = stamps.stamp_sequence(stamp(*status, *time, *path)).unwrap();
        chronology
            .add_version(Version {
                stamp: sequence,
                data: VersionData::Long { value: *value },
            })
            .unwrap();
    }
    chronology
}

fn values(chronology_latest: &crate::chronology::LatestVersion) -> Vec<i64> {
    chronology_latest
        .all()
        .iter()
        .filter_map(|version| match version.data {
            VersionData::Long { value } => Some(value),
            _ => None,
        })
        .collect()
}

#[test]
fn merged_branches_surface_both_edits() {
    let f = diamond(10, 20, 150, 150);
    let stamps = Arc::new(StampStore::default());
    let chronology = long_chronology(
        &stamps,
        &[
            (f.a, 5, Status::Active, 1),
            (f.b, 60, Status::Active, 2),
            (f.c, 70, Status::Active, 3),
        ],
    );
    let cache = PositionCache::default();

    let coordinate = StampCoordinate::new(Position::latest(f.d));
    let calculator = RelativePositionCalculator::new(
        coordinate.clone(),
        cache.segment_map(coordinate.position, &f.paths).unwrap(),
        Arc::clone(&stamps),
    );
    let latest = calculator.latest_version(&chronology).unwrap();
    assert!(latest.is_contradicted());
    assert_eq!(values(&latest), vec![2, 3]);

    // Time precedence picks the later edit instead.
    let coordinate = coordinate.with_precedence(StampPrecedence::Time);
    let calculator = RelativePositionCalculator::new(
        coordinate.clone(),
        cache.segment_map(coordinate.position, &f.paths).unwrap(),
        Arc::clone(&stamps),
    );
    let latest = calculator.latest_version(&chronology).unwrap();
    assert!(!latest.is_contradicted());
    assert_eq!(values(&latest), vec![3]);
    // Both coordinates share one destination, so one map serves both.
    assert_eq!(cache.builds(), 1);
}

#[test]
fn each_branch_sees_only_its_own_edits() {
    let f = diamond(10, 20, 150, 150);
    let stamps = Arc::new(StampStore::default());
    let chronology = long_chronology(
        &stamps,
        &[
            (f.a, 5, Status::Active, 1),
            (f.a, 15, Status::Active, 4),
            (f.b, 60, Status::Active, 2),
            (f.c, 70, Status::Active, 3),
        ],
    );
    let cache = PositionCache::default();
    let latest_on = |path| {
        let coordinate = StampCoordinate::new(Position::latest(path));
        RelativePositionCalculator::new(
            coordinate.clone(),
            cache.segment_map(coordinate.position, &f.paths).unwrap(),
            Arc::clone(&stamps),
        )
        .latest_version(&chronology)
        .unwrap()
    };
    assert_eq!(values(&latest_on(f.a)), vec![4]);
    assert_eq!(values(&latest_on(f.b)), vec![2]);
    assert_eq!(values(&latest_on(f.c)), vec![3]);
}

#[test]
fn retirement_hides_a_component_without_reviving_older_versions() {
    let f = diamond(10, 20, 150, 150);
    let stamps = Arc::new(StampStore::default());
    let chronology = long_chronology(
        &stamps,
        &[
            (f.a, 5, Status::Active, 1),
            (f.a, 8, Status::Inactive, 1),
        ],
    );
    let coordinate = StampCoordinate::active_only(f.b);
    let calculator = RelativePositionCalculator::new(
        coordinate.clone(),
        PositionCache::default()
            .segment_map(coordinate.position, &f.paths)
            .unwrap(),
        Arc::clone(&stamps),
    );
    assert!(!calculator.latest_version(&chronology).unwrap().is_present());
    assert!(!calculator.is_latest_active(&chronology).unwrap());
}
