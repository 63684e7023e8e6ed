//! Relative position computation.
//!
//! Comparing two stamped points means answering "is either of these visible from the destination,
//! and if both are, which one is closer?". Walking the origin graph for every comparison would be
//! far too slow, so a [SegmentMap] flattens the graph once per destination: each path reachable
//! from the destination becomes a segment with an end time (the latest moment visible on that
//! path) and the set of segments that lie between it and the destination. After that every
//! comparison is a couple of map lookups and a bit test.
//!
//! Segment maps are memoized per destination in a [PositionCache], since a session reuses a small
//! number of coordinates for a very large number of comparisons.
use dashmap::{mapref::entry::Entry, DashMap};
use fixedbitset::FixedBitSet;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    chronology::{Chronology, LatestVersion, Version},
    coordinate::{RelativePosition, StampCoordinate, StampPrecedence},
    error::KometError,
    identity::Nid,
    paths::{PathRegistry, Position},
    stamp::{Stamp, StampSequence, StampStore, Status, CANCELED_TIME},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub id: usize,
    pub path: Nid,
    /// Latest time on `path` visible from the destination.
    pub end_time: i64,
    /// Segments between this one and the destination.
    preceding: FixedBitSet,
}

impl Segment {
    /// True when `other` lies on the route from this segment to the destination, i.e. `other` is
    /// closer to the destination.
    pub fn contains_preceding(&self, other: usize) -> bool {
        self.preceding.contains(other)
    }

    pub fn preceding(&self) -> Vec<usize> {
        self.preceding.ones().collect()
    }

    fn reaches(&self, time: i64) -> bool {
        time != CANCELED_TIME && time <= self.end_time
    }
}

#[derive(Clone, Debug)]
pub struct SegmentMap {
    destination: Position,
    generation: u64,
    segments: BTreeMap<Nid, Segment>,
}

impl SegmentMap {
    pub fn build(destination: Position, paths: &PathRegistry) -> Result<SegmentMap, KometError> {
        paths.view(|origins, generation| {
            if !origins.contains_key(&destination.path) {
                return Err(KometError::NotFound(format!(
                    "Destination path {} is not registered",
                    destination.path
                )));
            }
            let mut map = SegmentMap {
                destination,
                generation,
                segments: BTreeMap::new(),
            };
            let mut next_id = 0;
            map.walk(destination, origins, &mut next_id, FixedBitSet::new());
            tracing::debug!(
                "built segment map for {destination}: {} segments",
                map.segments.len()
            );
            Ok(map)
        })
    }

    fn walk(
        &mut self,
        position: Position,
        origins: &BTreeMap<Nid, Vec<Position>>,
        next_id: &mut usize,
        preceding: FixedBitSet,
    ) {
        let id = match self.segments.get_mut(&position.path) {
            // Reached again through another origin: widen the window and remember every route.
            Some(segment) => {
                if position.time <= segment.end_time && preceding.is_subset(&segment.preceding) {
                    // Everything above this segment has already seen this route.
                    return;
                }
                segment.end_time = segment.end_time.max(position.time);
                segment.preceding.union_with(&preceding);
                segment.id
            }
            None => {
                let id = *next_id;
                *next_id += 1;
                self.segments.insert(
                    position.path,
                    Segment {
                        id,
                        path: position.path,
                        end_time: position.time,
                        preceding: preceding.clone(),
                    },
                );
                id
            }
        };

        let mut route = preceding;
        route.grow(id + 1);
        route.insert(id);
        if let Some(parents) = origins.get(&position.path) {
            for origin in parents {
                self.walk(*origin, origins, next_id, route.clone());
            }
        }
    }

    pub fn destination(&self) -> Position {
        self.destination
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn segment(&self, path: Nid) -> Option<&Segment> {
        self.segments.get(&path)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// A point is on route when its path has a segment and its time falls inside the segment.
    pub fn on_route(&self, point: Position) -> bool {
        self.segments
            .get(&point.path)
            .is_some_and(|segment| segment.reaches(point.time))
    }

    pub fn relative_position(
        &self,
        precedence: StampPrecedence,
        p1: Position,
        p2: Position,
    ) -> RelativePosition {
        let (Some(s1), Some(s2)) = (self.segments.get(&p1.path), self.segments.get(&p2.path))
        else {
            return RelativePosition::Unreachable;
        };
        if !s1.reaches(p1.time) || !s2.reaches(p2.time) {
            return RelativePosition::Unreachable;
        }
        if p1.path == p2.path {
            return RelativePosition::from_times(p1.time, p2.time);
        }
        match precedence {
            StampPrecedence::Time => RelativePosition::from_times(p1.time, p2.time),
            StampPrecedence::Path => {
                if s1.contains_preceding(s2.id) {
                    RelativePosition::Before
                } else if s2.contains_preceding(s1.id) {
                    RelativePosition::After
                } else {
                    RelativePosition::Contradiction
                }
            }
        }
    }
}

/// Memo of segment maps keyed by destination. A map built against an older path generation is
/// rebuilt on the next request for its destination.
#[derive(Debug, Default)]
pub struct PositionCache {
    maps: DashMap<Position, Arc<SegmentMap>>,
    hits: AtomicU64,
    builds: AtomicU64,
}

impl PositionCache {
    pub fn segment_map(
        &self,
        destination: Position,
        paths: &PathRegistry,
    ) -> Result<Arc<SegmentMap>, KometError> {
        let current = paths.generation();
        if let Some(map) = self.maps.get(&destination) {
            if map.generation() == current {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&map));
            }
        }
        let map = match self.maps.entry(destination) {
            Entry::Occupied(mut entry) => {
                if entry.get().generation() == paths.generation() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Arc::clone(entry.get())
                } else {
                    let built = Arc::new(SegmentMap::build(destination, paths)?);
                    self.builds.fetch_add(1, Ordering::Relaxed);
                    entry.insert(Arc::clone(&built));
                    built
                }
            }
            Entry::Vacant(entry) => {
                let built = Arc::new(SegmentMap::build(destination, paths)?);
                self.builds.fetch_add(1, Ordering::Relaxed);
                entry.insert(Arc::clone(&built));
                built
            }
        };
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

}

/// Resolves stamps and chronologies under one [StampCoordinate].
#[derive(Clone, Debug)]
pub struct RelativePositionCalculator {
    coordinate: StampCoordinate,
    segments: Arc<SegmentMap>,
    stamps: Arc<StampStore>,
}

impl RelativePositionCalculator {
    pub fn new(
        coordinate: StampCoordinate,
        segments: Arc<SegmentMap>,
        stamps: Arc<StampStore>,
    ) -> Self {
        RelativePositionCalculator {
            coordinate,
            segments,
            stamps,
        }
    }

    pub fn coordinate(&self) -> &StampCoordinate {
        &self.coordinate
    }

    pub fn segments(&self) -> &SegmentMap {
        &self.segments
    }

    pub fn fast_relative_position(&self, s1: &Stamp, s2: &Stamp) -> RelativePosition {
        self.segments.relative_position(
            self.coordinate.precedence,
            Position::new(s1.path, s1.time),
            Position::new(s2.path, s2.time),
        )
    }

    pub fn relative_position(
        &self,
        s1: StampSequence,
        s2: StampSequence,
    ) -> Result<RelativePosition, KometError> {
        Ok(self.fast_relative_position(&self.stamps.stamp(s1)?, &self.stamps.stamp(s2)?))
    }

    pub fn on_route_stamp(&self, stamp: &Stamp) -> bool {
        self.segments.on_route(Position::new(stamp.path, stamp.time))
    }

    pub fn on_route(&self, stamp: StampSequence) -> Result<bool, KometError> {
        Ok(self.on_route_stamp(&self.stamps.stamp(stamp)?))
    }

    /// The maximal stamps among `candidates` that are on route and in an allowed module. More than
    /// one stamp comes back when the latest versions contradict (or tie) each other.
    pub fn latest_stamps(
        &self,
        candidates: &[StampSequence],
    ) -> Result<Vec<StampSequence>, KometError> {
        let mut latest: Vec<(StampSequence, Stamp)> = Vec::new();
        for sequence in candidates {
            let stamp = self.stamps.stamp(*sequence)?;
            if !self.on_route_stamp(&stamp) || !self.coordinate.allows_module(stamp.module) {
                continue;
            }
            let superseded = latest.iter().any(|(_, kept)| {
                self.fast_relative_position(&stamp, kept) == RelativePosition::Before
            });
            if superseded {
                continue;
            }
            latest.retain(|(_, kept)| {
                self.fast_relative_position(&stamp, kept) != RelativePosition::After
            });
            latest.push((*sequence, stamp));
        }
        let mut sequences: Vec<StampSequence> = latest.into_iter().map(|(s, _)| s).collect();
        sequences.sort();
        sequences.dedup();
        Ok(sequences)
    }

    /// The visible version of `chronology`: the latest on-route versions, restricted to the
    /// coordinate's allowed statuses.
    pub fn latest_version(&self, chronology: &Chronology) -> Result<LatestVersion, KometError> {
        let latest = self.latest_stamps(&chronology.stamps())?;
        let mut visible: Vec<Version> = Vec::new();
        for sequence in latest {
            if !self
                .coordinate
                .allows_status(self.stamps.status_for(sequence)?)
            {
                continue;
            }
            if let Some(version) = chronology.version_for_stamp(sequence) {
                visible.push(version.clone());
            }
        }
        let mut visible = visible.into_iter();
        Ok(LatestVersion {
            value: visible.next(),
            contradictions: visible.collect(),
        })
    }

    /// True when any latest version (ignoring the status filter) is active.
    pub fn is_latest_active(&self, chronology: &Chronology) -> Result<bool, KometError> {
        for sequence in self.latest_stamps(&chronology.stamps())? {
            if self.stamps.status_for(sequence)? == Status::Active {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
