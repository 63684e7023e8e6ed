//! Performance benchmarks for version resolution
//!
//! These benchmarks measure the hot paths of a resolution session:
//! - Segment map construction for deep branch chains
//! - Point comparisons against a cached segment map
//! - Latest-version computation over long chronologies
//! - Snapshot sync to disk
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use komet_core::{
    calculator::SegmentMap,
    chronology::VersionData,
    config::StoreConfig,
    coordinate::{StampCoordinate, StampPrecedence},
    identity::{Nid, VersionType},
    paths::Position,
    stamp::{Stamp, Status},
    store::TerminologyStore,
};
use tempfile::TempDir;
use uuid::Uuid;

const DEPTH: usize = 64;
const VERSIONS: usize = 512;

// A chain of DEPTH paths, each forking from the previous one, plus one long chronology with
// versions spread along the chain.
fn setup_chain(config: StoreConfig) -> (TerminologyStore, Vec<Nid>, Nid) {
    let store = TerminologyStore::open(config).unwrap();
    let wk = store.well_known().unwrap();
    let mut chain = vec![wk.master_path];
    for depth in 1..DEPTH {
        let origin = Position::new(chain[depth - 1], (depth * 1_000) as i64);
        chain.push(
            store
                .add_path(Uuid::from_u128(depth as u128), &[origin])
                .unwrap(),
        );
    }
    let assemblage = store.assign_nid(&[Uuid::from_u128(u128::MAX)]).unwrap();
    let component = store
        .create_chronology(&[Uuid::new_v4()], assemblage, VersionType::Long)
        .unwrap();
    for i in 0..VERSIONS {
        let path = chain[i % DEPTH];
        let time = ((i % DEPTH) * 1_000 + i + 1) as i64;
        let stamp = Stamp::new(Status::Active, time, wk.user, wk.core_module, path).unwrap();
        store
            .add_version(component, stamp, VersionData::Long { value: i as i64 })
            .unwrap();
    }
    (store, chain, component)
}

fn bench_segment_map_build(c: &mut Criterion) {
    let (store, chain, _) = setup_chain(StoreConfig::in_memory());
    let destination = Position::latest(chain[DEPTH - 1]);

    c.bench_function("segment_map_build", |b| {
        b.iter(|| SegmentMap::build(black_box(destination), store.paths()).unwrap())
    });
}

fn bench_relative_position(c: &mut Criterion) {
    let (store, chain, _) = setup_chain(StoreConfig::in_memory());
    let coordinate = StampCoordinate::new(Position::latest(chain[DEPTH - 1]));
    let calculator = store.calculator(&coordinate).unwrap();
    let deep = Position::new(chain[0], 500);
    let shallow = Position::new(chain[DEPTH - 2], 62_500);

    c.bench_function("relative_position", |b| {
        b.iter(|| {
            calculator.segments().relative_position(
                StampPrecedence::Path,
                black_box(deep),
                black_box(shallow),
            )
        })
    });
}

fn bench_latest_version(c: &mut Criterion) {
    let (store, chain, component) = setup_chain(StoreConfig::in_memory());
    let coordinate = StampCoordinate::new(Position::latest(chain[DEPTH - 1]));
    // Warm the position cache so the loop measures resolution only.
    store.calculator(&coordinate).unwrap();

    c.bench_function("latest_version", |b| {
        b.iter(|| store.latest_version(black_box(component), &coordinate).unwrap())
    });
}

fn bench_sync(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let tempdir = TempDir::new().unwrap();
    let (store, _, _) =
        setup_chain(StoreConfig::in_memory().with_data_dir(tempdir.path().join("store")));

    c.bench_function("sync_snapshot", |b| {
        b.to_async(&rt).iter(|| async { store.sync().await.unwrap() })
    });
}

// Benchmark group configuration
criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(50);
    targets =
        bench_segment_map_build,
        bench_relative_position,
        bench_latest_version,
        bench_sync
}

criterion_main!(benches);
