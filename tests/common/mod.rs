//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use komet_core::{config::StoreConfig, store::TerminologyStore};
use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A bootstrapped, purely in-memory store.
#[allow(dead_code)]
pub fn memory_store() -> TerminologyStore {
    init_logging();
    TerminologyStore::open(StoreConfig::in_memory()).unwrap()
}

/// Config for a store persisted under `<temp_dir>/store`.
#[allow(dead_code)]
pub fn persistent_config(temp_dir: &TempDir) -> StoreConfig {
    init_logging();
    StoreConfig::in_memory().with_data_dir(temp_dir.path().join("store"))
}

/// Path of a file under `tests/fixtures`.
#[allow(dead_code)]
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
