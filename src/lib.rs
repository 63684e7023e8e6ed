//! # komet-core
//!
//! Bitemporal version resolution and component identity for terminology stores.
//!
//! ## Overview
//!
//! Every component in a terminology store (a concept, a description, a membership in a reference
//! set) is a **chronology**: an append-only list of versions. Every version is tagged with a
//! **STAMP** (status, time, author, module, path), and paths fork from each other at points in
//! time the way branches fork in a version control system. Answering "what does this component
//! look like from here?" means deciding which versions are visible from a position on a path and
//! which of those is the latest.
//!
//! ### Key Features
//!
//! - **Compact identity**: UUIDs map to negative 32-bit nids, and nids map to dense per-assemblage
//!   element sequences, all assigned lock-free under concurrent load
//! - **Branching history**: paths fork from origins, origins are normalized and cycle-checked
//! - **Fast comparisons**: origin graphs are flattened once per destination into segment maps so
//!   comparing two stamped points is a lookup and a bit test
//! - **Honest conflicts**: concurrent edits on unrelated paths resolve to a contradiction instead
//!   of a silent pick
//! - **Explicit lifecycle**: a [`store::TerminologyStore`] owns every registry; there are no
//!   process-wide singletons
//!
//! ## Architecture
//!
//! - **[`identity`]**: nids, element sequences, the [`identity::IdentifierService`]
//! - **[`stamp`]**: the STAMP tuple and its interning [`stamp::StampStore`]
//! - **[`paths`]**: positions and the [`paths::PathRegistry`] origin graph
//! - **[`coordinate`]**: stamp coordinates and relative positions
//! - **[`calculator`]**: segment maps, the position cache and the
//!   [`calculator::RelativePositionCalculator`]
//! - **[`chronology`]**: versions and latest-version results
//! - **[`store`]**: the store lifecycle and snapshot sync
//! - **[`scenario`]**: declarative TOML scenarios for imports and what-if queries
//! - **[`config`]**: store configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use komet_core::{
//!     chronology::VersionData,
//!     config::StoreConfig,
//!     coordinate::StampCoordinate,
//!     identity::VersionType,
//!     stamp::{Stamp, Status},
//!     store::TerminologyStore,
//! };
//! use uuid::Uuid;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = TerminologyStore::open(StoreConfig::in_memory().with_data_dir("./komet-data"))?;
//!     let wk = store.well_known().expect("bootstrapped");
//!
//!     let heart = store.create_chronology(
//!         &[Uuid::new_v4()],
//!         wk.concept_assemblage,
//!         VersionType::Concept,
//!     )?;
//!     let stamp = Stamp::new(Status::Active, 1_000, wk.user, wk.core_module, wk.master_path)?;
//!     store.add_version(heart, stamp, VersionData::Concept)?;
//!
//!     let latest = store.latest_version(heart, &StampCoordinate::active_only(wk.development_path))?;
//!     assert!(latest.is_present());
//!
//!     store.sync().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: the library
//! - **bin**: the `komet` command line tool (`clap`, `tracing-subscriber`)

pub mod calculator;
pub mod chronology;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod identity;
pub mod paths;
pub mod scenario;
pub mod stamp;
pub mod store;
#[cfg(test)]
mod tests;

pub use error::*;
