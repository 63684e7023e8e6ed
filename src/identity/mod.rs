//! Identity: stable UUIDs, process-local nids, and per-assemblage element sequences.
//!
//! - [`nid`]: the [Nid] and [ElementSequence] handles plus the closed [VersionType] set
//! - [`service`]: the concurrent [IdentifierService] that mints and binds them
//! - [`well_known`]: deterministic UUIDs for the components every store bootstraps

pub mod nid;
pub mod service;
pub mod well_known;

pub use nid::{ElementSequence, Nid, ObjectChronologyType, VersionType};
pub use service::{AssemblageSnapshot, IdentifierService, IdentifierSnapshot, UuidMergePolicy};
