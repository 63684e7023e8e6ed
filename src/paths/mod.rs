//! Paths are branches. Each path may fork from one or more origin positions on other paths, and
//! those origins chain: a path's content is its own versions plus whatever its origins could see
//! at the fork time.

pub mod position;
pub mod registry;

pub use position::Position;
pub use registry::{normalize_origins, PathRegistry, PathSnapshot};
