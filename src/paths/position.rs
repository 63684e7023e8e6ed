use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{identity::Nid, stamp::UNCOMMITTED_TIME};

/// A point on a path: where a version lives, or where a coordinate looks from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub path: Nid,
    pub time: i64,
}

impl Position {
    pub fn new(path: Nid, time: i64) -> Self {
        Position { path, time }
    }

    /// The open end of `path`: sees everything, including uncommitted work.
    pub fn latest(path: Nid) -> Self {
        Position {
            path,
            time: UNCOMMITTED_TIME,
        }
    }

    pub fn with_time(&self, time: i64) -> Self {
        Position {
            path: self.path,
            time,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.time == UNCOMMITTED_TIME {
            write!(f, "{}@latest", self.path)
        } else {
            write!(f, "{}@{}", self.path, self.time)
        }
    }
}
