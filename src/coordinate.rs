//! Stamp coordinates: the "where am I looking from" half of version resolution.
use enumset::EnumSet;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use crate::{
    identity::Nid,
    paths::Position,
    stamp::{Status, StatusSet},
};

/// Tie-break rule for two versions on different paths.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StampPrecedence {
    /// Raw time decides, whichever path the versions live on.
    Time,
    /// The version on the path closer to the destination wins; unrelated paths contradict.
    #[default]
    Path,
}

/// Outcome of comparing two stamped points from a destination's point of view.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq)]
pub enum RelativePosition {
    Before,
    After,
    Equal,
    /// Both points are visible but neither can be ordered before the other: an edit conflict.
    Contradiction,
    /// At least one point cannot be seen from the destination.
    Unreachable,
}

impl RelativePosition {
    /// The same comparison with the operands swapped.
    pub fn reverse(&self) -> RelativePosition {
        match self {
            RelativePosition::Before => RelativePosition::After,
            RelativePosition::After => RelativePosition::Before,
            other => *other,
        }
    }

    pub fn from_times(t1: i64, t2: i64) -> RelativePosition {
        match t1.cmp(&t2) {
            std::cmp::Ordering::Less => RelativePosition::Before,
            std::cmp::Ordering::Greater => RelativePosition::After,
            std::cmp::Ordering::Equal => RelativePosition::Equal,
        }
    }
}

impl Display for RelativePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RelativePosition::Before => "BEFORE",
            RelativePosition::After => "AFTER",
            RelativePosition::Equal => "EQUAL",
            RelativePosition::Contradiction => "CONTRADICTION",
            RelativePosition::Unreachable => "UNREACHABLE",
        };
        write!(f, "{label}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Hash, PartialEq, Eq)]
pub struct StampCoordinate {
    pub position: Position,
    pub precedence: StampPrecedence,
    /// Empty means any module.
    pub modules: BTreeSet<Nid>,
    pub statuses: StatusSet,
}

impl StampCoordinate {
    pub fn new(position: Position) -> Self {
        StampCoordinate {
            position,
            precedence: StampPrecedence::default(),
            modules: BTreeSet::new(),
            statuses: EnumSet::all(),
        }
    }

    /// Latest position on `path`, active versions only.
    pub fn active_only(path: Nid) -> Self {
        StampCoordinate::new(Position::latest(path)).with_statuses(EnumSet::only(Status::Active))
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.position = self.position.with_time(time);
        self
    }

    pub fn with_precedence(mut self, precedence: StampPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_modules<I: IntoIterator<Item = Nid>>(mut self, modules: I) -> Self {
        self.modules = modules.into_iter().collect();
        self
    }

    pub fn with_statuses(mut self, statuses: StatusSet) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn allows_module(&self, module: Nid) -> bool {
        self.modules.is_empty() || self.modules.contains(&module)
    }

    pub fn allows_status(&self, status: Status) -> bool {
        self.statuses.contains(status)
    }
}

impl Display for StampCoordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let statuses: Vec<String> = self.statuses.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "{} {:?} statuses[{}]",
            self.position,
            self.precedence,
            statuses.join(",")
        )?;
        if !self.modules.is_empty() {
            let modules: Vec<String> = self.modules.iter().map(|m| m.to_string()).collect();
            write!(f, " modules[{}]", modules.join(","))?;
        }
        Ok(())
    }
}
