use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::KometError;

/// Native identifier.
///
/// A dense, process-local handle for any versioned component. Nids are always negative: they are
/// minted upward from [Nid::FIRST] toward zero, which keeps them visually distinct from the
/// non-negative [ElementSequence]s derived from them.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "i32", into = "i32")]
pub struct Nid(i32);

impl Nid {
    pub const FIRST: Nid = Nid(i32::MIN + 1);

    pub fn new(value: i32) -> Result<Nid, KometError> {
        if value >= 0 {
            return Err(KometError::illegal_state(format!(
                "Nids must be negative. Found: {value}"
            )));
        }
        Ok(Nid(value))
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for Nid {
    type Error = KometError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Nid::new(value)
    }
}

impl From<Nid> for i32 {
    fn from(nid: Nid) -> i32 {
        nid.0
    }
}

impl Display for Nid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense, per-assemblage index of a nid. The first element registered in an assemblage gets 1.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ElementSequence(pub u32);

impl ElementSequence {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Display for ElementSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectChronologyType {
    Concept,
    Semantic,
}

/// The closed set of version payload kinds an assemblage can hold.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionType {
    Concept,
    Description,
    ComponentNid,
    String,
    Long,
    Member,
    Uuid,
}

impl VersionType {
    /// Compact token used when a version type travels outside of serde, e.g. in a packed index.
    pub fn token(&self) -> u8 {
        match self {
            VersionType::Concept => 1,
            VersionType::Description => 2,
            VersionType::ComponentNid => 3,
            VersionType::String => 4,
            VersionType::Long => 5,
            VersionType::Member => 6,
            VersionType::Uuid => 7,
        }
    }

    pub fn from_token(token: u8) -> Result<VersionType, KometError> {
        match token {
            1 => Ok(VersionType::Concept),
            2 => Ok(VersionType::Description),
            3 => Ok(VersionType::ComponentNid),
            4 => Ok(VersionType::String),
            5 => Ok(VersionType::Long),
            6 => Ok(VersionType::Member),
            7 => Ok(VersionType::Uuid),
            other => Err(KometError::Unsupported(format!(
                "version type token {other} has no handler"
            ))),
        }
    }

    pub fn object_type(&self) -> ObjectChronologyType {
        match self {
            VersionType::Concept => ObjectChronologyType::Concept,
            VersionType::Description
            | VersionType::ComponentNid
            | VersionType::String
            | VersionType::Long
            | VersionType::Member
            | VersionType::Uuid => ObjectChronologyType::Semantic,
        }
    }
}
