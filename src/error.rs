use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;

use serde_json::Error as JsonError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum KometError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Illegal state: {0}")]
    IllegalState(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Version type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("UUID {uuid} is bound to nid {existing}, refusing to merge onto nid {requested}")]
    UuidConflict {
        uuid: String,
        existing: i32,
        requested: i32,
    },
}

impl KometError {
    /// Illegal-state conditions signal a caller bug or a corrupted registry. Everything else can be
    /// handled by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KometError::IllegalState(_))
    }

    /// Build an [KometError::IllegalState] and log it at error level on the way out.
    pub(crate) fn illegal_state<S: Into<String>>(msg: S) -> KometError {
        let msg = msg.into();
        tracing::error!("{msg}");
        KometError::IllegalState(msg)
    }
}

impl From<toml::de::Error> for KometError {
    fn from(src: toml::de::Error) -> KometError {
        KometError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for KometError {
    fn from(src: toml::ser::Error) -> KometError {
        KometError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for KometError {
    fn from(src: JsonError) -> KometError {
        KometError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for KometError {
    fn from(src: uuid::Error) -> KometError {
        KometError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<io::Error> for KometError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => KometError::NotFound(format!("{x}")),
            _ => KometError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<JoinError> for KometError {
    fn from(x: JoinError) -> Self {
        KometError::Io(format!("Snapshot serialization task failed: {x}"))
    }
}
