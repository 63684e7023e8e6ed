use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

use crate::{error::KometError, identity::UuidMergePolicy};

/// Default name of the configuration file looked up by the CLI.
pub const CONFIG_FILE_NAME: &str = "komet.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where [crate::store::TerminologyStore::sync] writes snapshots. `None` keeps the store purely
    /// in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub uuid_merge: UuidMergePolicy,
    pub sync_on_shutdown: bool,
    pub bootstrap_well_known: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: None,
            uuid_merge: UuidMergePolicy::Strict,
            sync_on_shutdown: true,
            bootstrap_well_known: true,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        StoreConfig::default()
    }

    pub fn with_data_dir<P: Into<PathBuf>>(mut self, data_dir: P) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn with_uuid_merge(mut self, policy: UuidMergePolicy) -> Self {
        self.uuid_merge = policy;
        self
    }
}

pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<StoreConfig, KometError>;
    fn save(&self, config: &StoreConfig) -> Result<(), KometError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<StoreConfig, KometError> {
        tracing::debug!("Attempting to read store config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(StoreConfig::default());
        }
        let content = read_to_string(&self.path)?;
        let mut config: StoreConfig = toml::from_str(&content)?;
        // Relative data directories are anchored at the config file, not the working directory.
        if let (Some(data_dir), Some(parent)) = (config.data_dir.as_ref(), self.path.parent()) {
            if data_dir.is_relative() {
                config.data_dir = Some(parent.join(data_dir));
            }
        }
        Ok(config)
    }

    fn save(&self, config: &StoreConfig) -> Result<(), KometError> {
        tracing::debug!("Attempting to write store config to: {:?}", &self.path);
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
