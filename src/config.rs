// Runtime configuration loaded from YAML

use crate::field::FieldSet;
use crate::storage::{FileStorage, STORAGE_KEY, SqliteStorage, Storage};
use crate::store::{Store, StoreOptions};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "memberstore.yaml";

/// Which storage backend holds the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Nothing is written; the store starts from the default records
    Memory,
    /// JSON snapshot file per key
    #[default]
    File,
    /// SQLite key-value table
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageKind,
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub strict_persistence: bool,
    /// YAML field definitions replacing the built-in member schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            data_dir: default_data_dir(),
            storage_key: STORAGE_KEY.to_string(),
            strict_persistence: false,
            fields_file: None,
        }
    }
}

/// `<data dir>/memberstore`, or `.memberstore` when the platform has none
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("memberstore"))
        .unwrap_or_else(|| PathBuf::from(".memberstore"))
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse config")
    }

    /// Load `path`, or `memberstore.yaml` if present, or the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let yaml = fs::read_to_string(&path).with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::from_yaml(&yaml)?;
        info!(path = ?path, "Loaded config");
        Ok(config)
    }

    pub fn field_set(&self) -> Result<FieldSet> {
        match &self.fields_file {
            Some(path) => FieldSet::load(path).with_context(|| format!("Failed to load fields from {:?}", path)),
            None => Ok(FieldSet::default()),
        }
    }

    pub fn storage(&self) -> Result<Option<Box<dyn Storage>>> {
        let storage: Option<Box<dyn Storage>> = match self.storage {
            StorageKind::Memory => None,
            StorageKind::File => Some(Box::new(FileStorage::open(&self.data_dir)?)),
            StorageKind::Sqlite => Some(Box::new(SqliteStorage::open(self.data_dir.join("memberstore.db"))?)),
        };
        Ok(storage)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            storage_key: self.storage_key.clone(),
            strict_persistence: self.strict_persistence,
        }
    }

    /// Build the store this configuration describes
    pub fn open_store(&self) -> Result<Store> {
        let fields = self.field_set()?;
        let storage = self.storage()?;
        Ok(Store::open(fields, storage, self.store_options()))
    }
}
