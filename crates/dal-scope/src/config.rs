//! Runtime configuration

use crate::error::{DalError, DalResult};
use dal_store::{KeyValueStore, MemoryStore, SqliteStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the default configuration file
pub const CONFIG_ENV: &str = "DAL_CONFIG";

/// Backing store of the global workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local, lost on exit
    #[default]
    Memory,
    /// SQLite database file
    Sqlite {
        /// Database path
        path: PathBuf,
    },
}

impl StoreConfig {
    /// Open the configured store
    ///
    /// # Errors
    /// Fails if the database cannot be opened.
    pub fn open(&self) -> DalResult<Arc<dyn KeyValueStore>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryStore::new())),
            Self::Sqlite { path } => SqliteStore::open(path)
                .map(|store| Arc::new(store) as Arc<dyn KeyValueStore>)
                .map_err(|e| DalError::Config(format!("opening {}: {e}", path.display()))),
        }
    }
}

/// Document layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DalConfig {
    /// Schema definitions, laid out as `<version>/<scope>.json`
    pub schema_dir: PathBuf,
    /// Root of file-backed workspaces
    pub data_dir: PathBuf,
    /// Store of the global workspace
    pub store: StoreConfig,
    /// Relation depth followed by non-shallow backups
    pub backup_depth: u32,
    /// Archive copy buffer size in bytes
    pub chunk_size: usize,
}

impl DalConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With schema directory
    #[inline]
    #[must_use]
    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = dir.into();
        self
    }

    /// With data directory
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// With global store
    #[inline]
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// With backup relation depth
    #[inline]
    #[must_use]
    pub fn with_backup_depth(mut self, depth: u32) -> Self {
        self.backup_depth = depth;
        self
    }

    /// With archive buffer size
    #[inline]
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Load from a TOML file; missing keys keep their defaults
    ///
    /// # Errors
    /// [`DalError::Config`] if the file cannot be read or parsed.
    pub fn load_toml(path: &Path) -> DalResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DalError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| DalError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Load the file named by `DAL_CONFIG`, or the defaults when unset
    ///
    /// # Errors
    /// See [`DalConfig::load_toml`].
    pub fn from_env() -> DalResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_toml(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}

impl Default for DalConfig {
    fn default() -> Self {
        Self {
            schema_dir: PathBuf::from("schemas"),
            data_dir: PathBuf::from("data"),
            store: StoreConfig::Memory,
            backup_depth: 99,
            chunk_size: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = DalConfig::new();
        assert_eq!(config.backup_depth, 99);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dal.toml");
        std::fs::write(
            &path,
            "schema_dir = \"/srv/schemas\"\nbackup_depth = 2\n\n[store]\nkind = \"sqlite\"\npath = \"/srv/dal.db\"\n",
        )
        .unwrap();

        let config = DalConfig::load_toml(&path).unwrap();
        assert_eq!(config.schema_dir, PathBuf::from("/srv/schemas"));
        assert_eq!(config.backup_depth, 2);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("/srv/dal.db")
            }
        );
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dal.toml");
        std::fs::write(&path, "backup_depth = \"deep\"").unwrap();
        assert!(matches!(DalConfig::load_toml(&path), Err(DalError::Config(_))));
        assert!(DalConfig::load_toml(&dir.path().join("missing.toml")).is_err());
    }
}
