//! Workspace registry
//!
//! Binds each workspace name to its adapter: the key-value adapter for
//! `global`, a file adapter under `data_dir` for every other name.

use crate::config::DalConfig;
use crate::error::{DalError, DalResult};
use crate::workspace::Workspace;
use async_trait::async_trait;
use dal_persistence::{
    collect_relations, is_plain_segment, DocumentRef, FilePersistence, KvPersistence,
    PathDefaults, Persistence, PersistenceResult, RelationQuery, RelationSource, GLOBAL_WORKSPACE,
};
use dal_schema::{DirectorySource, SchemaRegistry};
use dal_store::KeyValueStore;
use dal_tree::NodeId;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Every workspace of one process
#[derive(Debug)]
pub struct Workspaces {
    config: DalConfig,
    schemas: Arc<SchemaRegistry>,
    store: Arc<dyn KeyValueStore>,
    adapters: RwLock<HashMap<String, Arc<dyn Persistence>>>,
    workspaces: HashMap<String, Workspace>,
}

impl Workspaces {
    /// Registry over explicit schemas and global store
    #[must_use]
    pub fn new(config: DalConfig, schemas: Arc<SchemaRegistry>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            schemas,
            store,
            adapters: RwLock::new(HashMap::new()),
            workspaces: HashMap::new(),
        }
    }

    /// Registry with schemas from `schema_dir` and the configured store
    ///
    /// # Errors
    /// Fails if the store cannot be opened.
    pub fn from_config(config: DalConfig) -> DalResult<Self> {
        let schemas = Arc::new(SchemaRegistry::new(DirectorySource::new(&config.schema_dir)));
        let store = config.store.open()?;
        Ok(Self::new(config, schemas, store))
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DalConfig {
        &self.config
    }

    /// Schema registry shared by every workspace
    #[inline]
    #[must_use]
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Adapter for a workspace name, created on first use
    ///
    /// # Errors
    /// [`DalError::Unsupported`] for git-hosted workspaces and
    /// [`DalError::InvalidPath`] for names that are not a plain directory.
    pub fn adapter(&self, name: &str) -> DalResult<Arc<dyn Persistence>> {
        if let Some(adapter) = self.adapters.read().get(name) {
            return Ok(Arc::clone(adapter));
        }
        if name.starts_with("git/") {
            return Err(DalError::Unsupported(format!("git workspace '{name}'")));
        }
        if name != GLOBAL_WORKSPACE && !is_plain_segment(name) {
            return Err(DalError::InvalidPath(name.to_string()));
        }
        let adapter: Arc<dyn Persistence> = if name == GLOBAL_WORKSPACE {
            Arc::new(KvPersistence::new(Arc::clone(&self.store), Arc::clone(&self.schemas)))
        } else {
            Arc::new(FilePersistence::new(
                &self.config.data_dir,
                name,
                Arc::clone(&self.schemas),
            ))
        };
        debug!(workspace = name, adapter = adapter.name(), "bound adapter");
        Ok(Arc::clone(
            self.adapters
                .write()
                .entry(name.to_string())
                .or_insert(adapter),
        ))
    }

    /// Workspace by name, created on first use
    ///
    /// # Errors
    /// See [`Workspaces::adapter`].
    pub fn workspace(&mut self, name: &str) -> DalResult<&mut Workspace> {
        if !self.workspaces.contains_key(name) {
            let adapter = self.adapter(name)?;
            let workspace = Workspace::new(name, adapter, Arc::clone(&self.schemas));
            self.workspaces.insert(name.to_string(), workspace);
        }
        self.workspaces
            .get_mut(name)
            .ok_or_else(|| DalError::NotFound(name.to_string()))
    }

    /// Resolve a path string and load the document it names
    ///
    /// # Errors
    /// [`DalError::InvalidPath`] for unresolvable paths, plus the errors of
    /// [`crate::ScopeHandle::get`].
    pub async fn from_path(
        &mut self,
        path: &str,
        defaults: &PathDefaults,
    ) -> DalResult<(&mut Workspace, NodeId)> {
        let doc = DocumentRef::parse_with(path, defaults)?;
        let workspace = self.workspace(&doc.workspace)?;
        let version = workspace.scope(&doc.scope).get(&doc.reference, &doc.version).await?;
        Ok((workspace, version))
    }

    /// Transitive relations of a document across workspaces
    ///
    /// # Errors
    /// Adapter errors.
    pub async fn relations(&self, doc: &DocumentRef, query: &RelationQuery) -> DalResult<BTreeSet<String>> {
        Ok(collect_relations(self, doc, query).await?)
    }

    // Workspace management

    /// `global` plus every directory under `data_dir`
    ///
    /// # Errors
    /// Fails if `data_dir` exists but cannot be listed.
    pub async fn list_workspaces(&self) -> DalResult<Vec<String>> {
        let mut names = vec![GLOBAL_WORKSPACE.to_string()];
        let mut entries = match tokio::fs::read_dir(&self.config.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                found.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        found.sort();
        names.extend(found.into_iter().filter(|n| n != GLOBAL_WORKSPACE));
        Ok(names)
    }

    fn check_managed(name: &str) -> DalResult<()> {
        if name == GLOBAL_WORKSPACE {
            return Err(DalError::Unsupported(format!("managing workspace '{name}'")));
        }
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(DalError::InvalidPath(name.to_string()));
        }
        Ok(())
    }

    /// Create an empty file-backed workspace
    ///
    /// # Errors
    /// [`DalError::Unsupported`] for `global`, [`DalError::AlreadyExists`]
    /// if the directory exists.
    pub async fn create_workspace(&self, name: &str) -> DalResult<()> {
        Self::check_managed(name)?;
        let dir = self.config.data_dir.join(name);
        if tokio::fs::try_exists(&dir).await? {
            return Err(DalError::AlreadyExists(name.to_string()));
        }
        tokio::fs::create_dir_all(&dir).await?;
        info!(workspace = name, "created workspace");
        Ok(())
    }

    /// Remove a file-backed workspace with all its documents
    ///
    /// # Errors
    /// [`DalError::Unsupported`] for `global`, [`DalError::NotFound`] if the
    /// directory does not exist.
    pub async fn delete_workspace(&mut self, name: &str) -> DalResult<()> {
        Self::check_managed(name)?;
        let dir = self.config.data_dir.join(name);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(DalError::NotFound(name.to_string()));
        }
        tokio::fs::remove_dir_all(&dir).await?;
        self.workspaces.remove(name);
        self.adapters.write().remove(name);
        info!(workspace = name, "deleted workspace");
        Ok(())
    }
}

#[async_trait]
impl RelationSource for Workspaces {
    async fn direct_relations(&self, doc: &DocumentRef) -> PersistenceResult<Vec<String>> {
        match self.adapter(&doc.workspace) {
            Ok(adapter) => adapter.direct_relations(doc).await,
            Err(e) => {
                debug!(doc = %doc, error = %e, "no adapter, no relations");
                Ok(Vec::new())
            }
        }
    }
}
