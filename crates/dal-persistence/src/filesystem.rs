//! File adapter for versioned workspaces
//!
//! Layout: `<root>/<workspace>/<scope>/<ref>/<tag>-<epoch>-<uuid>/` holding
//! `data.json` (the raw document) and `relations.json` (its relation list).
//! A tag is written once; later writes of the same tag are rejected.

use crate::adapter::{
    raw_schema_version, unwrap_document, wrap_document, Persistence, RelationSource, ScopeEntry,
    VersionEntry,
};
use crate::error::{PersistenceError, PersistenceResult};
use crate::reference::{is_plain_segment, DocumentRef, DEFAULT_SCHEMA_VERSION};
use crate::relations::relations_from_body;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dal_schema::{Schema, SchemaRegistry};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw document file inside a version folder
pub const DATA_FILE: &str = "data.json";

/// Relation list file inside a version folder
pub const RELATIONS_FILE: &str = "relations.json";

const UUID_LEN: usize = 36;

/// Parsed `<tag>-<epoch>-<uuid>` folder name
#[derive(Debug, Clone, PartialEq)]
pub struct VersionFolder {
    /// Version tag
    pub tag: String,
    /// Creation time in seconds since the epoch
    pub epoch: f64,
    /// Folder path
    pub path: PathBuf,
}

impl VersionFolder {
    /// Folder name for a new version of `tag`
    #[must_use]
    pub fn name_for(tag: &str, now: DateTime<Utc>) -> String {
        #[allow(clippy::cast_precision_loss)]
        let epoch = now.timestamp_micros() as f64 / 1_000_000.0;
        format!("{tag}-{epoch:.6}-{}", Uuid::new_v4())
    }

    /// Parse a folder path, `None` if the name does not follow the pattern
    #[must_use]
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let cut = name.len().checked_sub(UUID_LEN + 1)?;
        let (head, id) = name.split_at(cut);
        Uuid::parse_str(id.strip_prefix('-')?).ok()?;
        let (tag, epoch) = head.rsplit_once('-')?;
        Some(Self {
            tag: tag.to_string(),
            epoch: epoch.parse().ok()?,
            path: path.to_path_buf(),
        })
    }

    /// Creation time as RFC 3339
    #[must_use]
    pub fn date(&self) -> Option<String> {
        #[allow(clippy::cast_possible_truncation)]
        let micros = (self.epoch * 1_000_000.0).round() as i64;
        DateTime::from_timestamp_micros(micros)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

/// Persistence in a directory tree, one folder per stored version
#[derive(Debug, Clone)]
pub struct FilePersistence {
    root: PathBuf,
    workspace: String,
    schemas: Arc<SchemaRegistry>,
}

impl FilePersistence {
    /// Adapter for `workspace` stored under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, workspace: impl Into<String>, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            root: root.into(),
            workspace: workspace.into(),
            schemas,
        }
    }

    /// Directory of this workspace
    #[must_use]
    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join(&self.workspace)
    }

    /// Folder of one document; every segment must stay below the workspace
    fn document_dir(&self, scope: &str, reference: &str) -> PersistenceResult<PathBuf> {
        let plain = is_plain_segment(&self.workspace)
            && is_plain_segment(scope)
            && reference.split('/').all(is_plain_segment);
        if !plain {
            return Err(PersistenceError::InvalidPath(format!(
                "{}/{scope}/{reference}",
                self.workspace
            )));
        }
        Ok(reference
            .split('/')
            .fold(self.workspace_dir().join(scope), |dir, part| dir.join(part)))
    }

    /// Version folders of one document, oldest first
    async fn version_folders(&self, scope: &str, reference: &str) -> PersistenceResult<Vec<VersionFolder>> {
        let dir = self.document_dir(scope, reference)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(folder) = VersionFolder::parse(&entry.path()) {
                    folders.push(folder);
                }
            }
        }
        folders.sort_by(|a, b| a.epoch.total_cmp(&b.epoch).then_with(|| a.tag.cmp(&b.tag)));
        Ok(folders)
    }

    /// Newest folder holding `doc.version`
    async fn find_version(&self, doc: &DocumentRef) -> PersistenceResult<Option<VersionFolder>> {
        Ok(self
            .version_folders(&doc.scope, &doc.reference)
            .await?
            .into_iter()
            .rev()
            .find(|folder| folder.tag == doc.version))
    }

    /// Every version folder in the workspace with its `(scope, ref)`
    async fn all_versions(&self) -> PersistenceResult<Vec<(String, String, PathBuf)>> {
        let base = self.workspace_dir();
        let mut found = Vec::new();
        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let path = entry.path();
                if fs::try_exists(path.join(DATA_FILE)).await? {
                    let Some(relative) = path.parent().and_then(|p| p.strip_prefix(&base).ok()) else {
                        continue;
                    };
                    let parts: Vec<String> = relative
                        .iter()
                        .map(|part| part.to_string_lossy().into_owned())
                        .collect();
                    if let Some((scope, reference)) = parts.split_first() {
                        if !reference.is_empty() {
                            found.push((scope.clone(), reference.join("/"), path));
                        }
                    }
                } else {
                    stack.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn read_json(path: &Path) -> PersistenceResult<Value> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_relations(dir: &Path, relations: &[String]) -> PersistenceResult<()> {
        fs::write(dir.join(RELATIONS_FILE), serde_json::to_vec_pretty(relations)?).await?;
        Ok(())
    }

    /// Relations extracted from a stored `data.json`
    async fn extract_relations(&self, scope: &str, reference: &str, dir: &Path) -> PersistenceResult<Vec<String>> {
        let raw = Self::read_json(&dir.join(DATA_FILE)).await?;
        let version = raw_schema_version(&raw).unwrap_or(DEFAULT_SCHEMA_VERSION);
        let schema = self.schemas.load(scope, version)?;
        let doc = DocumentRef::new(&self.workspace, scope, reference, "");
        Ok(unwrap_document(&doc, &raw)
            .map(|body| relations_from_body(&schema, body))
            .unwrap_or_default())
    }
}

/// Keep only attributes the schema declares at the document level
fn declared_attributes(schema: &Schema, body: &Value) -> PersistenceResult<Value> {
    let map = body
        .as_object()
        .ok_or_else(|| PersistenceError::InvalidShape(format!("document body must be an object, got {body}")))?;
    let kept: Map<String, Value> = map
        .iter()
        .filter(|(name, _)| schema.resolve(name).is_ok())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Ok(Value::Object(kept))
}

#[async_trait]
impl RelationSource for FilePersistence {
    async fn direct_relations(&self, doc: &DocumentRef) -> PersistenceResult<Vec<String>> {
        let Some(folder) = self.find_version(doc).await? else {
            return Ok(Vec::new());
        };
        let cache = folder.path.join(RELATIONS_FILE);
        if fs::try_exists(&cache).await? {
            let relations: Vec<String> = serde_json::from_value(Self::read_json(&cache).await?)?;
            return Ok(relations);
        }
        debug!(doc = %doc, "no relation file, extracting from data");
        self.extract_relations(&doc.scope, &doc.reference, &folder.path).await
    }
}

#[async_trait]
impl Persistence for FilePersistence {
    fn name(&self) -> &'static str {
        "file"
    }

    fn versioning(&self) -> bool {
        true
    }

    async fn read(&self, doc: &DocumentRef) -> PersistenceResult<Option<Value>> {
        match self.find_version(doc).await? {
            Some(folder) => Ok(Some(Self::read_json(&folder.path.join(DATA_FILE)).await?)),
            None => Ok(None),
        }
    }

    async fn write(&self, doc: &DocumentRef, schema: &Schema, body: &Value) -> PersistenceResult<()> {
        // The tag becomes part of a folder name
        if !is_plain_segment(&doc.version) {
            return Err(PersistenceError::InvalidPath(doc.to_string()));
        }
        if self.find_version(doc).await?.is_some() {
            return Err(PersistenceError::AlreadyExists(doc.to_string()));
        }
        let body = declared_attributes(schema, body)?;
        let relations = relations_from_body(schema, &body);

        let dir = self
            .document_dir(&doc.scope, &doc.reference)?
            .join(VersionFolder::name_for(&doc.version, Utc::now()));
        fs::create_dir_all(&dir).await?;
        let raw = wrap_document(doc, schema.version(), body);
        fs::write(dir.join(DATA_FILE), serde_json::to_vec_pretty(&raw)?).await?;
        Self::write_relations(&dir, &relations).await?;

        info!(doc = %doc, dir = %dir.display(), relations = relations.len(), "wrote document");
        Ok(())
    }

    async fn delete(
        &self,
        doc: &DocumentRef,
        _schema: &Schema,
        partial: Option<&Value>,
    ) -> PersistenceResult<()> {
        if partial.is_some() {
            return Err(PersistenceError::Unsupported(
                "partial delete of a stored version".into(),
            ));
        }
        let folder = self
            .find_version(doc)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(doc.to_string()))?;
        fs::remove_dir_all(&folder.path).await?;
        info!(doc = %doc, "deleted document");
        Ok(())
    }

    async fn rebuild_indexes(&self) -> PersistenceResult<usize> {
        let mut rebuilt = 0usize;
        for (scope, reference, dir) in self.all_versions().await? {
            let relations = match self.extract_relations(&scope, &reference, &dir).await {
                Ok(relations) => relations,
                Err(e) if e.is_not_found() => {
                    warn!(scope = %scope, reference = %reference, error = %e, "no schema, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            Self::write_relations(&dir, &relations).await?;
            rebuilt += 1;
        }
        info!(workspace = %self.workspace, documents = rebuilt, "rebuilt relation indexes");
        Ok(rebuilt)
    }

    async fn list_scopes(&self, scope: Option<&str>) -> PersistenceResult<Vec<ScopeEntry>> {
        let documents: BTreeSet<(String, String)> = self
            .all_versions()
            .await?
            .into_iter()
            .filter(|(s, _, _)| scope.map_or(true, |wanted| wanted == s.as_str()))
            .map(|(s, r, _)| (s, r))
            .collect();
        Ok(documents
            .into_iter()
            .map(|(scope, reference)| ScopeEntry {
                url: format!("{}/{scope}/{reference}", self.workspace),
                scope,
                reference,
            })
            .collect())
    }

    async fn list_versions(
        &self,
        scope: &str,
        reference: &str,
    ) -> PersistenceResult<Vec<VersionEntry>> {
        Ok(self
            .version_folders(scope, reference)
            .await?
            .into_iter()
            .map(|folder| VersionEntry {
                url: DocumentRef::new(&self.workspace, scope, reference, &folder.tag).to_string(),
                date: folder.date(),
                tag: folder.tag,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dal_test_utils::fixtures;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn adapter(dir: &Path) -> FilePersistence {
        FilePersistence::new(dir, "demo", fixtures::registry())
    }

    #[test]
    fn folder_names_parse_back() {
        let name = VersionFolder::name_for("v1.0", Utc::now());
        let folder = VersionFolder::parse(Path::new(&name)).unwrap();
        assert_eq!(folder.tag, "v1.0");
        assert!(folder.epoch > 0.0);
        assert!(folder.date().unwrap().ends_with('Z'));

        assert!(VersionFolder::parse(Path::new("v1-notatime-x")).is_none());
    }

    #[tokio::test]
    async fn write_read_and_relations() {
        let dir = tempfile::tempdir().unwrap();
        let fsp = adapter(dir.path());
        let schema = fixtures::flow_schema();
        let doc = DocumentRef::new("demo", "Flow", "f1", "v1");

        let mut body = fixtures::sample_flow();
        body["Undeclared"] = json!(true);
        fsp.write(&doc, &schema, &body).await.unwrap();

        let raw = fsp.read(&doc).await.unwrap().unwrap();
        assert_eq!(raw["schema_version"], json!("1.0"));
        assert_eq!(raw["Flow"]["f1"]["Label"], json!("pick and place"));
        assert!(raw["Flow"]["f1"].get("Undeclared").is_none());

        let mut relations = fsp.direct_relations(&doc).await.unwrap();
        relations.sort();
        assert_eq!(
            relations,
            vec![
                "global/Callback/c1/__UNVERSIONED__",
                "global/Node/n1/__UNVERSIONED__"
            ]
        );

        let err = fsp.write(&doc, &schema, &body).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn missing_relation_file_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let fsp = adapter(dir.path());
        let schema = fixtures::node_schema();
        let doc = DocumentRef::new("demo", "Node", "n1", "v1");
        fsp.write(&doc, &schema, &fixtures::sample_node("n2")).await.unwrap();

        let folder = fsp.find_version(&doc).await.unwrap().unwrap();
        std::fs::remove_file(folder.path.join(RELATIONS_FILE)).unwrap();
        assert_eq!(
            fsp.direct_relations(&doc).await.unwrap(),
            vec!["global/Node/n2/__UNVERSIONED__"]
        );

        assert_eq!(fsp.rebuild_indexes().await.unwrap(), 1);
        assert!(folder.path.join(RELATIONS_FILE).exists());
    }

    #[tokio::test]
    async fn references_cannot_leave_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let fsp = adapter(&data);
        let schema = fixtures::node_schema();
        let body = fixtures::sample_node("n2");

        for doc in [
            DocumentRef::new("demo", "Node", "../../../escaped", "v1"),
            DocumentRef::new("demo", "..", "escaped", "v1"),
            DocumentRef::new("demo", "Node", "lib/./n1", "v1"),
            DocumentRef::new("demo", "Node", "n1", "../v1"),
        ] {
            let err = fsp.write(&doc, &schema, &body).await.unwrap_err();
            assert!(matches!(err, PersistenceError::InvalidPath(_)), "{doc}");
            if doc.version == "v1" {
                assert!(fsp.read(&doc).await.is_err(), "{doc}");
            }
        }
        let outside = FilePersistence::new(&data, "..", fixtures::registry());
        let err = outside
            .write(&DocumentRef::new("..", "Node", "n1", "v1"), &schema, &body)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidPath(_)));

        assert!(!dir.path().join("escaped").exists());
        assert!(!dir.path().join("Node").exists());
    }

    #[tokio::test]
    async fn versions_scopes_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fsp = adapter(dir.path());
        let schema = fixtures::node_schema();
        for tag in ["v1", "v2"] {
            let doc = DocumentRef::new("demo", "Node", "lib/n1", tag);
            fsp.write(&doc, &schema, &fixtures::sample_node("n2")).await.unwrap();
        }

        let versions = fsp.list_versions("Node", "lib/n1").await.unwrap();
        assert_eq!(
            versions.iter().map(|v| v.tag.as_str()).collect::<Vec<_>>(),
            vec!["v1", "v2"]
        );
        assert_eq!(versions[0].url, "demo/Node/lib/n1/v1");

        let scopes = fsp.list_scopes(None).await.unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].url, "demo/Node/lib/n1");
        assert!(fsp.list_scopes(Some("Flow")).await.unwrap().is_empty());

        let v1 = DocumentRef::new("demo", "Node", "lib/n1", "v1");
        assert!(fsp.delete(&v1, &schema, Some(&json!({}))).await.is_err());
        fsp.delete(&v1, &schema, None).await.unwrap();
        assert!(fsp.read(&v1).await.unwrap().is_none());
        assert!(fsp.delete(&v1, &schema, None).await.unwrap_err().is_not_found());
        assert_eq!(fsp.list_versions("Node", "lib/n1").await.unwrap().len(), 1);
    }
}
