//! Backup jobs
//!
//! A job archives each requested document plus everything reachable
//! through its relations. Documents that cannot be archived are logged and
//! skipped; the rest of the job continues.

use crate::error::{ArchiveError, ArchiveResult};
use crate::manifest::{copy_chunked, data_entry, relation_entry, Manifest, MANIFEST_FILE};
use dal_persistence::{DocumentRef, PathDefaults, Persistence, RelationQuery, RelationSource};
use dal_scope::{DalError, Workspaces};
use indexmap::IndexMap;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Outcome of a backup job
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// Manifest written into the archive
    pub manifest: Manifest,
    /// Paths that could not be archived
    pub skipped: Vec<String>,
}

/// One document ready to be written
#[derive(Debug)]
struct Staged {
    doc: DocumentRef,
    data: Vec<u8>,
    relations: Vec<u8>,
}

/// Backup of a set of documents into one zip archive
#[derive(Debug, Clone)]
pub struct BackupJob {
    paths: Vec<String>,
    shallow: bool,
    metadata: Value,
    defaults: PathDefaults,
}

impl BackupJob {
    /// Job for the given document paths
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            shallow: false,
            metadata: Value::Null,
            defaults: PathDefaults::new(),
        }
    }

    /// Follow direct relations only
    #[inline]
    #[must_use]
    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Metadata stored in the manifest
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Defaults applied while resolving the requested paths
    #[inline]
    #[must_use]
    pub fn with_defaults(mut self, defaults: PathDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Relation depth this job follows
    #[must_use]
    pub fn depth(&self, workspaces: &Workspaces) -> u32 {
        if self.shallow {
            0
        } else {
            workspaces.config().backup_depth
        }
    }

    /// Archive the documents into `out`
    ///
    /// # Errors
    /// Fails if the archive cannot be written or an adapter fails for a
    /// reason other than the document itself.
    pub async fn run(&self, workspaces: &Workspaces, out: &Path) -> ArchiveResult<BackupReport> {
        let query = RelationQuery::new().with_depth(self.depth(workspaces));
        let mut archived: IndexMap<String, Staged> = IndexMap::new();
        let mut skipped = Vec::new();

        for path in &self.paths {
            let doc = match DocumentRef::parse_with(path, &self.defaults) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping unresolvable path");
                    skipped.push(path.clone());
                    continue;
                }
            };
            if !archive(workspaces, doc.clone(), &mut archived, &mut skipped).await? {
                continue;
            }

            for relation in workspaces.relations(&doc, &query).await? {
                if archived.contains_key(&relation) {
                    continue;
                }
                match DocumentRef::parse(&relation) {
                    Ok(related) => {
                        archive(workspaces, related, &mut archived, &mut skipped).await?;
                    }
                    Err(e) => {
                        debug!(relation = %relation, error = %e, "skipping unparsable relation");
                        skipped.push(relation);
                    }
                }
            }
        }

        let manifest = Manifest::new(self.metadata.clone(), archived.keys().cloned().collect());
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        let staged: Vec<Staged> = archived.into_values().collect();
        let chunk_size = workspaces.config().chunk_size;
        let target: PathBuf = out.to_path_buf();
        tokio::task::spawn_blocking(move || write_archive(&target, &staged, &manifest_bytes, chunk_size))
            .await??;

        info!(
            archive = %out.display(),
            documents = manifest.manifest.len(),
            skipped = skipped.len(),
            "backup finished"
        );
        Ok(BackupReport { manifest, skipped })
    }
}

/// Stage one document, returning whether it was archived
async fn archive(
    workspaces: &Workspaces,
    doc: DocumentRef,
    archived: &mut IndexMap<String, Staged>,
    skipped: &mut Vec<String>,
) -> ArchiveResult<bool> {
    let key = doc.to_string();
    if archived.contains_key(&key) {
        return Ok(true);
    }
    match stage(workspaces, doc).await {
        Ok(staged) => {
            debug!(doc = %key, "archived document");
            archived.insert(key, staged);
            Ok(true)
        }
        Err(e) if e.is_document_error() => {
            warn!(doc = %key, error = %e, "skipping document");
            skipped.push(key);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

async fn stage(workspaces: &Workspaces, doc: DocumentRef) -> ArchiveResult<Staged> {
    let adapter = workspaces.adapter(&doc.workspace)?;
    let raw = adapter
        .read(&doc)
        .await?
        .ok_or_else(|| ArchiveError::from(DalError::NotFound(doc.to_string())))?;
    let relations = adapter.direct_relations(&doc).await?;
    Ok(Staged {
        data: serde_json::to_vec(&raw)?,
        relations: serde_json::to_vec(&relations)?,
        doc,
    })
}

fn write_archive(out: &Path, staged: &[Staged], manifest: &[u8], chunk_size: usize) -> ArchiveResult<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(std::fs::File::create(out)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in staged {
        zip.start_file(data_entry(&entry.doc), options)?;
        copy_chunked(&mut entry.data.as_slice(), &mut zip, chunk_size)?;
        zip.start_file(relation_entry(&entry.doc), options)?;
        copy_chunked(&mut entry.relations.as_slice(), &mut zip, chunk_size)?;
    }
    zip.start_file(MANIFEST_FILE, options)?;
    zip.write_all(manifest)?;
    zip.finish()?;
    Ok(())
}
