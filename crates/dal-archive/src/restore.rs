//! Restore jobs
//!
//! Every `data.json` named by the manifest is written back through its
//! workspace adapter. Relation caches are rebuilt by those writes, so
//! `relation.json` is never read.

use crate::error::{ArchiveError, ArchiveResult};
use crate::manifest::{copy_chunked, data_entry, Manifest, MANIFEST_FILE};
use dal_persistence::{
    raw_schema_version, unwrap_document, DocumentRef, Persistence, DEFAULT_SCHEMA_VERSION,
};
use dal_scope::{DalError, Workspaces};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Outcome of a restore job
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// Manifest read from the archive
    pub manifest: Manifest,
    /// Paths written back
    pub restored: Vec<String>,
    /// Paths missing from the archive or rejected by their adapter
    pub skipped: Vec<String>,
}

/// Manifest path with its document, when it resolves and is present
type ArchivedEntry = (String, Option<(DocumentRef, Vec<u8>)>);

/// Restore of one zip archive
#[derive(Debug, Clone)]
pub struct RestoreJob {
    archive: PathBuf,
}

impl RestoreJob {
    /// Job for an archive file
    #[must_use]
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
        }
    }

    /// Archive this job reads
    #[inline]
    #[must_use]
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Write every archived document back
    ///
    /// Documents already loaded into a [`dal_scope::Workspace`] are not
    /// refreshed; unload them to see the restored data.
    ///
    /// # Errors
    /// [`ArchiveError::Manifest`] if the archive has no manifest, plus
    /// container and adapter failures not tied to a single document.
    pub async fn run(&self, workspaces: &Workspaces) -> ArchiveResult<RestoreReport> {
        let chunk_size = workspaces.config().chunk_size;
        let source = self.archive.clone();
        let (manifest, entries) =
            tokio::task::spawn_blocking(move || read_archive(&source, chunk_size)).await??;

        let mut restored = Vec::new();
        let mut skipped = Vec::new();
        for (path, entry) in entries {
            let Some((doc, data)) = entry else {
                warn!(path = %path, "document missing from archive");
                skipped.push(path);
                continue;
            };
            match restore_document(workspaces, &doc, &data).await {
                Ok(()) => restored.push(path),
                Err(e) if e.is_document_error() => {
                    warn!(path = %path, error = %e, "skipping document");
                    skipped.push(path);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            archive = %self.archive.display(),
            restored = restored.len(),
            skipped = skipped.len(),
            "restore finished"
        );
        Ok(RestoreReport {
            manifest,
            restored,
            skipped,
        })
    }
}

async fn restore_document(workspaces: &Workspaces, doc: &DocumentRef, data: &[u8]) -> ArchiveResult<()> {
    let raw: Value = serde_json::from_slice(data)?;
    let schema_version = raw_schema_version(&raw).unwrap_or(DEFAULT_SCHEMA_VERSION);
    let schema = workspaces.schemas().load(&doc.scope, schema_version)?;
    let body = unwrap_document(doc, &raw)
        .ok_or_else(|| DalError::InvalidShape(format!("{doc} has no document body")))?;
    workspaces.adapter(&doc.workspace)?.write(doc, &schema, body).await?;
    Ok(())
}

fn read_archive(path: &Path, chunk_size: usize) -> ArchiveResult<(Manifest, Vec<ArchivedEntry>)> {
    let mut zip = ZipArchive::new(std::fs::File::open(path)?)?;
    let manifest: Manifest = match zip.by_name(MANIFEST_FILE) {
        Ok(mut file) => {
            let mut buffer = Vec::new();
            copy_chunked(&mut file, &mut buffer, chunk_size)?;
            serde_json::from_slice(&buffer).map_err(|e| ArchiveError::Manifest(e.to_string()))?
        }
        Err(ZipError::FileNotFound) => {
            return Err(ArchiveError::Manifest(format!("{MANIFEST_FILE} not in archive")))
        }
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::with_capacity(manifest.manifest.len());
    for archived in &manifest.manifest {
        let Ok(doc) = DocumentRef::parse(archived) else {
            entries.push((archived.clone(), None));
            continue;
        };
        let data = match zip.by_name(&data_entry(&doc)) {
            Ok(mut file) => {
                let mut buffer = Vec::new();
                copy_chunked(&mut file, &mut buffer, chunk_size)?;
                Some((doc, buffer))
            }
            Err(ZipError::FileNotFound) => None,
            Err(e) => return Err(e.into()),
        };
        entries.push((archived.clone(), data));
    }
    Ok((manifest, entries))
}
