//! Archive jobs
//!
//! Zip backup and restore of stored documents.
//!
//! # Overview
//!
//! An archive holds one `manifest.json` and, per document,
//! `<ws>/<scope>/<ref>/<version>/data.json` (the stored payload) and
//! `relation.json` (its relations at backup time).
//!
//! - **BackupJob**: archives documents plus their transitive relations
//! - **RestoreJob**: replays each `data.json` through the adapter write path
//!
//! # Example
//!
//! ```rust,ignore
//! use dal_archive::{BackupJob, RestoreJob};
//! use dal_scope::{DalConfig, Workspaces};
//!
//! # async fn example() -> dal_archive::ArchiveResult<()> {
//! let workspaces = Workspaces::from_config(DalConfig::new())?;
//! let report = BackupJob::new(["Flow:f1"])
//!     .run(&workspaces, "backup.zip".as_ref())
//!     .await?;
//! println!("{} documents", report.manifest.manifest.len());
//!
//! RestoreJob::new("backup.zip").run(&workspaces).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backup;
pub mod error;
pub mod manifest;
pub mod restore;

// Re-exports
pub use backup::{BackupJob, BackupReport};
pub use error::{ArchiveError, ArchiveResult};
pub use manifest::{Manifest, DATA_FILE, MANIFEST_FILE, RELATION_FILE};
pub use restore::{RestoreJob, RestoreReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
