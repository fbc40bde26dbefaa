//! # Column Family Export
//!
//! Copies one column family's live files into a destination directory and
//! returns a self-describing [`ExportMetadata`] bundle: file descriptors,
//! comparator name, and an options fingerprint, everything import-time
//! validation needs. The bundle is also persisted as an `EXPORT_METADATA`
//! sidecar so it survives a process restart.
//!
//! Exported artifacts are immutable: further writes to the source column
//! family alter neither the metadata nor the files it references.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use takumi_core::config::FlushPolicy;
use takumi_core::error::{Error, Result};
use takumi_core::types::{SequenceNumber, SstFileMeta};

use crate::column_family::ColumnFamilyHandle;
use crate::engine::Database;

/// Name of the sidecar metadata file inside an export directory.
pub const EXPORT_METADATA_FILE: &str = "EXPORT_METADATA";

/// Self-describing bundle of one exported column family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub column_family: String,
    pub comparator: String,
    pub options_fingerprint: u32,
    /// Largest sequence number present in any exported file; the importing
    /// database raises its sequence floor strictly above this.
    pub largest_sequence: SequenceNumber,
    pub files: Vec<SstFileMeta>,
}

impl ExportMetadata {
    /// Persist the sidecar into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self).map_err(|e| Error::Internal {
            message: format!("failed to encode export metadata: {}", e),
        })?;
        std::fs::write(dir.join(EXPORT_METADATA_FILE), body)?;
        Ok(())
    }

    /// Load a sidecar previously written by [`ExportMetadata::save`].
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(EXPORT_METADATA_FILE);
        if !path.exists() {
            return Err(Error::NotFound {
                message: format!("no export metadata at {:?}", path),
            });
        }
        let body = std::fs::read(&path)?;
        serde_json::from_slice(&body).map_err(|e| Error::Internal {
            message: format!("failed to decode export metadata: {}", e),
        })
    }
}

pub(crate) async fn export_column_family(
    db: &Database,
    handle: &ColumnFamilyHandle,
    dest: &Path,
) -> Result<ExportMetadata> {
    db.ensure_open()?;
    let cf = db.resolve_cf(handle)?;

    if dest.as_os_str().is_empty() {
        return Err(Error::InvalidArgument {
            message: "export path must not be empty".to_string(),
        });
    }
    // Fail before anything is pinned or linked.
    if dest.exists() {
        return Err(Error::AlreadyExists {
            path: dest.to_path_buf(),
        });
    }

    // The export ships files only; flush so acknowledged writes are in them.
    match db.config.checkpoint.flush {
        FlushPolicy::Never => {}
        FlushPolicy::Auto | FlushPolicy::Always => db.flush_cf(&cf)?,
    }

    let (capture, pins) = db.capture_and_pin_cf(cf.id)?;

    let result = materialize_export(db, &cf.name, &capture.files, dest);

    pins.release();

    match result {
        Ok(metadata) => {
            db.metrics.record_export();
            info!(
                "Exported column family '{}' to {:?}: {} files, sequences up to {}",
                cf.name,
                dest,
                metadata.files.len(),
                metadata.largest_sequence
            );
            Ok(metadata)
        }
        Err(e) => {
            if dest.exists() {
                if let Err(cleanup) = std::fs::remove_dir_all(dest) {
                    warn!("Failed to remove partial export {:?}: {}", dest, cleanup);
                }
            }
            Err(e)
        }
    }
}

fn materialize_export(
    db: &Database,
    cf_name: &str,
    files: &[SstFileMeta],
    dest: &Path,
) -> Result<ExportMetadata> {
    db.linker.materialize(files, dest)?;

    let exported_files: Vec<SstFileMeta> = files
        .iter()
        .map(|f| {
            let mut meta = f.clone();
            meta.path = dest.join(f.file_name());
            meta.being_compacted = false;
            meta
        })
        .collect();

    let largest_sequence = exported_files
        .iter()
        .map(|f| f.largest_sequence)
        .max()
        .unwrap_or(0);

    let options = {
        let manifest = db.manifest.lock();
        manifest
            .cf_by_name(cf_name)
            .map(|cf| cf.options.clone())
            .ok_or_else(|| Error::NotFound {
                message: format!("column family '{}' vanished during export", cf_name),
            })?
    };

    let metadata = ExportMetadata {
        column_family: cf_name.to_string(),
        comparator: options.comparator.clone(),
        options_fingerprint: options.fingerprint(),
        largest_sequence,
        files: exported_files,
    };

    metadata.save(dest)?;
    Ok(metadata)
}
