//! # Column Family Import
//!
//! Registers an exported file set as a new column family in a (possibly
//! different) running database, without rewriting file contents. Validation
//! is strict and happens before anything is linked:
//!
//! 1. comparator and options fingerprint must match the target
//!    (`IncompatibleSchema`, never a best-effort merge);
//! 2. every file checksum is re-validated (`ChecksumMismatch`);
//! 3. the file set must fit one level without re-sorting
//!    (`OverlappingRanges` otherwise).
//!
//! On success the engine's sequence counter is raised strictly above the
//! largest imported sequence number, so future writes can never collide with
//! or shadow imported history. On failure no partial column family is left
//! registered and any linked files are removed.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use takumi_core::error::{Error, Result};
use takumi_core::types::SstFileMeta;

use crate::column_family::{comparator, ColumnFamilyData, ColumnFamilyHandle, ColumnFamilyOptions};
use crate::engine::Database;
use crate::export::ExportMetadata;
use crate::manifest::sst_path;
use crate::sstable::verify_file_checksum;

pub(crate) async fn import_column_family(
    db: &Database,
    name: &str,
    metadata: &ExportMetadata,
    source_dir: &Path,
) -> Result<ColumnFamilyHandle> {
    db.ensure_open()?;

    if name.is_empty() {
        return Err(Error::InvalidArgument {
            message: "column family name must not be empty".to_string(),
        });
    }
    if db.column_family(name).is_some() {
        return Err(Error::InvalidArgument {
            message: format!("column family '{}' already exists", name),
        });
    }

    // Schema compatibility is all-or-nothing.
    if comparator(&metadata.comparator).is_none() {
        return Err(Error::IncompatibleSchema {
            message: format!(
                "comparator '{}' is not registered in the target database",
                metadata.comparator
            ),
        });
    }
    let options = ColumnFamilyOptions {
        comparator: metadata.comparator.clone(),
    };
    if options.fingerprint() != metadata.options_fingerprint {
        return Err(Error::IncompatibleSchema {
            message: format!(
                "options fingerprint mismatch: expected {:#010x}, got {:#010x}",
                metadata.options_fingerprint,
                options.fingerprint()
            ),
        });
    }

    // Locate and validate every source file before touching the target.
    let sources = resolve_sources(&metadata.files, source_dir)?;
    for (meta, path) in metadata.files.iter().zip(&sources) {
        if let Some(expected) = meta.checksum {
            let actual = verify_file_checksum(path)?;
            if actual != expected {
                return Err(Error::ChecksumMismatch {
                    path: path.clone(),
                    expected,
                    actual,
                });
            }
        }
    }

    let level = assign_level(&metadata.files)?;

    // Materialize under fresh file ids; roll back on any failure.
    let file_ids: Vec<u64> = {
        let mut manifest = db.manifest.lock();
        metadata.files.iter().map(|_| manifest.allocate_file_id()).collect()
    };

    let mut linked: Vec<PathBuf> = Vec::with_capacity(sources.len());
    let mut imported: Vec<SstFileMeta> = Vec::with_capacity(sources.len());
    for ((meta, src), file_id) in metadata.files.iter().zip(&sources).zip(&file_ids) {
        let target = sst_path(&db.config.data_dir, *file_id);
        if let Err(e) = db.linker.link_or_copy(src, &target) {
            remove_linked(&linked);
            return Err(e);
        }
        linked.push(target.clone());

        let mut new_meta = meta.clone();
        new_meta.file_id = *file_id;
        new_meta.path = target;
        new_meta.level = level;
        new_meta.being_compacted = false;
        imported.push(new_meta);
    }

    let largest_sequence = metadata.largest_sequence;

    // Register the family; undo everything if the manifest cannot be saved.
    let cf = {
        let mut manifest = db.manifest.lock();
        let cf_id = manifest.add_column_family(name, options.clone());
        for meta in &imported {
            if let Err(e) = manifest.add_file(cf_id, meta.clone()) {
                manifest.remove_column_family(cf_id);
                remove_linked(&linked);
                return Err(e);
            }
        }
        if manifest.last_sequence < largest_sequence {
            manifest.last_sequence = largest_sequence;
        }
        if let Err(e) = manifest.save(&db.config.data_dir) {
            manifest.remove_column_family(cf_id);
            remove_linked(&linked);
            return Err(e);
        }

        ColumnFamilyData::new(
            cf_id,
            name.to_string(),
            options,
            imported.clone(),
            db.config.memtable.clone(),
        )
    };

    // Sequence floor strictly above all imported history.
    db.sequence
        .fetch_max(largest_sequence + 1, std::sync::atomic::Ordering::SeqCst);

    let handle = cf.handle();
    db.cfs.write().insert(cf.id, std::sync::Arc::new(cf));
    db.metrics.record_import();

    info!(
        "Imported column family '{}': {} files at level {}, sequence floor {}",
        name,
        imported.len(),
        level,
        largest_sequence + 1
    );

    Ok(handle)
}

/// Resolve each descriptor to an on-disk file: the recorded path when it
/// still exists, otherwise the same file name inside `source_dir`.
fn resolve_sources(files: &[SstFileMeta], source_dir: &Path) -> Result<Vec<PathBuf>> {
    files
        .iter()
        .map(|meta| {
            if meta.path.exists() {
                return Ok(meta.path.clone());
            }
            let candidate = source_dir.join(meta.file_name());
            if candidate.exists() {
                return Ok(candidate);
            }
            Err(Error::NotFound {
                message: format!(
                    "exported file {} not found at {:?} or in {:?}",
                    meta.file_name(),
                    meta.path,
                    source_dir
                ),
            })
        })
        .collect()
}

/// Pick the level the imported set is placed at, without re-sorting.
///
/// A mutually non-overlapping set satisfies the sorted-level invariant and
/// goes to level 1 as-is. A set with key overlaps is only sound at level 0,
/// where read order is by largest sequence; that requires pairwise-disjoint
/// sequence ranges (exactly what flush-ordered exports produce). Anything
/// else cannot be placed consistently and is rejected.
fn assign_level(files: &[SstFileMeta]) -> Result<u32> {
    let mut key_overlap = false;
    for (i, a) in files.iter().enumerate() {
        for b in files.iter().skip(i + 1) {
            if a.overlaps(b) {
                key_overlap = true;
                if a.sequence_overlaps(b) {
                    return Err(Error::OverlappingRanges {
                        message: format!(
                            "files {} and {} overlap in both key and sequence ranges",
                            a.file_name(),
                            b.file_name()
                        ),
                    });
                }
            }
        }
    }

    Ok(if key_overlap { 0 } else { 1 })
}

fn remove_linked(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove partially imported file {:?}: {}", path, e);
        }
    }
}
