//! # Manifest - Live File Set Management
//!
//! The manifest is the authoritative record of which files constitute the
//! current database version. It is consolidated, not incremental: every save
//! rewrites the complete description, so a directory can be opened from its
//! manifest alone without replaying any edit history.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use takumi_core::error::{Error, Result};
use takumi_core::types::{ColumnFamilyId, FileId, SequenceNumber, SstFileMeta};

use crate::column_family::ColumnFamilyOptions;

/// Name of the manifest file inside a database directory.
pub const MANIFEST_FILE: &str = "MANIFEST";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub next_file_id: FileId,
    pub next_cf_id: ColumnFamilyId,
    /// Latest sequence number durably flushed to sorted files.
    pub last_sequence: SequenceNumber,
    /// WAL records at or below this sequence have been flushed and are
    /// skipped during replay.
    pub wal_checkpoint: SequenceNumber,
    pub column_families: Vec<ColumnFamilyMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnFamilyMeta {
    pub id: ColumnFamilyId,
    pub name: String,
    pub options: ColumnFamilyOptions,
    pub files: Vec<SstFileMeta>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            next_file_id: 1,
            next_cf_id: 1,
            last_sequence: 0,
            wal_checkpoint: 0,
            column_families: Vec::new(),
        }
    }

    /// Load the manifest from `dir`, or create a fresh one if none exists.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if path.exists() {
            Self::load(dir)
        } else {
            debug!("No manifest at {:?}, starting fresh", path);
            Ok(Self::new())
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let body = std::fs::read(dir.join(MANIFEST_FILE))?;
        let manifest: Manifest = serde_json::from_slice(&body).map_err(|e| Error::Manifest {
            message: format!("failed to decode manifest: {}", e),
        })?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::Manifest {
                message: format!("unsupported manifest version: {}", manifest.version),
            });
        }
        Ok(manifest)
    }

    /// Atomically persist the manifest under `dir`.
    ///
    /// Write-fsync-rename so a crash leaves either the old or the new
    /// manifest, never a torn one.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self).map_err(|e| Error::Manifest {
            message: format!("failed to encode manifest: {}", e),
        })?;

        let temp_path = dir.join(".MANIFEST.tmp");
        let final_path = dir.join(MANIFEST_FILE);

        {
            use std::io::Write;
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &final_path)?;
        std::fs::File::open(dir)?.sync_all()?;

        Ok(())
    }

    pub fn cf(&self, id: ColumnFamilyId) -> Option<&ColumnFamilyMeta> {
        self.column_families.iter().find(|cf| cf.id == id)
    }

    pub fn cf_mut(&mut self, id: ColumnFamilyId) -> Option<&mut ColumnFamilyMeta> {
        self.column_families.iter_mut().find(|cf| cf.id == id)
    }

    pub fn cf_by_name(&self, name: &str) -> Option<&ColumnFamilyMeta> {
        self.column_families.iter().find(|cf| cf.name == name)
    }

    pub fn add_column_family(
        &mut self,
        name: &str,
        options: ColumnFamilyOptions,
    ) -> ColumnFamilyId {
        let id = self.next_cf_id;
        self.next_cf_id += 1;
        self.column_families.push(ColumnFamilyMeta {
            id,
            name: name.to_string(),
            options,
            files: Vec::new(),
        });
        id
    }

    pub fn remove_column_family(&mut self, id: ColumnFamilyId) -> Option<ColumnFamilyMeta> {
        let idx = self.column_families.iter().position(|cf| cf.id == id)?;
        Some(self.column_families.remove(idx))
    }

    pub fn add_file(&mut self, cf_id: ColumnFamilyId, meta: SstFileMeta) -> Result<()> {
        let cf = self.cf_mut(cf_id).ok_or_else(|| Error::Manifest {
            message: format!("unknown column family id {}", cf_id),
        })?;
        cf.files.push(meta);
        Ok(())
    }

    pub fn remove_files(&mut self, cf_id: ColumnFamilyId, file_ids: &[FileId]) -> Result<()> {
        let cf = self.cf_mut(cf_id).ok_or_else(|| Error::Manifest {
            message: format!("unknown column family id {}", cf_id),
        })?;
        cf.files.retain(|f| !file_ids.contains(&f.file_id));
        Ok(())
    }

    /// Allocate a fresh file id.
    pub fn allocate_file_id(&mut self) -> FileId {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }

    /// All live files across every column family.
    pub fn live_files(&self) -> Vec<SstFileMeta> {
        self.column_families
            .iter()
            .flat_map(|cf| cf.files.iter().cloned())
            .collect()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Conventional file name for an SST with the given id.
pub fn sst_file_name(file_id: FileId) -> String {
    format!("{:06}.sst", file_id)
}

/// Path of an SST inside a database directory.
pub fn sst_path(data_dir: &Path, file_id: FileId) -> PathBuf {
    data_dir.join("sstables").join(sst_file_name(file_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file(id: FileId) -> SstFileMeta {
        SstFileMeta {
            file_id: id,
            path: PathBuf::from(format!("/data/sstables/{:06}.sst", id)),
            size: 1024,
            smallest_key: b"a".to_vec(),
            largest_key: b"z".to_vec(),
            smallest_sequence: 1,
            largest_sequence: 10,
            entry_count: 10,
            deletion_count: 0,
            checksum: Some(0xabcd),
            level: 0,
            being_compacted: false,
            creation_time: 0,
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new();
        let cf_id = manifest.add_column_family("default", ColumnFamilyOptions::default());
        manifest.add_file(cf_id, sample_file(1)).unwrap();
        manifest.last_sequence = 10;
        manifest.wal_checkpoint = 10;
        manifest.save(dir.path()).unwrap();

        let loaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(loaded.last_sequence, 10);
        assert_eq!(loaded.column_families.len(), 1);
        assert_eq!(loaded.cf_by_name("default").unwrap().files.len(), 1);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        Manifest::new().save(dir.path()).unwrap();
        assert!(dir.path().join(MANIFEST_FILE).exists());
        assert!(!dir.path().join(".MANIFEST.tmp").exists());
    }

    #[test]
    fn test_remove_files() {
        let mut manifest = Manifest::new();
        let cf_id = manifest.add_column_family("default", ColumnFamilyOptions::default());
        manifest.add_file(cf_id, sample_file(1)).unwrap();
        manifest.add_file(cf_id, sample_file(2)).unwrap();
        manifest.remove_files(cf_id, &[1]).unwrap();
        assert_eq!(manifest.cf(cf_id).unwrap().files.len(), 1);
        assert_eq!(manifest.cf(cf_id).unwrap().files[0].file_id, 2);
    }

    #[test]
    fn test_load_missing_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::load(dir.path()).is_err());
        assert!(Manifest::load_or_create(dir.path()).is_ok());
    }
}
