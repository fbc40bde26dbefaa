//! # FileLinker
//!
//! Materializes a set of immutable files into a destination directory,
//! all-or-nothing. Hard links avoid copying data when source and destination
//! share a filesystem; otherwise each file is copied byte-for-byte. Any
//! failure removes every artifact created so far, so a failed operation
//! leaves the destination absent rather than half-populated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use takumi_core::error::{Error, Result};
use takumi_core::metrics::Metrics;
use takumi_core::types::SstFileMeta;

pub struct FileLinker {
    metrics: Arc<Metrics>,
}

impl FileLinker {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Create `dest_dir` and materialize every file into it under its own
    /// file name. The directory must not already exist.
    ///
    /// Returns destination paths in input order. On any failure the
    /// directory and everything created inside it are removed before the
    /// error is returned.
    pub fn materialize(&self, files: &[SstFileMeta], dest_dir: &Path) -> Result<Vec<PathBuf>> {
        if dest_dir.exists() {
            return Err(Error::AlreadyExists {
                path: dest_dir.to_path_buf(),
            });
        }

        if let Some(parent) = dest_dir.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir(dest_dir)?;

        match self.transfer_all(files, dest_dir) {
            Ok(paths) => {
                // Make the new directory entries durable.
                std::fs::File::open(dest_dir)?.sync_all()?;
                Ok(paths)
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(dest_dir) {
                    warn!("Failed to clean up {:?} after error: {}", dest_dir, cleanup);
                }
                Err(e)
            }
        }
    }

    fn transfer_all(&self, files: &[SstFileMeta], dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut created = Vec::with_capacity(files.len());
        for file in files {
            let target = dest_dir.join(file.file_name());
            self.link_or_copy(&file.path, &target)?;
            created.push(target);
        }
        Ok(created)
    }

    /// Hard-link `src` to `dst`, copying instead when the filesystem rejects
    /// the link (different device, unsupported).
    pub fn link_or_copy(&self, src: &Path, dst: &Path) -> Result<()> {
        match std::fs::hard_link(src, dst) {
            Ok(()) => {
                self.metrics.record_file_linked();
                Ok(())
            }
            Err(link_err) => {
                debug!(
                    "Hard link {:?} -> {:?} failed ({}), copying instead",
                    src, dst, link_err
                );
                match std::fs::copy(src, dst) {
                    Ok(bytes) => {
                        self.metrics.record_file_copied(bytes);
                        Ok(())
                    }
                    Err(copy_err) => Err(Error::IOFailure {
                        message: format!("failed to transfer {:?} to {:?}", src, dst),
                        source: copy_err,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linker() -> FileLinker {
        FileLinker::new(Arc::new(Metrics::new()))
    }

    fn file_on_disk(dir: &Path, id: u64, content: &[u8]) -> SstFileMeta {
        let path = dir.join(format!("{:06}.sst", id));
        std::fs::write(&path, content).unwrap();
        SstFileMeta {
            file_id: id,
            path,
            size: content.len() as u64,
            smallest_key: Vec::new(),
            largest_key: Vec::new(),
            smallest_sequence: 0,
            largest_sequence: 0,
            entry_count: 0,
            deletion_count: 0,
            checksum: None,
            level: 0,
            being_compacted: false,
            creation_time: 0,
        }
    }

    #[test]
    fn test_materialize_links_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            file_on_disk(dir.path(), 1, b"one"),
            file_on_disk(dir.path(), 2, b"two"),
        ];
        let dest = dir.path().join("snapshot");

        let created = linker().materialize(&files, &dest).unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(std::fs::read(&created[0]).unwrap(), b"one");
        assert_eq!(std::fs::read(&created[1]).unwrap(), b"two");
    }

    #[test]
    fn test_destination_must_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![file_on_disk(dir.path(), 1, b"one")];
        let dest = dir.path().join("snapshot");
        std::fs::create_dir(&dest).unwrap();

        match linker().materialize(&files, &dest) {
            Err(Error::AlreadyExists { path }) => assert_eq!(path, dest),
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
        // The pre-existing directory is untouched.
        assert!(dest.exists());
    }

    #[test]
    fn test_failure_removes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let good = file_on_disk(dir.path(), 1, b"one");
        let mut missing = file_on_disk(dir.path(), 2, b"two");
        std::fs::remove_file(&missing.path).unwrap();
        missing.size = 0;

        let dest = dir.path().join("snapshot");
        let result = linker().materialize(&[good, missing], &dest);

        assert!(result.is_err());
        assert!(!dest.exists(), "failed materialize must leave nothing behind");
    }

    #[test]
    fn test_linked_file_shares_content_with_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = file_on_disk(dir.path(), 1, b"shared");
        let dest = dir.path().join("snapshot");

        linker().materialize(std::slice::from_ref(&file), &dest).unwrap();

        // Deleting the source must not affect the linked copy.
        std::fs::remove_file(&file.path).unwrap();
        assert_eq!(
            std::fs::read(dest.join(file.file_name())).unwrap(),
            b"shared"
        );
    }

    #[test]
    fn test_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let file = file_on_disk(dir.path(), 1, b"one");
        let dest = dir.path().join("deep").join("nested").join("snapshot");

        linker().materialize(std::slice::from_ref(&file), &dest).unwrap();
        assert!(dest.join("000001.sst").exists());
    }
}
