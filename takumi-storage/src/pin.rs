//! # Pinning Service
//!
//! Defers deletion of named files while any in-flight checkpoint or export
//! references them. Pins are reference-counted per file; overlapping pin
//! sets from concurrent operations are independent. The background deletion
//! path never removes a file directly: it goes through [`PinRegistry::retire`],
//! which deletes immediately when the file is unpinned and otherwise parks it
//! until the last pin is released.
//!
//! The refcount map is the only shared mutable state here. Its mutex guards
//! map updates exclusively; file deletion happens after the lock is dropped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use takumi_core::error::{Error, Result};
use takumi_core::metrics::Metrics;
use takumi_core::types::{FileId, SstFileMeta};

#[derive(Default)]
struct PinInner {
    /// Outstanding pin count per file.
    pins: HashMap<FileId, u64>,
    /// Superseded files awaiting deletion once their pins drain.
    retired: HashMap<FileId, PathBuf>,
}

pub struct PinRegistry {
    inner: Mutex<PinInner>,
    metrics: Arc<Metrics>,
}

impl PinRegistry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Mutex::new(PinInner::default()),
            metrics,
        }
    }

    /// Pin a file set for the duration of an operation.
    ///
    /// Fails with `NotFound` if any file has already been retired or its
    /// path no longer exists; in that case nothing is pinned.
    pub fn pin(self: &Arc<Self>, files: &[SstFileMeta]) -> Result<PinSet> {
        let mut inner = self.inner.lock();

        for file in files {
            if inner.retired.contains_key(&file.file_id) {
                return Err(Error::NotFound {
                    message: format!("file {:06} is already superseded", file.file_id),
                });
            }
            if !file.path.exists() {
                return Err(Error::NotFound {
                    message: format!("file missing from disk: {:?}", file.path),
                });
            }
        }

        for file in files {
            *inner.pins.entry(file.file_id).or_insert(0) += 1;
        }

        Ok(PinSet {
            registry: Arc::clone(self),
            file_ids: files.iter().map(|f| f.file_id).collect(),
            released: false,
        })
    }

    /// Hand a superseded file to the deletion path. Deletes now if unpinned,
    /// defers otherwise.
    pub fn retire(&self, file_id: FileId, path: PathBuf) {
        let deferred = {
            let mut inner = self.inner.lock();
            if inner.pins.get(&file_id).copied().unwrap_or(0) > 0 {
                inner.retired.insert(file_id, path.clone());
                true
            } else {
                false
            }
        };

        if deferred {
            debug!("Deferring deletion of pinned file {:06}", file_id);
            self.metrics.record_pin_deferred();
        } else {
            Self::delete_file(file_id, &path);
            self.metrics.record_file_retired();
        }
    }

    pub fn is_pinned(&self, file_id: FileId) -> bool {
        self.inner.lock().pins.get(&file_id).copied().unwrap_or(0) > 0
    }

    /// Number of retired files still waiting on pins.
    pub fn deferred_count(&self) -> usize {
        self.inner.lock().retired.len()
    }

    fn release(&self, file_ids: &[FileId]) {
        // Collect deletable paths under the lock, delete after dropping it.
        let mut deletable = Vec::new();
        {
            let mut inner = self.inner.lock();
            for id in file_ids {
                let drained = match inner.pins.get_mut(id) {
                    Some(count) => {
                        *count = count.saturating_sub(1);
                        *count == 0
                    }
                    None => false,
                };
                if drained {
                    inner.pins.remove(id);
                    if let Some(path) = inner.retired.remove(id) {
                        deletable.push((*id, path));
                    }
                }
            }
        }

        for (id, path) in deletable {
            Self::delete_file(id, &path);
            self.metrics.record_file_retired();
        }
    }

    fn delete_file(file_id: FileId, path: &PathBuf) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Deleted superseded file {:06} at {:?}", file_id, path),
            Err(e) => warn!("Failed to delete file {:06} at {:?}: {}", file_id, path, e),
        }
    }
}

/// RAII guard over one pinned file set. Releasing (or dropping) decrements
/// every refcount and deletes any retired file whose pins drained.
pub struct PinSet {
    registry: Arc<PinRegistry>,
    file_ids: Vec<FileId>,
    released: bool,
}

impl PinSet {
    pub fn file_ids(&self) -> &[FileId] {
        &self.file_ids
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.file_ids);
        }
    }
}

impl Drop for PinSet {
    fn drop(&mut self) {
        self.release_inner();
    }
}
