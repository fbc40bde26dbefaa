//! # Column Families
//!
//! A column family is a logically independent keyspace with its own
//! comparator and file set. Handles carry an atomic validity flag: dropping
//! the family invalidates every outstanding handle, and operations through a
//! released handle fail instead of touching freed state.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use takumi_core::config::MemTableConfig;
use takumi_core::error::{Error, Result};
use takumi_core::traits::Disposable;
use takumi_core::types::{ColumnFamilyId, SstFileMeta};

use crate::memtable::MemTable;

/// The only comparator this engine registers. Keys order as raw bytes,
/// which is also how the memtable skip list and the SSTable format sort.
pub const BYTEWISE_COMPARATOR: &str = "bytewise";

/// Comparator lookup by registered name.
pub fn comparator(name: &str) -> Option<fn(&[u8], &[u8]) -> CmpOrdering> {
    match name {
        BYTEWISE_COMPARATOR => Some(|a, b| a.cmp(b)),
        _ => None,
    }
}

/// Durable per-column-family options, recorded in the manifest and validated
/// on import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnFamilyOptions {
    pub comparator: String,
}

impl Default for ColumnFamilyOptions {
    fn default() -> Self {
        Self {
            comparator: BYTEWISE_COMPARATOR.to_string(),
        }
    }
}

impl ColumnFamilyOptions {
    /// Fingerprint over everything that affects on-disk compatibility.
    pub fn fingerprint(&self) -> u32 {
        crc32fast::hash(self.comparator.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        if comparator(&self.comparator).is_none() {
            return Err(Error::InvalidArgument {
                message: format!("unknown comparator: {}", self.comparator),
            });
        }
        Ok(())
    }
}

/// Runtime state of one column family.
pub struct ColumnFamilyData {
    pub id: ColumnFamilyId,
    pub name: String,
    pub options: ColumnFamilyOptions,
    /// Active memtable receiving writes.
    pub active: RwLock<Arc<MemTable>>,
    /// Sealed memtables awaiting flush, oldest first.
    pub immutable: RwLock<Vec<Arc<MemTable>>>,
    /// In-memory mirror of this family's manifest file list.
    pub files: RwLock<Vec<SstFileMeta>>,
    pub(crate) valid: Arc<AtomicBool>,
    memtable_config: MemTableConfig,
}

impl ColumnFamilyData {
    pub fn new(
        id: ColumnFamilyId,
        name: String,
        options: ColumnFamilyOptions,
        files: Vec<SstFileMeta>,
        memtable_config: MemTableConfig,
    ) -> Self {
        Self {
            id,
            name,
            options,
            active: RwLock::new(Arc::new(MemTable::new(memtable_config.clone()))),
            immutable: RwLock::new(Vec::new()),
            files: RwLock::new(files),
            valid: Arc::new(AtomicBool::new(true)),
            memtable_config,
        }
    }

    pub fn handle(&self) -> ColumnFamilyHandle {
        ColumnFamilyHandle {
            id: self.id,
            name: self.name.clone(),
            cf_alive: Arc::clone(&self.valid),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Any data not yet persisted to a sorted file?
    pub fn has_unflushed_data(&self) -> bool {
        !self.active.read().is_empty() || !self.immutable.read().is_empty()
    }

    /// Seal the active memtable and queue it for flushing. Returns false if
    /// there was nothing to rotate.
    pub fn rotate(&self) -> bool {
        let mut active = self.active.write();
        if active.is_empty() {
            return false;
        }

        active.set_read_only();
        let sealed = Arc::clone(&active);
        self.immutable.write().push(sealed);
        *active = Arc::new(MemTable::new(self.memtable_config.clone()));
        true
    }

    /// Oldest sealed memtable, if any.
    pub fn next_flushable(&self) -> Option<Arc<MemTable>> {
        self.immutable.read().first().cloned()
    }

    /// Remove a flushed memtable from the sealed queue.
    pub fn flushed(&self, table: &Arc<MemTable>) {
        self.immutable.write().retain(|t| !Arc::ptr_eq(t, table));
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

/// Caller-facing handle to a column family.
///
/// Cheap to clone. Two flags govern it: one shared with the engine, flipped
/// when the family is dropped, and one shared among clones of this handle,
/// flipped when the caller releases it. Operations through a released handle
/// fail with `IllegalState`; operations through a handle whose family was
/// dropped fail with `NotFound`.
#[derive(Debug, Clone)]
pub struct ColumnFamilyHandle {
    pub id: ColumnFamilyId,
    pub name: String,
    cf_alive: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl ColumnFamilyHandle {
    /// Whether the underlying column family still exists and the handle has
    /// not been released.
    pub fn is_valid(&self) -> bool {
        self.cf_alive.load(Ordering::Acquire) && !self.is_disposed()
    }
}

impl Disposable for ColumnFamilyHandle {
    fn dispose(&self) {
        self.released.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
