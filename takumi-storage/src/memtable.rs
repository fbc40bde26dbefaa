//! # MemTable - In-Memory Storage
//!
//! Recent writes live in a concurrent skip list until the table fills up and
//! is flushed to a level-0 SSTable. Each user key holds only its latest
//! version; a tombstone is a `None` value carrying the deleting sequence
//! number.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use takumi_core::config::MemTableConfig;
use takumi_core::error::{Error, Result};
use takumi_core::types::{EntryKind, SequenceNumber};

/// Latest version of one key.
#[derive(Debug, Clone)]
pub struct MemEntry {
    pub sequence: SequenceNumber,
    /// `None` marks a tombstone.
    pub value: Option<Bytes>,
}

impl MemEntry {
    pub fn kind(&self) -> EntryKind {
        if self.value.is_some() {
            EntryKind::Put
        } else {
            EntryKind::Tombstone
        }
    }
}

pub struct MemTable {
    data: SkipMap<Vec<u8>, MemEntry>,
    size_bytes: AtomicUsize,
    config: MemTableConfig,
    read_only: AtomicBool,
}

impl MemTable {
    pub fn new(config: MemTableConfig) -> Self {
        Self {
            data: SkipMap::new(),
            size_bytes: AtomicUsize::new(0),
            config,
            read_only: AtomicBool::new(false),
        }
    }

    /// Apply a write. `value == None` records a tombstone.
    pub fn apply(
        &self,
        key: &[u8],
        sequence: SequenceNumber,
        value: Option<Bytes>,
    ) -> Result<()> {
        if self.read_only.load(Ordering::Acquire) {
            return Err(Error::MemTable {
                message: "MemTable is read-only (being flushed)".to_string(),
            });
        }

        let entry_size = key.len() + value.as_ref().map(|v| v.len()).unwrap_or(0) + 16;
        self.data.insert(key.to_vec(), MemEntry { sequence, value });
        self.size_bytes.fetch_add(entry_size, Ordering::Relaxed);

        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Option<MemEntry> {
        self.data.get(key).map(|e| e.value().clone())
    }

    /// All entries in key order, for flushing.
    pub fn entries(&self) -> Vec<(Vec<u8>, MemEntry)> {
        self.data
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    pub fn should_flush(&self) -> bool {
        self.size_bytes() >= self.config.max_size
    }

    /// Seal the table before flushing it; further writes fail.
    pub fn set_read_only(&self) {
        self.read_only.store(true, Ordering::Release);
    }
}
