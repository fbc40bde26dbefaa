//! # Core Types
//!
//! Shared identifiers and the on-disk file descriptor that flows through the
//! manifest, the live-file registry, and export metadata.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Monotonically increasing counter stamped on every write at commit time.
/// Defines a total order over all mutations.
pub type SequenceNumber = u64;

/// Identifier of an on-disk sorted file, unique within one database.
pub type FileId = u64;

/// Identifier of a column family, unique within one database.
pub type ColumnFamilyId = u32;

/// Name of the column family every database starts with.
pub const DEFAULT_COLUMN_FAMILY: &str = "default";

/// Kind of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    Put = 0,
    Tombstone = 1,
}

impl TryFrom<u8> for EntryKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(EntryKind::Put),
            1 => Ok(EntryKind::Tombstone),
            _ => Err(Error::Internal {
                message: format!("invalid entry kind: {}", value),
            }),
        }
    }
}

/// Immutable descriptor of one sorted run.
///
/// Created when the engine flushes or compacts data; never mutated
/// afterwards; the underlying file is deleted only once no reader or pin
/// references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SstFileMeta {
    pub file_id: FileId,
    pub path: PathBuf,
    pub size: u64,
    pub smallest_key: Vec<u8>,
    pub largest_key: Vec<u8>,
    pub smallest_sequence: SequenceNumber,
    pub largest_sequence: SequenceNumber,
    pub entry_count: u64,
    pub deletion_count: u64,
    /// Whole-file CRC32, if checksumming was enabled when the file was built.
    pub checksum: Option<u32>,
    pub level: u32,
    pub being_compacted: bool,
    pub creation_time: u64,
}

impl SstFileMeta {
    /// File name component of `path`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{:06}.sst", self.file_id))
    }

    /// Whether the key ranges of two files intersect (bytewise order).
    pub fn overlaps(&self, other: &SstFileMeta) -> bool {
        self.smallest_key <= other.largest_key && other.smallest_key <= self.largest_key
    }

    /// Whether the sequence ranges of two files intersect.
    pub fn sequence_overlaps(&self, other: &SstFileMeta) -> bool {
        self.smallest_sequence <= other.largest_sequence
            && other.smallest_sequence <= self.largest_sequence
    }
}

/// Point-in-time capture of the live file set, taken together with the
/// latest durably-flushed sequence number under one short critical section.
#[derive(Debug, Clone)]
pub struct LiveFileSet {
    pub sequence: SequenceNumber,
    pub files: Vec<SstFileMeta>,
}

impl LiveFileSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(smallest: &[u8], largest: &[u8], seq_lo: u64, seq_hi: u64) -> SstFileMeta {
        SstFileMeta {
            file_id: 1,
            path: PathBuf::from("/data/sstables/000001.sst"),
            size: 0,
            smallest_key: smallest.to_vec(),
            largest_key: largest.to_vec(),
            smallest_sequence: seq_lo,
            largest_sequence: seq_hi,
            entry_count: 0,
            deletion_count: 0,
            checksum: None,
            level: 0,
            being_compacted: false,
            creation_time: 0,
        }
    }

    #[test]
    fn test_key_overlap() {
        let a = meta(b"a", b"m", 1, 10);
        let b = meta(b"k", b"z", 11, 20);
        let c = meta(b"n", b"z", 11, 20);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_sequence_overlap() {
        let a = meta(b"a", b"m", 1, 10);
        let b = meta(b"a", b"m", 11, 20);
        let c = meta(b"a", b"m", 5, 15);
        assert!(!a.sequence_overlaps(&b));
        assert!(a.sequence_overlaps(&c));
        assert!(c.sequence_overlaps(&b));
    }

    #[test]
    fn test_file_name() {
        let m = meta(b"a", b"b", 1, 2);
        assert_eq!(m.file_name(), "000001.sst");
    }
}
