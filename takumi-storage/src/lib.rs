//! # takumidb Storage Engine
//!
//! LSM-tree storage engine built around crash-consistent checkpoints and
//! portable column-family export/import.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Path                             │
//! │                                                             │
//! │  Incoming Write ──> WAL ──> MemTable ──> L0 SSTable ──> L1  │
//! │                                             (flush)  (merge)│
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Checkpoint / Export / Import                 │
//! │                                                             │
//! │  Live files ──> Pin ──> Link/Copy ──> Manifest / Metadata   │
//! │       │                                      │              │
//! │       └── compaction defers deletions ───────┘              │
//! │                                                             │
//! │  ExportMetadata ──> validate ──> Link ──> new column family │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Checkpoints and exports never block foreground reads or writes: the live
//! file set and sequence number are captured in one short critical section,
//! the files are pinned against background deletion, and everything after
//! that is filesystem work against immutable inputs.

pub mod checkpoint;
pub mod column_family;
pub mod compaction;
pub mod engine;
pub mod export;
pub mod import;
pub mod linker;
pub mod manifest;
pub mod memtable;
pub mod pin;
pub mod sstable;
pub mod wal;

pub use checkpoint::CheckpointState;
pub use column_family::{
    comparator, ColumnFamilyHandle, ColumnFamilyOptions, BYTEWISE_COMPARATOR,
};
pub use compaction::{CompactionJob, CompactionOutput, Compactor};
pub use engine::Database;
pub use export::{ExportMetadata, EXPORT_METADATA_FILE};
pub use linker::FileLinker;
pub use manifest::{Manifest, MANIFEST_FILE};
pub use memtable::MemTable;
pub use pin::{PinRegistry, PinSet};
pub use sstable::{verify_file_checksum, SstReader, SstWriter};
pub use wal::{WalRecord, WriteAheadLog};
