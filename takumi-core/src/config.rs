//! # Configuration Management
//!
//! Configuration for all takumidb components, persisted alongside the data
//! directory as `OPTIONS.json` so checkpoints are self-sufficient.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the persisted configuration file.
pub const OPTIONS_FILE: &str = "OPTIONS.json";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub data_dir: PathBuf,
    pub wal: WalConfig,
    pub memtable: MemTableConfig,
    pub sstable: SstableConfig,
    pub compaction: CompactionConfig,
    pub checkpoint: CheckpointConfig,
    pub flush_interval: Duration,
    pub compaction_interval: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal: WalConfig::default(),
            memtable: MemTableConfig::default(),
            sstable: SstableConfig::default(),
            compaction: CompactionConfig::default(),
            checkpoint: CheckpointConfig::default(),
            flush_interval: Duration::from_secs(60),
            compaction_interval: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Shorthand for a config rooted at `data_dir` with defaults elsewhere.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Persist as `OPTIONS.json` under `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self).map_err(|e| Error::Internal {
            message: format!("failed to encode options: {}", e),
        })?;
        std::fs::write(dir.join(OPTIONS_FILE), body)?;
        Ok(())
    }

    /// Load `OPTIONS.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let body = std::fs::read(dir.join(OPTIONS_FILE))?;
        serde_json::from_slice(&body).map_err(|e| Error::Internal {
            message: format!("failed to decode options: {}", e),
        })
    }
}

/// Write-ahead log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalConfig {
    /// fsync after every appended record.
    pub sync_on_write: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self { sync_on_write: true }
    }
}

/// MemTable configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemTableConfig {
    /// Maximum size before flush (bytes)
    pub max_size: usize,
}

impl Default for MemTableConfig {
    fn default() -> Self {
        Self {
            max_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// Compression type for SSTable blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Lz4 = 1,
    Zstd = 2,
    Snappy = 3,
}

impl TryFrom<u8> for CompressionType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            2 => Ok(CompressionType::Zstd),
            3 => Ok(CompressionType::Snappy),
            _ => Err(Error::SSTable {
                message: format!("invalid compression type: {}", value),
                source: None,
            }),
        }
    }
}

/// SSTable configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SstableConfig {
    pub block_size: usize,
    pub compression: CompressionType,
}

impl Default for SstableConfig {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024, // 4KB
            compression: CompressionType::Zstd,
        }
    }
}

/// Compaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Number of level-0 files that triggers a merge into level 1.
    pub level0_file_threshold: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            level0_file_threshold: 4,
        }
    }
}

/// Whether checkpoint/export captures force a memtable flush first.
///
/// Checkpoints ship a fresh, empty write-ahead log, so any unflushed data
/// would be absent from the copy. `Auto` flushes only when such data exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushPolicy {
    Auto,
    Always,
    Never,
}

/// Checkpoint and export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub flush: FlushPolicy,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            flush: FlushPolicy::Auto,
        }
    }
}
