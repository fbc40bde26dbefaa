//! # takumidb Core
//!
//! Fundamental building blocks shared by every takumidb crate:
//! - Core identifiers and the SST file descriptor
//! - Error types
//! - Configuration
//! - Metrics
//! - Capability traits
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  takumi-core                    │
//! ├─────────────────────────────────────────────────┤
//! │  • types    - Sequence numbers, file metadata   │
//! │  • error    - Error handling                    │
//! │  • config   - Engine + checkpoint configuration │
//! │  • metrics  - Atomic counters                   │
//! │  • traits   - Capability interfaces             │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{
    CheckpointConfig, CompactionConfig, CompressionType, DbConfig, FlushPolicy, MemTableConfig,
    SstableConfig, WalConfig, OPTIONS_FILE,
};
pub use error::{Error, Result};
pub use metrics::{Metrics, MetricsSnapshot};
pub use traits::{Disposable, KeyValueStore, StatsSource};
pub use types::{
    ColumnFamilyId, EntryKind, FileId, LiveFileSet, SequenceNumber, SstFileMeta,
    DEFAULT_COLUMN_FAMILY,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
