//! # Error Handling
//!
//! Error types shared by every takumidb component.
//!
//! ## Design Principles
//!
//! 1. **Typed**: every failure mode a caller can react to has its own variant
//! 2. **Contextual**: errors carry the path/value that triggered them
//! 3. **Synchronous**: no operation partially succeeds; a failure after
//!    resources were acquired implies those resources were rolled back
//! 4. **Recoverable**: distinguish between fatal and recoverable errors

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for takumidb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for takumidb
#[derive(Error, Debug)]
pub enum Error {
    // Caller errors
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("illegal state: {message}")]
    IllegalState { message: String },

    #[error("already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("not found: {message}")]
    NotFound { message: String },

    // Transfer / validation errors
    #[error("I/O failure: {message}")]
    IOFailure { message: String, source: std::io::Error },

    #[error("checksum mismatch for {path}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { path: PathBuf, expected: u32, actual: u32 },

    #[error("incompatible schema: {message}")]
    IncompatibleSchema { message: String },

    #[error("overlapping key ranges: {message}")]
    OverlappingRanges { message: String },

    // Storage errors
    #[error("WAL error: {message}")]
    WriteAheadLog { message: String, source: Option<Box<dyn std::error::Error + Send + Sync>> },

    #[error("SSTable error: {message}")]
    SSTable { message: String, source: Option<Box<dyn std::error::Error + Send + Sync>> },

    #[error("MemTable error: {message}")]
    MemTable { message: String },

    #[error("manifest error: {message}")]
    Manifest { message: String },

    #[error("compaction failed: {reason}")]
    Compaction { reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::InvalidArgument { .. } => true,
            Error::AlreadyExists { .. } => true,
            Error::NotFound { .. } => true,
            Error::IOFailure { .. } => false,
            Error::ChecksumMismatch { .. } => false,
            Error::IncompatibleSchema { .. } => true,
            Error::OverlappingRanges { .. } => true,
            _ => true,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Error::IllegalState { .. } => "ILLEGAL_STATE",
            Error::AlreadyExists { .. } => "ALREADY_EXISTS",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::IOFailure { .. } => "IO_FAILURE",
            Error::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            Error::IncompatibleSchema { .. } => "INCOMPATIBLE_SCHEMA",
            Error::OverlappingRanges { .. } => "OVERLAPPING_RANGES",
            Error::WriteAheadLog { .. } => "WAL_ERROR",
            Error::SSTable { .. } => "SSTABLE_ERROR",
            Error::MemTable { .. } => "MEMTABLE_ERROR",
            Error::Manifest { .. } => "MANIFEST_ERROR",
            Error::Compaction { .. } => "COMPACTION_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IOFailure {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}
