//! # Core Traits
//!
//! Capability interfaces at the seams between takumidb components.
//!
//! ## Design Philosophy
//!
//! 1. **Async-First**: engine I/O operations are async
//! 2. **Error Propagation**: all operations return Result
//! 3. **Composition**: small capabilities composed via delegation, not
//!    inheritance-style wrapper hierarchies
//! 4. **Testability**: collaborators are mockable behind these traits

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::SequenceNumber;

/// An externally-visible handle that owns an underlying resource.
///
/// The ownership flag is invalidated atomically on release; every operation
/// on a released handle fails with `IllegalState` rather than touching freed
/// state.
pub trait Disposable {
    /// Release the handle. Idempotent.
    fn dispose(&self);

    /// Whether the handle has been released.
    fn is_disposed(&self) -> bool;
}

/// On-demand access to monitoring counters.
///
/// The statistics collector is an external collaborator; anything that needs
/// tickers takes a `StatsSource` so tests can substitute a mock.
pub trait StatsSource: Send + Sync {
    /// Value of a named ticker, or `None` if the source does not track it.
    fn ticker(&self, name: &str) -> Option<u64>;
}

/// Minimal key-value facade implemented by the database engine.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write a key-value pair; returns the stamped sequence number.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<SequenceNumber>;

    /// Read the latest visible value for a key.
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Delete a key; returns the stamped sequence number.
    async fn delete(&self, key: &[u8]) -> Result<SequenceNumber>;

    /// Flush pending writes to sorted files.
    async fn flush(&self) -> Result<()>;
}
