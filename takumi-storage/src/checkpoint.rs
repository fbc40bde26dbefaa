//! # Checkpoint Coordinator
//!
//! Produces a crash-consistent, point-in-time, independently-openable copy
//! of a live database: hard-linked (or copied) sorted files, a consolidated
//! manifest, a copy of the configuration file, and a fresh write-ahead log.
//! The source database keeps serving reads and writes throughout; writes
//! committed after the capture step are excluded by the append-only
//! visibility of sequence numbers, not by blocking them.
//!
//! The operation walks a small state machine:
//!
//! ```text
//! Requested → Pinning → Linking → ManifestWritten → Complete
//!      └─────────┴─────────┴──────────┴──→ RolledBack (on failure)
//! ```
//!
//! Rolling back releases every pin and removes all destination artifacts, so
//! a failed checkpoint leaves the destination absent.

use std::path::Path;

use tracing::{debug, info, warn};

use takumi_core::config::FlushPolicy;
use takumi_core::error::{Error, Result};

use crate::engine::Database;
use crate::manifest::Manifest;

/// Progress of one checkpoint operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Requested,
    Pinning,
    Linking,
    ManifestWritten,
    Complete,
    RolledBack,
}

struct CheckpointJob<'a> {
    db: &'a Database,
    dest: &'a Path,
    state: CheckpointState,
}

impl<'a> CheckpointJob<'a> {
    fn new(db: &'a Database, dest: &'a Path) -> Self {
        Self {
            db,
            dest,
            state: CheckpointState::Requested,
        }
    }

    fn advance(&mut self, next: CheckpointState) {
        debug!("Checkpoint {:?}: {:?} -> {:?}", self.dest, self.state, next);
        self.state = next;
    }

    fn run(&mut self) -> Result<()> {
        // Files + sequence are captured and pinned in one critical section;
        // compaction cannot retire anything captured before we hold pins.
        self.advance(CheckpointState::Pinning);
        let (snapshot, pins) = self.db.capture_and_pin()?;
        let files = snapshot.live_files();

        self.advance(CheckpointState::Linking);
        self.db.linker.materialize(&files, &self.dest.join("sstables"))?;

        self.write_manifest(&snapshot)?;
        self.advance(CheckpointState::ManifestWritten);

        // Self-sufficient configuration copy, rooted at the new directory.
        let mut config = self.db.config.clone();
        config.data_dir = self.dest.to_path_buf();
        config.save(self.dest)?;

        // Fresh, empty write-ahead log.
        std::fs::create_dir(self.dest.join("wal"))?;
        std::fs::File::open(self.dest)?.sync_all()?;

        pins.release();
        self.advance(CheckpointState::Complete);
        Ok(())
    }

    /// Consolidated manifest describing exactly the linked file set at the
    /// captured sequence number. Opening it never replays source history.
    fn write_manifest(&self, snapshot: &Manifest) -> Result<()> {
        let sstables_dir = self.dest.join("sstables");

        let mut manifest = snapshot.clone();
        manifest.wal_checkpoint = manifest.last_sequence;
        for cf in &mut manifest.column_families {
            for file in &mut cf.files {
                file.path = sstables_dir.join(file.file_name());
                file.being_compacted = false;
            }
        }

        manifest.save(self.dest)
    }

    fn rollback(&mut self) {
        self.advance(CheckpointState::RolledBack);
        if self.dest.exists() {
            if let Err(e) = std::fs::remove_dir_all(self.dest) {
                warn!("Failed to remove partial checkpoint {:?}: {}", self.dest, e);
            }
        }
    }
}

pub(crate) async fn create_checkpoint(db: &Database, dest: &Path) -> Result<()> {
    db.ensure_open()?;

    if dest.as_os_str().is_empty() {
        return Err(Error::InvalidArgument {
            message: "checkpoint path must not be empty".to_string(),
        });
    }
    if dest.starts_with(&db.config.data_dir) {
        return Err(Error::InvalidArgument {
            message: format!(
                "checkpoint path {:?} must lie outside the database directory",
                dest
            ),
        });
    }
    // Fail before anything is pinned or linked.
    if dest.exists() {
        return Err(Error::AlreadyExists {
            path: dest.to_path_buf(),
        });
    }

    match db.config.checkpoint.flush {
        FlushPolicy::Always => db.flush().await?,
        FlushPolicy::Auto => {
            // A checkpoint ships an empty WAL; flush when memtable data
            // would otherwise be missing from the copy.
            let has_unflushed = db
                .cfs
                .read()
                .values()
                .any(|cf| cf.has_unflushed_data());
            if has_unflushed {
                db.flush().await?;
            }
        }
        FlushPolicy::Never => {}
    }

    let mut job = CheckpointJob::new(db, dest);
    match job.run() {
        Ok(()) => {
            db.metrics.record_checkpoint();
            info!(
                "Checkpoint complete at {:?} (sequence {})",
                dest,
                db.capture_live_files().sequence
            );
            Ok(())
        }
        Err(e) => {
            job.rollback();
            Err(e)
        }
    }
}
