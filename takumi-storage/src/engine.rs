//! Database Engine
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Database Engine                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Write Path:                                                │
//! │  ┌─────────┐    ┌─────────┐    ┌──────────┐                 │
//! │  │  Write  │───>│   WAL   │───>│ MemTable │                 │
//! │  └─────────┘    └─────────┘    └────┬─────┘                 │
//! │                                     │ Flush                 │
//! │                                     ▼                       │
//! │                                ┌──────────┐   Compaction    │
//! │                                │ L0 SSTs  │───────> L1      │
//! │                                └──────────┘                 │
//! │                                                             │
//! │  Checkpoint / Export Path:                                  │
//! │  ┌─────────┐   ┌─────────┐   ┌────────┐   ┌──────────┐      │
//! │  │ Capture │──>│   Pin   │──>│  Link  │──>│ Manifest │      │
//! │  └─────────┘   └─────────┘   └────────┘   └──────────┘      │
//! │                                                             │
//! │  Recovery Path:                                             │
//! │  ┌──────────┐    ┌─────────────┐    ┌──────────┐            │
//! │  │ Manifest │───>│ WAL Replay  │───>│ MemTable │            │
//! │  │ file set │    │ from seq N  │    │ rebuilt  │            │
//! │  └──────────┘    └─────────────┘    └──────────┘            │
//! └─────────────────────────────────────────────────────────────┘

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use takumi_core::config::{DbConfig, SstableConfig};
use takumi_core::error::{Error, Result};
use takumi_core::metrics::Metrics;
use takumi_core::traits::{Disposable, KeyValueStore};
use takumi_core::types::{
    ColumnFamilyId, EntryKind, LiveFileSet, SequenceNumber, DEFAULT_COLUMN_FAMILY,
};

use crate::checkpoint;
use crate::column_family::{ColumnFamilyData, ColumnFamilyHandle, ColumnFamilyOptions};
use crate::compaction::Compactor;
use crate::export::{self, ExportMetadata};
use crate::import;
use crate::linker::FileLinker;
use crate::manifest::{sst_path, Manifest};
use crate::pin::PinRegistry;
use crate::sstable::{SstReader, SstWriter};
use crate::wal::{WalRecord, WriteAheadLog};

type ColumnFamilyMap = HashMap<ColumnFamilyId, Arc<ColumnFamilyData>>;

pub struct Database {
    pub(crate) config: DbConfig,
    pub(crate) wal: Arc<WriteAheadLog>,
    pub(crate) manifest: Arc<Mutex<Manifest>>,
    pub(crate) cfs: Arc<RwLock<ColumnFamilyMap>>,
    pub(crate) sequence: Arc<AtomicU64>,
    pub(crate) pins: Arc<PinRegistry>,
    pub(crate) linker: Arc<FileLinker>,
    pub(crate) metrics: Arc<Metrics>,
    compactor: Arc<Compactor>,
    default_cf_id: ColumnFamilyId,
    pub(crate) open_flag: Arc<AtomicBool>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl Database {
    /// Open (or create) a database described by `config`.
    pub async fn open(config: DbConfig) -> Result<Self> {
        let data_dir = config.data_dir.clone();
        tokio::fs::create_dir_all(&data_dir).await?;
        tokio::fs::create_dir_all(data_dir.join("sstables")).await?;

        // Persist the configuration so the directory is self-sufficient.
        if !data_dir.join(takumi_core::config::OPTIONS_FILE).exists() {
            config.save(&data_dir)?;
        }

        let mut manifest = Manifest::load_or_create(&data_dir)?;
        if manifest.cf_by_name(DEFAULT_COLUMN_FAMILY).is_none() {
            manifest.add_column_family(DEFAULT_COLUMN_FAMILY, ColumnFamilyOptions::default());
            manifest.save(&data_dir)?;
        }

        // Recorded paths may be stale if the directory was moved (e.g. a
        // relocated checkpoint); fall back to the conventional location.
        for cf in &mut manifest.column_families {
            for file in &mut cf.files {
                if !file.path.exists() {
                    let candidate = sst_path(&data_dir, file.file_id);
                    if candidate.exists() {
                        file.path = candidate;
                    }
                }
            }
        }

        info!(
            "Opening database at {:?}: last_sequence={}, column_families={}",
            data_dir,
            manifest.last_sequence,
            manifest.column_families.len()
        );

        let metrics = Arc::new(Metrics::new());
        let sequence = Arc::new(AtomicU64::new(manifest.last_sequence));

        let mut cf_map = ColumnFamilyMap::new();
        let mut default_cf_id = None;
        for cf_meta in &manifest.column_families {
            if cf_meta.name == DEFAULT_COLUMN_FAMILY {
                default_cf_id = Some(cf_meta.id);
            }
            cf_map.insert(
                cf_meta.id,
                Arc::new(ColumnFamilyData::new(
                    cf_meta.id,
                    cf_meta.name.clone(),
                    cf_meta.options.clone(),
                    cf_meta.files.clone(),
                    config.memtable.clone(),
                )),
            );
        }
        let default_cf_id = default_cf_id.ok_or_else(|| Error::Internal {
            message: "default column family missing after open".to_string(),
        })?;

        let wal = Arc::new(WriteAheadLog::open(&data_dir.join("wal"), config.wal.clone())?);

        // CRASH RECOVERY: replay WAL records not yet flushed to sorted files.
        let replayed = Self::replay_wal(&wal, &cf_map, &sequence, manifest.wal_checkpoint)?;
        if replayed > 0 {
            info!(
                "Crash recovery: replayed {} WAL records from sequence {}",
                replayed, manifest.wal_checkpoint
            );
        }

        let compactor = Arc::new(Compactor::new(
            config.compaction.clone(),
            config.sstable.clone(),
            data_dir.clone(),
        ));

        let (shutdown_tx, _) = tokio::sync::watch::channel(false);

        let db = Self {
            wal,
            manifest: Arc::new(Mutex::new(manifest)),
            cfs: Arc::new(RwLock::new(cf_map)),
            sequence,
            pins: Arc::new(PinRegistry::new(Arc::clone(&metrics))),
            linker: Arc::new(FileLinker::new(Arc::clone(&metrics))),
            metrics,
            compactor,
            default_cf_id,
            open_flag: Arc::new(AtomicBool::new(true)),
            shutdown: shutdown_tx,
            config,
        };

        db.start_background_tasks();

        Ok(db)
    }

    /// Open a database directory by path, honoring its persisted
    /// `OPTIONS.json` when present. This is how checkpoint directories are
    /// opened as independent databases.
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.join(takumi_core::config::OPTIONS_FILE).exists() {
            DbConfig::load(path)?
        } else {
            DbConfig::default()
        };
        // The directory may have been moved since the options were written.
        config.data_dir = path.to_path_buf();
        Self::open(config).await
    }

    fn replay_wal(
        wal: &WriteAheadLog,
        cfs: &ColumnFamilyMap,
        sequence: &AtomicU64,
        checkpoint: SequenceNumber,
    ) -> Result<usize> {
        let records = wal.read_from(checkpoint)?;

        let mut replayed = 0;
        for record in records {
            let Some(cf) = cfs.get(&record.cf_id) else {
                warn!(
                    "Skipping WAL record for unknown column family {}",
                    record.cf_id
                );
                continue;
            };

            let value = match record.kind {
                EntryKind::Put => Some(record.value.clone()),
                EntryKind::Tombstone => None,
            };
            cf.active.read().apply(&record.key, record.sequence, value)?;
            sequence.fetch_max(record.sequence, Ordering::SeqCst);
            replayed += 1;
        }

        Ok(replayed)
    }

    /// Start background flush and compaction tasks
    fn start_background_tasks(&self) {
        // Flush task
        let cfs = Arc::clone(&self.cfs);
        let manifest = Arc::clone(&self.manifest);
        let sequence = Arc::clone(&self.sequence);
        let metrics = Arc::clone(&self.metrics);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut flush_interval = interval(config.flush_interval);
            flush_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = flush_interval.tick() => {
                        if let Err(e) = Self::flush_all(
                            &cfs,
                            &manifest,
                            &sequence,
                            &config.sstable,
                            &config.data_dir,
                            &metrics,
                        ) {
                            error!("Flush error: {:?}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Shutting down flush task");
                        break;
                    }
                }
            }
        });

        // Compaction task
        let cfs = Arc::clone(&self.cfs);
        let manifest = Arc::clone(&self.manifest);
        let compactor = Arc::clone(&self.compactor);
        let pins = Arc::clone(&self.pins);
        let metrics = Arc::clone(&self.metrics);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut compaction_interval = interval(config.compaction_interval);
            compaction_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = compaction_interval.tick() => {
                        if let Err(e) = Self::compaction_pass(
                            &cfs,
                            &manifest,
                            &compactor,
                            &pins,
                            &config.data_dir,
                            &metrics,
                        ) {
                            error!("Compaction error: {:?}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Shutting down compaction task");
                        break;
                    }
                }
            }
        });
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if !self.open_flag.load(Ordering::Acquire) {
            return Err(Error::IllegalState {
                message: "database is closed".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve a handle to live column-family state.
    ///
    /// A handle whose family was dropped fails `NotFound`; a handle the
    /// caller released fails `IllegalState`.
    pub(crate) fn resolve_cf(&self, handle: &ColumnFamilyHandle) -> Result<Arc<ColumnFamilyData>> {
        let cf = self.cfs.read().get(&handle.id).cloned();
        match cf {
            None => Err(Error::NotFound {
                message: format!("column family '{}' has been dropped", handle.name),
            }),
            Some(_) if handle.is_disposed() => Err(Error::IllegalState {
                message: format!("handle to column family '{}' has been released", handle.name),
            }),
            Some(cf) => Ok(cf),
        }
    }

    /// Handle to the always-present default column family.
    pub fn default_column_family(&self) -> ColumnFamilyHandle {
        let cfs = self.cfs.read();
        // Invariant established in open(): the default family always exists.
        cfs[&self.default_cf_id].handle()
    }

    /// Handle to a named column family, if it exists.
    pub fn column_family(&self, name: &str) -> Option<ColumnFamilyHandle> {
        self.cfs
            .read()
            .values()
            .find(|cf| cf.name == name)
            .map(|cf| cf.handle())
    }

    /// Names of all column families.
    pub fn column_family_names(&self) -> Vec<String> {
        self.cfs.read().values().map(|cf| cf.name.clone()).collect()
    }

    pub async fn create_column_family(
        &self,
        name: &str,
        options: ColumnFamilyOptions,
    ) -> Result<ColumnFamilyHandle> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(Error::InvalidArgument {
                message: "column family name must not be empty".to_string(),
            });
        }
        options.validate()?;
        if self.column_family(name).is_some() {
            return Err(Error::InvalidArgument {
                message: format!("column family '{}' already exists", name),
            });
        }

        let cf = {
            let mut manifest = self.manifest.lock();
            let id = manifest.add_column_family(name, options.clone());
            manifest.save(&self.config.data_dir)?;
            Arc::new(ColumnFamilyData::new(
                id,
                name.to_string(),
                options,
                Vec::new(),
                self.config.memtable.clone(),
            ))
        };

        let handle = cf.handle();
        self.cfs.write().insert(cf.id, cf);
        info!("Created column family '{}'", name);
        Ok(handle)
    }

    /// Drop a column family. Its handles become stale and its files are
    /// retired through the pinning service, so in-flight checkpoints and
    /// exports that pinned them keep working.
    pub async fn drop_column_family(&self, handle: &ColumnFamilyHandle) -> Result<()> {
        self.ensure_open()?;
        if handle.name == DEFAULT_COLUMN_FAMILY {
            return Err(Error::InvalidArgument {
                message: "the default column family cannot be dropped".to_string(),
            });
        }
        let cf = self.resolve_cf(handle)?;

        let removed = {
            let mut manifest = self.manifest.lock();
            let removed = manifest.remove_column_family(cf.id);
            manifest.save(&self.config.data_dir)?;
            removed
        };

        self.cfs.write().remove(&cf.id);
        cf.invalidate();

        if let Some(meta) = removed {
            for file in meta.files {
                self.pins.retire(file.file_id, file.path);
            }
        }

        info!("Dropped column family '{}'", handle.name);
        Ok(())
    }

    pub async fn put_cf(
        &self,
        handle: &ColumnFamilyHandle,
        key: &[u8],
        value: &[u8],
    ) -> Result<SequenceNumber> {
        let sequence = self.write_cf(handle, key, EntryKind::Put, value).await?;
        self.metrics.record_put();
        Ok(sequence)
    }

    pub async fn delete_cf(
        &self,
        handle: &ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<SequenceNumber> {
        let sequence = self.write_cf(handle, key, EntryKind::Tombstone, &[]).await?;
        self.metrics.record_delete();
        Ok(sequence)
    }

    async fn write_cf(
        &self,
        handle: &ColumnFamilyHandle,
        key: &[u8],
        kind: EntryKind,
        value: &[u8],
    ) -> Result<SequenceNumber> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(Error::InvalidArgument {
                message: "key must not be empty".to_string(),
            });
        }
        let cf = self.resolve_cf(handle)?;

        let sequence = {
            // The read guard keeps rotation out between stamping the
            // sequence and applying to this table, so a flush never strands
            // a stamped write in the wrong memtable.
            let active = cf.active.read();
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

            let record = WalRecord {
                sequence,
                cf_id: cf.id,
                kind,
                key: Bytes::copy_from_slice(key),
                value: Bytes::copy_from_slice(value),
            };
            let bytes = self.wal.append(&record)?;
            self.metrics.record_wal_write(bytes);

            let memtable_value = match kind {
                EntryKind::Put => Some(Bytes::copy_from_slice(value)),
                EntryKind::Tombstone => None,
            };
            active.apply(key, sequence, memtable_value)?;
            sequence
        };

        if cf.active.read().should_flush() {
            cf.rotate();
        }

        Ok(sequence)
    }

    pub async fn get_cf(
        &self,
        handle: &ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        let cf = self.resolve_cf(handle)?;

        // Hot data first
        if let Some(entry) = cf.active.read().get(key) {
            return Ok(entry.value);
        }
        for table in cf.immutable.read().iter().rev() {
            if let Some(entry) = table.get(key) {
                return Ok(entry.value);
            }
        }

        // Level 0, newest first; ranges may overlap so order matters.
        let files = cf.files.read().clone();
        let mut level0: Vec<_> = files.iter().filter(|f| f.level == 0).collect();
        level0.sort_by(|a, b| b.largest_sequence.cmp(&a.largest_sequence));

        for file in level0 {
            let reader = SstReader::open(&file.path)?;
            if let Some((_, kind, value)) = reader.get(key)? {
                return Ok(match kind {
                    EntryKind::Put => Some(value),
                    EntryKind::Tombstone => None,
                });
            }
        }

        // Deeper levels have non-overlapping ranges; at most one candidate.
        for file in files.iter().filter(|f| f.level >= 1) {
            if key >= file.smallest_key.as_slice() && key <= file.largest_key.as_slice() {
                let reader = SstReader::open(&file.path)?;
                if let Some((_, kind, value)) = reader.get(key)? {
                    return Ok(match kind {
                        EntryKind::Put => Some(value),
                        EntryKind::Tombstone => None,
                    });
                }
            }
        }

        Ok(None)
    }

    /// Flush every column family's memtables to level-0 files and advance
    /// the WAL checkpoint.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        Self::flush_all(
            &self.cfs,
            &self.manifest,
            &self.sequence,
            &self.config.sstable,
            &self.config.data_dir,
            &self.metrics,
        )
    }

    /// Flush a single column family. Does not advance the WAL checkpoint;
    /// other families may still hold unflushed records.
    pub(crate) fn flush_cf(&self, cf: &Arc<ColumnFamilyData>) -> Result<()> {
        cf.rotate();
        while let Some(table) = cf.next_flushable() {
            Self::flush_table(
                cf,
                &table,
                &self.manifest,
                &self.config.sstable,
                &self.config.data_dir,
                &self.metrics,
            )?;
            cf.flushed(&table);
        }
        Ok(())
    }

    fn flush_all(
        cfs: &RwLock<ColumnFamilyMap>,
        manifest: &Mutex<Manifest>,
        sequence: &AtomicU64,
        sstable_config: &SstableConfig,
        data_dir: &Path,
        metrics: &Metrics,
    ) -> Result<()> {
        // Everything stamped at or below this point is headed for a sealed
        // table; once those are flushed the WAL may skip to here.
        let checkpoint_seq = sequence.load(Ordering::SeqCst);

        let cf_list: Vec<Arc<ColumnFamilyData>> = cfs.read().values().cloned().collect();
        for cf in &cf_list {
            cf.rotate();
        }
        for cf in &cf_list {
            while let Some(table) = cf.next_flushable() {
                Self::flush_table(cf, &table, manifest, sstable_config, data_dir, metrics)?;
                cf.flushed(&table);
            }
        }

        {
            let mut m = manifest.lock();
            if m.wal_checkpoint < checkpoint_seq {
                m.wal_checkpoint = checkpoint_seq;
                m.save(data_dir)?;
            }
        }

        Ok(())
    }

    fn flush_table(
        cf: &Arc<ColumnFamilyData>,
        table: &Arc<crate::memtable::MemTable>,
        manifest: &Mutex<Manifest>,
        sstable_config: &SstableConfig,
        data_dir: &Path,
        metrics: &Metrics,
    ) -> Result<()> {
        let entries = table.entries();
        if entries.is_empty() {
            return Ok(());
        }

        let file_id = manifest.lock().allocate_file_id();
        let path = sst_path(data_dir, file_id);
        let mut writer = SstWriter::new(&path, file_id, 0, sstable_config.clone())?;

        let mut max_sequence = 0;
        for (key, entry) in &entries {
            let value = entry.value.clone().unwrap_or_default();
            writer.add(key, entry.sequence, entry.kind(), &value)?;
            max_sequence = max_sequence.max(entry.sequence);
        }
        let meta = writer.finish()?;

        info!(
            "Flushed memtable of '{}' to {:06}: {} entries, sequences up to {}",
            cf.name, file_id, meta.entry_count, max_sequence
        );

        {
            let mut m = manifest.lock();
            m.add_file(cf.id, meta.clone())?;
            if m.last_sequence < max_sequence {
                m.last_sequence = max_sequence;
            }
            m.save(data_dir)?;
        }

        cf.files.write().push(meta);
        metrics.record_flush();

        Ok(())
    }

    fn compaction_pass(
        cfs: &RwLock<ColumnFamilyMap>,
        manifest: &Mutex<Manifest>,
        compactor: &Compactor,
        pins: &PinRegistry,
        data_dir: &Path,
        metrics: &Metrics,
    ) -> Result<()> {
        let cf_list: Vec<Arc<ColumnFamilyData>> = cfs.read().values().cloned().collect();

        for cf in cf_list {
            let files = cf.files.read().clone();
            let Some(job) = compactor.pick(cf.id, &files) else {
                continue;
            };

            let input_ids: Vec<_> = job.inputs.iter().map(|f| f.file_id).collect();
            {
                let mut mirror = cf.files.write();
                for file in mirror.iter_mut() {
                    if input_ids.contains(&file.file_id) {
                        file.being_compacted = true;
                    }
                }
            }

            let output_id = manifest.lock().allocate_file_id();
            let result = match compactor.execute(&job, output_id) {
                Ok(result) => result,
                Err(e) => {
                    let mut mirror = cf.files.write();
                    for file in mirror.iter_mut() {
                        if input_ids.contains(&file.file_id) {
                            file.being_compacted = false;
                        }
                    }
                    return Err(e);
                }
            };

            {
                let mut m = manifest.lock();
                m.remove_files(cf.id, &result.input_ids)?;
                if let Some(ref output) = result.output {
                    m.add_file(cf.id, output.clone())?;
                }
                m.save(data_dir)?;
            }

            {
                let mut mirror = cf.files.write();
                mirror.retain(|f| !result.input_ids.contains(&f.file_id));
                if let Some(ref output) = result.output {
                    mirror.push(output.clone());
                }
            }

            // Superseded inputs go through the pinning service, never
            // straight to the filesystem.
            for input in &job.inputs {
                pins.retire(input.file_id, input.path.clone());
            }

            metrics.record_compaction();
        }

        Ok(())
    }

    /// Run one compaction pass now.
    pub async fn compact(&self) -> Result<()> {
        self.ensure_open()?;
        Self::compaction_pass(
            &self.cfs,
            &self.manifest,
            &self.compactor,
            &self.pins,
            &self.config.data_dir,
            &self.metrics,
        )
    }

    /// Consistent snapshot of all live files and the latest durably-flushed
    /// sequence number, under one short critical section.
    pub fn capture_live_files(&self) -> LiveFileSet {
        let manifest = self.manifest.lock();
        LiveFileSet {
            sequence: manifest.last_sequence,
            files: manifest.live_files(),
        }
    }

    /// Capture the whole manifest and pin its live files in one critical
    /// section, so a concurrent compaction cannot retire a captured file
    /// before the pins exist.
    pub(crate) fn capture_and_pin(&self) -> Result<(Manifest, crate::pin::PinSet)> {
        let manifest = self.manifest.lock();
        let snapshot = manifest.clone();
        let pins = self.pins.pin(&snapshot.live_files())?;
        Ok((snapshot, pins))
    }

    /// Like [`Self::capture_and_pin`], restricted to one column family.
    pub(crate) fn capture_and_pin_cf(
        &self,
        cf_id: ColumnFamilyId,
    ) -> Result<(LiveFileSet, crate::pin::PinSet)> {
        let manifest = self.manifest.lock();
        let cf = manifest.cf(cf_id).ok_or_else(|| Error::NotFound {
            message: format!("column family id {} not in manifest", cf_id),
        })?;
        let capture = LiveFileSet {
            sequence: manifest.last_sequence,
            files: cf.files.clone(),
        };
        let pins = self.pins.pin(&capture.files)?;
        Ok((capture, pins))
    }

    /// Latest sequence number stamped on any write.
    pub fn latest_sequence(&self) -> SequenceNumber {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Build a crash-consistent, independently-openable copy of this
    /// database at `path`. The path must not exist yet.
    pub async fn create_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        checkpoint::create_checkpoint(self, path.as_ref()).await
    }

    /// Copy one column family's live files to `path` and describe them with
    /// the returned metadata, ready for ingestion elsewhere.
    pub async fn export_column_family(
        &self,
        handle: &ColumnFamilyHandle,
        path: impl AsRef<Path>,
    ) -> Result<ExportMetadata> {
        export::export_column_family(self, handle, path.as_ref()).await
    }

    /// Register an exported file set as a new column family named `name`,
    /// without rewriting any data.
    pub async fn import_column_family(
        &self,
        name: &str,
        metadata: &ExportMetadata,
        source_dir: impl AsRef<Path>,
    ) -> Result<ColumnFamilyHandle> {
        import::import_column_family(self, name, metadata, source_dir.as_ref()).await
    }

    /// Flush, sync the WAL, and stop background work. Further operations
    /// fail with `IllegalState`.
    pub async fn close(&self) -> Result<()> {
        if !self.open_flag.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        Self::flush_all(
            &self.cfs,
            &self.manifest,
            &self.sequence,
            &self.config.sstable,
            &self.config.data_dir,
            &self.metrics,
        )?;
        self.wal.sync()?;
        let _ = self.shutdown.send(true);

        info!("Closed database at {:?}", self.config.data_dir);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<SequenceNumber> {
        let handle = self.default_column_family();
        self.put_cf(&handle, key, value).await
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let handle = self.default_column_family();
        self.get_cf(&handle, key).await
    }

    async fn delete(&self, key: &[u8]) -> Result<SequenceNumber> {
        let handle = self.default_column_family();
        self.delete_cf(&handle, key).await
    }

    async fn flush(&self) -> Result<()> {
        Database::flush(self).await
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
