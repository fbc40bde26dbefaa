//! # Compaction
//!
//! Merges level-0 files (overlapping, flush-ordered) into level 1 (sorted,
//! non-overlapping). The merge keeps the highest-sequence version of every
//! key and drops tombstones, since level 1 is the bottom level and nothing
//! older can hide beneath it. Superseded inputs are never deleted here; they
//! are retired through the Pinning Service so in-flight checkpoints and
//! exports keep their files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use tracing::{debug, info};

use takumi_core::config::{CompactionConfig, SstableConfig};
use takumi_core::error::Result;
use takumi_core::types::{ColumnFamilyId, EntryKind, FileId, SequenceNumber, SstFileMeta};

use crate::manifest::sst_path;
use crate::sstable::{SstReader, SstWriter};

/// One unit of compaction work.
#[derive(Debug, Clone)]
pub struct CompactionJob {
    pub cf_id: ColumnFamilyId,
    pub inputs: Vec<SstFileMeta>,
    pub output_level: u32,
}

/// Result of an executed compaction.
#[derive(Debug)]
pub struct CompactionOutput {
    pub input_ids: Vec<FileId>,
    /// `None` when every entry was superseded by tombstones.
    pub output: Option<SstFileMeta>,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

pub struct Compactor {
    config: CompactionConfig,
    sstable_config: SstableConfig,
    data_dir: PathBuf,
}

impl Compactor {
    pub fn new(config: CompactionConfig, sstable_config: SstableConfig, data_dir: PathBuf) -> Self {
        Self {
            config,
            sstable_config,
            data_dir,
        }
    }

    /// Select work for one column family, if its level 0 is full enough.
    /// Inputs are all level-0 files plus every level-1 file their combined
    /// key range overlaps.
    pub fn pick(&self, cf_id: ColumnFamilyId, files: &[SstFileMeta]) -> Option<CompactionJob> {
        let level0: Vec<_> = files
            .iter()
            .filter(|f| f.level == 0 && !f.being_compacted)
            .cloned()
            .collect();

        if level0.len() < self.config.level0_file_threshold {
            return None;
        }

        let mut inputs = level0.clone();
        for l1 in files.iter().filter(|f| f.level == 1 && !f.being_compacted) {
            if level0.iter().any(|l0| l0.overlaps(l1)) {
                inputs.push(l1.clone());
            }
        }

        debug!(
            "Picked compaction for cf {}: {} level-0 files, {} inputs total",
            cf_id,
            level0.len(),
            inputs.len()
        );

        Some(CompactionJob {
            cf_id,
            inputs,
            output_level: 1,
        })
    }

    /// Merge the job's inputs into a single level-1 file with the given id.
    pub fn execute(&self, job: &CompactionJob, output_file_id: FileId) -> Result<CompactionOutput> {
        let mut merged: BTreeMap<Vec<u8>, (SequenceNumber, EntryKind, Bytes)> = BTreeMap::new();
        let mut bytes_read = 0u64;

        for input in &job.inputs {
            let reader = SstReader::open(&input.path)?;
            bytes_read += input.size;

            for entry in reader.iter() {
                let (key, sequence, kind, value) = entry?;
                match merged.get(key.as_ref()) {
                    Some((existing_seq, _, _)) if *existing_seq >= sequence => {}
                    _ => {
                        merged.insert(key.to_vec(), (sequence, kind, value));
                    }
                }
            }
        }

        // Bottom level: tombstones have nothing left to shadow.
        merged.retain(|_, (_, kind, _)| *kind == EntryKind::Put);

        let input_ids: Vec<FileId> = job.inputs.iter().map(|f| f.file_id).collect();

        if merged.is_empty() {
            info!(
                "Compaction of {} files produced no surviving entries",
                input_ids.len()
            );
            return Ok(CompactionOutput {
                input_ids,
                output: None,
                bytes_read,
                bytes_written: 0,
            });
        }

        let output_path = sst_path(&self.data_dir, output_file_id);
        let mut writer = SstWriter::new(
            &output_path,
            output_file_id,
            job.output_level,
            self.sstable_config.clone(),
        )?;

        for (key, (sequence, kind, value)) in &merged {
            writer.add(key, *sequence, *kind, value)?;
        }
        let output = writer.finish()?;
        let bytes_written = output.size;

        info!(
            "Compaction complete: {} inputs merged into {:06} ({} entries, {} bytes)",
            input_ids.len(),
            output_file_id,
            output.entry_count,
            bytes_written
        );

        Ok(CompactionOutput {
            input_ids,
            output: Some(output),
            bytes_read,
            bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_l0(
        dir: &std::path::Path,
        file_id: FileId,
        entries: &[(&[u8], u64, EntryKind, &[u8])],
    ) -> SstFileMeta {
        std::fs::create_dir_all(dir.join("sstables")).unwrap();
        let path = sst_path(dir, file_id);
        let mut writer = SstWriter::new(&path, file_id, 0, SstableConfig::default()).unwrap();
        for (key, seq, kind, value) in entries {
            writer.add(key, *seq, *kind, value).unwrap();
        }
        writer.finish().unwrap()
    }

    fn compactor(dir: &std::path::Path) -> Compactor {
        Compactor::new(
            CompactionConfig::default(),
            SstableConfig::default(),
            dir.to_path_buf(),
        )
    }

    #[test]
    fn test_pick_requires_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let c = compactor(dir.path());

        let few = vec![
            write_l0(dir.path(), 1, &[(b"a", 1, EntryKind::Put, b"1")]),
            write_l0(dir.path(), 2, &[(b"b", 2, EntryKind::Put, b"2")]),
        ];
        assert!(c.pick(1, &few).is_none());
    }

    #[test]
    fn test_merge_keeps_highest_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let c = compactor(dir.path());

        let old = write_l0(
            dir.path(),
            1,
            &[(b"key", 1, EntryKind::Put, b"old"), (b"only", 2, EntryKind::Put, b"x")],
        );
        let new = write_l0(dir.path(), 2, &[(b"key", 5, EntryKind::Put, b"new")]);

        let job = CompactionJob {
            cf_id: 1,
            inputs: vec![old, new],
            output_level: 1,
        };
        let result = c.execute(&job, 10).unwrap();
        let output = result.output.unwrap();
        assert_eq!(output.level, 1);
        assert_eq!(output.entry_count, 2);

        let reader = SstReader::open(&output.path).unwrap();
        let (seq, _, value) = reader.get(b"key").unwrap().unwrap();
        assert_eq!(seq, 5);
        assert_eq!(&value[..], b"new");
    }

    #[test]
    fn test_merge_drops_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let c = compactor(dir.path());

        let put = write_l0(dir.path(), 1, &[(b"key", 1, EntryKind::Put, b"v")]);
        let del = write_l0(dir.path(), 2, &[(b"key", 2, EntryKind::Tombstone, b"")]);

        let job = CompactionJob {
            cf_id: 1,
            inputs: vec![put, del],
            output_level: 1,
        };
        let result = c.execute(&job, 10).unwrap();
        assert!(result.output.is_none(), "fully-deleted input yields no output");
    }

    #[test]
    fn test_pick_pulls_overlapping_l1() {
        let dir = tempfile::tempdir().unwrap();
        let c = compactor(dir.path());

        let mut files = Vec::new();
        for i in 1..=4u64 {
            files.push(write_l0(
                dir.path(),
                i,
                &[(format!("k{}", i).as_bytes(), i, EntryKind::Put, b"v")],
            ));
        }
        // Level-1 file overlapping the k1..k4 range
        let mut l1 = write_l0(dir.path(), 5, &[(b"k2", 10, EntryKind::Put, b"l1")]);
        l1.level = 1;
        files.push(l1);

        let job = c.pick(1, &files).unwrap();
        assert_eq!(job.inputs.len(), 5);
    }
}
