//! # SSTable - Sorted String Table
//!
//! SSTables are immutable, sorted files holding one run of key-value
//! entries. Once written they are never modified; compaction supersedes them
//! and checkpoints hard-link them.
//!
//! ## SSTable File Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SSTable File Structure                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Data Blocks (default 4KB each)                             │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ Entry: [key_len][key][sequence][kind][val_len][value] │  │
//! │  │ ...                                                   │  │
//! │  │ Block Footer: [compression][crc32]                    │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │                                                             │
//! │  Index Block (one entry per data block)                     │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ [last_key_len][last_key][offset][size]                │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │                                                             │
//! │  Stats Block (rmp-encoded FileProperties)                   │
//! │                                                             │
//! │  Footer                                                     │
//! │  [index_offset][index_size][stats_offset][stats_size]       │
//! │  [magic][version][file_crc32]                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The trailing CRC32 covers every preceding byte of the file and doubles as
//! the file's content checksum recorded in `SstFileMeta`; import re-validates
//! it before registering a file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

use takumi_core::config::{CompressionType, SstableConfig};
use takumi_core::error::{Error, Result};
use takumi_core::types::{EntryKind, FileId, SequenceNumber, SstFileMeta};

const SSTABLE_MAGIC: &[u8; 8] = b"TAKUMISS";
const SSTABLE_VERSION: u32 = 1;
// index_offset(8) + index_size(4) + stats_offset(8) + stats_size(4)
// + magic(8) + version(4)
const FOOTER_SIZE: usize = 36;
// footer + trailing file crc32
const TRAILER_SIZE: usize = FOOTER_SIZE + 4;
const BLOCK_FOOTER_SIZE: usize = 5;

/// Aggregate statistics stored in the stats block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProperties {
    pub entry_count: u64,
    pub deletion_count: u64,
    pub smallest_key: Vec<u8>,
    pub largest_key: Vec<u8>,
    pub smallest_sequence: SequenceNumber,
    pub largest_sequence: SequenceNumber,
    pub creation_time: u64,
}

/// SSTable writer
///
/// Entries must be added in strictly ascending key order.
pub struct SstWriter {
    path: PathBuf,
    file_id: FileId,
    level: u32,
    writer: BufWriter<File>,
    config: SstableConfig,
    current_block: BlockBuilder,
    index_builder: IndexBuilder,
    file_crc: crc32fast::Hasher,
    entry_count: u64,
    deletion_count: u64,
    file_offset: u64,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    min_sequence: SequenceNumber,
    max_sequence: SequenceNumber,
    last_key: Option<Vec<u8>>,
}

impl SstWriter {
    pub fn new(
        path: impl AsRef<Path>,
        file_id: FileId,
        level: u32,
        config: SstableConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            path,
            file_id,
            level,
            writer: BufWriter::new(file),
            current_block: BlockBuilder::new(config.block_size),
            config,
            index_builder: IndexBuilder::new(),
            file_crc: crc32fast::Hasher::new(),
            entry_count: 0,
            deletion_count: 0,
            file_offset: 0,
            min_key: None,
            max_key: None,
            min_sequence: SequenceNumber::MAX,
            max_sequence: 0,
            last_key: None,
        })
    }

    /// Add an entry. `value` must be empty for tombstones.
    pub fn add(
        &mut self,
        key: &[u8],
        sequence: SequenceNumber,
        kind: EntryKind,
        value: &[u8],
    ) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(Error::SSTable {
                    message: "keys must be added in strictly ascending order".to_string(),
                    source: None,
                });
            }
        }

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());
        self.min_sequence = self.min_sequence.min(sequence);
        self.max_sequence = self.max_sequence.max(sequence);

        if !self.current_block.add(key, sequence, kind, value) {
            // Block is full, flush it
            self.flush_block()?;

            if !self.current_block.add(key, sequence, kind, value) {
                return Err(Error::SSTable {
                    message: "entry too large for block".to_string(),
                    source: None,
                });
            }
        }

        self.entry_count += 1;
        if kind == EntryKind::Tombstone {
            self.deletion_count += 1;
        }
        self.last_key = Some(key.to_vec());

        Ok(())
    }

    /// Write bytes through the running whole-file checksum.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.write_all(buf)?;
        self.file_crc.update(buf);
        self.file_offset += buf.len() as u64;
        Ok(())
    }

    /// Flush current block to disk
    fn flush_block(&mut self) -> Result<()> {
        if self.current_block.is_empty() {
            return Ok(());
        }

        let block_data = self.current_block.finish();
        let compressed = compress_block(self.config.compression, &block_data)?;

        let block_offset = self.file_offset;
        let block_size = compressed.len() + BLOCK_FOOTER_SIZE;

        self.write_bytes(&compressed)?;

        let mut footer = [0u8; BLOCK_FOOTER_SIZE];
        footer[0] = self.config.compression as u8;
        footer[1..5].copy_from_slice(&crc32fast::hash(&compressed).to_le_bytes());
        self.write_bytes(&footer)?;

        if let Some(last_key) = self.current_block.last_key() {
            self.index_builder.add(&last_key, block_offset, block_size as u32);
        }

        self.current_block = BlockBuilder::new(self.config.block_size);

        Ok(())
    }

    /// Finish writing and return the file's descriptor.
    pub fn finish(mut self) -> Result<SstFileMeta> {
        self.flush_block()?;

        let index_offset = self.file_offset;
        let index_data = self.index_builder.finish();
        self.write_bytes(&index_data)?;
        let index_size = index_data.len() as u32;

        let creation_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let props = FileProperties {
            entry_count: self.entry_count,
            deletion_count: self.deletion_count,
            smallest_key: self.min_key.clone().unwrap_or_default(),
            largest_key: self.max_key.clone().unwrap_or_default(),
            smallest_sequence: if self.entry_count == 0 { 0 } else { self.min_sequence },
            largest_sequence: self.max_sequence,
            creation_time,
        };

        let stats_offset = self.file_offset;
        let stats_data = rmp_serde::to_vec(&props).map_err(|e| Error::SSTable {
            message: format!("failed to encode file properties: {}", e),
            source: None,
        })?;
        self.write_bytes(&stats_data)?;
        let stats_size = stats_data.len() as u32;

        let mut footer = BytesMut::with_capacity(FOOTER_SIZE);
        footer.put_u64_le(index_offset);
        footer.put_u32_le(index_size);
        footer.put_u64_le(stats_offset);
        footer.put_u32_le(stats_size);
        footer.put_slice(SSTABLE_MAGIC);
        footer.put_u32_le(SSTABLE_VERSION);
        self.write_bytes(&footer)?;

        // Trailing whole-file checksum; not part of its own input.
        let file_crc = self.file_crc.clone().finalize();
        self.writer.write_all(&file_crc.to_le_bytes())?;
        self.file_offset += 4;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        debug!(
            "Finished SSTable {:?}: {} entries, {} bytes",
            self.path, self.entry_count, self.file_offset
        );

        Ok(SstFileMeta {
            file_id: self.file_id,
            path: self.path,
            size: self.file_offset,
            smallest_key: props.smallest_key,
            largest_key: props.largest_key,
            smallest_sequence: props.smallest_sequence,
            largest_sequence: props.largest_sequence,
            entry_count: self.entry_count,
            deletion_count: self.deletion_count,
            checksum: Some(file_crc),
            level: self.level,
            being_compacted: false,
            creation_time,
        })
    }
}

/// SSTable reader backed by a memory map.
pub struct SstReader {
    path: PathBuf,
    mmap: Mmap,
    index: SstIndex,
    props: FileProperties,
    stored_crc: u32,
}

impl SstReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size < TRAILER_SIZE as u64 {
            return Err(Error::SSTable {
                message: format!("SSTable file too small: {:?}", path),
                source: None,
            });
        }

        let mmap = unsafe {
            MmapOptions::new().map(&file).map_err(|e| Error::IOFailure {
                message: format!("failed to mmap SSTable {:?}", path),
                source: e,
            })?
        };

        let trailer_offset = file_size as usize - TRAILER_SIZE;
        let mut cursor = io::Cursor::new(&mmap[trailer_offset..]);

        let index_offset = cursor.read_u64::<LittleEndian>()?;
        let index_size = cursor.read_u32::<LittleEndian>()?;
        let stats_offset = cursor.read_u64::<LittleEndian>()?;
        let stats_size = cursor.read_u32::<LittleEndian>()?;

        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if &magic != SSTABLE_MAGIC {
            return Err(Error::SSTable {
                message: format!("invalid SSTable magic in {:?}", path),
                source: None,
            });
        }

        let version = cursor.read_u32::<LittleEndian>()?;
        if version != SSTABLE_VERSION {
            return Err(Error::SSTable {
                message: format!("unsupported SSTable version: {}", version),
                source: None,
            });
        }

        let stored_crc = cursor.read_u32::<LittleEndian>()?;

        let index_end = index_offset as usize + index_size as usize;
        let stats_end = stats_offset as usize + stats_size as usize;
        if index_end > trailer_offset || stats_end > trailer_offset {
            return Err(Error::SSTable {
                message: format!("corrupt SSTable trailer in {:?}", path),
                source: None,
            });
        }

        let index = SstIndex::load(&mmap[index_offset as usize..index_end])?;
        let props: FileProperties = rmp_serde::from_slice(&mmap[stats_offset as usize..stats_end])
            .map_err(|e| Error::SSTable {
                message: format!("failed to decode file properties: {}", e),
                source: None,
            })?;

        Ok(Self {
            path,
            mmap,
            index,
            props,
            stored_crc,
        })
    }

    pub fn properties(&self) -> &FileProperties {
        &self.props
    }

    /// Reconstruct the descriptor for this file.
    pub fn meta(&self, file_id: FileId, level: u32) -> SstFileMeta {
        SstFileMeta {
            file_id,
            path: self.path.clone(),
            size: self.mmap.len() as u64,
            smallest_key: self.props.smallest_key.clone(),
            largest_key: self.props.largest_key.clone(),
            smallest_sequence: self.props.smallest_sequence,
            largest_sequence: self.props.largest_sequence,
            entry_count: self.props.entry_count,
            deletion_count: self.props.deletion_count,
            checksum: Some(self.stored_crc),
            level,
            being_compacted: false,
            creation_time: self.props.creation_time,
        }
    }

    /// Look up a key. Returns the stored sequence number and, for puts, the
    /// value; tombstones yield `(sequence, kind, empty)`.
    pub fn get(&self, key: &[u8]) -> Result<Option<(SequenceNumber, EntryKind, Bytes)>> {
        let block_info = match self.index.find_block(key) {
            Some(info) => info,
            None => return Ok(None),
        };

        let block_data = self.read_block(block_info.offset, block_info.size)?;
        search_block(&block_data, key)
    }

    /// Read and decompress a block
    fn read_block(&self, offset: u64, size: u32) -> Result<Vec<u8>> {
        let block_end = offset as usize + size as usize - BLOCK_FOOTER_SIZE;
        let block_data = &self.mmap[offset as usize..block_end];

        let compression = CompressionType::try_from(self.mmap[block_end])?;
        let crc = u32::from_le_bytes(
            self.mmap[block_end + 1..block_end + BLOCK_FOOTER_SIZE]
                .try_into()
                .map_err(|_| Error::SSTable {
                    message: "truncated block footer".to_string(),
                    source: None,
                })?,
        );

        if crc32fast::hash(block_data) != crc {
            return Err(Error::SSTable {
                message: format!("block CRC mismatch in {:?}", self.path),
                source: None,
            });
        }

        decompress_block(compression, block_data)
    }

    /// Iterate all entries in key order.
    pub fn iter(&self) -> SstIterator {
        SstIterator::new(self)
    }
}

/// Recompute the whole-file checksum of an SSTable and compare it against the
/// stored trailer value. Returns the verified checksum.
pub fn verify_file_checksum(path: &Path) -> Result<u32> {
    let data = std::fs::read(path)?;
    if data.len() < TRAILER_SIZE {
        return Err(Error::SSTable {
            message: format!("SSTable file too small: {:?}", path),
            source: None,
        });
    }

    let body = &data[..data.len() - 4];
    let stored = u32::from_le_bytes(data[data.len() - 4..].try_into().map_err(|_| {
        Error::SSTable {
            message: "truncated checksum trailer".to_string(),
            source: None,
        }
    })?);
    let actual = crc32fast::hash(body);

    if actual != stored {
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: stored,
            actual,
        });
    }

    Ok(actual)
}

fn compress_block(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4 => lz4::block::compress(data, None, true).map_err(|e| Error::SSTable {
            message: format!("LZ4 compression failed: {}", e),
            source: None,
        }),
        CompressionType::Zstd => zstd::encode_all(data, 3).map_err(|e| Error::SSTable {
            message: format!("Zstd compression failed: {}", e),
            source: None,
        }),
        CompressionType::Snappy => {
            snap::raw::Encoder::new()
                .compress_vec(data)
                .map_err(|e| Error::SSTable {
                    message: format!("Snappy compression failed: {}", e),
                    source: None,
                })
        }
    }
}

fn decompress_block(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4 => lz4::block::decompress(data, None).map_err(|e| Error::SSTable {
            message: format!("LZ4 decompression failed: {}", e),
            source: None,
        }),
        CompressionType::Zstd => zstd::decode_all(data).map_err(|e| Error::SSTable {
            message: format!("Zstd decompression failed: {}", e),
            source: None,
        }),
        CompressionType::Snappy => {
            snap::raw::Decoder::new()
                .decompress_vec(data)
                .map_err(|e| Error::SSTable {
                    message: format!("Snappy decompression failed: {}", e),
                    source: None,
                })
        }
    }
}

/// Search for a key within a decompressed block
fn search_block(
    block_data: &[u8],
    target_key: &[u8],
) -> Result<Option<(SequenceNumber, EntryKind, Bytes)>> {
    let mut cursor = io::Cursor::new(block_data);

    while (cursor.position() as usize) < block_data.len() {
        let key_len = cursor.read_u32::<LittleEndian>()? as usize;
        let mut key = vec![0u8; key_len];
        cursor.read_exact(&mut key)?;

        let sequence = cursor.read_u64::<LittleEndian>()?;
        let kind = EntryKind::try_from(cursor.read_u8()?)?;
        let value_len = cursor.read_u32::<LittleEndian>()? as usize;

        if key.as_slice() == target_key {
            let mut value = vec![0u8; value_len];
            cursor.read_exact(&mut value)?;
            return Ok(Some((sequence, kind, Bytes::from(value))));
        } else if key.as_slice() > target_key {
            // Keys are sorted, so we've passed it
            return Ok(None);
        } else {
            cursor.seek(SeekFrom::Current(value_len as i64))?;
        }
    }

    Ok(None)
}

/// Block builder
struct BlockBuilder {
    buffer: BytesMut,
    last_key: Option<Vec<u8>>,
    max_size: usize,
}

impl BlockBuilder {
    fn new(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_size),
            last_key: None,
            max_size,
        }
    }

    fn add(&mut self, key: &[u8], sequence: SequenceNumber, kind: EntryKind, value: &[u8]) -> bool {
        let entry_size = 4 + key.len() + 8 + 1 + 4 + value.len();

        if self.buffer.len() + entry_size > self.max_size && !self.buffer.is_empty() {
            return false; // Block is full
        }

        self.buffer.put_u32_le(key.len() as u32);
        self.buffer.put_slice(key);
        self.buffer.put_u64_le(sequence);
        self.buffer.put_u8(kind as u8);
        self.buffer.put_u32_le(value.len() as u32);
        self.buffer.put_slice(value);

        self.last_key = Some(key.to_vec());
        true
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn last_key(&self) -> Option<Vec<u8>> {
        self.last_key.clone()
    }

    fn finish(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

/// Index builder - one entry per data block
struct IndexBuilder {
    entries: Vec<IndexEntry>,
}

impl IndexBuilder {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn add(&mut self, last_key: &[u8], offset: u64, size: u32) {
        self.entries.push(IndexEntry {
            key: last_key.to_vec(),
            offset,
            size,
        });
    }

    fn finish(&self) -> Vec<u8> {
        let mut buffer = BytesMut::new();
        buffer.put_u32_le(self.entries.len() as u32);

        for entry in &self.entries {
            buffer.put_u32_le(entry.key.len() as u32);
            buffer.put_slice(&entry.key);
            buffer.put_u64_le(entry.offset);
            buffer.put_u32_le(entry.size);
        }

        buffer.to_vec()
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    key: Vec<u8>,
    offset: u64,
    size: u32,
}

struct SstIndex {
    entries: Vec<IndexEntry>,
}

impl SstIndex {
    fn load(data: &[u8]) -> Result<Self> {
        let mut cursor = io::Cursor::new(data);
        let entry_count = cursor.read_u32::<LittleEndian>()? as usize;

        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let key_len = cursor.read_u32::<LittleEndian>()? as usize;
            let mut key = vec![0u8; key_len];
            cursor.read_exact(&mut key)?;

            let offset = cursor.read_u64::<LittleEndian>()?;
            let size = cursor.read_u32::<LittleEndian>()?;

            entries.push(IndexEntry { key, offset, size });
        }

        Ok(Self { entries })
    }

    /// First block whose last key is >= the target key.
    fn find_block(&self, key: &[u8]) -> Option<&IndexEntry> {
        match self
            .entries
            .binary_search_by(|entry| entry.key.as_slice().cmp(key))
        {
            Ok(idx) => Some(&self.entries[idx]),
            Err(idx) if idx < self.entries.len() => Some(&self.entries[idx]),
            Err(_) => None,
        }
    }
}

/// Iterator over all entries of an SSTable
pub struct SstIterator<'a> {
    reader: &'a SstReader,
    index_pos: usize,
    block_cursor: io::Cursor<Vec<u8>>,
}

impl<'a> SstIterator<'a> {
    fn new(reader: &'a SstReader) -> Self {
        Self {
            reader,
            index_pos: 0,
            block_cursor: io::Cursor::new(Vec::new()),
        }
    }

    fn load_next_block(&mut self) -> Result<bool> {
        if self.index_pos >= self.reader.index.entries.len() {
            return Ok(false);
        }

        let entry = &self.reader.index.entries[self.index_pos];
        let block_data = self.reader.read_block(entry.offset, entry.size)?;

        self.block_cursor = io::Cursor::new(block_data);
        self.index_pos += 1;

        Ok(true)
    }
}

impl<'a> Iterator for SstIterator<'a> {
    type Item = Result<(Bytes, SequenceNumber, EntryKind, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if (self.block_cursor.position() as usize) < self.block_cursor.get_ref().len() {
                let key_len = match self.block_cursor.read_u32::<LittleEndian>() {
                    Ok(len) => len as usize,
                    Err(e) => return Some(Err(e.into())),
                };
                let mut key = vec![0u8; key_len];
                if let Err(e) = self.block_cursor.read_exact(&mut key) {
                    return Some(Err(e.into()));
                }

                let sequence = match self.block_cursor.read_u64::<LittleEndian>() {
                    Ok(s) => s,
                    Err(e) => return Some(Err(e.into())),
                };
                let kind = match self
                    .block_cursor
                    .read_u8()
                    .map_err(Error::from)
                    .and_then(EntryKind::try_from)
                {
                    Ok(k) => k,
                    Err(e) => return Some(Err(e)),
                };

                let value_len = match self.block_cursor.read_u32::<LittleEndian>() {
                    Ok(len) => len as usize,
                    Err(e) => return Some(Err(e.into())),
                };
                let mut value = vec![0u8; value_len];
                if let Err(e) = self.block_cursor.read_exact(&mut value) {
                    return Some(Err(e.into()));
                }

                return Some(Ok((Bytes::from(key), sequence, kind, Bytes::from(value))));
            }

            match self.load_next_block() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sample(
        path: &Path,
        config: SstableConfig,
        count: usize,
    ) -> SstFileMeta {
        let mut writer = SstWriter::new(path, 1, 0, config).unwrap();
        for i in 0..count {
            let key = format!("key_{:04}", i);
            let value = format!("value_{}", i);
            writer
                .add(key.as_bytes(), (i + 1) as u64, EntryKind::Put, value.as_bytes())
                .unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_sstable_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.sst");

        let meta = write_sample(&path, SstableConfig::default(), 100);
        assert_eq!(meta.entry_count, 100);
        assert_eq!(meta.smallest_key, b"key_0000".to_vec());
        assert_eq!(meta.largest_key, b"key_0099".to_vec());
        assert_eq!(meta.smallest_sequence, 1);
        assert_eq!(meta.largest_sequence, 100);
        assert!(meta.checksum.is_some());

        let reader = SstReader::open(&path).unwrap();
        let (seq, kind, value) = reader.get(b"key_0050").unwrap().unwrap();
        assert_eq!(seq, 51);
        assert_eq!(kind, EntryKind::Put);
        assert_eq!(&value[..], b"value_50");

        assert!(reader.get(b"key_9999").unwrap().is_none());
        assert!(reader.get(b"aaa").unwrap().is_none());

        let count = reader.iter().map(|r| r.unwrap()).count();
        assert_eq!(count, 100);
    }

    #[test]
    fn test_sstable_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000002.sst");

        let mut writer = SstWriter::new(&path, 2, 0, SstableConfig::default()).unwrap();
        writer.add(b"alive", 1, EntryKind::Put, b"v").unwrap();
        writer.add(b"dead", 2, EntryKind::Tombstone, b"").unwrap();
        let meta = writer.finish().unwrap();
        assert_eq!(meta.entry_count, 2);
        assert_eq!(meta.deletion_count, 1);

        let reader = SstReader::open(&path).unwrap();
        let (seq, kind, _) = reader.get(b"dead").unwrap().unwrap();
        assert_eq!(seq, 2);
        assert_eq!(kind, EntryKind::Tombstone);
    }

    #[test]
    fn test_out_of_order_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000003.sst");

        let mut writer = SstWriter::new(&path, 3, 0, SstableConfig::default()).unwrap();
        writer.add(b"b", 1, EntryKind::Put, b"v").unwrap();
        assert!(writer.add(b"a", 2, EntryKind::Put, b"v").is_err());
        assert!(writer.add(b"b", 3, EntryKind::Put, b"v").is_err());
    }

    #[test]
    fn test_compression_variants() {
        for compression in [
            CompressionType::None,
            CompressionType::Lz4,
            CompressionType::Zstd,
            CompressionType::Snappy,
        ] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("000004.sst");
            let config = SstableConfig {
                compression,
                ..Default::default()
            };

            write_sample(&path, config, 500);

            let reader = SstReader::open(&path).unwrap();
            let (_, _, value) = reader.get(b"key_0250").unwrap().unwrap();
            assert_eq!(&value[..], b"value_250");
        }
    }

    #[test]
    fn test_checksum_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000005.sst");

        let meta = write_sample(&path, SstableConfig::default(), 50);
        let verified = verify_file_checksum(&path).unwrap();
        assert_eq!(Some(verified), meta.checksum);

        // Flip one byte in the middle of the file
        let mut data = std::fs::read(&path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xff;
        std::fs::write(&path, data).unwrap();

        match verify_file_checksum(&path) {
            Err(Error::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_meta_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000006.sst");

        let written = write_sample(&path, SstableConfig::default(), 10);
        let reader = SstReader::open(&path).unwrap();
        let meta = reader.meta(written.file_id, written.level);

        assert_eq!(meta.entry_count, written.entry_count);
        assert_eq!(meta.smallest_key, written.smallest_key);
        assert_eq!(meta.largest_key, written.largest_key);
        assert_eq!(meta.largest_sequence, written.largest_sequence);
        assert_eq!(meta.checksum, written.checksum);
        assert_eq!(meta.size, written.size);
    }
}
