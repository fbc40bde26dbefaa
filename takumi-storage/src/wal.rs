//! Write-Ahead Log (WAL)
//!
//! Every write is appended here before it touches the memtable, so writes
//! acknowledged before a crash survive a restart. A checkpoint directory
//! receives a fresh, empty log: everything it needs is already in its
//! sorted files.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WAL File Structure                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Header (16 bytes)                                          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Magic Number (8 bytes): "TAKUMIWL"                  │    │
//! │  │ Version (4 bytes)                                   │    │
//! │  │ Reserved (4 bytes)                                  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │  Record 1                                                   │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Length (4 bytes)  CRC32 (4 bytes)                   │    │
//! │  │ Payload:                                            │    │
//! │  │   - Sequence (8 bytes)                              │    │
//! │  │   - Column family (4 bytes)                         │    │
//! │  │   - Kind (1 byte)                                   │    │
//! │  │   - Key length (4) + key                            │    │
//! │  │   - Value length (4) + value                        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │  Record 2 ...                                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use takumi_core::config::WalConfig;
use takumi_core::error::{Error, Result};
use takumi_core::types::{ColumnFamilyId, EntryKind, SequenceNumber};

const WAL_MAGIC: &[u8; 8] = b"TAKUMIWL";
const WAL_VERSION: u32 = 1;
const WAL_HEADER_SIZE: usize = 16;
const RECORD_HEADER_SIZE: usize = 8;

/// Name of the log file inside the `wal/` directory.
pub const WAL_FILE: &str = "000001.log";

#[derive(Debug, Clone)]
pub struct WalRecord {
    pub sequence: SequenceNumber,
    pub cf_id: ColumnFamilyId,
    pub kind: EntryKind,
    pub key: Bytes,
    pub value: Bytes,
}

pub struct WriteAheadLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    config: WalConfig,
}

impl WriteAheadLog {
    /// Open the log under `wal_dir`, creating directory and file as needed.
    pub fn open(wal_dir: &Path, config: WalConfig) -> Result<Self> {
        std::fs::create_dir_all(wal_dir)?;
        let path = wal_dir.join(WAL_FILE);

        let is_new = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);

        if is_new {
            let mut header = BytesMut::with_capacity(WAL_HEADER_SIZE);
            header.put_slice(WAL_MAGIC);
            header.put_u32_le(WAL_VERSION);
            header.put_u32_le(0); // reserved
            writer.write_all(&header)?;
            writer.flush()?;
            debug!("Created WAL at {:?}", path);
        }

        Ok(Self {
            writer: Mutex::new(writer),
            path,
            config,
        })
    }

    /// Append one record, fsyncing when configured. Returns encoded length.
    pub fn append(&self, record: &WalRecord) -> Result<u64> {
        let payload_len = 8 + 4 + 1 + 4 + record.key.len() + 4 + record.value.len();
        let mut payload = BytesMut::with_capacity(payload_len);
        payload.put_u64_le(record.sequence);
        payload.put_u32_le(record.cf_id);
        payload.put_u8(record.kind as u8);
        payload.put_u32_le(record.key.len() as u32);
        payload.put_slice(&record.key);
        payload.put_u32_le(record.value.len() as u32);
        payload.put_slice(&record.value);

        let mut frame = BytesMut::with_capacity(RECORD_HEADER_SIZE + payload.len());
        frame.put_u32_le(payload.len() as u32);
        frame.put_u32_le(crc32fast::hash(&payload));
        frame.put_slice(&payload);

        let mut writer = self.writer.lock();
        writer.write_all(&frame)?;
        writer.flush()?;
        if self.config.sync_on_write {
            writer.get_ref().sync_data()?;
        }

        Ok(frame.len() as u64)
    }

    /// Force everything to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Read all records with sequence strictly greater than `checkpoint`.
    ///
    /// A torn record at the tail (partial write before a crash) ends the
    /// scan with a warning instead of an error; everything before it is
    /// intact thanks to per-record checksums.
    pub fn read_from(&self, checkpoint: SequenceNumber) -> Result<Vec<WalRecord>> {
        Self::read_records(&self.path, checkpoint)
    }

    fn read_records(path: &Path, checkpoint: SequenceNumber) -> Result<Vec<WalRecord>> {
        let mut file = File::open(path)?;

        let mut header = [0u8; WAL_HEADER_SIZE];
        file.read_exact(&mut header)?;
        if &header[0..8] != WAL_MAGIC {
            return Err(Error::WriteAheadLog {
                message: format!("invalid WAL magic in {:?}", path),
                source: None,
            });
        }
        let version = u32::from_le_bytes(header[8..12].try_into().unwrap_or_default());
        if version != WAL_VERSION {
            return Err(Error::WriteAheadLog {
                message: format!("unsupported WAL version: {}", version),
                source: None,
            });
        }

        let mut records = Vec::new();
        loop {
            let mut frame_header = [0u8; RECORD_HEADER_SIZE];
            match file.read_exact(&mut frame_header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(frame_header[0..4].try_into().unwrap_or_default());
            let crc = u32::from_le_bytes(frame_header[4..8].try_into().unwrap_or_default());

            let mut payload = vec![0u8; len as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("Torn WAL record at tail of {:?}, stopping replay", path);
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            if crc32fast::hash(&payload) != crc {
                warn!("WAL record CRC mismatch in {:?}, stopping replay", path);
                break;
            }

            let mut cursor = io::Cursor::new(payload.as_slice());
            let sequence = cursor.read_u64::<LittleEndian>()?;
            let cf_id = cursor.read_u32::<LittleEndian>()?;
            let kind = EntryKind::try_from(cursor.read_u8()?)?;
            let key_len = cursor.read_u32::<LittleEndian>()? as usize;
            let mut key = vec![0u8; key_len];
            cursor.read_exact(&mut key)?;
            let value_len = cursor.read_u32::<LittleEndian>()? as usize;
            let mut value = vec![0u8; value_len];
            cursor.read_exact(&mut value)?;

            if sequence <= checkpoint {
                continue;
            }

            records.push(WalRecord {
                sequence,
                cf_id,
                kind,
                key: Bytes::from(key),
                value: Bytes::from(value),
            });
        }

        if !records.is_empty() {
            info!("Read {} WAL records after sequence {}", records.len(), checkpoint);
        }

        Ok(records)
    }
}
