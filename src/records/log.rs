//! Append-only log file holding every stored record.
//!
//! Layout: a header (magic, version, base id) followed by frames of
//! `magic | body length | MessagePack body | crc32(body)`. The base id is the
//! first id the store may hand out, so ids are never reused after the log is
//! reset by a bulk delete.

use crate::error::{Result, StoreError};
use crate::types::{LogRecord, RecordId};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for the log header.
const LOG_MAGIC: &[u8; 4] = b"LGS\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Header size: magic + version + base id.
const HEADER_SIZE: u64 = 4 + 1 + 8;

/// Magic bytes opening each record frame.
const FRAME_MAGIC: &[u8; 4] = b"REC\0";

/// Frame overhead: magic + body length + checksum.
const FRAME_OVERHEAD: u64 = 4 + 4 + 4;

/// Contents of a log read at open time.
pub struct LoadedLog {
    /// Lowest id the store may assign.
    pub base_id: RecordId,
    /// Records in append order.
    pub records: Vec<LogRecord>,
}

struct Writer {
    file: File,
    size: u64,
    writes_since_sync: u64,
}

/// Append-only record log.
pub struct RecordLog {
    /// Path to the log file.
    path: PathBuf,

    /// Write handle and current end of file.
    writer: Mutex<Writer>,

    /// Sync every N writes (0 and 1 both mean every write).
    sync_interval: u64,
}

impl RecordLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 1;

    /// Open or create a record log, returning everything already in it.
    ///
    /// A frame cut short by a crash at the end of the file is dropped and the
    /// file truncated back to the last whole record.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<(Self, LoadedLog)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if file.metadata()?.len() == 0 {
            Self::write_header(&mut file, RecordId(1))?;
            file.sync_all()?;
        }

        let (loaded, valid_len) = Self::load(&file)?;

        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                dropped_bytes = file_len - valid_len,
                "truncating torn record at end of log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), records = loaded.records.len(), "opened record log");

        Ok((
            Self {
                path,
                writer: Mutex::new(Writer {
                    file,
                    size: valid_len,
                    writes_since_sync: 0,
                }),
                sync_interval: sync_interval.max(1),
            },
            loaded,
        ))
    }

    /// Append a record. Returns the offset it was written at.
    pub fn append(&self, record: &LogRecord) -> Result<u64> {
        let body = rmp_serde::to_vec(record)?;
        let frame = Self::encode_frame(&body)?;

        let mut writer = self.writer.lock();
        let offset = writer.size;

        let needs_sync = writer.writes_since_sync + 1 >= self.sync_interval;

        if let Err(e) = Self::write_frame(&mut writer.file, offset, &frame, needs_sync) {
            // The frame is not committed; the next append overwrites it.
            if let Err(truncate) = writer.file.set_len(offset) {
                warn!(offset, error = %truncate, "could not roll back failed append");
            }
            return Err(e.into());
        }

        writer.size = offset + frame.len() as u64;
        writer.writes_since_sync = if needs_sync {
            0
        } else {
            writer.writes_since_sync + 1
        };

        Ok(offset)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.sync_all()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    /// Replace the log with an empty one whose base id is `base_id`.
    ///
    /// The new file is written beside the old one and renamed over it, so a
    /// failure at any point leaves either the complete old log or the empty
    /// new one.
    pub fn reset(&self, base_id: RecordId) -> Result<()> {
        let mut writer = self.writer.lock();

        let tmp_path = self.path.with_extension("log.tmp");
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let prepared = Self::write_header(&mut file, base_id)
            .and_then(|_| file.sync_all().map_err(StoreError::from))
            .and_then(|_| fs::rename(&tmp_path, &self.path).map_err(StoreError::from));
        if let Err(e) = prepared {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Nothing below can fail: the handle already points at the renamed file.
        Self::sync_parent_dir(&self.path);
        *writer = Writer {
            file,
            size: HEADER_SIZE,
            writes_since_sync: 0,
        };

        Ok(())
    }

    /// Current file size.
    pub fn size(&self) -> u64 {
        self.writer.lock().size
    }

    /// Swap the write handle, returning the old one.
    #[cfg(test)]
    pub(crate) fn replace_file(&self, file: File) -> File {
        std::mem::replace(&mut self.writer.lock().file, file)
    }

    fn write_header(file: &mut File, base_id: RecordId) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(LOG_MAGIC)?;
        file.write_all(&[LOG_VERSION])?;
        file.write_all(&base_id.0.to_le_bytes())?;
        Ok(())
    }

    fn write_frame(file: &mut File, offset: u64, frame: &[u8], sync: bool) -> std::io::Result<()> {
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(frame)?;
        if sync {
            file.sync_data()?;
        }
        Ok(())
    }

    fn encode_frame(body: &[u8]) -> Result<Vec<u8>> {
        let len = u32::try_from(body.len())
            .map_err(|_| StoreError::Serialization("record too large".into()))?;

        let mut frame = Vec::with_capacity(body.len() + FRAME_OVERHEAD as usize);
        frame.extend_from_slice(FRAME_MAGIC);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(&crc32fast::hash(body).to_le_bytes());
        Ok(frame)
    }

    /// Read every record. Returns the records and the length of the valid
    /// prefix of the file.
    fn load(file: &File) -> Result<(LoadedLog, u64)> {
        let file_len = file.metadata()?.len();
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid log magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        let mut base_bytes = [0u8; 8];
        reader.read_exact(&mut base_bytes)?;
        let base_id = RecordId(u64::from_le_bytes(base_bytes));

        let mut records = Vec::new();
        let mut offset = HEADER_SIZE;

        while offset < file_len {
            if file_len - offset < FRAME_OVERHEAD {
                break;
            }

            let mut frame_magic = [0u8; 4];
            reader.read_exact(&mut frame_magic)?;
            if &frame_magic != FRAME_MAGIC {
                return Err(StoreError::Corruption(format!(
                    "bad frame magic at offset {offset}"
                )));
            }

            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            let body_len = u64::from(u32::from_le_bytes(len_bytes));

            let frame_end = offset + FRAME_OVERHEAD + body_len;
            if frame_end > file_len {
                break;
            }

            let mut body = vec![0u8; body_len as usize];
            let mut checksum_bytes = [0u8; 4];
            match reader
                .read_exact(&mut body)
                .and_then(|_| reader.read_exact(&mut checksum_bytes))
            {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let stored = u32::from_le_bytes(checksum_bytes);
            let computed = crc32fast::hash(&body);
            if stored != computed {
                if frame_end == file_len {
                    // Last frame only half made it to disk.
                    break;
                }
                return Err(StoreError::ChecksumMismatch {
                    expected: stored,
                    got: computed,
                });
            }

            records.push(rmp_serde::from_slice::<LogRecord>(&body)?);
            offset = frame_end;
        }

        Ok((LoadedLog { base_id, records }, offset))
    }

    #[cfg(unix)]
    fn sync_parent_dir(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }

    #[cfg(not(unix))]
    fn sync_parent_dir(_path: &Path) {}
}
