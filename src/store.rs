//! The durable log table.

use crate::error::{Result, StoreError};
use crate::query::{evaluate, LogPage, Predicate, SortSpec};
use crate::records::RecordLog;
use crate::types::{LogRecord, NewLogRecord, RecordId};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Storage operations the rest of the crate relies on.
///
/// Implementations must allow concurrent inserts and queries from any thread.
/// Records are never modified once inserted.
pub trait LogTable: Send + Sync {
    /// Insert a normalized record and return the id assigned to it.
    fn insert(&self, record: NewLogRecord) -> Result<RecordId>;

    /// Number of stored records.
    fn count(&self) -> Result<u64>;

    /// Remove every record, atomically.
    fn delete_all(&self) -> Result<()>;

    /// Filter, sort and page the table. `total_count` on the result covers
    /// the whole filtered set.
    fn query(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<LogPage>;
}

/// Store configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the store files.
    pub path: PathBuf,

    /// fsync after this many inserts (1 = every insert).
    pub sync_interval: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./logdata"),
            sync_interval: RecordLog::DEFAULT_SYNC_INTERVAL,
            create_if_missing: true,
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"LSK\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Durable, single-writer log table.
///
/// Every record lives in an append-only file and in an in-memory table keyed
/// by id. Inserts go to disk first, then become visible to queries.
pub struct LogStore {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// On-disk record log.
    log: RecordLog,

    /// All live records, in id order.
    rows: RwLock<BTreeMap<RecordId, LogRecord>>,

    /// Serializes writers; holds the next id to assign.
    write_lock: Mutex<RecordId>,

    /// Set by `close`.
    closed: AtomicBool,
}

impl LogStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        Self::open(config)
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let (log, loaded) =
            RecordLog::open(config.path.join("records.log"), config.sync_interval)?;

        let max_id = loaded.records.iter().map(|r| r.id).max();
        let next_id = match max_id {
            Some(id) => following(id)?.max(loaded.base_id),
            None => loaded.base_id,
        };

        let stored = loaded.records.len();
        let rows: BTreeMap<_, _> = loaded.records.into_iter().map(|r| (r.id, r)).collect();
        if rows.len() != stored {
            return Err(StoreError::Corruption(format!(
                "{} duplicate record ids in log",
                stored - rows.len()
            )));
        }

        info!(
            path = %config.path.display(),
            records = rows.len(),
            next_id = %next_id,
            "opened log store"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            rows: RwLock::new(rows),
            write_lock: Mutex::new(next_id),
            closed: AtomicBool::new(false),
        })
    }

    /// Insert a record and return it as stored.
    pub fn append(&self, record: NewLogRecord) -> Result<LogRecord> {
        self.ensure_open()?;
        let mut next_id = self.write_lock.lock();

        let record = LogRecord::from_new(*next_id, record);
        let after = following(record.id)?;

        // A failed append may still have reached the disk, so its id is spent.
        let appended = self.log.append(&record);
        *next_id = after;
        appended?;

        self.rows.write().insert(record.id, record.clone());
        debug!(id = %record.id, source = %record.source_address, "stored log record");

        Ok(record)
    }

    /// Get a record by id.
    pub fn get(&self, id: RecordId) -> Result<Option<LogRecord>> {
        self.ensure_open()?;
        Ok(self.rows.read().get(&id).cloned())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Flush and refuse all further operations.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(path = %self.config.path.display(), "closing log store");
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "store at {} is closed",
                self.config.path.display()
            )));
        }
        Ok(())
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        if !manifest_path.exists() {
            return Err(StoreError::NotInitialized);
        }
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

fn following(id: RecordId) -> Result<RecordId> {
    id.next()
        .ok_or_else(|| StoreError::Corruption(format!("record id space exhausted at {id}")))
}

impl LogTable for LogStore {
    fn insert(&self, record: NewLogRecord) -> Result<RecordId> {
        self.append(record).map(|r| r.id)
    }

    fn count(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.rows.read().len() as u64)
    }

    fn delete_all(&self) -> Result<()> {
        self.ensure_open()?;
        let next_id = self.write_lock.lock();
        let mut rows = self.rows.write();

        self.log
            .reset(*next_id)
            .map_err(|e| StoreError::BulkDeleteFailure(e.to_string()))?;

        let removed = rows.len();
        rows.clear();
        info!(removed, "deleted all log records");

        Ok(())
    }

    fn query(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<LogPage> {
        self.ensure_open()?;
        let rows = self.rows.read();
        let (records, total_count) = evaluate(rows.values(), predicate, sort, offset, limit);

        Ok(LogPage {
            records,
            total_count,
            offset,
        })
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
