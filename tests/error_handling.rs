//! Error handling and edge case tests.

use logsink::{
    build_view, normalize, IngestConfig, IngestService, LogPage, LogStore, LogTable, LogViewer,
    NewLogRecord, NotificationHub, Origin, Predicate, RawInput, RecordId, Refresh, SortSpec,
    StoreConfig, StoreError, ViewQuery,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("store"),
        ..Default::default()
    }
}

fn origin() -> Origin {
    Origin::new(Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))))
}

/// A table that fails every call while `down` is set.
struct FlakyTable {
    inner: LogStore,
    down: AtomicBool,
}

impl FlakyTable {
    fn check(&self) -> logsink::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("database offline".into()))
        } else {
            Ok(())
        }
    }
}

impl LogTable for FlakyTable {
    fn insert(&self, record: NewLogRecord) -> logsink::Result<RecordId> {
        self.check()?;
        self.inner.insert(record)
    }

    fn count(&self) -> logsink::Result<u64> {
        self.check()?;
        self.inner.count()
    }

    fn delete_all(&self) -> logsink::Result<()> {
        self.check()?;
        self.inner.delete_all()
    }

    fn query(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        offset: usize,
        limit: Option<usize>,
    ) -> logsink::Result<LogPage> {
        self.check()?;
        self.inner.query(predicate, sort, offset, limit)
    }
}

fn flaky(dir: &TempDir) -> Arc<FlakyTable> {
    Arc::new(FlakyTable {
        inner: LogStore::create(test_config(dir)).unwrap(),
        down: AtomicBool::new(false),
    })
}

// --- Ingestion Never Fails ---

#[test]
fn test_submission_acks_while_store_is_down() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let table = flaky(&dir);
    let hub = NotificationHub::new();
    let conn = hub.subscribe().unwrap();
    let ingest = IngestService::new(table.clone(), hub.clone(), IngestConfig::default());

    table.down.store(true, Ordering::SeqCst);
    let ack = ingest.submit_text("dropped", &origin());
    assert_eq!(ack.echo, "dropped");
    assert!(ack.to_string().ends_with(" : dropped"));

    // Nothing stored, so nobody is told to refresh.
    assert!(conn.try_recv().is_err());
    assert!(matches!(ingest.count(), Err(StoreError::Unavailable(_))));

    table.down.store(false, Ordering::SeqCst);
    ingest.submit_text("kept", &origin());
    assert_eq!(ingest.count().unwrap(), 1);
}

#[test]
fn test_delete_all_failure_is_reported() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let table = flaky(&dir);
    let ingest = IngestService::new(table.clone(), NotificationHub::new(), IngestConfig::default());
    ingest.submit_text("a", &origin());

    table.down.store(true, Ordering::SeqCst);
    assert!(matches!(
        ingest.delete_all(),
        Err(StoreError::BulkDeleteFailure(_))
    ));

    table.down.store(false, Ordering::SeqCst);
    assert_eq!(ingest.count().unwrap(), 1);
}

#[test]
fn test_viewer_keeps_last_page_when_store_fails() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let table = flaky(&dir);
    let ingest = IngestService::new(table.clone(), NotificationHub::new(), IngestConfig::default());
    ingest.submit_text("visible", &origin());

    let viewer = LogViewer::new(table.clone(), ViewQuery::new());
    viewer.refresh();
    assert_eq!(viewer.page().unwrap().len(), 1);

    table.down.store(true, Ordering::SeqCst);
    viewer.refresh();

    assert_eq!(viewer.page().unwrap().records[0].message, "visible");
    assert_eq!(viewer.refresh_count(), 2);
}

// --- Store Lifecycle ---

#[test]
fn test_closed_store_rejects_everything() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::create(test_config(&dir)).unwrap();
    store.close().unwrap();
    // Closing twice is fine.
    store.close().unwrap();

    assert!(matches!(
        build_view(&store, &ViewQuery::new()),
        Err(StoreError::Unavailable(_))
    ));
    assert!(matches!(store.get(RecordId(1)), Err(StoreError::Unavailable(_))));
}

#[test]
fn test_second_open_is_locked() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let first = LogStore::create(config.clone()).unwrap();
    assert!(matches!(LogStore::open(config.clone()), Err(StoreError::Locked)));

    drop(first);
    assert!(LogStore::open(config).is_ok());
}

#[test]
fn test_bad_manifest_is_invalid_format() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    std::fs::create_dir_all(&config.path).unwrap();
    std::fs::write(config.path.join("MANIFEST"), b"NOPE\x01").unwrap();

    assert!(matches!(
        LogStore::open(config),
        Err(StoreError::InvalidFormat(_))
    ));
}

#[test]
fn test_garbage_log_file_is_invalid_format() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    drop(LogStore::create(config.clone()).unwrap());

    std::fs::write(config.path.join("records.log"), b"this is not a log file").unwrap();

    assert!(matches!(
        LogStore::open(config),
        Err(StoreError::InvalidFormat(_))
    ));
}

#[test]
fn test_torn_tail_is_dropped_on_open() {
    use std::io::Write;

    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let ingest_origin = origin();

    {
        let store = Arc::new(LogStore::create(config.clone()).unwrap());
        let ingest =
            IngestService::new(store.clone(), NotificationHub::new(), IngestConfig::default());
        ingest.submit_text("one", &ingest_origin);
        ingest.submit_text("two", &ingest_origin);
    }

    // Half a frame, as if the process died mid-write.
    let mut log = std::fs::OpenOptions::new()
        .append(true)
        .open(config.path.join("records.log"))
        .unwrap();
    log.write_all(b"REC\0\xff\x00").unwrap();
    drop(log);

    let store = LogStore::open(config).unwrap();
    assert_eq!(store.count().unwrap(), 2);

    let next = normalize(RawInput::text("three"), None, &ingest_origin);
    assert_eq!(store.insert(next).unwrap(), RecordId(3));
}
