//! Append-only storage for location records.
//!
//! The collection is a single JSON file that only supports whole-file reads
//! and whole-file replacement. [`AppendStore`] serializes every
//! read-modify-write cycle through one writer thread fed by a FIFO channel,
//! so two concurrent appends can never both start from the same stale
//! collection and drop each other's record.
//!
//! The writer runs on its own OS thread, outside the tokio blocking pool,
//! so writes keep completing while every pool thread is parked on an append.

pub mod collection;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::record::Record;

/// Default number of writes that may wait in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

const WRITER_THREAD_NAME: &str = "geolog-writer";

/// Tuning for an [`AppendStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Maximum number of accepted writes waiting for the writer.
    /// Submitters wait for a free slot once the queue is full.
    pub queue_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    /// Always `true`; failures are reported as errors.
    pub success: bool,
    /// Length of the collection after the write.
    #[serde(skip)]
    pub total: usize,
}

/// A record waiting for the writer, paired with the caller's completion channel.
#[derive(Debug)]
struct WriteRequest {
    record: Record,
    reply: oneshot::Sender<Result<AppendOutcome>>,
}

#[derive(Debug)]
enum WriterMessage {
    Append(WriteRequest),
    /// Stop accepting; everything queued ahead of or behind this is still written.
    Close,
}

/// Serialized writer over the on-disk collection.
///
/// Appends are applied one at a time in the order they were accepted.
/// Reads go straight to the file and are not ordered against writes.
#[derive(Debug)]
pub struct AppendStore {
    path: PathBuf,
    queue: mpsc::Sender<WriterMessage>,
    /// Held while stamping and enqueueing so `savedAt` follows queue order.
    accept: Mutex<()>,
    /// Fires once the writer thread has drained its queue and exited.
    finished: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

impl AppendStore {
    /// Open the collection at `path` and start its writer thread.
    ///
    /// The file (and its parent directories) is created holding an empty
    /// array if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue capacity is zero, the file cannot be
    /// created, or the writer thread cannot be spawned.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if options.queue_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "queue_capacity must be greater than 0".to_string(),
            });
        }

        if collection::initialize(&path)? {
            info!(path = %path.display(), "Initialized empty collection");
        }

        let (queue, receiver) = mpsc::channel(options.queue_capacity);
        let (done, finished) = oneshot::channel();
        let target = path.clone();
        thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || run_writer(&target, receiver, done))?;

        debug!(
            path = %path.display(),
            queue_capacity = options.queue_capacity,
            "Append store opened"
        );
        Ok(Self {
            path,
            queue,
            accept: Mutex::new(()),
            finished: tokio::sync::Mutex::new(Some(finished)),
        })
    }

    /// Get the path to the collection file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `record` for writing and wait until it is persisted.
    ///
    /// `savedAt` is stamped at the moment the record is accepted into the
    /// queue. Once accepted the write happens even if this future is dropped.
    ///
    /// # Errors
    ///
    /// Returns the storage error that made this write fail, in which case the
    /// record was not appended, or [`Error::WriterClosed`] after shutdown.
    pub async fn append(&self, mut record: Record) -> Result<AppendOutcome> {
        let permit = self.queue.reserve().await.map_err(|_| Error::WriterClosed)?;
        let (reply, outcome) = oneshot::channel();

        {
            let _accepted = self
                .accept
                .lock()
                .map_err(|_| Error::internal("acceptance lock poisoned"))?;
            record.stamp_saved_at(Utc::now());
            permit.send(WriterMessage::Append(WriteRequest { record, reply }));
        }

        outcome.await.map_err(|_| Error::WriterClosed)?
    }

    /// Read the whole collection as it is on disk right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        collection::load(&self.path)
    }

    /// Read the collection file verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_raw(&self) -> Result<String> {
        collection::read_raw(&self.path)
    }

    /// Stop accepting writes and wait for every accepted write to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer thread panicked.
    pub async fn shutdown(&self) -> Result<()> {
        if self.queue.send(WriterMessage::Close).await.is_err() {
            debug!("Writer already stopped");
        }

        let finished = self.finished.lock().await.take();
        if let Some(finished) = finished {
            finished
                .await
                .map_err(|_| Error::internal("writer thread exited without draining"))?;
            info!(path = %self.path.display(), "Append store closed");
        }
        Ok(())
    }
}

fn run_writer(path: &Path, mut queue: mpsc::Receiver<WriterMessage>, done: oneshot::Sender<()>) {
    while let Some(message) = queue.blocking_recv() {
        match message {
            WriterMessage::Append(request) => process(path, request),
            WriterMessage::Close => {
                queue.close();
                while let Some(message) = queue.blocking_recv() {
                    if let WriterMessage::Append(request) = message {
                        process(path, request);
                    }
                }
                break;
            }
        }
    }

    debug!(path = %path.display(), "Writer thread finished");
    if done.send(()).is_err() {
        debug!("Store dropped before writer finished");
    }
}

fn process(path: &Path, request: WriteRequest) {
    let WriteRequest { record, reply } = request;
    let result = apply(path, record);

    match &result {
        Ok(outcome) => debug!(total = outcome.total, "Record appended"),
        Err(err) => error!(error = %err, "Failed to append record"),
    }

    if reply.send(result).is_err() {
        debug!("Append caller went away before completion");
    }
}

/// One full read-modify-write cycle. Nothing is written unless the read succeeded.
fn apply(path: &Path, record: Record) -> Result<AppendOutcome> {
    let mut records = collection::load(path)?;
    records.push(record);
    collection::persist(path, &records)?;
    Ok(AppendOutcome {
        success: true,
        total: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Arc;

    use serde_json::json;

    fn report(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn open_temp() -> (tempfile::TempDir, AppendStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AppendStore::open(dir.path().join("locations.json"), StoreOptions::default())
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_initializes_empty_collection() {
        let (_dir, store) = open_temp();

        assert!(store.path().exists());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
        assert!(store.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_keeps_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");
        fs::write(&path, r#"[{"id": "old"}]"#).unwrap();

        let store = AppendStore::open(&path, StoreOptions::default()).unwrap();
        store.append(report(json!({"id": "new"}))).await.unwrap();

        let ids: Vec<_> = store
            .read_all()
            .unwrap()
            .iter()
            .map(|r| r.get("id").cloned().unwrap())
            .collect();
        assert_eq!(ids, vec![json!("old"), json!("new")]);
    }

    #[tokio::test]
    async fn test_open_rejects_zero_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppendStore::open(
            dir.path().join("locations.json"),
            StoreOptions { queue_capacity: 0 },
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[tokio::test]
    async fn test_append_round_trip() {
        let (_dir, store) = open_temp();
        let mut record = report(json!({"lat": 48.85, "lng": 2.35, "accuracy": 12}));
        record.set_ip("203.0.113.9");

        let outcome = store.append(record).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.total, 1);

        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 1);
        let saved = &records[0];
        assert_eq!(saved.get("lat"), Some(&json!(48.85)));
        assert_eq!(saved.get("lng"), Some(&json!(2.35)));
        assert_eq!(saved.get("accuracy"), Some(&json!(12)));
        assert_eq!(saved.ip(), Some("203.0.113.9"));
        assert!(saved.saved_at().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_lose_nothing() {
        let (_dir, store) = open_temp();
        let store = Arc::new(store);

        let tasks: Vec<_> = (0..50)
            .map(|id| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append(report(json!({ "id": id }))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 50);
        let ids: HashSet<u64> = records
            .iter()
            .map(|r| r.get("id").and_then(serde_json::Value::as_u64).unwrap())
            .collect();
        assert_eq!(ids, (0..50).collect());
    }

    #[tokio::test]
    async fn test_acceptance_order_is_collection_order() {
        let (_dir, store) = open_temp();

        let first = store.append(report(json!({"name": "a"})));
        let second = store.append(report(json!({"name": "b"})));
        let third = store.append(report(json!({"name": "c"})));
        let (a, b, c) = tokio::join!(first, second, third);
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let records = store.read_all().unwrap();
        let names: Vec<_> = records
            .iter()
            .map(|r| r.get("name").and_then(serde_json::Value::as_str).unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let stamps: Vec<_> = records.iter().map(|r| r.saved_at().unwrap()).collect();
        let mut sorted = stamps.clone();
        sorted.sort_unstable();
        assert_eq!(stamps, sorted);
    }

    #[tokio::test]
    async fn test_corrupt_collection_rejects_append_and_is_untouched() {
        let (_dir, store) = open_temp();
        let garbage = "[{\"id\": 1},  oops";
        fs::write(store.path(), garbage).unwrap();

        let err = store.append(report(json!({"id": 2}))).await.unwrap_err();
        assert!(matches!(err, Error::CollectionCorrupt { .. }));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), garbage);
    }

    #[tokio::test]
    async fn test_writer_keeps_going_after_failure() {
        let (_dir, store) = open_temp();
        fs::write(store.path(), "not json").unwrap();
        assert!(store.append(report(json!({"id": 1}))).await.is_err());

        fs::write(store.path(), "[]").unwrap();
        let outcome = store.append(report(json!({"id": 2}))).await.unwrap();
        assert_eq!(outcome.total, 1);
    }

    #[tokio::test]
    async fn test_missing_file_rejects_append() {
        let (_dir, store) = open_temp();
        fs::remove_file(store.path()).unwrap();

        let err = store.append(report(json!({"id": 1}))).await.unwrap_err();
        assert!(matches!(err, Error::CollectionRead { .. }));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_read_raw_is_verbatim() {
        let (_dir, store) = open_temp();
        store.append(report(json!({"id": 1}))).await.unwrap();

        let raw = store.read_raw().unwrap();
        assert_eq!(raw, fs::read_to_string(store.path()).unwrap());
        assert!(raw.starts_with("[\n  {"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_accepted_writes() {
        let (_dir, store) = open_temp();

        let (a, b, c, closed) = tokio::join!(
            store.append(report(json!({"id": 1}))),
            store.append(report(json!({"id": 2}))),
            store.append(report(json!({"id": 3}))),
            store.shutdown(),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        closed.unwrap();

        assert_eq!(store.read_all().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_append_after_shutdown_fails() {
        let (_dir, store) = open_temp();
        store.shutdown().await.unwrap();

        let err = store.append(report(json!({"id": 1}))).await.unwrap_err();
        assert!(err.is_writer_closed());
        // Shutting down twice is harmless.
        store.shutdown().await.unwrap();
    }

    #[test]
    fn test_open_needs_no_runtime() {
        let (_dir, store) = open_temp();
        drop(store);
    }

    #[test]
    fn test_append_completes_while_blocking_pool_is_full() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (_dir, store) = open_temp();
        let store = Arc::new(store);

        // The only blocking thread parks on the append; the write must not need another.
        let handle = runtime.handle().clone();
        let waiting = Arc::clone(&store);
        let outcome = runtime
            .block_on(runtime.spawn_blocking(move || {
                handle.block_on(waiting.append(report(json!({"id": 1}))))
            }))
            .unwrap()
            .unwrap();

        assert_eq!(outcome.total, 1);
        runtime.block_on(store.shutdown()).unwrap();
    }

    #[test]
    fn test_store_options_default() {
        assert_eq!(StoreOptions::default().queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_append_outcome_serializes_success_only() {
        let outcome = AppendOutcome {
            success: true,
            total: 4,
        };
        assert_eq!(serde_json::to_string(&outcome).unwrap(), r#"{"success":true}"#);
    }
}
