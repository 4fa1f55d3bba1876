//! Write-coalescing storage wrapper
//!
//! Holding a foot switch with a `VAR_INC` hold list writes the `.var` entry on
//! every repeat tick. On flash-backed storage that is a lot of wear for values
//! that are immediately overwritten, so this wrapper batches writes.
//!
//! # Debouncing Strategy
//!
//! 1. A write is stored as "pending" for its key and the timestamp recorded.
//! 2. Another write to the same key within the window replaces the pending
//!    value (last-write-wins).
//! 3. Once the window expires without new writes, every pending entry is
//!    written to the inner backend.
//!
//! Reads see pending values, so the wrapper is transparent to callers. Pending
//! entries are written on [`Storage::flush`] and when the flusher task shuts
//! down. Entries that fail to write stay pending and are retried on the next
//! flush.

use super::{Storage, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

struct Pending {
    entries: HashMap<String, String>,
    last_write_ts: Instant,
}

/// Storage wrapper that batches writes to the inner backend
pub struct CoalescingStorage {
    inner: Arc<dyn Storage>,
    pending: Mutex<Pending>,
    debounce: Duration,
    write_count: AtomicU64,
}

impl CoalescingStorage {
    /// Wrap `inner` with the given debounce window (0 writes through)
    pub fn new(inner: Arc<dyn Storage>, debounce_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            inner,
            pending: Mutex::new(Pending {
                entries: HashMap::new(),
                last_write_ts: Instant::now(),
            }),
            debounce: Duration::from_millis(debounce_ms),
            write_count: AtomicU64::new(0),
        })
    }

    /// Number of writes performed on the inner backend
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Acquire)
    }

    /// Number of keys waiting to be written
    pub fn pending_len(&self) -> usize {
        self.pending.lock().entries.len()
    }

    /// Flush pending entries if the debounce window has expired at `now`.
    ///
    /// Returns the number of entries written.
    pub fn flush_if_due(&self, now: Instant) -> usize {
        let due = {
            let pending = self.pending.lock();
            !pending.entries.is_empty()
                && now.saturating_duration_since(pending.last_write_ts) >= self.debounce
        };
        if !due {
            return 0;
        }
        trace!("Debounce window expired, flushing pending entries");
        self.flush_pending().unwrap_or_else(|e| {
            error!("Failed to flush pending entries: {}", e);
            0
        })
    }

    /// Write every pending entry to the inner backend
    fn flush_pending(&self) -> Result<usize, StorageError> {
        let entries = std::mem::take(&mut self.pending.lock().entries);
        if entries.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut first_error = None;
        let mut failed = HashMap::new();

        for (key, contents) in entries {
            match self.inner.write(&key, &contents) {
                Ok(()) => {
                    written += 1;
                    self.write_count.fetch_add(1, Ordering::AcqRel);
                }
                Err(e) => {
                    error!("Failed to write {}: {}", key, e);
                    first_error.get_or_insert(e);
                    failed.insert(key, contents);
                }
            }
        }

        if !failed.is_empty() {
            let mut pending = self.pending.lock();
            for (key, contents) in failed {
                // A newer write that arrived meanwhile wins
                pending.entries.entry(key).or_insert(contents);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Flushed {} pending entries", written);
                Ok(written)
            }
        }
    }

    /// Spawn the background task that flushes expired windows.
    ///
    /// The task flushes everything pending when the handle is shut down.
    pub fn spawn_flusher(self: &Arc<Self>) -> FlusherHandle {
        let storage = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let tick = if self.debounce.is_zero() {
            Duration::from_millis(1000)
        } else {
            self.debounce
        };

        let task = tokio::spawn(async move {
            info!(
                "Storage flusher started (debounce: {}ms)",
                storage.debounce.as_millis()
            );
            let mut ticker = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        storage.flush_if_due(Instant::now());
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
            if let Err(e) = storage.flush_pending() {
                error!("Final flush failed: {}", e);
            }
            info!(
                "Storage flusher stopped (total writes: {})",
                storage.write_count()
            );
        });

        FlusherHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

impl Storage for CoalescingStorage {
    fn read(&self, key: &str) -> Result<String, StorageError> {
        if let Some(contents) = self.pending.lock().entries.get(key) {
            return Ok(contents.clone());
        }
        self.inner.read(key)
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        if self.debounce.is_zero() {
            self.inner.write(key, contents)?;
            self.write_count.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        let mut pending = self.pending.lock();
        pending.entries.insert(key.to_string(), contents.to_string());
        pending.last_write_ts = Instant::now();
        trace!("Queued write for {}", key);
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.flush_pending()?;
        self.inner.flush()
    }
}

/// Handle to the background flusher task
pub struct FlusherHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FlusherHandle {
    /// Stop the flusher and wait for its final flush
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Storage flusher task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn make_storage(debounce_ms: u64) -> (Arc<MemoryStorage>, Arc<CoalescingStorage>) {
        let inner = Arc::new(MemoryStorage::new());
        let storage = CoalescingStorage::new(inner.clone(), debounce_ms);
        (inner, storage)
    }

    #[test]
    fn test_zero_debounce_writes_through() {
        let (inner, storage) = make_storage(0);
        storage.write("/button1.var", "1\n0\n127\n1\n").unwrap();
        assert_eq!(inner.write_count(), 1);
        assert_eq!(storage.pending_len(), 0);
    }

    #[test]
    fn test_rapid_writes_coalesce() {
        let (inner, storage) = make_storage(200);

        for value in 0..5 {
            storage
                .write("/button5.var", &format!("{}\n0\n56\n1\n", value))
                .unwrap();
        }

        assert_eq!(inner.write_count(), 0);
        assert_eq!(storage.read("/button5.var").unwrap(), "4\n0\n56\n1\n");

        // Not due yet
        assert_eq!(storage.flush_if_due(Instant::now()), 0);

        let later = Instant::now() + Duration::from_millis(250);
        assert_eq!(storage.flush_if_due(later), 1);
        assert_eq!(inner.write_count(), 1);
        assert_eq!(inner.get("/button5.var").unwrap(), "4\n0\n56\n1\n");
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn test_flush_forces_write() {
        let (inner, storage) = make_storage(10_000);
        storage.write("/button1.push", "CC 1 80 127\n").unwrap();
        storage.write("/button1.hold", "CC 1 81 127\n").unwrap();

        storage.flush().unwrap();
        assert_eq!(inner.write_count(), 2);
        assert_eq!(storage.pending_len(), 0);
    }

    #[test]
    fn test_read_falls_through_to_inner() {
        let (inner, storage) = make_storage(10_000);
        inner.write("/button2.flags", "1\n").unwrap();
        assert_eq!(storage.read("/button2.flags").unwrap(), "1\n");
        assert!(storage.read("/button2.var").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_flusher_writes_on_shutdown() {
        let (inner, storage) = make_storage(10_000);
        let flusher = storage.spawn_flusher();

        storage.write("/button6.var", "3\n0\n127\n1\n").unwrap();
        flusher.shutdown().await;

        assert_eq!(inner.get("/button6.var").unwrap(), "3\n0\n127\n1\n");
    }

    #[tokio::test]
    async fn test_flusher_flushes_after_window() {
        let (inner, storage) = make_storage(50);
        let flusher = storage.spawn_flusher();

        storage.write("/button4.var", "9\n0\n127\n1\n").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(inner.write_count(), 1);
        flusher.shutdown().await;
    }
}
