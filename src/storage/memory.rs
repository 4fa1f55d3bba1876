//! In-memory storage, used for tests and the `memory` backend

use super::{Storage, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// HashMap-backed storage that counts writes
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `write` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<String, StorageError> {
        self.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), contents.to_string());
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
