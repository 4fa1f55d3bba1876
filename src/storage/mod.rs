//! Storage collaborator for button configuration
//!
//! Button configuration is kept as small named text entries, one per button
//! and concern:
//!
//! ```text
//! /button1.push        CC 1 80 127,CC 1 80 0
//! /button1.hold        CC 1 81 127,CC 1 81 0
//! /button1.doublepush
//! /button1.flags       0
//! /button1.var         value\nmin\nmax\nstep\n
//! ```
//!
//! The [`Storage`] trait only needs read/write by name. Backends: a directory
//! on disk ([`FileStorage`]), an embedded sled database ([`SledStorage`]) and
//! an in-memory map ([`MemoryStorage`]). [`CoalescingStorage`] wraps any of
//! them to batch high-frequency writes.

mod coalescing;
mod file;
mod memory;
mod sled_store;

pub use coalescing::{CoalescingStorage, FlusherHandle};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sled_store::SledStorage;

use crate::button::ButtonId;
use thiserror::Error;

/// Errors reported by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no stored entry for '{key}'")]
    NotFound { key: String },

    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database error on '{key}': {source}")]
    Database {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("entry '{key}' is not valid UTF-8")]
    Encoding { key: String },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Named text storage used for button configuration
///
/// Calls are synchronous and may block; they are made from the controller
/// loop only.
pub trait Storage: Send + Sync {
    /// Read the entry stored under `key`
    fn read(&self, key: &str) -> Result<String, StorageError>;

    /// Replace the entry stored under `key`
    fn write(&self, key: &str, contents: &str) -> Result<(), StorageError>;

    /// Make buffered writes durable
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// The per-button entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Push,
    Hold,
    DoublePush,
    Flags,
    Variable,
}

impl EntryKind {
    pub fn extension(self) -> &'static str {
        match self {
            EntryKind::Push => ".push",
            EntryKind::Hold => ".hold",
            EntryKind::DoublePush => ".doublepush",
            EntryKind::Flags => ".flags",
            EntryKind::Variable => ".var",
        }
    }
}

/// Storage key for one button entry, e.g. `/button3.doublepush`
pub fn entry_key(button: ButtonId, kind: EntryKind) -> String {
    format!("/button{}{}", button.number(), kind.extension())
}

/// First line of a stored entry, without its line terminator
pub fn first_line(contents: &str) -> &str {
    contents
        .split(['\r', '\n'])
        .next()
        .unwrap_or("")
}
