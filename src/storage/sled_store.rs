//! sled-backed storage

use super::{Storage, StorageError};
use std::path::Path;
use tracing::{info, trace};

/// Stores entries in an embedded sled database, one key per entry
#[derive(Clone)]
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    /// Open the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|source| StorageError::Database {
            key: path.display().to_string(),
            source,
        })?;
        info!("Sled storage opened at: {}", path.display());
        Ok(Self { db })
    }
}

impl Storage for SledStorage {
    fn read(&self, key: &str) -> Result<String, StorageError> {
        let value = self
            .db
            .get(key)
            .map_err(|source| StorageError::Database {
                key: key.to_string(),
                source,
            })?
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;

        String::from_utf8(value.to_vec()).map_err(|_| StorageError::Encoding {
            key: key.to_string(),
        })
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        let db_err = |source| StorageError::Database {
            key: key.to_string(),
            source,
        };
        self.db.insert(key, contents.as_bytes()).map_err(db_err)?;
        self.db.flush().map_err(db_err)?;
        trace!("Entry {} written to sled", key);
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|source| StorageError::Database {
                key: "<flush>".to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_and_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("buttons.sled");

        {
            let storage = SledStorage::open(&path).unwrap();
            storage.write("/button5.var", "23\n0\n56\n1\n").unwrap();
            assert!(storage.read("/button5.push").unwrap_err().is_not_found());
        }

        let storage = SledStorage::open(&path).unwrap();
        assert_eq!(storage.read("/button5.var").unwrap(), "23\n0\n56\n1\n");
    }
}
