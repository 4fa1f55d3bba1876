//! Directory-backed storage: each key is a file below the root directory

use super::{Storage, StorageError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stores each entry as a file (`/button1.push` -> `<root>/button1.push`)
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        info!("File storage at: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<String, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(StorageError::Encoding {
                key: key.to_string(),
            }),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        std::fs::write(self.path_for(key), contents).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        debug!("Wrote {} ({} bytes)", key, contents.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();

        storage.write("/button1.push", "CC 1 80 127\n").unwrap();
        assert_eq!(storage.read("/button1.push").unwrap(), "CC 1 80 127\n");
        assert!(temp.path().join("button1.push").exists());
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();

        let err = storage.read("/button2.hold").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_creates_directory() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("nested").join("buttons");
        let storage = FileStorage::open(&root).unwrap();
        assert!(storage.root().is_dir());
    }
}
