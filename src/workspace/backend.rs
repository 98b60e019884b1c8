//! Where the workspace registry document lives

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::StoreError;
use crate::lock;

/// Key/value persistence for serialized documents
pub trait MetaBackend: Send + Sync {
    /// Read the document stored under `key`, `None` if never written
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the document stored under `key`
    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError>;
}

/// One JSON file per key inside a directory
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl MetaBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Write beside the target and rename so readers never see a torn file
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, contents).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }
}

/// In-process backend for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with a document
    pub fn with_document(key: &str, contents: &str) -> Self {
        let backend = Self::default();
        lock(&backend.entries).insert(key.to_string(), contents.to_string());
        backend
    }

    /// Make subsequent writes fail, simulating a full or read-only disk
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl MetaBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from(key),
                source: io::Error::new(io::ErrorKind::Other, "write refused"),
            });
        }
        lock(&self.entries).insert(key.to_string(), contents.to_string());
        Ok(())
    }
}
