//! Persistent URI → cache file index.
//!
//! The index is one bincode blob (`index.bin`) in the cache base directory,
//! shared by every process using that directory. Each access follows the
//! same protocol:
//!
//! 1. take an exclusive advisory lock on `index.bin.lock`;
//! 2. reload the blob and merge unseen keys into the in-memory map
//!    (in-memory entries win, so concurrent writers converge);
//! 3. for writes, insert the entry and persist the whole map through a
//!    temp file plus rename.
//!
//! The lock lives on a sibling file because the rename in step 3 swaps the
//! index inode, which would silently drop a lock held on the index itself.
//!
//! An unreadable blob (truncated, foreign, or from another format version)
//! is logged and treated as an empty index. It is never an error.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bincode::Options;
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CacheError;
use crate::staging::StagingFile;

/// File name of the serialized index inside the cache base directory.
pub const INDEX_FILE_NAME: &str = "index.bin";

/// File name of the advisory lock guarding the index.
pub const INDEX_LOCK_FILE_NAME: &str = "index.bin.lock";

/// Bumped whenever [`IndexFile`] changes shape.
const INDEX_FORMAT_VERSION: u32 = 1;

/// Upper bound on the size of an index blob we are willing to decode.
const MAX_INDEX_BYTES: u64 = 64 * 1024 * 1024;

/// One entry of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Name of the cached file, relative to the cache base directory.
    pub file_name: String,
    /// When the entry was recorded (seconds since UNIX_EPOCH).
    pub installed_at_secs: i64,
}

/// On-disk layout of the index blob.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: HashMap<String, IndexEntry>,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_INDEX_BYTES)
}

/// In-memory view of the shared index, kept in sync with disk on every access.
#[derive(Debug)]
pub struct CacheIndex {
    path: PathBuf,
    lock_path: PathBuf,
    entries: HashMap<String, IndexEntry>,
}

impl CacheIndex {
    /// Create an index for the given cache base directory.
    ///
    /// Nothing is read or created until the first access.
    pub fn new(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join(INDEX_FILE_NAME),
            lock_path: base_dir.join(INDEX_LOCK_FILE_NAME),
            entries: HashMap::new(),
        }
    }

    /// Path of the serialized index.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the cache file name recorded for a key.
    pub fn get(&mut self, key: &str) -> Result<Option<IndexEntry>, CacheError> {
        let _lock = self.lock()?;
        self.reload();
        Ok(self.entries.get(key).cloned())
    }

    /// Record (or replace) the cache file name for a key and persist the index.
    pub fn put(&mut self, key: &str, file_name: impl Into<String>) -> Result<(), CacheError> {
        let _lock = self.lock()?;
        self.reload();

        let entry = IndexEntry {
            file_name: file_name.into(),
            installed_at_secs: chrono::Utc::now().timestamp(),
        };
        self.entries.insert(key.to_string(), entry);

        self.save()
    }

    /// All entries currently known, sorted by key.
    pub fn entries(&mut self) -> Result<Vec<(String, IndexEntry)>, CacheError> {
        let _lock = self.lock()?;
        self.reload();

        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Merge persisted entries into memory without overwriting known keys.
    fn reload(&mut self) {
        let Some(loaded) = self.load_from_disk() else {
            return;
        };

        let before = self.entries.len();
        for (key, entry) in loaded {
            self.entries.entry(key).or_insert(entry);
        }
        debug!(
            path = %self.path.display(),
            merged = self.entries.len() - before,
            total = self.entries.len(),
            "Reloaded download cache index"
        );
    }

    fn load_from_disk(&self) -> Option<HashMap<String, IndexEntry>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read download cache index, starting from an empty index");
                return None;
            }
        };

        match codec().deserialize::<IndexFile>(&bytes) {
            Ok(file) if file.version == INDEX_FORMAT_VERSION => Some(file.entries),
            Ok(file) => {
                warn!(
                    path = %self.path.display(),
                    found = file.version,
                    expected = INDEX_FORMAT_VERSION,
                    "Download cache index has an incompatible format version, starting from an empty index"
                );
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Download cache index is corrupt, starting from an empty index");
                None
            }
        }
    }

    fn save(&self) -> Result<(), CacheError> {
        let write_failed = |e| CacheError::WriteIndex {
            path: self.path.clone(),
            source: e,
        };

        let file = IndexFile {
            version: INDEX_FORMAT_VERSION,
            entries: self.entries.clone(),
        };
        let bytes = codec()
            .serialize(&file)
            .map_err(|e| write_failed(io::Error::other(e.to_string())))?;

        let mut staging = StagingFile::create(&self.path).map_err(write_failed)?;
        staging.write_all(&bytes).map_err(write_failed)?;
        staging.commit().map_err(write_failed)?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "Saved download cache index");
        Ok(())
    }

    /// Exclusive advisory lock, released when the returned file is dropped.
    fn lock(&self) -> Result<File, CacheError> {
        let lock_failed = |e| CacheError::Lock {
            path: self.lock_path.clone(),
            source: e,
        };

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(lock_failed)?;
        file.lock_exclusive().map_err(lock_failed)?;
        Ok(file)
    }
}
