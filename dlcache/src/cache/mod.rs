//! Shared on-disk download cache.
//!
//! The cache base directory holds one index file and one content file per
//! source URI:
//!
//! ```text
//! <base>/
//!   index.bin                      URI → file name (see [`CacheIndex`])
//!   index.bin.lock                 advisory lock for the index
//!   lib-1.0.jar_3f2a…              content, named <original>_<uri hash>
//! ```
//!
//! Lookups are self-healing: an entry whose file is missing or fails the
//! caller's checksums is reported as a miss, and the next install simply
//! repopulates it. Nothing is pruned eagerly.

mod index;
mod uri;

pub use index::{CacheIndex, IndexEntry, INDEX_FILE_NAME, INDEX_LOCK_FILE_NAME};
pub use uri::{cache_key, cached_file_name, normalize_uri, original_file_name, InvalidUri};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::checksum::{self, ChecksumSet};
use crate::staging::copy_atomically;

/// Errors raised by the download cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The configured base path exists but is not a directory.
    #[error("cache path {} exists but is not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    /// The base directory could not be created.
    #[error("failed to create cache directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index lock could not be taken.
    #[error("failed to lock cache index {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index could not be persisted.
    #[error("failed to write cache index {}: {source}", .path.display())]
    WriteIndex {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copying an artifact into the cache failed.
    #[error("failed to copy {} into the cache as {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    /// Whether this error reflects a misconfigured cache rather than an I/O fault.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotADirectory { .. })
    }
}

/// A cache entry as reported by [`DownloadCache::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Normalized source URI.
    pub uri: String,
    /// Cached file name inside the base directory.
    pub file_name: String,
    /// Absolute path of the cached file.
    pub path: PathBuf,
    /// When the entry was recorded.
    pub installed_at: Option<DateTime<Utc>>,
    /// Whether the cached file is currently present on disk.
    pub present: bool,
}

/// Download cache rooted at a base directory.
///
/// All index access inside one process is serialized by an internal mutex;
/// the index's advisory file lock covers other processes.
#[derive(Debug)]
pub struct DownloadCache {
    base_dir: PathBuf,
    index: Mutex<CacheIndex>,
}

impl DownloadCache {
    /// Create a cache rooted at `base_dir`.
    ///
    /// The directory is created lazily on first use.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let index = CacheIndex::new(&base_dir);
        Self {
            base_dir,
            index: Mutex::new(index),
        }
    }

    /// The cache base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Return the cached file for `uri` if it exists and satisfies `checksums`.
    ///
    /// A missing or tampered file is reported as `Ok(None)`, never as an error.
    pub fn get_artifact(
        &self,
        uri: &Url,
        checksums: &ChecksumSet,
    ) -> Result<Option<PathBuf>, CacheError> {
        let mut index = self.index.lock();
        self.ensure_base_dir()?;
        self.lookup_valid(&mut index, uri, checksums)
    }

    /// Copy `source` into the cache as the artifact for `uri`.
    ///
    /// A still-valid entry for `(uri, checksums)` makes this a no-op. Returns
    /// the path of the cached file.
    pub fn install(
        &self,
        uri: &Url,
        source: &Path,
        checksums: &ChecksumSet,
    ) -> Result<PathBuf, CacheError> {
        let mut index = self.index.lock();
        self.ensure_base_dir()?;

        if let Some(existing) = self.lookup_valid(&mut index, uri, checksums)? {
            debug!(uri = %uri, path = %existing.display(), "Artifact already cached, skipping install");
            return Ok(existing);
        }

        let file_name = cached_file_name(uri);
        let dest = self.base_dir.join(&file_name);
        let bytes = copy_atomically(source, &dest).map_err(|e| CacheError::Copy {
            from: source.to_path_buf(),
            to: dest.clone(),
            source: e,
        })?;
        index.put(cache_key(uri), file_name)?;

        info!(uri = %uri, path = %dest.display(), bytes, "Installed artifact into download cache");
        Ok(dest)
    }

    /// List all entries recorded in the index.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut index = self.index.lock();
        if !self.base_dir.is_dir() {
            return Ok(Vec::new());
        }

        Ok(index
            .entries()?
            .into_iter()
            .map(|(uri, entry)| {
                let path = self.base_dir.join(&entry.file_name);
                CacheEntry {
                    present: path.is_file(),
                    installed_at: DateTime::from_timestamp(entry.installed_at_secs, 0),
                    uri,
                    file_name: entry.file_name,
                    path,
                }
            })
            .collect())
    }

    fn lookup_valid(
        &self,
        index: &mut CacheIndex,
        uri: &Url,
        checksums: &ChecksumSet,
    ) -> Result<Option<PathBuf>, CacheError> {
        let Some(entry) = index.get(cache_key(uri))? else {
            debug!(uri = %uri, "Download cache miss");
            return Ok(None);
        };

        let path = self.base_dir.join(&entry.file_name);
        if !path.is_file() {
            debug!(uri = %uri, path = %path.display(), "Cached file is missing, treating as miss");
            return Ok(None);
        }
        if !checksum::is_valid(&path, checksums) {
            debug!(uri = %uri, path = %path.display(), "Cached file failed checksum, treating as miss");
            return Ok(None);
        }

        Ok(Some(path))
    }

    fn ensure_base_dir(&self) -> Result<(), CacheError> {
        if self.base_dir.exists() && !self.base_dir.is_dir() {
            return Err(CacheError::NotADirectory {
                path: self.base_dir.clone(),
            });
        }
        fs::create_dir_all(&self.base_dir).map_err(|e| CacheError::CreateDir {
            path: self.base_dir.clone(),
            source: e,
        })
    }
}
