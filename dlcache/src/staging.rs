//! Write-then-rename staging files.
//!
//! Content destined for a path is written to a hidden sibling first and
//! renamed over the destination only once complete, so readers of the
//! destination never observe a partially written file. A staging file that
//! is dropped without being committed is removed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STAGING_ID: AtomicU64 = AtomicU64::new(0);

/// A temporary file that atomically replaces `final_path` on commit.
#[derive(Debug)]
pub struct StagingFile {
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StagingFile {
    /// Create a staging file next to `final_path`.
    ///
    /// The parent directory must already exist.
    pub fn create(final_path: &Path) -> io::Result<Self> {
        let parent = final_path.parent().unwrap_or_else(|| Path::new("."));
        let name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", final_path.display()),
                )
            })?;

        let temp_path = parent.join(format!(
            ".{}.{}.{}.part",
            name,
            std::process::id(),
            NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed)
        ));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;

        Ok(Self {
            file: Some(file),
            temp_path,
            final_path: final_path.to_path_buf(),
        })
    }

    /// Path of the temporary file holding the staged content.
    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// Path the content will be renamed to on commit.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Flush to disk and rename over the final path.
    pub fn commit(mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        fs::rename(&self.temp_path, &self.final_path)
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file already closed"))
    }
}

impl Write for StagingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        // After a successful commit the temp path no longer exists.
        self.file.take();
        let _ = fs::remove_file(&self.temp_path);
    }
}

/// Copy `source` over `dest` atomically.
///
/// Returns the number of bytes copied.
pub fn copy_atomically(source: &Path, dest: &Path) -> io::Result<u64> {
    let mut reader = File::open(source)?;
    let mut staging = StagingFile::create(dest)?;
    let bytes = io::copy(&mut reader, &mut staging)?;
    staging.commit()?;
    Ok(bytes)
}
