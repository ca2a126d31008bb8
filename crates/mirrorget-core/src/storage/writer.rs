//! Positional writer for the destination file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::PathBuf;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Writer for the destination file. Each `write_at` is independent of any cursor
/// (pwrite-style); callers keep their ranges disjoint.
pub struct StorageWriter {
    file: File,
    path: PathBuf,
}

impl StorageWriter {
    /// Create from an open file and path (used by StorageWriterBuilder).
    pub(crate) fn from_file_and_path(file: File, path: PathBuf) -> Self {
        Self {
            file,
            path,
        }
    }

    /// Write all of `data` at `offset`.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .with_context(|| format!("write {} bytes at offset {}", data.len(), offset))
    }

    /// Non-Unix fallback: seek + write on a cloned handle.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
            .with_context(|| format!("write {} bytes at offset {}", data.len(), offset))
    }

    /// Sync data to disk and close the file, leaving it in place.
    pub fn close(self) -> Result<()> {
        self.file.sync_all().context("storage sync failed")?;
        Ok(())
    }

    /// Close the file and delete it (cancellation).
    pub fn discard(self) {
        let path = self.path.clone();
        drop(self.file);
        super::remove_quietly(&path);
    }
}
