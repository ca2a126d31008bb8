//! Builder for creating and preallocating the destination file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a new destination file. Call `preallocate` then `build` to get
/// a `StorageWriter` for offset writes.
pub struct StorageWriterBuilder {
    file: File,
    path: PathBuf,
}

impl StorageWriterBuilder {
    /// Create (or truncate) the file at `path`. Fails if the folder is missing or not writable.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create destination file: {}", path.display()))?;
        Ok(StorageWriterBuilder {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Preallocate `size` bytes. On Unix tries `posix_fallocate` for real block
    /// allocation; falls back to `set_len` on failure or non-Unix.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate file")?;
        Ok(())
    }

    /// Close and delete the file before any data was written (e.g. every probe failed).
    pub fn discard(self) {
        drop(self.file);
        super::remove_quietly(&self.path);
    }

    /// Finish building and return the writer.
    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.path)
    }
}
