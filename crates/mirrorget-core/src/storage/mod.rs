//! Destination file lifecycle.
//!
//! The file is created (truncated) before any network activity, preallocated
//! once the size is known, written at absolute offsets by the segment workers,
//! and finally either closed in place or removed.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

/// Removes `path`, treating "already gone" as success.
pub(crate) fn remove_quietly(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove destination file: {}", e),
    }
}
