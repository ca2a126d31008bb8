//! Mirror URL construction and destination path derivation.
//!
//! A remote path is always relative (no domain, no leading slash required);
//! it is appended to each mirror base address and its last component names
//! the local file.

mod path;
mod sanitize;

pub use path::{file_name_from_relative_path, mirror_url};
pub use sanitize::sanitize_filename;

use std::path::{Path, PathBuf};

/// Default filename when the relative path yields nothing usable.
const DEFAULT_FILENAME: &str = "download.bin";

/// Where a download of `relative_path` lands inside `destination_folder`. Pure.
///
/// # Examples
///
/// - `("/srv/dl", "store/pool/app_1.0.deb")` → `/srv/dl/app_1.0.deb`
/// - `("/srv/dl", "store/")` → `/srv/dl/store`
pub fn destination_path(destination_folder: &Path, relative_path: &str) -> PathBuf {
    let name = file_name_from_relative_path(relative_path)
        .map(|raw| sanitize_filename(&raw))
        .filter(|s| !s.is_empty() && s != "." && s != "..")
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    destination_folder.join(name)
}
