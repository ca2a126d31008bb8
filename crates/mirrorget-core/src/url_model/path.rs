//! Relative remote paths: filename extraction and joining onto a mirror base.

use anyhow::{Context, Result};

/// Extracts the last path component of a relative remote path for use as a filename.
///
/// Query strings and fragments are stripped. Returns `None` for empty paths and
/// for `.` / `..` components.
pub fn file_name_from_relative_path(relative_path: &str) -> Option<String> {
    let path = relative_path
        .split(['?', '#'])
        .next()
        .unwrap_or(relative_path);
    let segment = path.split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Full URL of `relative_path` on the mirror at `base`.
///
/// Exactly one `/` separates base and path regardless of how either is written;
/// a base path prefix (e.g. `https://m.example/pub`) is kept.
pub fn mirror_url(base: &str, relative_path: &str) -> Result<String> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base = url::Url::parse(&base).with_context(|| format!("invalid mirror address: {}", base))?;
    let joined = base
        .join(relative_path.trim_start_matches('/'))
        .with_context(|| format!("invalid remote path: {}", relative_path))?;
    Ok(joined.to_string())
}
