//! RemoteFileProbe: one-shot blocking HEAD request.
//!
//! Uses the curl crate (libcurl) to learn the size of the remote file, whether
//! the mirror serves byte ranges, and any content hash it advertises. Runs in
//! the calling thread; the dispatcher calls it once per session, before
//! planning segments.

mod parse;

use anyhow::{Context, Result};
use std::str;
use std::time::Duration;

use crate::config::ProbeConfig;

/// What a mirror told us about the remote file. Immutable once probed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFileInfo {
    /// Total size in bytes; `None` means unknown or the probe failed.
    pub size: Option<u64>,
    /// True if the server sent `Accept-Ranges: bytes`.
    pub supports_partial_download: bool,
    /// Raw `Content-MD5` value, forwarded untouched to an external verifier.
    pub content_hash: Vec<u8>,
}

impl RemoteFileInfo {
    /// Sentinel returned when a mirror could not be reached or did not report a size.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// True when the probe produced a usable size.
    pub fn is_viable(&self) -> bool {
        self.size.is_some()
    }

    /// Content hash as lowercase hex (empty when none was advertised).
    pub fn content_hash_hex(&self) -> String {
        hex::encode(&self.content_hash)
    }
}

/// Probes `url` and returns its metadata, or [`RemoteFileInfo::unreachable`]
/// when the request fails for any reason. Never panics, never retries.
pub fn probe(url: &str, cfg: &ProbeConfig) -> RemoteFileInfo {
    match head(url, cfg) {
        Ok(info) => info,
        Err(e) => {
            tracing::debug!(%url, "probe failed: {:#}", e);
            RemoteFileInfo::unreachable()
        }
    }
}

/// Performs the HEAD request and parses the interesting headers.
fn head(url: &str, cfg: &ProbeConfig) -> Result<RemoteFileInfo> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.nobody(true)?; // HEAD request
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))?;
    easy.timeout(Duration::from_secs(cfg.timeout_secs))?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                // A new status line starts the headers of the next hop in a redirect chain.
                if line.starts_with("HTTP/") {
                    headers.clear();
                }
                headers.push(line.to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }

    Ok(parse::parse_headers(&headers))
}
