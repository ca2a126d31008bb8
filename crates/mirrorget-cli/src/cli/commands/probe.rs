//! `mirrorget probe <path>` – query every mirror for the file's metadata.

use anyhow::{bail, Context, Result};
use mirrorget_core::config::MirrorConfig;
use mirrorget_core::probe;
use mirrorget_core::url_model::mirror_url;

pub async fn run_probe(cfg: &MirrorConfig, path: &str, servers: Vec<String>) -> Result<()> {
    let servers = if servers.is_empty() {
        cfg.servers.clone()
    } else {
        servers
    };
    if servers.is_empty() {
        bail!("no mirrors configured; pass --server or run `mirrorget servers set`");
    }

    println!("  {:<40}  {:>12}  {:>6}  {}", "Mirror", "Size", "Ranges", "Hash");
    for server in servers {
        let url = mirror_url(&server, path)?;
        let probe_cfg = cfg.probe;
        let info = tokio::task::spawn_blocking(move || probe::probe(&url, &probe_cfg))
            .await
            .context("probe task join")?;
        let size = info
            .size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let hash = if info.content_hash.is_empty() {
            "-".to_string()
        } else {
            info.content_hash_hex()
        };
        println!(
            "  {:<40}  {:>12}  {:>6}  {}",
            server,
            size,
            if info.supports_partial_download { "yes" } else { "no" },
            hash
        );
    }
    Ok(())
}
