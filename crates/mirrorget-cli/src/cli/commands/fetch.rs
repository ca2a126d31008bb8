//! `mirrorget fetch <path>` – run one download session and report its events.

use anyhow::{bail, Context, Result};
use mirrorget_core::config::MirrorConfig;
use mirrorget_core::session::ProgressStats;
use mirrorget_core::{DownloadEvent, DownloadManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct FetchArgs {
    pub path: String,
    pub id: i64,
    pub servers: Vec<String>,
    pub dest: Option<PathBuf>,
    pub json: bool,
}

fn print_progress(stats: &ProgressStats) {
    let done_mib = stats.bytes_done as f64 / 1_048_576.0;
    let total_mib = stats.total_bytes as f64 / 1_048_576.0;
    let pct = stats.fraction() * 100.0;
    let rate_mib = stats.bytes_per_sec() / 1_048_576.0;
    let eta = stats
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    println!(
        "  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}",
        done_mib, total_mib, pct, rate_mib, eta
    );
}

/// Returns the process exit code: 0 on success, 1 otherwise.
pub async fn run_fetch(mut cfg: MirrorConfig, args: FetchArgs) -> Result<i32> {
    if !args.servers.is_empty() {
        cfg.servers = args.servers;
    }
    if let Some(dest) = args.dest {
        cfg.destination_folder = Some(dest);
    }
    if cfg.servers.is_empty() {
        bail!("no mirrors configured; pass --server or run `mirrorget servers set`");
    }

    let (manager, mut events) = DownloadManager::spawn(cfg)?;
    let manager = Arc::new(manager);
    let target = manager.destination_path(&args.path);
    let started_at = Instant::now();

    // The start-up probe blocks; keep it off the runtime threads.
    let starter = Arc::clone(&manager);
    let path = args.path.clone();
    let id = args.id;
    let started = tokio::task::spawn_blocking(move || starter.start_new_download(&path, id))
        .await
        .context("start task join")?;
    tracing::debug!(started, "start_new_download returned");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("download manager stopped without a result");
                };
                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                }
                match event {
                    DownloadEvent::Progress { bytes, total, .. } => {
                        if !args.json {
                            print_progress(&ProgressStats::since(started_at, bytes, total));
                        }
                    }
                    DownloadEvent::Stopped { result, .. } => {
                        if !args.json {
                            println!("{}: {}", target.display(), result);
                        }
                        return Ok(if result.is_success() { 0 } else { 1 });
                    }
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("interrupted; cancelling download");
                let canceller = Arc::clone(&manager);
                tokio::task::spawn_blocking(move || canceller.cancel_current_download())
                    .await
                    .context("cancel task join")?;
            }
        }
    }
}
