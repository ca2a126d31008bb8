use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum number of times one segment is reassigned to a different server.
pub const MAXIMUM_THREAD_RETRY_COUNT: u32 = 3;

/// A worker whose watchdog counter exceeds this many silent ticks is stalled.
pub const WATCHDOG_MAXIMUM: u32 = 7;

/// Metadata probe timeouts (optional section in config.toml).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub connect_timeout_secs: u64,
    /// Upper bound on one HEAD request, so an unresponsive mirror cannot block start-up forever.
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            timeout_secs: 30,
        }
    }
}

/// Options applied to every segment connection (optional section in config.toml).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Connect timeout in seconds; `None` uses 30s.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Optional curl receive buffer size in bytes (None = library default).
    #[serde(default)]
    pub buffer_size: Option<usize>,
}

impl TransferConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(30))
    }
}

/// Global configuration loaded from `~/.config/mirrorget/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Ordered mirror base addresses.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Folder downloads are written to (None = current directory).
    #[serde(default)]
    pub destination_folder: Option<PathBuf>,
    /// Period of the timer driving both the watchdog and progress events.
    pub tick_interval_ms: u64,
    /// Silent ticks tolerated before a connection is declared stalled.
    pub watchdog_max_ticks: u32,
    /// Per-segment reassignment budget.
    pub max_segment_retries: u32,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            destination_folder: None,
            tick_interval_ms: 1000,
            watchdog_max_ticks: WATCHDOG_MAXIMUM,
            max_segment_retries: MAXIMUM_THREAD_RETRY_COUNT,
            probe: ProbeConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl MirrorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mirrorget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MirrorConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] but for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<MirrorConfig> {
    if !path.exists() {
        let default_cfg = MirrorConfig::default();
        save_at(path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MirrorConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Persist `cfg` (e.g. after the server list changed).
pub fn save(cfg: &MirrorConfig) -> Result<()> {
    save_at(&config_path()?, cfg)
}

pub fn save_at(path: &Path, cfg: &MirrorConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
