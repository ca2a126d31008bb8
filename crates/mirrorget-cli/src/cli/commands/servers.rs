//! `mirrorget servers list|set` – read or persist the mirror list.

use anyhow::Result;
use mirrorget_core::config::{self, MirrorConfig};
use mirrorget_core::url_model::mirror_url;

use crate::cli::ServersCommand;

pub fn run_servers(mut cfg: MirrorConfig, command: ServersCommand) -> Result<()> {
    match command {
        ServersCommand::List => {
            if cfg.servers.is_empty() {
                println!("No mirrors configured.");
            }
            for (i, server) in cfg.servers.iter().enumerate() {
                println!("{:>3}  {}", i, server);
            }
        }
        ServersCommand::Set { urls } => {
            for url in &urls {
                mirror_url(url, "")?;
            }
            cfg.servers = urls;
            config::save(&cfg)?;
            tracing::info!(count = cfg.servers.len(), "mirror list saved");
            println!("Saved {} mirror(s).", cfg.servers.len());
        }
    }
    Ok(())
}
