//! `mirrorget dest <path>` – print the local destination of a remote path.

use mirrorget_core::config::MirrorConfig;
use mirrorget_core::url_model::destination_path;
use std::path::Path;

pub fn run_dest(cfg: &MirrorConfig, path: &str) {
    let folder = cfg
        .destination_folder
        .as_deref()
        .unwrap_or_else(|| Path::new("."));
    println!("{}", destination_path(folder, path).display());
}
