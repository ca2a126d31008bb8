use std::path::PathBuf;
use std::sync::mpsc::Sender;

use crate::events::DownloadId;

/// Requests from the [`DownloadManager`](super::DownloadManager) handle to the dispatcher.
pub(super) enum Command {
    SetServers(Vec<String>),
    SetDestinationFolder(PathBuf),
    Start {
        path: String,
        id: DownloadId,
        reply: Sender<bool>,
    },
    Cancel {
        reply: Sender<bool>,
    },
    DestinationPath {
        path: String,
        reply: Sender<PathBuf>,
    },
    Shutdown,
}
