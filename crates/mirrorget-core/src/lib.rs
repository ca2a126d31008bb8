pub mod config;
pub mod logging;

pub mod events;
pub mod manager;
pub mod probe;
pub mod retry;
pub mod segmenter;
pub mod session;
pub mod storage;
pub mod transport;
pub mod url_model;

pub use events::{DownloadEvent, DownloadId, TaskResult};
pub use manager::DownloadManager;
pub use probe::RemoteFileInfo;
