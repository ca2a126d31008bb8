//! Events emitted towards the UI layer and the terminal result codes.

use serde::Serialize;
use std::fmt;

/// Caller-supplied identifier echoed back with every event of a session.
pub type DownloadId = i64;

/// Terminal outcome of a download session. Exactly one is reported per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Success,
    /// The destination file could not be created.
    FailCannotCreateFile,
    /// No server answered the probe, or a segment ran out of servers to try.
    FailNoViableServer,
    /// The session was cancelled by the caller.
    FailCancel,
    /// Anything not classified above (e.g. a disk write failing mid-session).
    Fail,
}

impl TaskResult {
    pub fn is_success(self) -> bool {
        self == TaskResult::Success
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskResult::Success => "success",
            TaskResult::FailCannotCreateFile => "cannot create destination file",
            TaskResult::FailNoViableServer => "no viable server",
            TaskResult::FailCancel => "cancelled",
            TaskResult::Fail => "failed",
        };
        f.write_str(s)
    }
}

/// Notification delivered on the manager's event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Periodic aggregate progress while a session is active.
    Progress {
        bytes: u64,
        total: u64,
        id: DownloadId,
    },
    /// Terminal event; the session no longer exists once this is sent.
    Stopped { result: TaskResult, id: DownloadId },
}

impl DownloadEvent {
    pub fn id(&self) -> DownloadId {
        match self {
            DownloadEvent::Progress { id, .. } | DownloadEvent::Stopped { id, .. } => *id,
        }
    }
}
