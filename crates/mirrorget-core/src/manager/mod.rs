//! Public handle of the worker plane.
//!
//! A [`DownloadManager`] owns one dispatcher thread. Every operation is a
//! message to that thread; operations with a return value wait for its reply.
//! Events arrive on the unbounded receiver returned by [`DownloadManager::spawn`].

mod command;
mod dispatcher;
mod start;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::config::MirrorConfig;
use crate::events::{DownloadEvent, DownloadId};
use crate::url_model::destination_path;

use command::Command;
use dispatcher::Dispatcher;

pub struct DownloadManager {
    commands: mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl DownloadManager {
    /// Start the dispatcher thread with `cfg` (servers, destination folder, timing).
    pub fn spawn(cfg: MirrorConfig) -> Result<(Self, UnboundedReceiver<DownloadEvent>)> {
        let (commands, command_rx) = mpsc::channel();
        let (events, event_rx) = unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("mirrorget-dispatch".into())
            .spawn(move || Dispatcher::new(cfg, command_rx, events).run())
            .context("spawn dispatcher thread")?;
        Ok((
            Self {
                commands,
                thread: Some(thread),
            },
            event_rx,
        ))
    }

    fn send(&self, cmd: Command) -> bool {
        if self.commands.send(cmd).is_err() {
            tracing::warn!("dispatcher thread is gone");
            return false;
        }
        true
    }

    fn request<T>(&self, make: impl FnOnce(mpsc::Sender<T>) -> Command) -> Option<T> {
        let (reply, rx) = mpsc::channel();
        if !self.send(make(reply)) {
            return None;
        }
        rx.recv().ok()
    }

    /// Replace the mirror list. An active session keeps its live connections
    /// and uses the new list for every later reassignment.
    pub fn set_servers(&self, servers: Vec<String>) {
        self.send(Command::SetServers(servers));
    }

    pub fn set_destination_folder(&self, folder: impl Into<PathBuf>) {
        self.send(Command::SetDestinationFolder(folder.into()));
    }

    /// Start downloading `relative_path`; `id` is echoed in every event.
    ///
    /// Returns `false` when a session is already active (no event), or when
    /// no connection could be started (a `Stopped` event has been sent
    /// before this returns).
    pub fn start_new_download(&self, relative_path: &str, id: DownloadId) -> bool {
        self.request(|reply| Command::Start {
            path: relative_path.to_string(),
            id,
            reply,
        })
        .unwrap_or(false)
    }

    /// Pausing is not supported. Always returns `false` and leaves any
    /// active session running; use [`cancel_current_download`](Self::cancel_current_download).
    pub fn pause_current_download(&self) -> bool {
        tracing::debug!("pause requested; not supported");
        false
    }

    /// Cancel the active session. `false` if there is none.
    pub fn cancel_current_download(&self) -> bool {
        self.request(|reply| Command::Cancel { reply })
            .unwrap_or(false)
    }

    /// Local path `relative_path` is (or would be) written to.
    pub fn destination_path(&self, relative_path: &str) -> PathBuf {
        self.request(|reply| Command::DestinationPath {
            path: relative_path.to_string(),
            reply,
        })
        .unwrap_or_else(|| destination_path(Path::new("."), relative_path))
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("dispatcher thread panicked");
            }
        }
    }
}
