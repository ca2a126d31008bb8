//! The single control flow: owns the session and the curl multi handle, and
//! serializes commands, transfer events and timer ticks.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use crate::config::MirrorConfig;
use crate::events::{DownloadEvent, DownloadId, TaskResult};
use crate::probe;
use crate::session::{Session, SessionParams};
use crate::transport::{CurlConnector, TransportEvent};
use crate::url_model::destination_path;

use super::command::Command;
use super::start;

/// Longest single wait inside the transfer loop, so commands stay responsive.
const MAX_WAIT: Duration = Duration::from_millis(100);

pub(super) struct Dispatcher {
    cfg: MirrorConfig,
    commands: Receiver<Command>,
    events: UnboundedSender<DownloadEvent>,
    connector: CurlConnector,
    session: Option<Session>,
    next_tag: u64,
    next_tick: Instant,
}

impl Dispatcher {
    pub(super) fn new(
        cfg: MirrorConfig,
        commands: Receiver<Command>,
        events: UnboundedSender<DownloadEvent>,
    ) -> Self {
        let connector = CurlConnector::new(cfg.transfer);
        Self {
            cfg,
            commands,
            events,
            connector,
            session: None,
            next_tag: 0,
            next_tick: Instant::now(),
        }
    }

    pub(super) fn run(mut self) {
        loop {
            if self.session.is_none() {
                match self.commands.recv() {
                    Ok(cmd) => {
                        if !self.handle(cmd) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
                continue;
            }

            if !self.drain_commands() {
                break;
            }
            if self.session.is_none() {
                continue;
            }

            let now = Instant::now();
            if now >= self.next_tick {
                self.tick();
                self.next_tick = now + self.cfg.tick_interval();
            }
            self.settle();
            if self.session.is_none() {
                continue;
            }

            let wait = self.next_tick.saturating_duration_since(now).min(MAX_WAIT);
            match self.connector.pump(wait) {
                Ok(events) => self.deliver(events),
                Err(e) => {
                    tracing::error!("transfer loop failed: {:#}", e);
                    if let Some(session) = self.session.as_mut() {
                        session.fail(&mut self.connector);
                    }
                }
            }
            self.settle();
        }

        self.shutdown();
        tracing::debug!("dispatcher stopped");
    }

    /// Handle every queued command without blocking. False once the manager is gone.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => {
                    if !self.handle(cmd) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SetServers(servers) => {
                tracing::info!(count = servers.len(), "server list changed");
                self.cfg.servers = servers.clone();
                if let Some(session) = self.session.as_mut() {
                    session.set_servers(servers, &mut self.connector);
                }
                self.settle();
            }
            Command::SetDestinationFolder(folder) => {
                self.cfg.destination_folder = Some(folder);
            }
            Command::Start { path, id, reply } => {
                let started = if self.session.is_some() {
                    tracing::warn!(download_id = id, "a download is already active; refusing {}", path);
                    false
                } else {
                    self.start(path, id)
                };
                let _ = reply.send(started);
            }
            Command::Cancel { reply } => {
                let cancelled = match self.session.as_mut() {
                    Some(session) => {
                        session.cancel(&mut self.connector);
                        self.settle();
                        true
                    }
                    None => false,
                };
                let _ = reply.send(cancelled);
            }
            Command::DestinationPath { path, reply } => {
                let _ = reply.send(destination_path(&self.folder(), &path));
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn folder(&self) -> PathBuf {
        self.cfg
            .destination_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn start(&mut self, path: String, id: DownloadId) -> bool {
        let probe_cfg = self.cfg.probe;
        let prepared = match start::prepare(&self.cfg.servers, &self.folder(), &path, |url| {
            probe::probe(url, &probe_cfg)
        }) {
            Ok(prepared) => prepared,
            Err(result) => {
                self.emit(DownloadEvent::Stopped { result, id });
                return false;
            }
        };

        self.next_tag += 1;
        let params = SessionParams {
            tag: self.next_tag,
            id,
            remote_path: path,
            info: prepared.info,
            watchdog_max_ticks: self.cfg.watchdog_max_ticks,
            max_segment_retries: self.cfg.max_segment_retries,
        };
        let session = Session::launch(
            params,
            prepared.storage,
            self.cfg.servers.clone(),
            &prepared.unusable,
            &mut self.connector,
        );
        let launched =
            session.active_workers() > 0 || session.outcome() == Some(TaskResult::Success);
        self.session = Some(session);
        self.next_tick = Instant::now() + self.cfg.tick_interval();
        self.settle();
        launched
    }

    fn tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.on_tick(&mut self.connector);
        if session.outcome().is_none() {
            let progress = session.progress_event();
            self.emit(progress);
        }
    }

    fn deliver(&mut self, events: Vec<TransportEvent>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for event in events {
            match event {
                TransportEvent::Data(conn, data) => session.on_data(conn, &data, &mut self.connector),
                TransportEvent::Finished(conn, result) => {
                    session.on_finished(conn, result, &mut self.connector)
                }
            }
        }
    }

    /// Report and drop the session once it reached a terminal result.
    fn settle(&mut self) {
        if !self
            .session
            .as_ref()
            .is_some_and(|s| s.outcome().is_some())
        {
            return;
        }
        let Some(session) = self.session.take() else {
            return;
        };
        self.connector.abort_all();
        let id = session.id();
        let total = session.total_bytes();
        let result = session.finish();
        if result.is_success() {
            self.emit(DownloadEvent::Progress {
                bytes: total,
                total,
                id,
            });
        }
        self.emit(DownloadEvent::Stopped { result, id });
    }

    fn shutdown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.cancel(&mut self.connector);
        }
        self.settle();
    }

    fn emit(&self, event: DownloadEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}
