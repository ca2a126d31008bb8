//! Download session state machine.
//!
//! A [`Session`] owns everything mutable about one download: the live workers,
//! the retry queue, byte counters and the destination file. It performs no
//! network I/O itself; it asks a [`Connector`] to open or abort connections and
//! is told about data, completions and timer ticks through its `on_*` methods.
//! All calls come from one thread (the dispatcher), so no state is shared.

mod progress;
mod watchdog;
mod worker;

#[cfg(test)]
mod tests;

pub use progress::ProgressStats;
pub use worker::SegmentProgress;

use crate::events::{DownloadEvent, DownloadId, TaskResult};
use crate::probe::RemoteFileInfo;
use crate::retry::{self, ConnectionError, RetryDecision, RetryQueue};
use crate::segmenter::{plan_segments, segment_count, Segment};
use crate::storage::StorageWriter;
use crate::url_model::mirror_url;

use progress::ProgressAggregator;
use worker::{Worker, WorkerPool};

/// Identifies one connection: the session that owns it and a per-session serial.
///
/// Events tagged with another session's number are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    pub session: u64,
    pub worker: u64,
}

/// A ranged read the connector should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub url: String,
    pub server: String,
    /// First byte wanted (absolute file offset).
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
    /// Plain GET of the whole file (mirror does not serve ranges, nothing received yet).
    pub whole_file: bool,
}

impl RangeRequest {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inclusive `start-end` form expected by curl's range option.
    pub fn curl_range(&self) -> String {
        format!("{}-{}", self.start, self.end.saturating_sub(1))
    }
}

/// Network side of a session: opens and aborts segment connections.
pub trait Connector {
    fn open(&mut self, conn: ConnId, request: &RangeRequest) -> Result<(), ConnectionError>;
    fn abort(&mut self, conn: ConnId);
}

/// Fixed inputs of a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Internal serial distinguishing this session from earlier ones.
    pub tag: u64,
    pub id: DownloadId,
    pub remote_path: String,
    pub info: RemoteFileInfo,
    pub watchdog_max_ticks: u32,
    pub max_segment_retries: u32,
}

/// Where a segment currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentState {
    Active { server: String },
    Queued,
    Completed,
}

/// Read-only view of one committed segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentView {
    pub start: u64,
    pub end: u64,
    pub received: u64,
    pub state: SegmentState,
}

pub struct Session {
    tag: u64,
    id: DownloadId,
    remote_path: String,
    info: RemoteFileInfo,
    servers: Vec<String>,
    storage: Option<StorageWriter>,
    pool: WorkerPool,
    queue: RetryQueue,
    completed: Vec<Segment>,
    progress: ProgressAggregator,
    next_worker: u64,
    watchdog_max_ticks: u32,
    max_segment_retries: u32,
    outcome: Option<TaskResult>,
}

impl Session {
    /// Plans segments and opens one connection per segment.
    ///
    /// `servers` is the current mirror list; `unusable` are mirrors that failed
    /// the start-up probe. They are never picked for this session. The
    /// returned session may already be terminal (zero-length file, or every
    /// connection failed to open); check [`Session::outcome`].
    pub fn launch(
        params: SessionParams,
        storage: StorageWriter,
        servers: Vec<String>,
        unusable: &[String],
        connector: &mut dyn Connector,
    ) -> Session {
        let total = params.info.size.unwrap_or(0);
        let mut session = Session {
            tag: params.tag,
            id: params.id,
            remote_path: params.remote_path,
            info: params.info,
            servers,
            storage: Some(storage),
            pool: WorkerPool::default(),
            queue: RetryQueue::new(),
            completed: Vec::new(),
            progress: ProgressAggregator::new(total),
            next_worker: 0,
            watchdog_max_ticks: params.watchdog_max_ticks,
            max_segment_retries: params.max_segment_retries,
            outcome: None,
        };

        let usable: Vec<usize> = (0..session.servers.len())
            .filter(|&i| !unusable.contains(&session.servers[i]))
            .collect();
        let count = segment_count(
            total,
            session.info.supports_partial_download,
            usable.len(),
        );
        let plan = plan_segments(total, count);
        tracing::info!(
            session = session.tag,
            download_id = session.id,
            size = total,
            segments = plan.len(),
            partial = session.info.supports_partial_download,
            "starting download of {}",
            session.remote_path
        );

        if plan.is_empty() {
            session.outcome = Some(TaskResult::Success);
            return session;
        }
        if usable.is_empty() {
            session.outcome = Some(TaskResult::FailNoViableServer);
            return session;
        }

        // One planned segment per mirror; refusals are routed only once every
        // planned mirror holds its own connection.
        let mut refused = Vec::new();
        for (segment, &server) in plan.into_iter().zip(usable.iter()) {
            let mut progress = SegmentProgress::new(segment);
            progress.tried = unusable.to_vec();
            if let Err(progress) = session.spawn(progress, server, connector) {
                refused.push(progress);
            }
        }
        for progress in refused {
            session.route(progress, connector);
            if session.outcome.is_some() {
                break;
            }
        }
        if session.outcome.is_none() {
            session.assign_queued(connector);
        }
        session.settle(connector);
        session
    }

    pub fn id(&self) -> DownloadId {
        self.id
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn info(&self) -> &RemoteFileInfo {
        &self.info
    }

    /// Terminal result, once the session has reached one.
    pub fn outcome(&self) -> Option<TaskResult> {
        self.outcome
    }

    pub fn active_workers(&self) -> usize {
        self.pool.len()
    }

    pub fn queued_segments(&self) -> usize {
        self.queue.len()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.progress.downloaded()
    }

    pub fn total_bytes(&self) -> u64 {
        self.progress.total()
    }

    pub fn progress_event(&self) -> DownloadEvent {
        self.progress.event(self.id)
    }

    /// Every committed segment (active, queued, completed), sorted by offset.
    pub fn segments(&self) -> Vec<SegmentView> {
        let mut out: Vec<SegmentView> = self
            .pool
            .iter()
            .map(|w| SegmentView {
                start: w.segment.begin,
                end: w.segment.end(),
                received: w.segment.received,
                state: SegmentState::Active {
                    server: w.server.clone(),
                },
            })
            .chain(self.queue.iter().map(|s| SegmentView {
                start: s.begin,
                end: s.end(),
                received: s.received,
                state: SegmentState::Queued,
            }))
            .chain(self.completed.iter().map(|s| SegmentView {
                start: s.start,
                end: s.end,
                received: s.len(),
                state: SegmentState::Completed,
            }))
            .collect();
        out.sort_by_key(|v| v.start);
        out
    }

    fn owns(&self, conn: ConnId) -> bool {
        conn.session == self.tag && self.outcome.is_none()
    }

    /// Data arrived on `conn`: write it at the segment's resume offset.
    pub fn on_data(&mut self, conn: ConnId, data: &[u8], connector: &mut dyn Connector) {
        if !self.owns(conn) || data.is_empty() {
            return;
        }
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        let Some(worker) = self.pool.get_mut(conn) else {
            return;
        };
        let offset = worker.segment.resume_offset();
        let take = (data.len() as u64).min(worker.segment.remaining()) as usize;
        if take == 0 {
            // Extra bytes past the segment end; the close will complete it.
            worker.accept(0);
            return;
        }
        if let Err(e) = storage.write_at(offset, &data[..take]) {
            tracing::error!(session = self.tag, offset, "destination write failed: {:#}", e);
            self.terminate(TaskResult::Fail, connector);
            return;
        }
        let accepted = worker.accept(take);
        self.progress.record(accepted);
    }

    /// The connection for `conn` closed, cleanly (`Ok`) or not.
    pub fn on_finished(
        &mut self,
        conn: ConnId,
        result: Result<(), ConnectionError>,
        connector: &mut dyn Connector,
    ) {
        if !self.owns(conn) {
            return;
        }
        let Some(worker) = self.pool.get(conn) else {
            return;
        };
        if worker.segment.is_complete() {
            if let Err(e) = &result {
                tracing::debug!(session = self.tag, "segment complete despite close error: {}", e);
            }
            self.complete(conn, connector);
            return;
        }
        let err = result.err().unwrap_or(ConnectionError::Truncated {
            expected: worker.segment.needed,
            received: worker.segment.received,
        });
        self.fail_worker(conn, err, connector);
    }

    /// Timer tick: advance every watchdog and fail the stalled workers.
    pub fn on_tick(&mut self, connector: &mut dyn Connector) {
        if self.outcome.is_some() {
            return;
        }
        for (conn, ticks) in watchdog::tick(&mut self.pool, self.watchdog_max_ticks) {
            connector.abort(conn);
            self.fail_worker(conn, ConnectionError::Stalled { ticks }, connector);
            if self.outcome.is_some() {
                break;
            }
        }
    }

    /// Abort everything and end with `FailCancel`.
    pub fn cancel(&mut self, connector: &mut dyn Connector) {
        if self.outcome.is_none() {
            tracing::info!(session = self.tag, download_id = self.id, "download cancelled");
            self.terminate(TaskResult::FailCancel, connector);
        }
    }

    /// Abort everything and end with a generic `Fail` (transport broke down).
    pub fn fail(&mut self, connector: &mut dyn Connector) {
        if self.outcome.is_none() {
            self.terminate(TaskResult::Fail, connector);
        }
    }

    /// Adopt a new mirror list. Live connections keep their mirror; queued
    /// segments may be picked up by newly idle or newly added mirrors.
    pub fn set_servers(&mut self, servers: Vec<String>, connector: &mut dyn Connector) {
        self.servers = servers;
        if self.outcome.is_none() {
            self.assign_queued(connector);
        }
    }

    /// Consume a terminal session and settle the destination file: closed in
    /// place on success, deleted on cancellation, left as-is on failure.
    pub fn finish(mut self) -> TaskResult {
        let mut result = self.outcome.unwrap_or(TaskResult::Fail);
        if let Some(storage) = self.storage.take() {
            match result {
                TaskResult::Success => {
                    if let Err(e) = storage.close() {
                        tracing::error!(session = self.tag, "closing destination failed: {:#}", e);
                        result = TaskResult::Fail;
                    }
                }
                TaskResult::FailCancel => storage.discard(),
                _ => drop(storage),
            }
        }
        tracing::info!(
            session = self.tag,
            download_id = self.id,
            bytes = self.progress.downloaded(),
            "download stopped: {}",
            result
        );
        result
    }

    fn complete(&mut self, conn: ConnId, connector: &mut dyn Connector) {
        let Some(worker) = self.pool.remove(conn) else {
            return;
        };
        tracing::debug!(
            session = self.tag,
            server = %worker.server,
            offset = worker.segment.begin,
            len = worker.segment.needed,
            "segment complete"
        );
        self.completed.push(worker.segment.span());
        self.assign_queued(connector);
        self.settle(connector);
    }

    fn fail_worker(&mut self, conn: ConnId, err: ConnectionError, connector: &mut dyn Connector) {
        let Some(worker) = self.pool.remove(conn) else {
            return;
        };
        tracing::warn!(
            session = self.tag,
            server = %worker.server,
            offset = worker.segment.begin,
            received = worker.segment.received,
            needed = worker.segment.needed,
            kind = %err.kind(),
            "segment connection failed: {}",
            err
        );
        let mut segment = worker.segment;
        segment.tried.push(worker.server);
        self.route(segment, connector);
        if self.outcome.is_none() {
            // The failed mirror is idle now and may serve something queued.
            self.assign_queued(connector);
            self.settle(connector);
        }
    }

    /// Send a failed segment to an idle untried mirror (within its retry
    /// budget), the queue, or end the session once every mirror failed it.
    fn route(&mut self, mut segment: SegmentProgress, connector: &mut dyn Connector) {
        loop {
            let decision = retry::decide(
                &segment,
                &self.servers,
                self.max_segment_retries,
                |s| self.pool.is_busy(s),
            );
            match decision {
                RetryDecision::Reassign(server) => {
                    segment.retries += 1;
                    match self.spawn(segment, server, connector) {
                        Ok(()) => return,
                        Err(back) => segment = back,
                    }
                }
                RetryDecision::Queue => {
                    tracing::debug!(session = self.tag, offset = segment.begin, "segment queued for retry");
                    self.queue.push(segment);
                    return;
                }
                RetryDecision::Exhausted => {
                    tracing::warn!(
                        session = self.tag,
                        offset = segment.begin,
                        retries = segment.retries,
                        "no mirror left for segment"
                    );
                    self.queue.push(segment);
                    self.terminate(TaskResult::FailNoViableServer, connector);
                    return;
                }
            }
        }
    }

    /// Hand queued segments to idle untried mirrors, oldest segment first.
    fn assign_queued(&mut self, connector: &mut dyn Connector) {
        while let Some((mut segment, server)) = self
            .queue
            .take_assignable(&self.servers, |s| self.pool.is_busy(s))
        {
            segment.retries += 1;
            if let Err(segment) = self.spawn(segment, server, connector) {
                self.queue.push(segment);
            }
        }
    }

    /// Detect the terminal conditions after workers or queue changed.
    fn settle(&mut self, connector: &mut dyn Connector) {
        if self.outcome.is_some() {
            return;
        }
        if self.pool.is_empty() && self.queue.is_empty() {
            self.outcome = Some(TaskResult::Success);
            return;
        }
        if self.queue.has_exhausted(&self.servers)
            || (self.pool.is_empty() && !self.queue.is_empty())
        {
            self.terminate(TaskResult::FailNoViableServer, connector);
        }
    }

    /// Open a connection for `segment` on `servers[server]`. On failure the
    /// mirror is marked tried and the segment handed back.
    fn spawn(
        &mut self,
        mut segment: SegmentProgress,
        server: usize,
        connector: &mut dyn Connector,
    ) -> Result<(), SegmentProgress> {
        let base = self.servers[server].clone();
        let conn = ConnId {
            session: self.tag,
            worker: self.next_worker,
        };
        self.next_worker += 1;

        let opened = mirror_url(&base, &self.remote_path)
            .map_err(|e| ConnectionError::Setup(format!("{:#}", e)))
            .and_then(|url| {
                let request = RangeRequest {
                    url,
                    server: base.clone(),
                    start: segment.resume_offset(),
                    end: segment.end(),
                    whole_file: !self.info.supports_partial_download
                        && segment.resume_offset() == 0
                        && segment.end() == self.progress.total(),
                };
                connector.open(conn, &request)
            });

        match opened {
            Ok(()) => {
                tracing::debug!(
                    session = self.tag,
                    worker = conn.worker,
                    server = %base,
                    from = segment.resume_offset(),
                    to = segment.end(),
                    retries = segment.retries,
                    "segment connection opened"
                );
                self.pool.insert(Worker::new(conn, base, segment));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = self.tag, server = %base, "cannot open connection: {}", e);
                segment.tried.push(base);
                Err(segment)
            }
        }
    }

    /// Abort every live connection, drop the queue and record `result`.
    fn terminate(&mut self, result: TaskResult, connector: &mut dyn Connector) {
        for worker in self.pool.drain() {
            connector.abort(worker.conn);
        }
        self.queue.clear();
        if self.outcome.is_none() {
            self.outcome = Some(result);
        }
    }
}
