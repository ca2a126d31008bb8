//! WorkerPool: live segment connections and their byte counters.

use crate::segmenter::Segment;

use super::ConnId;

/// Progress of one segment, carried across connections when it is reassigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentProgress {
    /// First byte of the segment in the file; never changes across retries.
    pub begin: u64,
    /// Length of the segment.
    pub needed: u64,
    /// Bytes already written; a new connection resumes at `begin + received`.
    pub received: u64,
    /// Number of reassignments to another mirror so far.
    pub retries: u32,
    /// Mirrors that failed (or were unusable for) this segment.
    pub tried: Vec<String>,
}

impl SegmentProgress {
    pub fn new(segment: Segment) -> Self {
        Self {
            begin: segment.start,
            needed: segment.len(),
            received: 0,
            retries: 0,
            tried: Vec::new(),
        }
    }

    /// Absolute offset the next byte belongs at.
    pub fn resume_offset(&self) -> u64 {
        self.begin + self.received
    }

    /// Exclusive end offset of the segment.
    pub fn end(&self) -> u64 {
        self.begin + self.needed
    }

    pub fn remaining(&self) -> u64 {
        self.needed - self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.needed
    }

    pub fn has_tried(&self, server: &str) -> bool {
        self.tried.iter().any(|t| t == server)
    }

    pub fn span(&self) -> Segment {
        Segment {
            start: self.begin,
            end: self.end(),
        }
    }
}

/// One in-flight connection serving a segment.
#[derive(Debug)]
pub(crate) struct Worker {
    pub(crate) conn: ConnId,
    pub(crate) server: String,
    pub(crate) segment: SegmentProgress,
    /// Silent ticks in a row, in `[0, watchdog maximum]` until the worker trips.
    pub(crate) watchdog: u32,
    /// Data arrived since the previous tick.
    pub(crate) fresh: bool,
}

impl Worker {
    pub(crate) fn new(conn: ConnId, server: String, segment: SegmentProgress) -> Self {
        Self {
            conn,
            server,
            segment,
            watchdog: 0,
            fresh: false,
        }
    }

    /// Accepts up to `len` bytes and returns how many belong to this segment.
    pub(crate) fn accept(&mut self, len: usize) -> u64 {
        let take = (len as u64).min(self.segment.remaining());
        self.segment.received += take;
        self.watchdog = 0;
        self.fresh = true;
        take
    }
}

/// The set of live workers, in launch order.
#[derive(Debug, Default)]
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub(crate) fn insert(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    pub(crate) fn remove(&mut self, conn: ConnId) -> Option<Worker> {
        let pos = self.workers.iter().position(|w| w.conn == conn)?;
        Some(self.workers.remove(pos))
    }

    pub(crate) fn get(&self, conn: ConnId) -> Option<&Worker> {
        self.workers.iter().find(|w| w.conn == conn)
    }

    pub(crate) fn get_mut(&mut self, conn: ConnId) -> Option<&mut Worker> {
        self.workers.iter_mut().find(|w| w.conn == conn)
    }

    /// True while some live connection is assigned to `server`.
    pub(crate) fn is_busy(&self, server: &str) -> bool {
        self.workers.iter().any(|w| w.server == server)
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.iter_mut()
    }

    pub(crate) fn drain(&mut self) -> Vec<Worker> {
        std::mem::take(&mut self.workers)
    }
}
