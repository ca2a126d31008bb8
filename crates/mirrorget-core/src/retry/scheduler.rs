//! Reassignment of failed segments to alternate mirrors.
//!
//! Target selection is deterministic: among mirrors that are idle (no live
//! connection) and have not yet failed this segment, the one listed first in
//! the current server list wins.
//!
//! The retry budget only gates the immediate reassignment of a failed
//! segment. A segment over budget waits in the queue and is handed to the
//! next idle mirror it has not tried; it is given up on only once every
//! mirror in the list has failed it.

use std::collections::VecDeque;

use crate::session::SegmentProgress;

/// What to do with a segment whose connection just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Open a connection to `servers[index]` right away.
    Reassign(usize),
    /// An untried mirror exists but is busy, or the budget is spent; wait in the queue.
    Queue,
    /// Every mirror in the list already failed this segment.
    Exhausted,
}

/// First idle mirror the segment has not tried yet.
pub fn pick_server<F>(segment: &SegmentProgress, servers: &[String], is_busy: F) -> Option<usize>
where
    F: Fn(&str) -> bool,
{
    servers
        .iter()
        .position(|s| !segment.has_tried(s) && !is_busy(s))
}

fn is_exhausted(segment: &SegmentProgress, servers: &[String]) -> bool {
    servers.iter().all(|s| segment.has_tried(s))
}

/// Decide the fate of a failed segment. `segment.tried` must already contain
/// the mirror that just failed.
pub fn decide<F>(
    segment: &SegmentProgress,
    servers: &[String],
    max_retries: u32,
    is_busy: F,
) -> RetryDecision
where
    F: Fn(&str) -> bool,
{
    if is_exhausted(segment, servers) {
        return RetryDecision::Exhausted;
    }
    if segment.retries >= max_retries {
        return RetryDecision::Queue;
    }
    match pick_server(segment, servers, is_busy) {
        Some(index) => RetryDecision::Reassign(index),
        None => RetryDecision::Queue,
    }
}

/// Segments waiting for an idle mirror, oldest first.
#[derive(Debug, Default)]
pub struct RetryQueue {
    queue: VecDeque<SegmentProgress>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: SegmentProgress) {
        self.queue.push_back(segment);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentProgress> {
        self.queue.iter()
    }

    /// Removes the oldest queued segment that can run now, with the mirror it should run on.
    pub fn take_assignable<F>(
        &mut self,
        servers: &[String],
        is_busy: F,
    ) -> Option<(SegmentProgress, usize)>
    where
        F: Fn(&str) -> bool,
    {
        let (pos, server) = self
            .queue
            .iter()
            .enumerate()
            .find_map(|(pos, seg)| pick_server(seg, servers, &is_busy).map(|server| (pos, server)))?;
        let segment = self.queue.remove(pos)?;
        Some((segment, server))
    }

    /// True if some queued segment can never be scheduled again.
    pub fn has_exhausted(&self, servers: &[String]) -> bool {
        self.queue.iter().any(|seg| is_exhausted(seg, servers))
    }

    /// Empties the queue without reassignment (cancellation, session failure).
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
