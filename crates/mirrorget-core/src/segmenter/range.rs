//! Segment type and range planning.

/// A byte range `[start, end)` (half-open) of the remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl Segment {
    /// Length of this segment in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How many segments to plan for a file.
///
/// One segment when the mirror cannot serve ranges or fewer than two mirrors are
/// usable; otherwise one per usable mirror. Never more segments than bytes.
pub fn segment_count(total_size: u64, supports_partial: bool, usable_servers: usize) -> usize {
    if !supports_partial || usable_servers < 2 {
        return 1;
    }
    let cap = usize::try_from(total_size).unwrap_or(usize::MAX).max(1);
    usable_servers.min(cap)
}

/// Builds a segment plan for a given total size and segment count.
///
/// Segments are as equal as possible; earlier segments take the remainder bytes.
/// Returns an empty vec if `total_size` is 0 or `segment_count` is 0.
pub fn plan_segments(total_size: u64, segment_count: usize) -> Vec<Segment> {
    if total_size == 0 || segment_count == 0 {
        return Vec::new();
    }

    let segment_count = segment_count as u64;
    let base = total_size / segment_count;
    let remainder = total_size % segment_count;

    let mut out = Vec::with_capacity(segment_count as usize);
    let mut offset = 0u64;

    for i in 0..segment_count {
        let len = base + u64::from(i < remainder);
        let end = (offset + len).min(total_size);
        out.push(Segment { start: offset, end });
        offset = end;
    }

    out
}
