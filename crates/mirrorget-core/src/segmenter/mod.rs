//! Range math and segment planning.
//!
//! Splits a remote file into contiguous byte ranges, one per usable mirror.

mod range;

pub use range::{plan_segments, segment_count, Segment};
