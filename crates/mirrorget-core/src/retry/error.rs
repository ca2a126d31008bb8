//! Per-connection error type.

use std::fmt;

/// Why one segment connection stopped before delivering its whole range.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Curl reported an error (timeout, refused, reset, ...).
    #[error("transfer failed: {0}")]
    Transfer(#[from] curl::Error),
    /// The server answered with a status we cannot use for this range.
    #[error("unexpected HTTP status {0}")]
    Http(u32),
    /// The server answered 206 for a different range than requested.
    #[error("Content-Range does not start at offset {expected_start}")]
    RangeMismatch { expected_start: u64 },
    /// Connection closed cleanly but short of the segment's end.
    #[error("connection closed after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },
    /// No data for more than the watchdog maximum of ticks.
    #[error("no data for {ticks} ticks")]
    Stalled { ticks: u32 },
    /// The connection could not even be set up (bad URL, curl handle refused).
    #[error("could not open connection: {0}")]
    Setup(String),
}

/// Coarse classification used in logs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    Http,
    Truncated,
    Stalled,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Http => "http",
            FailureKind::Truncated => "truncated",
            FailureKind::Stalled => "stalled",
            FailureKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl ConnectionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ConnectionError::Transfer(e) => classify_curl_error(e),
            ConnectionError::Http(_) | ConnectionError::RangeMismatch { .. } => FailureKind::Http,
            ConnectionError::Truncated { .. } => FailureKind::Truncated,
            ConnectionError::Stalled { .. } => FailureKind::Stalled,
            ConnectionError::Setup(_) => FailureKind::Other,
        }
    }
}

fn classify_curl_error(e: &curl::Error) -> FailureKind {
    if e.is_operation_timedout() {
        return FailureKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return FailureKind::Connection;
    }
    if e.is_write_error() {
        // The handler refused the body (bad status or range); see SegmentHandler.
        return FailureKind::Http;
    }
    FailureKind::Other
}
