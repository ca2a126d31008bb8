//! Easy2 Handler for one segment connection.
//! Validates the response before accepting body bytes, then buffers them until
//! the event loop hands them to the session.

use std::str;

use crate::retry::ConnectionError;
use crate::session::RangeRequest;

use super::response::{parse_content_range, parse_http_status};

pub(crate) struct SegmentHandler {
    start: u64,
    expected: u64,
    headers: Vec<String>,
    /// Body bytes still to drop before `start` (server ignored the range). `None` until checked.
    skip: Option<u64>,
    delivered: u64,
    pending: Vec<u8>,
    /// Why the handler refused the body, if it did.
    error: Option<ConnectionError>,
    /// The whole range was delivered and the handler stopped the transfer early.
    satisfied: bool,
}

impl SegmentHandler {
    pub(crate) fn new(request: &RangeRequest) -> Self {
        Self {
            start: request.start,
            expected: request.len(),
            headers: Vec::new(),
            skip: None,
            delivered: 0,
            pending: Vec::new(),
            error: None,
            satisfied: false,
        }
    }

    /// Body bytes received since the previous call.
    pub(crate) fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn take_error(&mut self) -> Option<ConnectionError> {
        self.error.take()
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        self.satisfied || (self.expected > 0 && self.delivered == self.expected)
    }

    /// Bytes of the body to skip, or why the response is unusable.
    fn admit(&self) -> Result<u64, ConnectionError> {
        match parse_http_status(&self.headers).unwrap_or(0) {
            206 => match parse_content_range(&self.headers) {
                Some((start, _, _)) if start == self.start => Ok(0),
                _ => Err(ConnectionError::RangeMismatch {
                    expected_start: self.start,
                }),
            },
            // Full body from byte 0.
            200 => Ok(self.start),
            code => Err(ConnectionError::Http(code)),
        }
    }
}

impl curl::easy::Handler for SegmentHandler {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(s) = str::from_utf8(data) {
            let line = s.trim_end();
            if line.starts_with("HTTP/") {
                self.headers.clear();
            }
            if !line.is_empty() {
                self.headers.push(line.to_string());
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, curl::easy::WriteError> {
        if self.error.is_some() {
            return Ok(0);
        }
        let skip = match self.skip {
            Some(skip) => skip,
            None => match self.admit() {
                Ok(skip) => skip,
                Err(e) => {
                    self.error = Some(e);
                    return Ok(0);
                }
            },
        };

        let dropped = skip.min(data.len() as u64);
        self.skip = Some(skip - dropped);
        let body = &data[dropped as usize..];

        let room = (self.expected - self.delivered) as usize;
        let take = room.min(body.len());
        self.pending.extend_from_slice(&body[..take]);
        self.delivered += take as u64;
        if take < body.len() {
            // Range fully delivered; stop the transfer.
            self.satisfied = true;
            return Ok(0);
        }
        Ok(data.len())
    }
}
