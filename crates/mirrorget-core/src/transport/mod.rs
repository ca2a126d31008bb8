//! Curl multi backend for segment connections.
//!
//! All transfers of a session run on one `curl::multi::Multi`, driven from the
//! dispatcher thread: `pump` performs pending I/O, collects buffered body bytes
//! and reports finished transfers as [`TransportEvent`]s.

mod handler;
mod response;

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::time::Duration;

use curl::easy::Easy2;
use curl::multi::{Easy2Handle, Multi};

use crate::config::TransferConfig;
use crate::retry::ConnectionError;
use crate::session::{ConnId, Connector, RangeRequest};

use handler::SegmentHandler;

/// Something that happened on a connection during one `pump`.
#[derive(Debug)]
pub enum TransportEvent {
    Data(ConnId, Vec<u8>),
    Finished(ConnId, Result<(), ConnectionError>),
}

pub struct CurlConnector {
    multi: Multi,
    handles: HashMap<ConnId, Easy2Handle<SegmentHandler>>,
    transfer: TransferConfig,
}

impl CurlConnector {
    pub fn new(transfer: TransferConfig) -> Self {
        Self {
            multi: Multi::new(),
            handles: HashMap::new(),
            transfer,
        }
    }

    fn easy_for(&self, request: &RangeRequest) -> Result<Easy2<SegmentHandler>, curl::Error> {
        let mut easy = Easy2::new(SegmentHandler::new(request));
        easy.url(&request.url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.transfer.connect_timeout())?;
        if let Some(sz) = self.transfer.buffer_size {
            easy.buffer_size(sz)?;
        }
        if !request.whole_file {
            easy.range(&request.curl_range())?;
        }
        Ok(easy)
    }

    /// Run pending transfers, waiting up to `wait` for socket activity.
    pub fn pump(&mut self, wait: Duration) -> Result<Vec<TransportEvent>> {
        if self.handles.is_empty() {
            std::thread::sleep(wait);
            return Ok(Vec::new());
        }

        let running = self
            .multi
            .perform()
            .map_err(|e| anyhow!("curl multi perform: {}", e))?;

        let mut events = Vec::new();
        for (conn, handle) in self.handles.iter_mut() {
            let data = handle.get_mut().take_pending();
            if !data.is_empty() {
                events.push(TransportEvent::Data(*conn, data));
            }
        }

        let mut done: Vec<(ConnId, Result<(), curl::Error>)> = Vec::new();
        let handles = &self.handles;
        self.multi.messages(|msg| {
            for (conn, handle) in handles.iter() {
                if let Some(res) = msg.result_for2(handle) {
                    done.push((*conn, res));
                    break;
                }
            }
        });

        for (conn, res) in done {
            let Some(handle) = self.handles.remove(&conn) else {
                continue;
            };
            let mut easy = self
                .multi
                .remove2(handle)
                .map_err(|e| anyhow!("curl multi remove: {}", e))?;
            let code = easy.response_code().unwrap_or(0);
            let handler = easy.get_mut();
            let result = match (handler.take_error(), res) {
                (Some(e), _) => Err(e),
                (None, Err(_)) if handler.is_satisfied() => Ok(()),
                (None, Err(e)) => Err(ConnectionError::Transfer(e)),
                (None, Ok(())) if !(200..300).contains(&code) => Err(ConnectionError::Http(code)),
                (None, Ok(())) => Ok(()),
            };
            tracing::trace!(worker = conn.worker, code, ok = result.is_ok(), "transfer finished");
            events.push(TransportEvent::Finished(conn, result));
        }

        if running > 0 {
            self.multi
                .wait(&mut [], wait)
                .map_err(|e| anyhow!("curl multi wait: {}", e))?;
        }
        Ok(events)
    }

    /// Drop every transfer (session ended).
    pub fn abort_all(&mut self) {
        let conns: Vec<ConnId> = self.handles.keys().copied().collect();
        for conn in conns {
            self.abort(conn);
        }
    }
}

impl Connector for CurlConnector {
    fn open(&mut self, conn: ConnId, request: &RangeRequest) -> Result<(), ConnectionError> {
        let easy = self.easy_for(request)?;
        let handle = self
            .multi
            .add2(easy)
            .map_err(|e| ConnectionError::Setup(format!("curl multi add: {}", e)))?;
        self.handles.insert(conn, handle);
        Ok(())
    }

    fn abort(&mut self, conn: ConnId) {
        if let Some(handle) = self.handles.remove(&conn) {
            if let Err(e) = self.multi.remove2(handle) {
                tracing::debug!(worker = conn.worker, "curl multi remove: {}", e);
            }
        }
    }
}

impl Drop for CurlConnector {
    fn drop(&mut self) {
        self.abort_all();
    }
}
