//! Minimal HTTP/1.1 mirror for integration tests.
//!
//! Serves one static body under any path. HEAD answers with Content-Length and
//! (optionally) Accept-Ranges and Content-MD5; GET honours `Range: bytes=a-b`
//! with 206. Options simulate the misbehaving mirrors the worker plane must
//! survive: HEAD refused, ranges ignored, body stalling after N bytes.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RangeServerOptions {
    /// If true, HEAD returns 405 (the probe fails).
    pub refuse_head: bool,
    /// If true, GET ignores Range and always returns 200 with the full body,
    /// and HEAD does not advertise ranges.
    pub ignore_ranges: bool,
    /// Stop sending (but keep the connection open) after this many body bytes.
    pub stall_after: Option<usize>,
    /// Value of the Content-MD5 header on HEAD.
    pub content_md5: Option<String>,
}

/// A running mirror. It lives until the test process exits.
#[derive(Clone)]
pub struct RangeServer {
    pub url: String,
    heads: Arc<AtomicUsize>,
    ranges: Arc<Mutex<Vec<Option<(u64, u64)>>>>,
}

impl RangeServer {
    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.ranges.lock().unwrap().len()
    }

    /// `Range` header of every GET received so far (`None` = no Range).
    pub fn ranges(&self) -> Vec<Option<(u64, u64)>> {
        self.ranges.lock().unwrap().clone()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let server = RangeServer {
        url: format!("http://127.0.0.1:{}/", port),
        heads: Arc::new(AtomicUsize::new(0)),
        ranges: Arc::new(Mutex::new(Vec::new())),
    };
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    let state = server.clone();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            let state = state.clone();
            thread::spawn(move || handle(stream, &body, &opts, &state));
        }
    });
    server
}

/// Base URL of a port nobody listens on.
pub fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/", port)
}

fn handle(mut stream: TcpStream, body: &[u8], opts: &RangeServerOptions, state: &RangeServer) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;
    let accept_ranges = if opts.ignore_ranges {
        ""
    } else {
        "Accept-Ranges: bytes\r\n"
    };

    if method.eq_ignore_ascii_case("HEAD") {
        state.heads.fetch_add(1, Ordering::SeqCst);
        if opts.refuse_head {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
            return;
        }
        let md5 = opts
            .content_md5
            .as_ref()
            .map(|v| format!("Content-MD5: {}\r\n", v))
            .unwrap_or_default();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}{}Connection: close\r\n\r\n",
            total, accept_ranges, md5
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }
    state.ranges.lock().unwrap().push(range);

    let (head, slice) = match range.filter(|_| !opts.ignore_ranges) {
        Some((start, end_incl)) if start < total => {
            let end_excl = end_incl.saturating_add(1).min(total);
            let slice = &body[start as usize..end_excl as usize];
            (
                format!(
                    "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\n",
                    slice.len(),
                    start,
                    end_excl - 1,
                    total
                ),
                slice,
            )
        }
        Some(_) => {
            let response = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nConnection: close\r\n\r\n",
                total
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        None => (
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n", total),
            body,
        ),
    };
    let head = format!("{}{}Connection: close\r\n\r\n", head, accept_ranges);
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    match opts.stall_after {
        Some(n) if n < slice.len() => {
            let _ = stream.write_all(&slice[..n]);
            let _ = stream.flush();
            // Silent but open: only a watchdog can notice.
            thread::sleep(Duration::from_secs(20));
        }
        _ => {
            let _ = stream.write_all(slice);
        }
    }
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let Some(spec) = value.trim().strip_prefix("bytes=") else {
            continue;
        };
        if let Some((a, b)) = spec.split_once('-') {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end_incl = match b.trim() {
                "" => u64::MAX,
                end => end.parse::<u64>().unwrap_or(0),
            };
            range = Some((start, end_incl));
        }
    }
    (method, range)
}
