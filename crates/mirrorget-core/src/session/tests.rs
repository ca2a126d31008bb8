use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::*;
use crate::storage::StorageWriterBuilder;

const A: &str = "http://a.example/";
const B: &str = "http://b.example/";
const C: &str = "http://c.example/";

#[derive(Default)]
struct RecordingConnector {
    opened: Vec<(ConnId, RangeRequest)>,
    aborted: Vec<ConnId>,
    refuse: HashSet<String>,
}

impl RecordingConnector {
    fn refusing(servers: &[&str]) -> Self {
        Self {
            refuse: servers.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Most recent connection opened against `server`.
    fn last_on(&self, server: &str) -> (ConnId, RangeRequest) {
        self.opened
            .iter()
            .rev()
            .find(|(_, r)| r.server == server)
            .cloned()
            .unwrap_or_else(|| panic!("nothing opened on {}", server))
    }
}

impl Connector for RecordingConnector {
    fn open(&mut self, conn: ConnId, request: &RangeRequest) -> Result<(), ConnectionError> {
        if self.refuse.contains(&request.server) {
            return Err(ConnectionError::Setup("refused".into()));
        }
        self.opened.push((conn, request.clone()));
        Ok(())
    }

    fn abort(&mut self, conn: ConnId) {
        self.aborted.push(conn);
    }
}

fn body(size: u64) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn params(size: u64, partial: bool) -> SessionParams {
    SessionParams {
        tag: 1,
        id: 42,
        remote_path: "pool/main/f.iso".into(),
        info: RemoteFileInfo {
            size: Some(size),
            supports_partial_download: partial,
            content_hash: Vec::new(),
        },
        watchdog_max_ticks: 7,
        max_segment_retries: 3,
    }
}

fn servers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn launch_with(
    dir: &Path,
    params: SessionParams,
    list: &[&str],
    unusable: &[&str],
    connector: &mut RecordingConnector,
) -> (Session, PathBuf) {
    let path = dir.join("f.iso");
    let mut builder = StorageWriterBuilder::create(&path).unwrap();
    builder.preallocate(params.info.size.unwrap_or(0)).unwrap();
    let session = Session::launch(
        params,
        builder.build(),
        servers(list),
        &servers(unusable),
        connector,
    );
    (session, path)
}

/// Delivers the bytes of `request` from `data` and closes the connection cleanly.
fn serve(session: &mut Session, conn: ConnId, request: &RangeRequest, data: &[u8], c: &mut RecordingConnector) {
    let slice = &data[request.start as usize..request.end as usize];
    for chunk in slice.chunks(16) {
        session.on_data(conn, chunk, c);
    }
    session.on_finished(conn, Ok(()), c);
}

fn drop_after(session: &mut Session, conn: ConnId, request: &RangeRequest, data: &[u8], n: u64, c: &mut RecordingConnector) {
    let from = request.start as usize;
    session.on_data(conn, &data[from..from + n as usize], c);
    session.on_finished(conn, Err(ConnectionError::Http(503)), c);
}

#[test]
fn three_mirrors_split_evenly_and_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(300);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(300, true), &[A, B, C], &[], &mut c);

    let ranges: Vec<(String, u64, u64)> = c
        .opened
        .iter()
        .map(|(_, r)| (r.server.clone(), r.start, r.end))
        .collect();
    assert_eq!(
        ranges,
        vec![
            (A.to_string(), 0, 100),
            (B.to_string(), 100, 200),
            (C.to_string(), 200, 300),
        ]
    );
    assert_eq!(c.opened[0].1.url, "http://a.example/pool/main/f.iso");
    assert!(c.opened.iter().all(|(_, r)| !r.whole_file));

    for (conn, req) in c.opened.clone() {
        serve(&mut session, conn, &req, &data, &mut c);
    }
    assert_eq!(session.outcome(), Some(TaskResult::Success));
    assert_eq!(
        session.progress_event(),
        DownloadEvent::Progress { bytes: 300, total: 300, id: 42 }
    );
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn failed_segment_resumes_on_idle_untried_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(300);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(300, true), &[A, B, C], &[], &mut c);

    let (a_conn, a_req) = c.last_on(A);
    let (b_conn, b_req) = c.last_on(B);
    let (c_conn, c_req) = c.last_on(C);

    // C finishes first and goes idle; A is still busy.
    serve(&mut session, c_conn, &c_req, &data, &mut c);
    drop_after(&mut session, b_conn, &b_req, &data, 40, &mut c);
    assert_eq!(session.outcome(), None);

    let (retry_conn, retry_req) = c.last_on(C);
    assert_ne!(retry_conn, c_conn);
    assert_eq!((retry_req.start, retry_req.end), (140, 200));
    assert_eq!(session.bytes_downloaded(), 140);

    serve(&mut session, retry_conn, &retry_req, &data, &mut c);
    serve(&mut session, a_conn, &a_req, &data, &mut c);
    assert_eq!(session.outcome(), Some(TaskResult::Success));
    assert_eq!(session.bytes_downloaded(), 300);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn single_mirror_without_ranges_fails_when_connection_drops() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(500);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(500, false), &[A], &[], &mut c);

    assert_eq!(c.opened.len(), 1);
    let (conn, req) = c.opened[0].clone();
    assert!(req.whole_file);
    assert_eq!((req.start, req.end), (0, 500));

    drop_after(&mut session, conn, &req, &data, 120, &mut c);
    assert_eq!(session.outcome(), Some(TaskResult::FailNoViableServer));
    assert_eq!(session.finish(), TaskResult::FailNoViableServer);
    // Partial file stays behind.
    assert!(path.exists());
}

#[test]
fn no_partial_support_uses_one_connection_despite_many_mirrors() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = RecordingConnector::default();
    let (session, _) = launch_with(dir.path(), params(300, false), &[A, B, C], &[], &mut c);
    assert_eq!(c.opened.len(), 1);
    assert_eq!(c.opened[0].1.server, A);
    assert_eq!(session.active_workers(), 1);
}

#[test]
fn resumed_segment_on_non_ranged_mirror_asks_for_range() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(200, false), &[A, B], &[], &mut c);

    let (conn, req) = c.last_on(A);
    drop_after(&mut session, conn, &req, &data, 50, &mut c);
    let (_, retry) = c.last_on(B);
    assert!(!retry.whole_file);
    assert_eq!((retry.start, retry.end), (50, 200));
}

#[test]
fn failed_segment_waits_in_queue_until_a_mirror_frees_up() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);

    let (a_conn, a_req) = c.last_on(A);
    let (b_conn, b_req) = c.last_on(B);
    drop_after(&mut session, b_conn, &b_req, &data, 30, &mut c);
    assert_eq!(session.queued_segments(), 1);
    assert_eq!(c.opened.len(), 2);

    serve(&mut session, a_conn, &a_req, &data, &mut c);
    assert_eq!(session.queued_segments(), 0);
    let (retry_conn, retry_req) = c.last_on(A);
    assert_eq!((retry_req.start, retry_req.end), (130, 200));

    serve(&mut session, retry_conn, &retry_req, &data, &mut c);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn segment_fails_session_once_every_mirror_failed_it() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);

    let (a_conn, a_req) = c.last_on(A);
    let (b_conn, b_req) = c.last_on(B);
    drop_after(&mut session, b_conn, &b_req, &data, 30, &mut c);
    serve(&mut session, a_conn, &a_req, &data, &mut c);

    let (retry_conn, retry_req) = c.last_on(A);
    drop_after(&mut session, retry_conn, &retry_req, &data, 10, &mut c);
    assert_eq!(session.outcome(), Some(TaskResult::FailNoViableServer));
    assert_eq!(session.active_workers(), 0);
    assert_eq!(session.bytes_downloaded(), 140);
}

#[test]
fn exhaustion_aborts_remaining_connections() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);

    let (a_conn, a_req) = c.last_on(A);
    let (b_conn, b_req) = c.last_on(B);
    drop_after(&mut session, b_conn, &b_req, &data, 10, &mut c);
    assert_eq!(session.queued_segments(), 1);

    // A fails too: its segment moves to B, and the queued one takes A.
    drop_after(&mut session, a_conn, &a_req, &data, 20, &mut c);
    let (b_retry, b_retry_req) = c.last_on(B);
    let (a_retry, a_retry_req) = c.last_on(A);
    assert_eq!((b_retry_req.start, b_retry_req.end), (20, 100));
    assert_eq!((a_retry_req.start, a_retry_req.end), (110, 200));

    // Both mirrors have now failed the second segment.
    drop_after(&mut session, a_retry, &a_retry_req, &data, 5, &mut c);
    assert_eq!(session.outcome(), Some(TaskResult::FailNoViableServer));
    assert_eq!(c.aborted, vec![b_retry]);

    // Late completions from the aborted connection change nothing.
    session.on_finished(b_retry, Ok(()), &mut c);
    assert_eq!(session.outcome(), Some(TaskResult::FailNoViableServer));
}

#[test]
fn spent_retry_budget_still_reaches_idle_untried_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(100);
    let mut c = RecordingConnector::default();
    let mut p = params(100, false);
    p.max_segment_retries = 1;
    let (mut session, path) = launch_with(dir.path(), p, &[A, B, C], &[], &mut c);

    let (conn, req) = c.last_on(A);
    drop_after(&mut session, conn, &req, &data, 10, &mut c);
    let (conn, req) = c.last_on(B);
    assert_eq!((req.start, req.end), (10, 100));
    drop_after(&mut session, conn, &req, &data, 10, &mut c);

    assert_eq!(session.outcome(), None);
    let (conn, req) = c.last_on(C);
    assert_eq!((req.start, req.end), (20, 100));
    serve(&mut session, conn, &req, &data, &mut c);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn silent_connection_is_aborted_after_watchdog_maximum() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);

    let (a_conn, a_req) = c.last_on(A);
    let (b_conn, _) = c.last_on(B);
    serve(&mut session, a_conn, &a_req, &data, &mut c);
    session.on_data(b_conn, &data[100..120], &mut c);

    // The tick right after data only clears the flag; then 7 silent ticks are tolerated.
    for _ in 0..8 {
        session.on_tick(&mut c);
    }
    assert!(c.aborted.is_empty());
    session.on_tick(&mut c);
    assert_eq!(c.aborted, vec![b_conn]);

    let (retry_conn, retry_req) = c.last_on(A);
    assert_eq!((retry_req.start, retry_req.end), (120, 200));
    // The aborted transfer may still report a close; it must be ignored.
    session.on_finished(b_conn, Err(ConnectionError::Http(0)), &mut c);
    assert_eq!(session.active_workers(), 1);

    serve(&mut session, retry_conn, &retry_req, &data, &mut c);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn cancel_aborts_everything_and_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(300);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(300, true), &[A, B, C], &[], &mut c);

    let (a_conn, _) = c.last_on(A);
    session.on_data(a_conn, &data[..10], &mut c);
    session.cancel(&mut c);
    assert_eq!(c.aborted.len(), 3);
    assert_eq!(session.outcome(), Some(TaskResult::FailCancel));

    session.on_data(a_conn, &data[10..20], &mut c);
    session.on_tick(&mut c);
    assert_eq!(session.bytes_downloaded(), 10);
    assert_eq!(c.aborted.len(), 3);

    assert_eq!(session.finish(), TaskResult::FailCancel);
    assert!(!path.exists());
}

#[test]
fn events_from_other_sessions_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(100);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(100, true), &[A], &[], &mut c);

    let (conn, _) = c.last_on(A);
    let stale = ConnId { session: 0, worker: conn.worker };
    session.on_data(stale, &data[..50], &mut c);
    session.on_finished(stale, Err(ConnectionError::Http(500)), &mut c);
    assert_eq!(session.bytes_downloaded(), 0);
    assert_eq!(session.active_workers(), 1);
    assert_eq!(session.outcome(), None);
}

#[test]
fn surplus_bytes_past_segment_end_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);

    let (a_conn, _) = c.last_on(A);
    let (b_conn, b_req) = c.last_on(B);
    // A server that ignores the range end would send past byte 100.
    session.on_data(a_conn, &data[..150], &mut c);
    assert_eq!(session.bytes_downloaded(), 100);
    session.on_data(a_conn, &[0xff; 8], &mut c);
    session.on_finished(a_conn, Ok(()), &mut c);

    serve(&mut session, b_conn, &b_req, &data, &mut c);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn complete_segment_counts_even_if_close_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(100);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(100, true), &[A], &[], &mut c);

    let (conn, _) = c.last_on(A);
    session.on_data(conn, &data, &mut c);
    session.on_finished(conn, Err(ConnectionError::Http(0)), &mut c);
    assert_eq!(session.outcome(), Some(TaskResult::Success));
}

#[test]
fn clean_close_short_of_segment_end_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);

    let (b_conn, _) = c.last_on(B);
    session.on_data(b_conn, &data[100..150], &mut c);
    session.on_finished(b_conn, Ok(()), &mut c);
    assert_eq!(session.queued_segments(), 1);
}

#[test]
fn refused_open_queues_segment_for_busy_mirrors() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(300);
    let mut c = RecordingConnector::refusing(&[C]);
    let (mut session, path) = launch_with(dir.path(), params(300, true), &[A, B, C], &[], &mut c);

    assert_eq!(c.opened.len(), 2);
    assert_eq!(session.queued_segments(), 1);

    let (a_conn, a_req) = c.last_on(A);
    serve(&mut session, a_conn, &a_req, &data, &mut c);
    let (retry_conn, retry_req) = c.last_on(A);
    assert_eq!((retry_req.start, retry_req.end), (200, 300));

    let (b_conn, b_req) = c.last_on(B);
    serve(&mut session, b_conn, &b_req, &data, &mut c);
    serve(&mut session, retry_conn, &retry_req, &data, &mut c);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn refused_first_mirror_never_doubles_up_a_planned_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(300);
    let mut c = RecordingConnector::refusing(&[A]);
    let (mut session, path) = launch_with(dir.path(), params(300, true), &[A, B, C], &[], &mut c);

    let ranges: Vec<(String, u64, u64)> = c
        .opened
        .iter()
        .map(|(_, r)| (r.server.clone(), r.start, r.end))
        .collect();
    assert_eq!(
        ranges,
        vec![(B.to_string(), 100, 200), (C.to_string(), 200, 300)]
    );
    assert_eq!(session.queued_segments(), 1);

    let (b_conn, b_req) = c.last_on(B);
    serve(&mut session, b_conn, &b_req, &data, &mut c);
    let (retry_conn, retry_req) = c.last_on(B);
    assert_eq!((retry_req.start, retry_req.end), (0, 100));

    let (c_conn, c_req) = c.last_on(C);
    serve(&mut session, c_conn, &c_req, &data, &mut c);
    serve(&mut session, retry_conn, &retry_req, &data, &mut c);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn every_open_refused_ends_without_viable_server() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = RecordingConnector::refusing(&[A, B]);
    let (session, _) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);
    assert_eq!(session.outcome(), Some(TaskResult::FailNoViableServer));
    assert_eq!(session.active_workers(), 0);
}

#[test]
fn probe_failed_mirrors_are_never_used() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(200, true), &[A, B, C], &[B], &mut c);

    let used: Vec<&str> = c.opened.iter().map(|(_, r)| r.server.as_str()).collect();
    assert_eq!(used, vec![A, C]);

    // C's segment fails; A is busy and B is excluded, so it must wait.
    let (c_conn, c_req) = c.last_on(C);
    drop_after(&mut session, c_conn, &c_req, &data, 5, &mut c);
    assert_eq!(session.queued_segments(), 1);
    assert!(c.opened.iter().all(|(_, r)| r.server != B));
}

#[test]
fn new_servers_pick_up_queued_segments() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(200);
    let mut c = RecordingConnector::default();
    let (mut session, path) = launch_with(dir.path(), params(200, true), &[A, B], &[], &mut c);

    let (a_conn, a_req) = c.last_on(A);
    let (b_conn, b_req) = c.last_on(B);
    drop_after(&mut session, b_conn, &b_req, &data, 20, &mut c);
    assert_eq!(session.queued_segments(), 1);

    session.set_servers(servers(&[A, B, C]), &mut c);
    assert_eq!(session.queued_segments(), 0);
    let (c_conn, c_req) = c.last_on(C);
    assert_eq!((c_req.start, c_req.end), (120, 200));
    // The in-flight connection on A is untouched.
    assert!(c.aborted.is_empty());

    serve(&mut session, a_conn, &a_req, &data, &mut c);
    serve(&mut session, c_conn, &c_req, &data, &mut c);
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn segments_always_partition_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(301);
    let mut c = RecordingConnector::default();
    let (mut session, _) = launch_with(dir.path(), params(301, true), &[A, B, C], &[], &mut c);

    let check = |session: &Session| {
        let views = session.segments();
        assert_eq!(views.first().map(|v| v.start), Some(0));
        assert_eq!(views.last().map(|v| v.end), Some(301));
        for pair in views.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let received: u64 = views.iter().map(|v| v.received).sum();
        assert_eq!(received, session.bytes_downloaded());
    };
    check(&session);

    let (b_conn, b_req) = c.last_on(B);
    let (c_conn, c_req) = c.last_on(C);
    serve(&mut session, c_conn, &c_req, &data, &mut c);
    check(&session);
    drop_after(&mut session, b_conn, &b_req, &data, 33, &mut c);
    check(&session);
    let states: Vec<SegmentState> = session.segments().into_iter().map(|v| v.state).collect();
    assert_eq!(
        states,
        vec![
            SegmentState::Active { server: A.into() },
            SegmentState::Active { server: C.into() },
            SegmentState::Completed,
        ]
    );
}

#[test]
fn zero_length_file_succeeds_without_connections() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = RecordingConnector::default();
    let (session, path) = launch_with(dir.path(), params(0, true), &[A, B], &[], &mut c);
    assert!(c.opened.is_empty());
    assert_eq!(session.outcome(), Some(TaskResult::Success));
    assert_eq!(session.finish(), TaskResult::Success);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn range_request_curl_form() {
    let r = RangeRequest {
        url: "http://a/x".into(),
        server: "http://a/".into(),
        start: 100,
        end: 200,
        whole_file: false,
    };
    assert_eq!(r.curl_range(), "100-199");
    assert_eq!(r.len(), 100);
}
