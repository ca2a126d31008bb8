//! WatchdogMonitor: per-tick liveness check over all live workers.
//!
//! Data arrival is the only liveness signal. A worker that stays silent for
//! more than `max_ticks` consecutive ticks is reported as stalled; the caller
//! aborts it and routes it through the ordinary failure path.

use super::worker::WorkerPool;
use super::ConnId;

/// Advances every worker's watchdog by one tick and returns the stalled ones
/// with their silent-tick count.
pub(crate) fn tick(pool: &mut WorkerPool, max_ticks: u32) -> Vec<(ConnId, u32)> {
    let mut stalled = Vec::new();
    for worker in pool.iter_mut() {
        if worker.fresh {
            worker.fresh = false;
            continue;
        }
        worker.watchdog += 1;
        if worker.watchdog > max_ticks {
            stalled.push((worker.conn, worker.watchdog));
        }
    }
    stalled
}
