//! A point-in-time read of the fiber lifecycle counters.
//!
//! The counters themselves live as atomics on `scheduler` (generalized
//! from the teacher's `ACTIVE_STRANDS`/`TOTAL_SPAWNED`/`TOTAL_COMPLETED`/
//! `PEAK_STRANDS`); this module is the read side, grouped into one struct
//! so a host embedding the runtime can log or expose them without reaching
//! into `scheduler`'s internals directly.

use crate::scheduler::{ACTIVE_FIBERS, PEAK_FIBERS, TOTAL_COMPLETED, TOTAL_SPAWNED};
use std::sync::atomic::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub active_fibers: usize,
    pub total_spawned: u64,
    pub total_completed: u64,
    pub peak_fibers: usize,
}

/// Read every lifecycle counter at once. Not transactionally consistent
/// across fields (each atomic loads independently) but good enough for
/// diagnostics and logging, same as the teacher's own counter reads.
pub fn snapshot() -> Snapshot {
    Snapshot {
        active_fibers: ACTIVE_FIBERS.load(Ordering::Acquire),
        total_spawned: TOTAL_SPAWNED.load(Ordering::Acquire),
        total_completed: TOTAL_COMPLETED.load(Ordering::Acquire),
        peak_fibers: PEAK_FIBERS.load(Ordering::Acquire),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn snapshot_reflects_scheduled_work() {
        let before = snapshot();
        let scheduler = Arc::new(Scheduler::new(2));
        let ran = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            let ran = ran.clone();
            scheduler.schedule(i, 0, Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while ran.load(Ordering::SeqCst) < 5 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        let after = snapshot();
        assert!(after.total_spawned >= before.total_spawned + 5);
        assert!(after.total_completed >= before.total_completed + 5);
        assert!(after.peak_fibers >= 1);
        Arc::try_unwrap(scheduler).map_err(|_| ()).unwrap().shutdown();
    }
}
