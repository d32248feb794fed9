//! Priority run queue and worker pool.
//!
//! Generalizes the teacher's fire-and-forget `may::coroutine::spawn` strand
//! model (`scheduler.rs`'s `ACTIVE_STRANDS`/`TOTAL_SPAWNED`/
//! `TOTAL_COMPLETED`/`PEAK_STRANDS` atomics, lock-free `StrandRegistry`)
//! into a priority-ordered, FIFO-within-priority scheduler: a fixed pool of
//! worker threads pulls the highest-priority ready fiber and runs its task
//! to completion or suspension.

use crate::fiber::{Fiber, FiberId};
use may::coroutine;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

pub static ACTIVE_FIBERS: AtomicUsize = AtomicUsize::new(0);
pub static TOTAL_SPAWNED: AtomicU64 = AtomicU64::new(0);
pub static TOTAL_COMPLETED: AtomicU64 = AtomicU64::new(0);
pub static PEAK_FIBERS: AtomicUsize = AtomicUsize::new(0);

/// A unit of fiber work: run until completion or a suspension point.
/// `FnOnce` because a fiber task is consumed when it runs; a task that
/// needs to resume later is modeled by the caller re-enqueuing a
/// continuation closure (see `glyph-l2`'s `Chunk`/`PrimitiveResult` for the
/// actual suspend/resume contract the interpreter uses on top of this).
pub type Task = Box<dyn FnOnce() + Send>;

struct ReadyEntry {
    priority: u8,
    seq: u64,
    fiber_id: FiberId,
    task: Task,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for ReadyEntry {}
impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first; lower (earlier) seq first within a
        // priority, i.e. FIFO. BinaryHeap is a max-heap, so we reverse
        // `seq` to make an earlier sequence number compare as "greater".
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A bounded pool of worker threads draining a priority run queue.
pub struct Scheduler {
    ready: Arc<(Mutex<BinaryHeap<ReadyEntry>>, Condvar)>,
    next_seq: AtomicU64,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    workers: Vec<std::thread::JoinHandle<()>>,
    fibers: Arc<Mutex<HashMap<FiberId, Arc<Fiber>>>>,
}

impl Scheduler {
    pub fn new(worker_count: usize) -> Self {
        let ready = Arc::new((Mutex::new(BinaryHeap::new()), Condvar::new()));
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fibers = Arc::new(Mutex::new(HashMap::new()));
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let ready = ready.clone();
            let shutdown = shutdown.clone();
            workers.push(std::thread::spawn(move || worker_loop(ready, shutdown)));
        }
        Scheduler { ready, next_seq: AtomicU64::new(0), shutdown, workers, fibers }
    }

    /// Register a fiber so `fiber()` can look it up later (join targets,
    /// unpark-by-id, etc).
    pub fn register_fiber(&self, fiber: Arc<Fiber>) {
        self.fibers.lock().expect("fiber table lock poisoned").insert(fiber.id, fiber);
    }

    pub fn fiber(&self, id: FiberId) -> Option<Arc<Fiber>> {
        self.fibers.lock().expect("fiber table lock poisoned").get(&id).cloned()
    }

    /// Enqueue `task` for `fiber_id` at `priority`. Runs on a worker
    /// thread when it reaches the front of the run queue.
    pub fn schedule(&self, fiber_id: FiberId, priority: u8, task: Task) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        TOTAL_SPAWNED.fetch_add(1, Ordering::Relaxed);
        let active = ACTIVE_FIBERS.fetch_add(1, Ordering::AcqRel) + 1;
        let mut peak = PEAK_FIBERS.load(Ordering::Acquire);
        while active > peak {
            match PEAK_FIBERS.compare_exchange_weak(peak, active, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => break,
                Err(cur) => peak = cur,
            }
        }
        let (lock, cv) = &*self.ready;
        let mut heap = lock.lock().expect("ready queue lock poisoned");
        heap.push(ReadyEntry { priority, seq, fiber_id, task });
        cv.notify_one();
    }

    /// Spawn a delayed fork: schedules `task` after `delay_ms`, or
    /// immediately if `delay_ms == 0`.
    pub fn delayed_fork(self: &Arc<Self>, fiber_id: FiberId, priority: u8, delay_ms: u64, task: Task) {
        if delay_ms == 0 {
            self.schedule(fiber_id, priority, task);
            return;
        }
        let scheduler = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(delay_ms));
            scheduler.schedule(fiber_id, priority, task);
        });
    }

    pub fn active_count(&self) -> usize {
        ACTIVE_FIBERS.load(Ordering::Acquire)
    }

    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        self.ready.1.notify_all();
        for w in self.workers {
            let _ = w.join();
        }
    }
}

fn worker_loop(
    ready: Arc<(Mutex<BinaryHeap<ReadyEntry>>, Condvar)>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
) {
    let (lock, cv) = &*ready;
    loop {
        let entry = {
            let mut heap = lock.lock().expect("ready queue lock poisoned");
            loop {
                if let Some(entry) = heap.pop() {
                    break Some(entry);
                }
                if shutdown.load(Ordering::Acquire) {
                    break None;
                }
                heap = cv.wait(heap).expect("ready queue wait poisoned");
            }
        };
        let Some(entry) = entry else { break };
        tracing::trace!(fiber_id = entry.fiber_id, priority = entry.priority, "dispatching fiber");
        // May coroutines are cheap cooperative green threads; spawning one
        // per task lets a fiber that suspends (parks, blocks on I/O) yield
        // the worker thread back to the scheduler rather than tying it up.
        let handle = unsafe {
            coroutine::spawn(move || {
                (entry.task)();
                ACTIVE_FIBERS.fetch_sub(1, Ordering::AcqRel);
                TOTAL_COMPLETED.fetch_add(1, Ordering::Release);
            })
        };
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn higher_priority_tasks_run_before_lower_priority_ones() {
        let mut heap: BinaryHeap<ReadyEntry> = BinaryHeap::new();
        heap.push(ReadyEntry { priority: 1, seq: 0, fiber_id: 1, task: Box::new(|| {}) });
        heap.push(ReadyEntry { priority: 5, seq: 1, fiber_id: 2, task: Box::new(|| {}) });
        heap.push(ReadyEntry { priority: 5, seq: 2, fiber_id: 3, task: Box::new(|| {}) });
        let popped: Vec<(u8, FiberId)> =
            std::iter::from_fn(|| heap.pop().map(|e| (e.priority, e.fiber_id))).collect();
        assert_eq!(popped, vec![(5, 2), (5, 3), (1, 1)]);
    }

    #[test]
    fn fifo_within_same_priority() {
        let mut heap: BinaryHeap<ReadyEntry> = BinaryHeap::new();
        heap.push(ReadyEntry { priority: 3, seq: 0, fiber_id: 1, task: Box::new(|| {}) });
        heap.push(ReadyEntry { priority: 3, seq: 1, fiber_id: 2, task: Box::new(|| {}) });
        heap.push(ReadyEntry { priority: 3, seq: 2, fiber_id: 3, task: Box::new(|| {}) });
        let popped: Vec<FiberId> = std::iter::from_fn(|| heap.pop().map(|e| e.fiber_id)).collect();
        assert_eq!(popped, vec![1, 2, 3]);
    }

    #[test]
    fn scheduled_tasks_actually_run() {
        let scheduler = Arc::new(Scheduler::new(2));
        let ran = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            let ran = ran.clone();
            scheduler.schedule(i, 0, Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while ran.load(Ordering::SeqCst) < 10 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        Arc::try_unwrap(scheduler).map_err(|_| ()).unwrap().shutdown();
    }

    #[test]
    fn delayed_fork_runs_after_the_delay() {
        let scheduler = Arc::new(Scheduler::new(1));
        let ran_at = Arc::new(Mutex::new(None));
        let start = std::time::Instant::now();
        let ran_at2 = ran_at.clone();
        scheduler.delayed_fork(1, 0, 30, Box::new(move || {
            *ran_at2.lock().unwrap() = Some(start.elapsed());
        }));
        std::thread::sleep(std::time::Duration::from_millis(200));
        let elapsed = ran_at.lock().unwrap().expect("task should have run");
        assert!(elapsed.as_millis() >= 25, "ran too early: {elapsed:?}");
        Arc::try_unwrap(scheduler).map_err(|_| ()).unwrap().shutdown();
    }
}
