//! A bounded pool of worker threads draining a task queue, for the
//! blocking I/O operations async file handles dispatch onto.
//!
//! Grounded on the same mutex+condvar run-queue shape as
//! [`crate::scheduler::Scheduler`], generalizing the teacher's
//! blocking-syscall file operations (`file.rs`'s `patch_seq_file_slurp`
//! et al., which call straight into `std::fs` on the calling thread) into
//! a dedicated pool so a fiber's I/O doesn't tie up a scheduler worker.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    cv: Condvar,
    shutdown: std::sync::atomic::AtomicBool,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

/// Default worker count, overridable via `GLYPH_IO_THREADS`.
const DEFAULT_IO_THREADS: usize = 4;

impl ThreadPool {
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            shutdown: std::sync::atomic::AtomicBool::new(false),
        });
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let shared = shared.clone();
            workers.push(std::thread::spawn(move || Self::worker_loop(shared)));
        }
        ThreadPool { shared, workers }
    }

    /// Build a pool sized from `GLYPH_IO_THREADS` (default 4).
    pub fn from_env() -> Self {
        let n = std::env::var("GLYPH_IO_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_IO_THREADS);
        ThreadPool::new(n)
    }

    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        let mut queue = self.shared.queue.lock().expect("io pool queue lock poisoned");
        queue.push_back(Box::new(job));
        self.shared.cv.notify_one();
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut queue = shared.queue.lock().expect("io pool queue lock poisoned");
                loop {
                    if let Some(job) = queue.pop_front() {
                        break Some(job);
                    }
                    if shared.shutdown.load(std::sync::atomic::Ordering::Acquire) {
                        break None;
                    }
                    queue = shared.cv.wait(queue).expect("io pool wait poisoned");
                }
            };
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }

    pub fn shutdown(self) {
        self.shared.shutdown.store(true, std::sync::atomic::Ordering::Release);
        self.shared.cv.notify_all();
        for w in self.workers {
            let _ = w.join();
        }
    }
}
