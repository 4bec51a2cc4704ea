//! Where background work (image decode, archive read, archive compression)
//! runs. Jobs never touch session state; they report back through the
//! session's completion channel and are applied in `Session::pump`.
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub enum Executor {
    /// One short-lived named thread per job.
    Threaded,
    /// Jobs queue up until a test runs them, in whatever order it likes.
    Manual(Mutex<VecDeque<(&'static str, Job)>>),
}

impl Executor {
    pub fn threaded() -> Self {
        Executor::Threaded
    }

    pub fn manual() -> Self {
        Executor::Manual(Mutex::new(VecDeque::new()))
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Executor::Manual(_))
    }

    pub fn spawn<F>(&self, name: &'static str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Executor::Threaded => {
                let builder = thread::Builder::new().name(format!("fragbox-{name}"));
                // spawn() drops the closure on failure, so keep a way to run it inline
                let slot = std::sync::Arc::new(Mutex::new(Some(job)));
                let worker_slot = slot.clone();
                let spawned = builder.spawn(move || {
                    if let Some(job) = take(&worker_slot) {
                        job();
                    }
                });
                if let Err(err) = spawned {
                    warn!(task = name, error = %err, "failed to spawn worker; running inline");
                    if let Some(job) = take(&slot) {
                        job();
                    }
                }
            }
            Executor::Manual(queue) => {
                debug!(task = name, "queued job");
                lock(queue).push_back((name, Box::new(job)));
            }
        }
    }

    /// Jobs waiting in a manual executor.
    pub fn queued(&self) -> Vec<&'static str> {
        match self {
            Executor::Threaded => Vec::new(),
            Executor::Manual(queue) => lock(queue).iter().map(|(name, _)| *name).collect(),
        }
    }

    pub fn run_next(&self) -> bool {
        self.run_with(|queue| queue.pop_front())
    }

    pub fn run_last(&self) -> bool {
        self.run_with(|queue| queue.pop_back())
    }

    /// Runs queued jobs, including ones queued while running, until none are
    /// left. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    fn run_with<P>(&self, pick: P) -> bool
    where
        P: FnOnce(&mut VecDeque<(&'static str, Job)>) -> Option<(&'static str, Job)>,
    {
        let Executor::Manual(queue) = self else {
            return false;
        };
        // release the lock before running so jobs may queue more work
        let picked = pick(&mut lock(queue));
        match picked {
            Some((name, job)) => {
                debug!(task = name, "running queued job");
                job();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Executor::Threaded => f.write_str("Executor::Threaded"),
            Executor::Manual(queue) => f
                .debug_tuple("Executor::Manual")
                .field(&lock(queue).len())
                .finish(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    lock(slot).take()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn manual_runs_in_chosen_order() {
        let executor = Executor::manual();
        let (tx, rx) = unbounded();
        for i in 0..3 {
            let tx = tx.clone();
            executor.spawn("count", move || tx.send(i).unwrap());
        }
        assert_eq!(executor.queued(), vec!["count"; 3]);
        assert!(executor.run_last());
        assert_eq!(executor.run_all(), 2);
        assert!(!executor.run_next());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![2, 0, 1]);
    }

    #[test]
    fn threaded_runs_off_thread() {
        let executor = Executor::threaded();
        let (tx, rx) = unbounded();
        let caller = thread::current().id();
        executor.spawn("whoami", move || {
            tx.send(thread::current().id()).unwrap();
        });
        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn nested_spawn_in_manual_mode() {
        let executor = Arc::new(Executor::manual());
        let inner = executor.clone();
        let (tx, rx) = unbounded();
        executor.spawn("outer", move || {
            inner.spawn("inner", move || tx.send("inner ran").unwrap());
        });
        assert_eq!(executor.run_all(), 2);
        assert_eq!(rx.try_recv().unwrap(), "inner ran");
    }
}
