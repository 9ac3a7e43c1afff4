//! Fixed-capacity worker pool
//!
//! Workers are plain OS threads that take boxed jobs from a shared channel.
//! Concurrency is bounded by a slot counter rather than by the thread count:
//! a slot is reserved before a job is queued and released when the job
//! finishes, so a queued job always has an idle worker waiting for it.

use crate::error::PoolError;
use crossbeam_channel::{Receiver, SendError, Sender, select};
use std::{
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, trace, warn};

pub(crate) type Job = Box<dyn FnOnce(&PoolHandle) + Send + 'static>;

#[derive(Debug)]
struct Shared {
    capacity: usize,
    active: AtomicUsize,
    closed: AtomicBool,
    jobs: Sender<Job>,
}

/// Shared view of a pool, handed to every dispatched task
///
/// Cloning is cheap; all clones refer to the same workers and slot counter.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    /// Maximum number of tasks the pool runs at once
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of slots currently reserved or running a task
    ///
    /// The value is advisory and may be stale by the time it is read.
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::Relaxed)
    }

    /// Take one slot if the pool is below capacity.
    pub(crate) fn try_reserve(&self) -> bool {
        if self.shared.closed.load(Ordering::Relaxed) {
            return false;
        }

        self.shared
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |active| {
                (active < self.shared.capacity).then_some(active + 1)
            })
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.shared.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Queue a job that already holds a reserved slot.
    ///
    /// If every worker is gone the job runs on the calling thread.
    pub(crate) fn submit(&self, job: Job) {
        if let Err(SendError(job)) = self.shared.jobs.send(job) {
            trace!("no workers left, running task inline");
            job(self);
        }
    }
}

/// A fixed set of worker threads
///
/// The pool dereferences to its [`PoolHandle`]. Dropping it has the same
/// effect as [`Pool::close`].
#[derive(Debug)]
pub struct Pool {
    handle: PoolHandle,
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Start `capacity` worker threads.
    ///
    /// A capacity of 0 starts nothing and yields a pool that never offloads.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let mut pool = Self {
            handle: PoolHandle {
                shared: Arc::new(Shared {
                    capacity,
                    active: AtomicUsize::new(0),
                    closed: AtomicBool::new(false),
                    jobs: jobs_tx,
                }),
            },
            shutdown: Some(shutdown_tx),
            workers: Vec::with_capacity(capacity),
        };

        for index in 0..capacity {
            let handle = pool.handle.clone();
            let jobs = jobs_rx.clone();
            let shutdown = shutdown_rx.clone();

            // On failure the partially built pool is dropped, which stops the
            // workers already started.
            let worker = thread::Builder::new()
                .name(format!("workshare-{index}"))
                .spawn(move || worker_loop(&handle, &jobs, &shutdown))
                .map_err(|source| PoolError::Spawn { index, source })?;
            pool.workers.push(worker);
        }

        debug!(capacity, "work share pool started");
        Ok(pool)
    }

    /// Stop every worker and wait for them to exit.
    pub fn close(mut self) {
        self.shutdown_workers();
    }

    fn shutdown_workers(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };

        self.handle.shared.closed.store(true, Ordering::Relaxed);
        drop(shutdown);

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("work share worker panicked");
            }
        }

        debug!(capacity = self.handle.capacity(), "work share pool closed");
    }
}

impl Deref for Pool {
    type Target = PoolHandle;

    fn deref(&self) -> &PoolHandle {
        &self.handle
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown_workers();
    }
}

fn worker_loop(handle: &PoolHandle, jobs: &Receiver<Job>, shutdown: &Receiver<()>) {
    loop {
        select! {
            recv(jobs) -> job => match job {
                Ok(job) => job(handle),
                Err(_) => return,
            },
            recv(shutdown) -> _ => {
                // Jobs queued before shutdown still hold a slot; finish them.
                while let Ok(job) = jobs.try_recv() {
                    job(handle);
                }
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_capacity_never_reserves() {
        let pool = Pool::new(0).unwrap();
        assert_eq!(pool.capacity(), 0);
        assert!(!pool.try_reserve());
        assert_eq!(pool.active_workers(), 0);
        pool.close();
    }

    #[test]
    fn reservations_stop_at_capacity() {
        let pool = Pool::new(2).unwrap();
        assert!(pool.try_reserve());
        assert!(pool.try_reserve());
        assert!(!pool.try_reserve());
        assert_eq!(pool.active_workers(), 2);

        pool.release();
        assert!(pool.try_reserve());
        pool.release();
        pool.release();
        assert_eq!(pool.active_workers(), 0);
    }

    #[test]
    fn workers_are_named() {
        let pool = Pool::new(1).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        assert!(pool.try_reserve());
        pool.submit(Box::new(move |handle: &PoolHandle| {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
            handle.release();
        }));
        assert_eq!(rx.recv().unwrap().as_deref(), Some("workshare-0"));
    }

    #[test]
    fn closed_pool_refuses_reservations() {
        let pool = Pool::new(1).unwrap();
        let handle = PoolHandle::clone(&pool);
        pool.close();
        assert!(!handle.try_reserve());
    }

    #[test]
    fn submit_after_workers_exit_runs_inline() {
        let pool = Pool::new(1).unwrap();
        let handle = PoolHandle::clone(&pool);
        pool.close();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let caller = thread::current().id();
        handle.submit(Box::new(move |_: &PoolHandle| {
            tx.send(thread::current().id()).unwrap();
        }));
        assert_eq!(rx.recv().unwrap(), caller);
    }
}
