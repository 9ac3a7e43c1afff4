//! Per-call-site join scope
//!
//! An [`AsyncGroup`] collects the units of work one recursive call frame
//! decided to offload. The request value moves into the task and is handed
//! back by [`AsyncGroup::wait`], so the caller cannot touch it while a worker
//! may still be writing to it.

use crate::pool::{Job, PoolHandle};
use crossbeam_channel::Receiver;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    thread,
};
use tracing::trace;

type TaskOutcome<R> = thread::Result<R>;

/// Single-use group of tasks dispatched from one call frame
pub struct AsyncGroup<R> {
    inline: Vec<R>,
    pending: Vec<Receiver<TaskOutcome<R>>>,
    reservation: Option<PoolHandle>,
}

impl<R: Send + 'static> AsyncGroup<R> {
    /// Create an empty group
    pub fn new() -> Self {
        Self {
            inline: Vec::new(),
            pending: Vec::new(),
            reservation: None,
        }
    }

    /// Whether one more unit of work may be handed to the pool right now.
    ///
    /// A `true` answer reserves a worker slot for the next
    /// [`run_async`](Self::run_async) on this group, and that slot counts in
    /// [`PoolHandle::active_workers`]. Asking again before that call returns
    /// `true` for the slot already held, even if the reservation filled the
    /// pool; it never takes a second slot. A group without a reservation
    /// gets `false` whenever the pool is full, and always for a pool of
    /// capacity 0.
    pub fn can_share_work(&mut self, pool: &PoolHandle) -> bool {
        if self.reservation.is_some() {
            return true;
        }

        if pool.try_reserve() {
            self.reservation = Some(pool.clone());
            true
        } else {
            false
        }
    }

    /// Run `dispatch` on `request`, on a worker when a slot is reserved.
    ///
    /// Without a reservation the dispatch runs inline on the calling
    /// thread. Either way the request comes back from [`wait`](Self::wait).
    pub fn run_async<F>(&mut self, pool: &PoolHandle, dispatch: F, mut request: R)
    where
        F: FnOnce(&PoolHandle, &mut R) + Send + 'static,
    {
        let Some(slot) = self.reservation.take() else {
            trace!("no reserved slot, dispatching inline");
            dispatch(pool, &mut request);
            self.inline.push(request);
            return;
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move |worker: &PoolHandle| {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| dispatch(worker, &mut request)));
            worker.release();
            let _ = tx.send(outcome.map(|()| request));
        });

        self.pending.push(rx);
        slot.submit(job);
    }

    /// Block until every offloaded task has finished and return all
    /// requests.
    ///
    /// Order is unspecified. A panic raised by an offloaded task is resumed
    /// here once the remaining tasks have finished.
    pub fn wait(mut self) -> Vec<R> {
        let mut requests = std::mem::take(&mut self.inline);
        let (offloaded, fault) = self.join_pending();
        requests.extend(offloaded);

        if let Some(payload) = fault {
            panic::resume_unwind(payload);
        }
        requests
    }
}

impl<R> AsyncGroup<R> {
    /// Receive every offloaded outcome, keeping the first panic payload.
    fn join_pending(&mut self) -> (Vec<R>, Option<Box<dyn Any + Send>>) {
        let mut requests = Vec::with_capacity(self.pending.len());
        let mut fault: Option<Box<dyn Any + Send>> = None;

        for rx in std::mem::take(&mut self.pending) {
            match rx.recv() {
                Ok(Ok(request)) => requests.push(request),
                Ok(Err(payload)) => {
                    fault.get_or_insert(payload);
                }
                Err(_) => {
                    let lost: Box<dyn Any + Send> =
                        Box::new("work share task was dropped before running");
                    fault.get_or_insert(lost);
                }
            }
        }

        (requests, fault)
    }
}

impl<R: Send + 'static> Default for AsyncGroup<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for AsyncGroup<R> {
    fn drop(&mut self) {
        // A reservation that was never used goes back to the pool.
        if let Some(slot) = self.reservation.take() {
            slot.release();
        }

        // Dropped without `wait`: still join the offloaded tasks, and surface
        // their panics unless this thread is already unwinding.
        let (_, fault) = self.join_pending();
        if let Some(payload) = fault
            && !thread::panicking()
        {
            panic::resume_unwind(payload);
        }
    }
}

impl<R> std::fmt::Debug for AsyncGroup<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncGroup")
            .field("inline", &self.inline.len())
            .field("pending", &self.pending.len())
            .field("reserved", &self.reservation.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_capacity_runs_everything_inline() {
        let pool = Pool::new(0).unwrap();
        let caller = thread::current().id();
        let mut group = AsyncGroup::new();

        for n in 0..4u64 {
            assert!(!group.can_share_work(&pool));
            group.run_async(
                &pool,
                move |_, out: &mut (u64, Option<thread::ThreadId>)| {
                    *out = (n * 2, Some(thread::current().id()));
                },
                (0, None),
            );
        }

        let mut results = group.wait();
        results.sort_unstable_by_key(|r| r.0);
        assert_eq!(
            results.iter().map(|r| r.0).collect::<Vec<_>>(),
            vec![0, 2, 4, 6]
        );
        assert!(results.iter().all(|r| r.1 == Some(caller)));
    }

    #[test]
    fn never_shares_while_pool_is_full() {
        let pool = Pool::new(1).unwrap();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(0);

        let mut busy = AsyncGroup::new();
        assert!(busy.can_share_work(&pool));
        busy.run_async(
            &pool,
            move |_, done: &mut bool| {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                *done = true;
            },
            false,
        );
        started_rx.recv().unwrap();

        assert_eq!(pool.active_workers(), 1);
        let mut other: AsyncGroup<bool> = AsyncGroup::new();
        for _ in 0..10 {
            assert!(!other.can_share_work(&pool));
        }

        release_tx.send(()).unwrap();
        assert_eq!(busy.wait(), vec![true]);
        assert_eq!(pool.active_workers(), 0);
        assert!(other.can_share_work(&pool));
    }

    #[test]
    fn repeated_checks_return_the_held_slot_even_when_pool_is_full() {
        let pool = Pool::new(1).unwrap();
        let mut group: AsyncGroup<()> = AsyncGroup::new();
        assert!(group.can_share_work(&pool));
        assert_eq!(pool.active_workers(), pool.capacity());

        // The held slot is answered again; nobody else gets one.
        assert!(group.can_share_work(&pool));
        let mut other: AsyncGroup<()> = AsyncGroup::new();
        assert!(!other.can_share_work(&pool));
        assert_eq!(pool.active_workers(), 1);
    }

    #[test]
    fn unused_reservation_is_released_on_drop() {
        let pool = Pool::new(1).unwrap();
        {
            let mut group: AsyncGroup<()> = AsyncGroup::new();
            assert!(group.can_share_work(&pool));
            assert_eq!(pool.active_workers(), 1);
        }
        assert_eq!(pool.active_workers(), 0);
    }

    #[test]
    fn offloaded_panic_resumes_in_wait() {
        let pool = Pool::new(1).unwrap();
        let mut group = AsyncGroup::new();
        assert!(group.can_share_work(&pool));
        group.run_async(
            &pool,
            |_, _: &mut ()| std::panic::panic_any("task failed"),
            (),
        );

        let payload = panic::catch_unwind(AssertUnwindSafe(|| group.wait())).unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"task failed"));
        assert_eq!(pool.active_workers(), 0);

        // The worker survives and keeps serving.
        let mut next = AsyncGroup::new();
        assert!(next.can_share_work(&pool));
        next.run_async(&pool, |_, v: &mut u8| *v = 7, 0);
        assert_eq!(next.wait(), vec![7]);
    }

    #[test]
    fn dropped_group_still_surfaces_offloaded_panic() {
        let pool = Pool::new(1).unwrap();
        let mut group = AsyncGroup::new();
        assert!(group.can_share_work(&pool));
        group.run_async(
            &pool,
            |_, _: &mut ()| std::panic::panic_any("lost task"),
            (),
        );

        let payload = panic::catch_unwind(AssertUnwindSafe(move || drop(group))).unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"lost task"));
        assert_eq!(pool.active_workers(), 0);
    }

    #[test]
    fn dropped_group_joins_its_tasks() {
        let pool = Pool::new(1).unwrap();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let mut group = AsyncGroup::new();
        assert!(group.can_share_work(&pool));
        group.run_async(
            &pool,
            move |_, _: &mut ()| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                done_tx.send(()).unwrap();
            },
            (),
        );

        drop(group);
        assert!(done_rx.try_recv().is_ok());
    }
}
