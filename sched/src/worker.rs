//! Per-scheduler scheduling contexts.
//!
//! A [`Worker`] issues actions onto one target dispatch queue and tracks a
//! token for every task it has issued. Cancelling the worker cancels every
//! outstanding task: nothing not yet started will run after the cancel
//! returns, while actions already mid-execution complete normally.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strand_dispatch::SerialQueue;
//! use strand_sched::Scheduler;
//!
//! let queue = Arc::new(SerialQueue::new("worker").unwrap());
//! let scheduler = Scheduler::new(queue);
//! let worker = scheduler.create_worker();
//!
//! let token = worker.schedule(|| println!("ran")).unwrap();
//! token.cancel(); // best-effort if not yet started
//! worker.cancel(); // cancels everything the worker issued
//! ```

use crate::cancel_set::CancelSet;
use crate::cancel_token::{Cancellable, CancelToken};
use crate::delay_pool::{self, PoolError};
use crate::scheduled_task::ScheduledTask;
use std::sync::Arc;
use strand_dispatch::DispatchQueue;
use thiserror::Error;
use time::Duration;
use tracing::trace;

/// Errors that can occur when scheduling an action.
///
/// This is the only failure a scheduling caller can observe; everything
/// after the synchronous hand-in is cancellation or fatal-sink territory.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The process-wide delay pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A scheduling context that issues and tracks a group of cancellable
/// tasks against one dispatch queue.
///
/// Workers are not reusable after [`cancel`](Worker::cancel): scheduling on
/// a cancelled worker returns an inert, already-cancelled token and the
/// action is never invoked. Dropping a worker does not cancel it.
pub struct Worker {
    queue: Arc<dyn DispatchQueue>,
    tasks: CancelSet,
}

impl Worker {
    pub(crate) fn new(queue: Arc<dyn DispatchQueue>) -> Self {
        Self {
            queue,
            tasks: CancelSet::new(),
        }
    }

    /// Schedules `action` to run as soon as the pool hands it to the
    /// queue.
    pub fn schedule(
        &self,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<CancelToken, ScheduleError> {
        self.schedule_after(Duration::ZERO, action)
    }

    /// Schedules `action` to run no earlier than `delay` from now.
    ///
    /// A non-positive delay schedules immediately. Returns a token that
    /// cancels the task: exact before the pool hands off to the queue,
    /// best-effort afterwards. Never blocks.
    pub fn schedule_after(
        &self,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<CancelToken, ScheduleError> {
        if self.tasks.is_cancelled() {
            return Ok(CancelToken::cancelled());
        }

        trace!(delay = %delay, "scheduling action");

        let task = ScheduledTask::new(Box::new(action), self.queue.clone());
        let token = task.token();

        // Track before spawning, so a racing worker cancel always observes
        // this task
        self.tasks.add(token.clone());
        task.attach_parent(&self.tasks, token.clone());

        let pool_token = if delay.is_positive() {
            let delay: core::time::Duration = delay.try_into().unwrap_or(core::time::Duration::MAX);
            let task = task.clone();
            delay_pool::schedule(delay, move || task.run())
        } else {
            let task = task.clone();
            delay_pool::submit(move || task.run())
        };

        match pool_token {
            Ok(pool_token) => {
                task.attach(pool_token);
                Ok(token)
            }
            Err(error) => {
                // Detach the stillborn task before surfacing the failure
                token.cancel();
                Err(error.into())
            }
        }
    }

    /// Cancels this worker and every outstanding task it has issued.
    ///
    /// Terminal and idempotent. Tasks already mid-execution are not
    /// interrupted.
    pub fn cancel(&self) {
        self.tasks.cancel()
    }

    /// Whether this worker has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.tasks.is_cancelled()
    }
}

impl Cancellable for Worker {
    fn cancel(&self) {
        Worker::cancel(self)
    }

    fn is_cancelled(&self) -> bool {
        Worker::is_cancelled(self)
    }
}

impl core::fmt::Debug for Worker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Worker")
            .field("cancelled", &self.is_cancelled())
            .field("outstanding", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use strand_dispatch::SerialQueue;

    fn worker_on(name: &str) -> (Arc<SerialQueue>, Worker) {
        let queue = Arc::new(SerialQueue::new(name).unwrap());
        let worker = Worker::new(queue.clone());
        (queue, worker)
    }

    fn wait_until(deadline: core::time::Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(core::time::Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn immediate_action_runs_once() {
        let (_queue, worker) = worker_on("w-immediate");
        let ran = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let token = {
            let ran = ran.clone();
            worker
                .schedule(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    tx.send(()).unwrap();
                })
                .unwrap()
        };

        rx.recv_timeout(core::time::Duration::from_secs(5)).unwrap();
        std::thread::sleep(core::time::Duration::from_millis(100));
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        // Completion funnels into the same disposal path as cancellation
        assert!(wait_until(core::time::Duration::from_secs(2), || {
            token.is_cancelled()
        }));
    }

    #[test]
    fn delayed_action_runs() {
        let (_queue, worker) = worker_on("w-delayed");
        let (tx, rx) = mpsc::channel();

        worker
            .schedule_after(Duration::milliseconds(20), move || tx.send(()).unwrap())
            .unwrap();

        rx.recv_timeout(core::time::Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn cancelled_delayed_action_never_runs() {
        let (_queue, worker) = worker_on("w-cancel-delayed");
        let ran_a = Arc::new(AtomicUsize::new(0));
        let ran_b = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        {
            let ran_a = ran_a.clone();
            worker
                .schedule(move || {
                    ran_a.fetch_add(1, Ordering::SeqCst);
                    tx.send(()).unwrap();
                })
                .unwrap();
        }
        let token_b = {
            let ran_b = ran_b.clone();
            worker
                .schedule_after(Duration::milliseconds(50), move || {
                    ran_b.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
        };
        token_b.cancel();

        rx.recv_timeout(core::time::Duration::from_secs(5)).unwrap();
        std::thread::sleep(core::time::Duration::from_millis(400));

        assert_eq!(ran_a.load(Ordering::SeqCst), 1);
        assert_eq!(ran_b.load(Ordering::SeqCst), 0);
        assert!(token_b.is_cancelled());
    }

    #[test]
    fn worker_cancel_prevents_pending_tasks() {
        let (_queue, worker) = worker_on("w-sweep");
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let ran = ran.clone();
            worker
                .schedule_after(Duration::milliseconds(150), move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        worker.cancel();
        assert!(worker.is_cancelled());

        std::thread::sleep(core::time::Duration::from_millis(500));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn schedule_on_cancelled_worker_is_inert() {
        let (_queue, worker) = worker_on("w-inert");
        worker.cancel();

        let ran = Arc::new(AtomicUsize::new(0));
        let token = {
            let ran = ran.clone();
            worker
                .schedule(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
        };

        assert!(token.is_cancelled());
        std::thread::sleep(core::time::Duration::from_millis(200));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(worker.tasks.len(), 0);
    }

    #[test]
    fn hundred_actions_from_ten_threads_each_run_once() {
        let (_queue, worker) = worker_on("w-contend");
        let worker = Arc::new(worker);
        let ran = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let threads: Vec<_> = (0..10)
            .map(|_| {
                let worker = worker.clone();
                let ran = ran.clone();
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let ran = ran.clone();
                        let tx = tx.clone();
                        worker
                            .schedule(move || {
                                ran.fetch_add(1, Ordering::SeqCst);
                                tx.send(()).unwrap();
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
        for _ in 0..100 {
            rx.recv_timeout(core::time::Duration::from_secs(10)).unwrap();
        }

        std::thread::sleep(core::time::Duration::from_millis(200));
        assert_eq!(ran.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn completed_tasks_detach_from_the_worker() {
        let (_queue, worker) = worker_on("w-detach");
        let (tx, rx) = mpsc::channel();

        for _ in 0..8 {
            let tx = tx.clone();
            worker.schedule(move || tx.send(()).unwrap()).unwrap();
        }
        for _ in 0..8 {
            rx.recv_timeout(core::time::Duration::from_secs(5)).unwrap();
        }

        assert!(wait_until(core::time::Duration::from_secs(2), || {
            worker.tasks.is_empty()
        }));
        assert!(!worker.is_cancelled());
    }

    #[test]
    fn panicking_action_reports_fatal_once_and_cancels() {
        let _guard = fatal::hook_test_guard();

        let (_queue, worker) = worker_on("w-panic");
        let reports = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        {
            let reports = reports.clone();
            fatal::set_hook(Box::new(move |fatal| {
                assert!(fatal.message().contains("scheduled kaboom"));
                reports.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            }));
        }

        let token = worker
            .schedule(|| panic!("scheduled kaboom"))
            .unwrap();

        rx.recv_timeout(core::time::Duration::from_secs(5)).unwrap();
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert!(wait_until(core::time::Duration::from_secs(2), || {
            token.is_cancelled()
        }));

        fatal::take_hook();
    }

    #[test]
    fn hand_off_to_closed_queue_cancels_the_token() {
        let (queue, worker) = worker_on("w-closed");
        queue.shutdown();

        let ran = Arc::new(AtomicUsize::new(0));
        let token = {
            let ran = ran.clone();
            worker
                .schedule(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
        };

        assert!(wait_until(core::time::Duration::from_secs(2), || {
            token.is_cancelled()
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
