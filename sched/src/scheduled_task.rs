//! The cancellable wrapper around one scheduled action.
//!
//! A task's life is: pool thread calls [`ScheduledTask::run`], which hands
//! the action off into the target dispatch queue; the queued block executes
//! the action and then funnels into the same one-shot cancel path used by
//! external disposal. Whoever wins the one-shot guard drops the unexecuted
//! action (if any), aborts the pool future, revokes the queue submission
//! and detaches the task from its parent worker — each exactly once.

use crate::cancel_set::CancelSet;
use crate::cancel_token::{Cancellable, CancelToken};
use crate::fatal::{self, FatalError};
use core::sync::atomic::{AtomicBool, Ordering};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use strand_dispatch::{Block, DispatchQueue};
use tracing::warn;

pub(crate) struct ScheduledTask {
    queue: Arc<dyn DispatchQueue>,
    /// Taken by whichever of execution and cancellation comes first.
    action: spin::Mutex<Option<Block>>,
    /// Pool abort + submission revoke + parent detach.
    group: CancelSet,
    fired: AtomicBool,
}

impl ScheduledTask {
    pub(crate) fn new(action: Block, queue: Arc<dyn DispatchQueue>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            action: spin::Mutex::new(Some(action)),
            group: CancelSet::new(),
            fired: AtomicBool::new(false),
        })
    }

    /// The task's externally visible token.
    pub(crate) fn token(self: &Arc<Self>) -> CancelToken {
        CancelToken::from_cancellable(self.clone() as Arc<dyn Cancellable>)
    }

    /// Pool-side entry point: hand off into the dispatch queue.
    ///
    /// The pool thread never runs the action itself. If the task was
    /// cancelled before the hand-off the action slot is already empty and
    /// the queued block is a no-op.
    pub(crate) fn run(self: &Arc<Self>) {
        let this = self.clone();
        match self.queue.submit(Box::new(move || this.execute())) {
            Ok(submission) => {
                // If cancellation already won, add() revokes immediately
                self.group
                    .add(CancelToken::on_cancel(move || submission.revoke()));
            }
            Err(error) => {
                warn!("failed to hand off scheduled action: {error}");
                self.cancel();
            }
        }
    }

    /// Queue-side entry point: run the action, then clean up exactly once.
    fn execute(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
                // No caller is left to observe this; it goes to the fatal sink
                fatal::report(&FatalError::from_panic(payload));
            }
        }
        self.cancel();
    }

    /// Registers a cancellation dependency (pool abort, submission revoke).
    pub(crate) fn attach(&self, token: CancelToken) {
        self.group.add(token);
    }

    /// Registers detachment from the owning worker: when this task is
    /// cancelled or completes, `token` is removed from `parent` so
    /// long-lived workers do not accumulate spent tokens.
    pub(crate) fn attach_parent(&self, parent: &CancelSet, token: CancelToken) {
        self.group
            .add(CancelToken::from_cancellable(Arc::new(Remover {
                parent: parent.clone(),
                token,
                fired: AtomicBool::new(false),
            })));
    }
}

impl Cancellable for ScheduledTask {
    fn cancel(&self) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // Before the hand-off runs, this is what prevents the action
            // from ever executing
            drop(self.action.lock().take());
            self.group.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.group.is_cancelled()
    }
}

/// Removes a spent task's token from its parent set, exactly once.
struct Remover {
    parent: CancelSet,
    token: CancelToken,
    fired: AtomicBool,
}

impl Cancellable for Remover {
    fn cancel(&self) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.parent.remove(&self.token);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;
    use core::time::Duration;
    use std::sync::mpsc;
    use strand_dispatch::SerialQueue;

    fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn run_executes_action_then_cancels_itself() {
        let queue = Arc::new(SerialQueue::new("task-run").unwrap());
        let (tx, rx) = mpsc::channel();
        let task = ScheduledTask::new(
            Box::new(move || tx.send(()).unwrap()),
            queue.clone() as Arc<dyn DispatchQueue>,
        );

        task.run();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || task.is_cancelled()));
    }

    #[test]
    fn cancel_before_run_drops_the_action() {
        let queue = Arc::new(SerialQueue::new("task-cancel").unwrap());
        let ran = Arc::new(AtomicUsize::new(0));
        let task = {
            let ran = ran.clone();
            ScheduledTask::new(
                Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }),
                queue.clone() as Arc<dyn DispatchQueue>,
            )
        };

        task.cancel();
        task.run();

        // Everything queued so far has run once shutdown returns
        queue.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(task.is_cancelled());
    }

    #[test]
    fn remover_detaches_from_parent_once() {
        let parent = CancelSet::new();
        let token = CancelToken::new();
        parent.add(token.clone());

        let remover = Remover {
            parent: parent.clone(),
            token: token.clone(),
            fired: AtomicBool::new(false),
        };

        assert_eq!(parent.len(), 1);
        remover.cancel();
        assert_eq!(parent.len(), 0);
        assert!(token.is_cancelled());

        // Second fire is a no-op
        remover.cancel();
        assert_eq!(parent.len(), 0);
    }

    #[test]
    fn hand_off_failure_cancels_the_task() {
        let queue = Arc::new(SerialQueue::new("task-closed").unwrap());
        queue.shutdown();

        let ran = Arc::new(AtomicUsize::new(0));
        let task = {
            let ran = ran.clone();
            ScheduledTask::new(
                Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }),
                queue as Arc<dyn DispatchQueue>,
            )
        };

        task.run();
        assert!(task.is_cancelled());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
