//! Composite cancellation containers.
//!
//! A [`CancelSet`] is an unordered, mutable group of [`CancelToken`]s that
//! cancels them all together. Membership is dynamic and safe against a
//! concurrent sweep: when an `add` races a `cancel`, either the sweep
//! observes the new token and cancels it, or the adder observes the swept
//! state and cancels the token itself. Either way every token is cancelled
//! exactly once and none is silently leaked.
//!
//! Sweeping is terminal: once cancelled, a set stays empty and cancels
//! every token added to it immediately.
//!
//! # Lock discipline
//!
//! Membership is guarded by a spinlock holding only O(1) operations; token
//! release logic always runs after the lock is dropped, so a release that
//! re-enters the set (the scheduler's parent-detach path does) cannot
//! deadlock.

use crate::cancel_token::{Cancellable, CancelToken};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An unordered group of tokens cancelled as one unit.
///
/// Cheap to clone; clones share the same membership.
#[derive(Clone)]
pub struct CancelSet {
    inner: Arc<Inner>,
}

struct Inner {
    /// `None` is the terminal swept state.
    members: spin::Mutex<Option<Vec<CancelToken>>>,
    cancelled: AtomicBool,
}

impl CancelSet {
    /// Creates an empty, live set.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                members: spin::Mutex::new(Some(Vec::new())),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Adds `token` to the set.
    ///
    /// If the set has already been cancelled the token is cancelled
    /// immediately instead of being stored.
    pub fn add(&self, token: CancelToken) {
        let mut members = self.inner.members.lock();
        match members.as_mut() {
            Some(members) => members.push(token),
            None => {
                drop(members);
                token.cancel();
            }
        }
    }

    /// Removes `token` (by identity) and cancels it.
    ///
    /// No-op if the token is not a member, or if the set has already been
    /// swept.
    pub fn remove(&self, token: &CancelToken) {
        let removed = {
            let mut members = self.inner.members.lock();
            members.as_mut().and_then(|members| {
                members
                    .iter()
                    .position(|member| member.same(token))
                    .map(|at| members.swap_remove(at))
            })
        };

        if let Some(removed) = removed {
            removed.cancel();
        }
    }

    /// Cancels the set and every current member, exactly once.
    ///
    /// Only the winning caller sweeps; losers and later callers are no-ops.
    /// Tokens added concurrently are cancelled by whichever side observes
    /// the other.
    pub fn cancel(&self) {
        self.inner.cancel()
    }

    /// Whether the set itself has been cancelled. Reflects the set only,
    /// not any member state.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Current member count. Zero once swept.
    pub fn len(&self) -> usize {
        self.inner.members.lock().as_ref().map_or(0, Vec::len)
    }

    /// Whether the set currently has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A token view of this set, for nesting one group inside another.
    pub fn token(&self) -> CancelToken {
        CancelToken::from_cancellable(self.inner.clone())
    }
}

impl Default for CancelSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellable for CancelSet {
    fn cancel(&self) {
        CancelSet::cancel(self)
    }

    fn is_cancelled(&self) -> bool {
        CancelSet::is_cancelled(self)
    }
}

impl Cancellable for Inner {
    fn cancel(&self) {
        let drained = {
            let mut members = self.members.lock();
            let drained = members.take();
            if drained.is_some() {
                self.cancelled.store(true, Ordering::Release);
            }
            drained
        };

        if let Some(drained) = drained {
            for token in drained {
                token.cancel();
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl core::fmt::Debug for CancelSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelSet")
            .field("cancelled", &self.is_cancelled())
            .field("len", &self.len())
            .finish()
    }
}
