//! Single-unit cancellation handles.
//!
//! A [`CancelToken`] represents one cancellable unit of work or grouping.
//! Cancellation is a single-winner transition: among any number of
//! concurrent [`cancel`](CancelToken::cancel) calls, exactly one performs
//! the release side effect and the rest are no-ops. Once cancelled, a token
//! stays cancelled forever.
//!
//! Tokens are cheap clonable handles; clones share state and identity.
//!
//! # Example
//!
//! ```
//! use strand_sched::CancelToken;
//!
//! let token = CancelToken::on_cancel(|| println!("released"));
//! assert!(!token.is_cancelled());
//!
//! token.cancel();
//! token.cancel(); // idempotent, release ran once
//! assert!(token.is_cancelled());
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One cancellable unit: an idempotent cancel and a state query.
///
/// Implementations must make `cancel` a single-winner transition, and
/// `is_cancelled` must not report `true` before the winning transition is
/// visible to the reading thread.
pub trait Cancellable: Send + Sync {
    /// Requests cancellation. Idempotent.
    fn cancel(&self);

    /// Whether cancellation has taken effect.
    fn is_cancelled(&self) -> bool;
}

/// A clonable handle to one [`Cancellable`] unit.
///
/// Identity (used for membership in a [`CancelSet`](crate::CancelSet)) is
/// the shared allocation, so clones compare equal and distinct tokens never
/// do.
#[derive(Clone)]
pub struct CancelToken(Arc<dyn Cancellable>);

impl CancelToken {
    /// Creates a plain token with no release logic.
    pub fn new() -> Self {
        Self::on_cancel(|| {})
    }

    /// Creates a token that runs `release` exactly once, on the winning
    /// `cancel` call.
    pub fn on_cancel(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Arc::new(Inner {
            cancelled: AtomicBool::new(false),
            release: spin::Mutex::new(Some(Box::new(release))),
        }))
    }

    /// Creates an inert token that is already cancelled.
    pub fn cancelled() -> Self {
        Self(Arc::new(Cancelled))
    }

    pub(crate) fn from_cancellable(inner: Arc<dyn Cancellable>) -> Self {
        Self(inner)
    }

    /// Requests cancellation; the release logic runs at most once across
    /// all clones and callers.
    pub fn cancel(&self) {
        self.0.cancel()
    }

    /// Whether this token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Shared-allocation identity.
    pub(crate) fn same(&self, other: &Self) -> bool {
        core::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl Cancellable for CancelToken {
    fn cancel(&self) {
        CancelToken::cancel(self)
    }

    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Inner {
    cancelled: AtomicBool,
    release: spin::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Cancellable for Inner {
    fn cancel(&self) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // Only the winning transition reaches the release logic
            let release = self.release.lock().take();
            if let Some(release) = release {
                release();
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct Cancelled;

impl Cancellable for Cancelled {
    fn cancel(&self) {}

    fn is_cancelled(&self) -> bool {
        true
    }
}
