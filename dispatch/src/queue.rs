use thiserror::Error;

/// A unit of work accepted by a [`DispatchQueue`].
pub type Block = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can occur when submitting work to a dispatch queue.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The queue no longer accepts work.
    #[error("the dispatch queue is closed")]
    Closed,
}

/// An execution context that runs blocks under its own thread and ordering
/// model.
///
/// Implementations must not run the block on the submitting thread inside
/// `submit`; submission only enqueues. Whether the context is serial or
/// concurrent is the implementation's business and is inherited by callers.
pub trait DispatchQueue: Send + Sync {
    /// Enqueues `block` for execution, returning a handle that can revoke it
    /// before it runs.
    fn submit(&self, block: Block) -> Result<Submission, SubmitError>;
}

/// A best-effort revocation handle for one queued block.
///
/// Revoking is exact only before the queue reaches the block; a block that
/// has already started is never interrupted. Dropping the handle without
/// calling [`revoke`](Submission::revoke) leaves the block scheduled.
pub struct Submission(Box<dyn FnOnce() + Send>);

impl Submission {
    /// Wraps an implementation-specific revocation action.
    pub fn new(revoke: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(revoke))
    }

    /// Revokes the submission if it has not yet run.
    pub fn revoke(self) {
        (self.0)()
    }
}

impl core::fmt::Debug for Submission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Submission")
    }
}
