//! Scheduler factories.
//!
//! A [`Scheduler`] binds workers to one target dispatch queue. It is
//! stateless beyond holding that queue reference, so it is cheap to clone
//! and share.
//!
//! The process-wide main scheduler is injected rather than discovered: the
//! embedder that owns the platform's main queue installs it once with
//! [`Scheduler::set_main`], and everyone else reaches it through
//! [`Scheduler::main`].

use crate::worker::Worker;
use std::sync::{Arc, OnceLock};
use strand_dispatch::DispatchQueue;
use thiserror::Error;

/// A main scheduler was already installed.
#[derive(Debug, Error)]
#[error("a main scheduler is already installed")]
pub struct MainAlreadySet;

static MAIN: OnceLock<Scheduler> = OnceLock::new();

/// Creates [`Worker`]s bound to one target dispatch queue.
#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<dyn DispatchQueue>,
}

impl Scheduler {
    /// A scheduler that dispatches onto `queue`.
    pub fn new(queue: Arc<dyn DispatchQueue>) -> Self {
        Self { queue }
    }

    /// A new worker bound to this scheduler's queue.
    pub fn create_worker(&self) -> Worker {
        Worker::new(self.queue.clone())
    }

    /// Installs the process-wide main scheduler over `queue`.
    ///
    /// First caller wins; the instance lives for the rest of the process.
    pub fn set_main(queue: Arc<dyn DispatchQueue>) -> Result<(), MainAlreadySet> {
        MAIN.set(Scheduler::new(queue)).map_err(|_| MainAlreadySet)
    }

    /// The process-wide main scheduler, if one has been installed.
    pub fn main() -> Option<&'static Scheduler> {
        MAIN.get()
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Scheduler")
    }
}
