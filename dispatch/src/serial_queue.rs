//! In-memory serial dispatch queue.
//!
//! One named worker thread drains submissions in order from an unbounded
//! channel. Each submission carries a revocation flag that is checked
//! immediately before the block runs, so revoking is exact for blocks the
//! thread has not reached yet and a no-op for blocks already started.

use super::*;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

struct Entry {
    revoked: Arc<AtomicBool>,
    block: Block,
}

/// A serial execution context backed by a single named thread.
///
/// Blocks run in submission order. [`shutdown`](SerialQueue::shutdown) stops
/// intake, drains the backlog and joins the thread; submissions after that
/// fail with [`SubmitError::Closed`].
pub struct SerialQueue {
    tx: spin::Mutex<Option<flume::Sender<Entry>>>,
    thread: spin::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl SerialQueue {
    /// Starts a new queue whose worker thread is named `name`.
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = flume::unbounded();
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(rx))?;

        Ok(Self {
            tx: spin::Mutex::new(Some(tx)),
            thread: spin::Mutex::new(Some(thread)),
        })
    }

    fn run(rx: flume::Receiver<Entry>) {
        while let Ok(entry) = rx.recv() {
            if !entry.revoked.load(Ordering::Acquire) {
                (entry.block)();
            }
        }
    }

    /// Stops intake, drains the backlog and joins the worker thread.
    ///
    /// Idempotent. Must not be called from a block running on the queue
    /// itself, as it would join the calling thread.
    pub fn shutdown(&self) {
        // Dropping the sender disconnects the channel once the backlog drains
        drop(self.tx.lock().take());

        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            debug!("dispatch queue shutting down");
            if thread.join().is_err() {
                tracing::warn!("dispatch queue thread panicked");
            }
        }
    }
}

impl DispatchQueue for SerialQueue {
    fn submit(&self, block: Block) -> Result<Submission, SubmitError> {
        let revoked = Arc::new(AtomicBool::new(false));
        let entry = Entry {
            revoked: revoked.clone(),
            block,
        };

        self.tx
            .lock()
            .as_ref()
            .ok_or(SubmitError::Closed)?
            .send(entry)
            .map_err(|_| SubmitError::Closed)?;

        Ok(Submission::new(move || {
            revoked.store(true, Ordering::Release)
        }))
    }
}
