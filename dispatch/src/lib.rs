//! Dispatch-queue capability boundary for the Strand scheduler adapter.
//!
//! This crate defines the narrow interface a scheduler needs from an external
//! execution context: [`DispatchQueue::submit`], which enqueues a block of
//! work for execution under that context's own thread and ordering model, and
//! a best-effort [`Submission::revoke`] for blocks that have not yet run.
//!
//! The crate deliberately knows nothing about any concrete platform queue
//! (a UI main loop, an OS dispatch queue, ...). Embedders implement
//! [`DispatchQueue`] over whatever primitive they have. [`SerialQueue`] is
//! the in-memory implementation shipped here: a single named worker thread
//! draining submissions in order, usable both as a real "arbitrary queue"
//! target and as the test vehicle for everything built on top.
//!
//! # Example
//!
//! ```no_run
//! use strand_dispatch::{DispatchQueue, SerialQueue};
//!
//! let queue = SerialQueue::new("worker").unwrap();
//! let submission = queue.submit(Box::new(|| println!("ran"))).unwrap();
//!
//! // Too late once the block has started; a no-op then.
//! submission.revoke();
//! queue.shutdown();
//! ```

mod queue;
mod serial_queue;

pub use queue::{Block, DispatchQueue, Submission, SubmitError};
pub use serial_queue::SerialQueue;
