//! Reactive-streams scheduler adapter over external dispatch queues.
//!
//! This crate is the scheduler-and-cancellation substrate beneath a
//! reactive-streams implementation: it submits units of work onto an
//! external execution context (any [`DispatchQueue`]), hands callers a
//! token that cancels pending or in-flight work exactly once, and composes
//! many such tokens into a single cancellable group.
//!
//! # Pieces
//!
//! - [`CancelToken`] / [`CancelSet`]: single-winner idempotent cancellation
//!   and composable cancellation groups
//! - [`Scheduler`] / [`Worker`]: the scheduler contract — create a worker,
//!   schedule immediate or delayed actions, cancel everything a worker
//!   issued
//! - a process-wide, lazily started delay pool (one background thread)
//!   that realizes delays before handing actions off to the target queue
//! - [`fatal`]: process-wide delivery of action panics, since no caller
//!   remains to observe an asynchronous failure
//!
//! Actions always execute inside the target dispatch queue, never on the
//! pool thread; the queue's own threading and ordering model is inherited,
//! not redefined here.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strand_dispatch::SerialQueue;
//! use strand_sched::Scheduler;
//! use time::Duration;
//!
//! let queue = Arc::new(SerialQueue::new("background").unwrap());
//! let scheduler = Scheduler::new(queue);
//! let worker = scheduler.create_worker();
//!
//! worker.schedule(|| println!("now-ish")).unwrap();
//! let token = worker
//!     .schedule_after(Duration::milliseconds(50), || println!("later"))
//!     .unwrap();
//!
//! token.cancel(); // "later" never runs
//! worker.cancel(); // and neither does anything else still pending
//! ```

pub mod cancel_set;
pub mod cancel_token;
mod delay_pool;
pub mod fatal;
mod scheduled_task;
pub mod scheduler;
pub mod worker;

pub use cancel_set::CancelSet;
pub use cancel_token::{Cancellable, CancelToken};
pub use delay_pool::PoolError;
pub use fatal::{FatalError, FatalHook};
pub use scheduler::{MainAlreadySet, Scheduler};
pub use worker::{ScheduleError, Worker};

// Re-export the capability boundary for consumers
pub use strand_dispatch::{Block, DispatchQueue, Submission, SubmitError};
