//! Process-wide delivery of unrecoverable action failures.
//!
//! By the time a scheduled action runs, no synchronous caller remains to
//! observe a failure, and the scheduler contract has no per-task error
//! channel. An action that panics is therefore wrapped in a [`FatalError`]
//! and delivered to a process-wide sink: the hook installed with
//! [`set_hook`], or `tracing::error!` when none is installed.
//!
//! The hook shape follows `std::panic::set_hook`/`take_hook` so embedders
//! (and tests) can capture or escalate delivery.

use std::sync::RwLock;
use thiserror::Error;
use trace_err::*;
use tracing::error;

/// A scheduled action failed; there is no caller left to observe it.
#[derive(Debug, Error)]
#[error("fatal error on scheduler worker: {message}")]
pub struct FatalError {
    message: String,
}

impl FatalError {
    pub(crate) fn from_panic(payload: Box<dyn core::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        Self { message }
    }

    /// The panic payload text of the failed action.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A process-wide sink for [`FatalError`]s.
pub type FatalHook = Box<dyn Fn(&FatalError) + Send + Sync>;

static HOOK: RwLock<Option<FatalHook>> = RwLock::new(None);

/// Installs `hook` as the process-wide fatal sink, replacing any previous
/// hook.
pub fn set_hook(hook: FatalHook) {
    *HOOK.write().trace_expect("Failed to lock mutex") = Some(hook);
}

/// Removes and returns the installed hook, restoring the default
/// log-and-continue sink.
pub fn take_hook() -> Option<FatalHook> {
    HOOK.write().trace_expect("Failed to lock mutex").take()
}

pub(crate) fn report(fatal: &FatalError) {
    match HOOK.read().trace_expect("Failed to lock mutex").as_ref() {
        Some(hook) => hook(fatal),
        None => error!("{fatal}"),
    }
}

/// Serializes tests that install a hook, since the sink is process-wide.
#[cfg(test)]
pub(crate) fn hook_test_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
    GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hook_captures_reports() {
        let _guard = hook_test_guard();

        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = seen.clone();
            set_hook(Box::new(move |fatal| {
                assert_eq!(fatal.message(), "boom");
                seen.fetch_add(1, Ordering::SeqCst);
            }));
        }

        report(&FatalError {
            message: "boom".to_string(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(take_hook().is_some());
        assert!(take_hook().is_none());

        // Default sink only logs; must not panic
        report(&FatalError {
            message: "boom".to_string(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_payload_text_is_extracted() {
        let fatal =
            FatalError::from_panic(std::panic::catch_unwind(|| panic!("kaboom")).unwrap_err());
        assert_eq!(fatal.message(), "kaboom");

        let fatal = FatalError::from_panic(Box::new(42_u32));
        assert_eq!(fatal.message(), "non-string panic payload");
    }
}
