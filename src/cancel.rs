//! Cooperative cancellation for long running collection work.
//!
//! A [`CancelToken`] is owned by the thread doing the work and passed by `&mut` into
//! every expensive call. Other threads keep a [`CancelHandle`] to abort it.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Number of checks between two samples of the external stop signal.
const CHECK_INTERVAL: u32 = 16;

/// Returned by collection operations interrupted through their [`CancelToken`].
///
/// The collection stays structurally valid; the call can simply be repeated.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation canceled")]
pub struct Canceled;

/// Worker-side cancellation flag with amortized checks.
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
    stop: Option<Arc<AtomicBool>>,
    checks: u32,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a token that is only canceled through its handles.
    pub fn new() -> Self {
        Self {
            canceled: Arc::new(AtomicBool::new(false)),
            stop: None,
            checks: 0,
        }
    }

    /// Creates a token that also observes `stop`, sampled once every few checks.
    pub fn with_stop_signal(stop: Arc<AtomicBool>) -> Self {
        Self {
            stop: Some(stop),
            ..Self::new()
        }
    }

    /// Returns a handle able to cancel this token from any thread.
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            canceled: self.canceled.clone(),
        }
    }

    /// Cancels the token. The next check observes it.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    /// Returns true once the token has been canceled.
    pub fn is_canceled(&mut self) -> bool {
        if self.canceled.load(Ordering::Relaxed) {
            return true;
        }
        self.checks = self.checks.wrapping_add(1);
        if self.checks % CHECK_INTERVAL == 0
            && let Some(stop) = &self.stop
            && stop.load(Ordering::Relaxed)
        {
            self.canceled.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// `?`-friendly form of [`CancelToken::is_canceled`].
    pub fn check(&mut self) -> Result<(), Canceled> {
        if self.is_canceled() { Err(Canceled) } else { Ok(()) }
    }
}

/// Shared handle to a [`CancelToken`].
#[derive(Clone)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancels the token this handle was taken from.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    /// Returns true if the token was canceled.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_token_is_not_canceled() {
        let mut token = CancelToken::new();
        for _ in 0..100 {
            assert!(!token.is_canceled());
        }
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn explicit_cancel_is_seen_immediately() {
        let mut token = CancelToken::new();
        token.cancel();
        assert!(token.is_canceled());
        assert_eq!(token.check(), Err(Canceled));
    }

    #[test]
    fn handle_cancels_from_another_thread() {
        let mut token = CancelToken::new();
        let handle = token.handle();
        thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(token.is_canceled());
    }

    #[test]
    fn stop_signal_is_sampled_periodically() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut token = CancelToken::with_stop_signal(stop.clone());
        stop.store(true, Ordering::Relaxed);

        let mut seen_after = None;
        for i in 1..=CHECK_INTERVAL {
            if token.is_canceled() {
                seen_after = Some(i);
                break;
            }
        }
        assert_eq!(seen_after, Some(CHECK_INTERVAL));
        // once observed, it sticks
        assert!(token.is_canceled());
        assert!(token.handle().is_canceled());
    }
}
