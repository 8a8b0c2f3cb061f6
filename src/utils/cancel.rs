// src/utils/cancel.rs
//! Shared cancellation signal for long-lived tasks
//!
//! Passed to every worker at construction and polled at defined checkpoints
//! (between cadence cycles, inside drain loops). Edge handlers never see it.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloneable cancellation token backed by a flag and a condition variable
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger cancellation and wake every waiter
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Block for at most `timeout`. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.signal.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert!(handle.join().unwrap());
        assert!(token.is_cancelled());
    }
}
