use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Result, SiftError};

#[derive(Debug, Default)]
struct Flag {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation shared between a caller and in-flight work.
///
/// Clones share the same cancel flag. A token may additionally carry a
/// deadline; [`with_timeout`](CancelToken::with_timeout) derives a token that
/// shares the flag but expires on its own.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<Flag>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        self.flag.cancelled.store(true, Ordering::SeqCst);
        self.flag.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Derive a token sharing this flag whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            flag: self.flag.clone(),
            deadline: Some(deadline),
        }
    }

    /// Return an error if the token was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SiftError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SiftError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Resolve once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> SiftError {
        loop {
            // Register before checking the flag so a concurrent cancel() is not missed.
            let notified = self.flag.notify.notified();
            if let Err(e) = self.check() {
                return e;
            }
            match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => return SiftError::DeadlineExceeded,
                    }
                }
                None => notified.await,
            }
        }
    }
}
