//! Interruptible waits for work running on the loader thread
//!
//! Rust threads cannot be interrupted from outside, so each load gets its own
//! [`Interrupt`] handle. Canceling a load raises it, which wakes any
//! [`Interrupt::sleep`] in progress. Work that blocks elsewhere should call
//! [`Interrupt::check`] or poll its own cancel flag between steps.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Returned by interruptible waits once the interrupt has been raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Per-load interrupt signal, shared between the worker and the canceling thread
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    raised: Mutex<bool>,
    signal: Condvar,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt and wake every waiter. Idempotent.
    pub fn raise(&self) {
        let mut raised = self.lock();
        *raised = true;
        self.inner.signal.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// `Err(Interrupted)` once raised, for use with `?` between work steps
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_raised() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, returning early with `Err(Interrupted)` if raised
    ///
    /// A zero duration still reports an interrupt raised beforehand. A
    /// duration too large to add to the current instant sleeps until raised.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now().checked_add(duration);
        let mut raised = self.lock();
        loop {
            if *raised {
                return Err(Interrupted);
            }
            raised = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    self.inner
                        .signal
                        .wait_timeout(raised, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .signal
                    .wait(raised)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
