//! Per-load execution unit
//!
//! A [`LoadTask`] runs once on the worker thread and produces one [`Outcome`].
//! The outcome travels back to the dispatcher, where the task clears the
//! loader's state and invokes exactly one callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};
use std::time::Duration;

use crate::error::{LoadError, UnexpectedLoaderError};
use crate::interrupt::Interrupt;
use crate::loadable::{Callback, Loadable};

use super::LoaderShared;

/// Terminal message posted from the worker to the dispatcher
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Work finished or was skipped/interrupted by a cancel
    EndOfSource,
    /// Work failed
    Error(LoadError),
}

/// Type-erased view of a task, held by the loader while it is active
pub(crate) trait TaskControl: Send + Sync {
    fn id(&self) -> u64;

    /// Cancel cooperatively, then raise the task's interrupt
    fn quit(&self);
}

pub(crate) struct LoadTask<L: Loadable + ?Sized> {
    id: u64,
    loadable: Arc<L>,
    delay: Duration,
    interrupt: Interrupt,
    /// Written once by the worker, read by whichever thread cancels
    executor_thread: OnceLock<Thread>,
}

impl<L: Loadable + ?Sized + 'static> LoadTask<L> {
    pub(crate) fn new(id: u64, loadable: Arc<L>, delay: Duration) -> Self {
        Self {
            id,
            loadable,
            delay,
            interrupt: Interrupt::new(),
            executor_thread: OnceLock::new(),
        }
    }

    /// Run on the worker thread. Never panics out; every path yields an outcome.
    pub(crate) fn run(&self) -> Outcome {
        let _ = self.executor_thread.set(thread::current());

        match panic::catch_unwind(AssertUnwindSafe(|| self.execute())) {
            Ok(Ok(())) => Outcome::EndOfSource,
            Ok(Err(LoadError::Interrupted)) => {
                if self.loadable.is_load_canceled() {
                    Outcome::EndOfSource
                } else {
                    // quit() cancels before it raises, so the loadable made this up
                    log::error!("Task {} interrupted without being canceled", self.id);
                    Outcome::Error(LoadError::Interrupted)
                }
            }
            Ok(Err(error @ LoadError::Io(_))) => {
                log::debug!("Task {} failed: {}", self.id, error);
                Outcome::Error(error)
            }
            Ok(Err(error @ LoadError::Unexpected(_))) => {
                log::error!("Unexpected error in task {}: {}", self.id, error);
                Outcome::Error(error)
            }
            Err(payload) => {
                let error = UnexpectedLoaderError::from_panic(payload);
                log::error!("Unexpected error in task {}: {}", self.id, error);
                Outcome::Error(LoadError::Unexpected(error))
            }
        }
    }

    fn execute(&self) -> Result<(), LoadError> {
        if !self.delay.is_zero() {
            self.interrupt.sleep(self.delay)?;
        }
        if !self.loadable.is_load_canceled() {
            self.loadable.load(&self.interrupt)?;
        } else {
            log::debug!("Task {} canceled before load, skipping", self.id);
        }
        Ok(())
    }

    /// Deliver the outcome on the dispatcher thread
    ///
    /// The loader goes idle before the callback runs, so the callback may
    /// start another load. A cancel request wins over whatever the work
    /// reported.
    pub(crate) fn handle_message<C>(&self, outcome: Outcome, callback: C, shared: &LoaderShared)
    where
        C: Callback<L>,
    {
        shared.finish(self.id);

        let loadable = self.loadable.as_ref();
        if loadable.is_load_canceled() {
            log::debug!("Task {} delivered as canceled", self.id);
            callback.on_load_canceled(loadable);
            return;
        }

        match outcome {
            Outcome::EndOfSource => callback.on_load_completed(loadable),
            Outcome::Error(error) => callback.on_load_error(loadable, error),
        }
    }
}

impl<L: Loadable + ?Sized + 'static> TaskControl for LoadTask<L> {
    fn id(&self) -> u64 {
        self.id
    }

    fn quit(&self) {
        self.loadable.cancel_load();
        // The interrupt belongs to this task alone, so raising it before the
        // worker picks the task up only cuts the delay short
        self.interrupt.raise();
        if let Some(thread) = self.executor_thread.get() {
            thread.unpark();
        }
    }
}
