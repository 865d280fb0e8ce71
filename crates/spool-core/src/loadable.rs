//! Contracts supplied by the caller: the work to run and who hears about it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::LoadError;
use crate::interrupt::Interrupt;

/// A unit of cancelable, possibly blocking work run by a [`Loader`](crate::Loader)
///
/// The loader never looks inside a loadable. It calls [`load`](Self::load) on
/// its worker thread and [`cancel_load`](Self::cancel_load) from whichever
/// thread cancels, so implementations keep their cancel state in something
/// thread-safe such as a [`CancelFlag`].
pub trait Loadable: Send + Sync {
    /// Request cancellation. Afterwards `is_load_canceled` must return true.
    fn cancel_load(&self);

    /// Whether the load has been canceled
    fn is_load_canceled(&self) -> bool;

    /// Perform the load, returning on completion or cancellation
    ///
    /// Long-running work should poll `is_load_canceled` and block only through
    /// `interrupt` so a cancel can end it promptly. Return
    /// `Err(LoadError::Interrupted)` (or use `?` on an interrupted wait) when
    /// a cancel cut the work short.
    fn load(&self, interrupt: &Interrupt) -> Result<(), LoadError>;
}

/// Receives exactly one terminal notification per load
///
/// Always invoked on the dispatcher the load was started with, never on the
/// loader's worker thread. By the time any of these run the loader is already
/// idle, so a callback may start the next load.
pub trait Callback<L: ?Sized>: Send + 'static {
    /// The load was canceled
    fn on_load_canceled(&self, loadable: &L);

    /// The load ran to completion
    fn on_load_completed(&self, loadable: &L);

    /// The load failed
    fn on_load_error(&self, loadable: &L, error: LoadError);
}

impl<L: ?Sized, C: Callback<L> + Sync + ?Sized> Callback<L> for Arc<C> {
    fn on_load_canceled(&self, loadable: &L) {
        (**self).on_load_canceled(loadable)
    }

    fn on_load_completed(&self, loadable: &L) {
        (**self).on_load_completed(loadable)
    }

    fn on_load_error(&self, loadable: &L, error: LoadError) {
        (**self).on_load_error(loadable, error)
    }
}

/// Shared cancel flag for implementing [`Loadable`]
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    canceled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}
