//! Delivery of loader results onto a chosen thread
//!
//! Load outcomes are produced on the loader's worker thread but must be
//! reported on the thread that started the load. A [`Dispatcher`] is anything
//! that can run a closure later, in posting order, on one specific thread.
//!
//! ```text
//! ┌──────────────┐   start_loading    ┌───────────────┐
//! │ Event queue  │ ─────────────────► │ Loader worker │
//! │   thread     │                    │   (load())    │
//! │              │ ◄───────────────── │               │
//! └──────────────┘   post(message)    └───────────────┘
//!        │
//!        ▼ run_pending() / run()
//!   callback fires here
//! ```
//!
//! [`EventQueue`] is the provided implementation: a crossbeam channel drained
//! by the thread that owns it. Preparing a queue binds it to the calling
//! thread, so loads started there can find it through
//! [`QueueHandle::current`].

mod queue;

pub use queue::{EventQueue, QueueHandle};

use thiserror::Error;

/// A unit of work to run on a dispatcher's thread
pub type Message = Box<dyn FnOnce() + Send + 'static>;

/// Runs messages later, in posting order, on one specific thread
pub trait Dispatcher: Send + Sync {
    /// Enqueue a message. Fails if the receiving side is gone.
    fn post(&self, message: Message) -> Result<(), DispatchError>;

    /// Name for diagnostics
    fn label(&self) -> &str;
}

impl<D: Dispatcher + ?Sized> Dispatcher for std::sync::Arc<D> {
    fn post(&self, message: Message) -> Result<(), DispatchError> {
        (**self).post(message)
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

/// Errors from dispatcher setup and delivery
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The queue was dropped; nothing will ever run the message
    #[error("Event queue '{label}' is no longer running")]
    Disconnected { label: String },

    /// The calling thread already owns an event queue
    #[error("Thread already has event queue '{label}'")]
    AlreadyBound { label: String },
}
