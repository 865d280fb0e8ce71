//! Error types for background loading
//!
//! Two families live here:
//!
//! - [`LoadError`] is what a load can end with. It is delivered to
//!   [`Callback::on_load_error`](crate::Callback::on_load_error) on the
//!   dispatcher context, never returned to the caller of `start_loading`.
//! - [`LoaderError`] covers misuse of the [`Loader`](crate::Loader) itself
//!   (starting twice, canceling while idle, no event queue on the calling
//!   thread). These come back synchronously from the loader's methods.

use std::any::Any;
use std::fmt;
use std::io;

use thiserror::Error;

use crate::interrupt::Interrupted;

/// Errors a load can finish with
#[derive(Debug, Error)]
pub enum LoadError {
    /// The blocking call inside `load()` was interrupted by a cancel
    ///
    /// Reported through `on_load_canceled`, never `on_load_error`.
    #[error("load interrupted")]
    Interrupted,

    /// Ordinary failure from the work itself, passed through unchanged
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Anything the work did not declare: panics and foreign error types
    #[error(transparent)]
    Unexpected(#[from] UnexpectedLoaderError),
}

impl LoadError {
    /// Wrap an error of an undeclared type as an unexpected loader error
    pub fn unexpected<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unexpected(UnexpectedLoaderError::new(cause))
    }

    /// Whether this error means the load was interrupted
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<Interrupted> for LoadError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

/// Failure of a type the loadable did not declare
///
/// Displays as `Unexpected <type>: <message>` and chains the original failure
/// as its [`source`](std::error::Error::source).
#[derive(Debug, Error)]
#[error("Unexpected {type_name}: {message}")]
pub struct UnexpectedLoaderError {
    type_name: String,
    message: String,
    #[source]
    cause: Box<dyn std::error::Error + Send + Sync>,
}

impl UnexpectedLoaderError {
    /// Wrap an arbitrary error, recording its short type name
    pub fn new<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            type_name: short_type_name(std::any::type_name::<E>()).to_string(),
            message: cause.to_string(),
            cause: Box::new(cause),
        }
    }

    /// Wrap the payload of a caught panic
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let panic = PanicError::from_payload(payload);
        Self {
            type_name: "panic".to_string(),
            message: panic.message.clone(),
            cause: Box::new(panic),
        }
    }

    /// Short type name of the original failure
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Message of the original failure
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The original failure
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

/// A panic raised inside `load()`, kept as an error value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicError {
    message: String,
}

impl PanicError {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panicked: {}", self.message)
    }
}

impl std::error::Error for PanicError {}

/// `a::b::Foo<c::Bar>` -> `Foo<c::Bar>`
fn short_type_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Misuse of the loader, reported synchronously
#[derive(Debug, Error)]
pub enum LoaderError {
    /// `start_loading` while a load is active
    #[error("Loader '{name}' is already loading")]
    AlreadyLoading { name: String },

    /// `cancel_loading` while idle
    #[error("Loader '{name}' is not loading")]
    NotLoading { name: String },

    /// Implicit-dispatcher start from a thread with no event queue
    #[error("Calling thread has no event queue to deliver callbacks on")]
    NoCurrentQueue,

    /// The loader was released and can no longer start loads
    #[error("Loader '{name}' has been released")]
    Released { name: String },

    /// The OS refused to spawn the worker thread
    #[error("Failed to spawn worker thread '{name}': {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The worker thread is gone
    #[error("Worker thread '{name}' disconnected")]
    WorkerDisconnected { name: String },
}

impl LoaderError {
    /// Whether this is a contract violation by the caller (illegal state)
    /// rather than an infrastructure failure
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Self::AlreadyLoading { .. }
                | Self::NotLoading { .. }
                | Self::NoCurrentQueue
                | Self::Released { .. }
        )
    }
}

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;
