//! Spool Core - run one cancelable load at a time on a background thread
//!
//! A [`Loader`] runs a caller-supplied [`Loadable`] on its own worker thread
//! and reports the outcome to a [`Callback`] on the thread that started the
//! load, through that thread's [`EventQueue`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod interrupt;
pub mod loadable;
pub mod loader;

pub use config::LoaderConfig;
pub use dispatch::{DispatchError, Dispatcher, EventQueue, Message, QueueHandle};
pub use error::{LoadError, LoaderError, PanicError, Result, UnexpectedLoaderError};
pub use interrupt::{Interrupt, Interrupted};
pub use loadable::{Callback, CancelFlag, Loadable};
pub use loader::Loader;
