//! Thread-bound event queue
//!
//! One queue per thread. The owning thread drains it with `run_pending()`,
//! `run_once()`, `run_until()` or `run()`; any thread can post through a
//! [`QueueHandle`].

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::{DispatchError, Dispatcher, Message};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<QueueHandle>> = const { RefCell::new(None) };
}

enum Envelope {
    Run(Message),
    Quit,
}

/// Event queue owned by, and bound to, the thread that prepared it
///
/// Not `Send`: messages posted to it only ever run on that thread.
pub struct EventQueue {
    handle: QueueHandle,
    rx: Receiver<Envelope>,
    quit_requested: Cell<bool>,
    _not_send: PhantomData<*const ()>,
}

impl EventQueue {
    /// Create a queue and bind it to the calling thread
    pub fn prepare(label: impl Into<String>) -> Result<Self, DispatchError> {
        if let Some(existing) = QueueHandle::current() {
            return Err(DispatchError::AlreadyBound {
                label: existing.label().to_string(),
            });
        }

        let (tx, rx) = channel::unbounded();
        let handle = QueueHandle {
            tx,
            label: Arc::from(label.into()),
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
        };
        CURRENT.with(|current| *current.borrow_mut() = Some(handle.clone()));

        log::debug!("Event queue '{}' bound to {:?}", handle.label, std::thread::current().id());

        Ok(Self {
            handle,
            rx,
            quit_requested: Cell::new(false),
            _not_send: PhantomData,
        })
    }

    /// A handle other threads can post through
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn label(&self) -> &str {
        &self.handle.label
    }

    /// Number of messages waiting
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run every message already queued, without blocking
    ///
    /// Stops early at a quit marker. Returns how many messages ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(Envelope::Run(message)) => {
                    message();
                    ran += 1;
                }
                Ok(Envelope::Quit) => {
                    self.quit_requested.set(true);
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Wait up to `timeout` for one message and run it
    ///
    /// Returns whether a message ran.
    pub fn run_once(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => self.dispatch(envelope),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Run messages until `done` holds or `timeout` passes
    ///
    /// `done` is checked before each wait. Returns its final value. A timeout
    /// too large to add to the current instant waits without a deadline.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if done() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.run_once(deadline - now);
                }
                None => {
                    // The queue holds a sender, so recv only fails if that changes
                    let Ok(envelope) = self.rx.recv() else {
                        return done();
                    };
                    self.dispatch(envelope);
                }
            }
        }
    }

    fn dispatch(&self, envelope: Envelope) -> bool {
        match envelope {
            Envelope::Run(message) => {
                message();
                true
            }
            Envelope::Quit => {
                self.quit_requested.set(true);
                false
            }
        }
    }

    /// Run messages until [`QueueHandle::quit`] is called
    pub fn run(&self) {
        log::debug!("Event queue '{}' running", self.handle.label);

        if self.quit_requested.replace(false) {
            return;
        }

        while let Ok(envelope) = self.rx.recv() {
            match envelope {
                Envelope::Run(message) => message(),
                Envelope::Quit => break,
            }
        }

        log::debug!("Event queue '{}' stopped", self.handle.label);
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        let id = self.handle.id;
        // try_with: the thread-local may already be gone during thread teardown
        let _ = CURRENT.try_with(|current| {
            let mut current = current.borrow_mut();
            if current.as_ref().map(|h| h.id) == Some(id) {
                *current = None;
            }
        });
    }
}

/// Cloneable, thread-safe handle for posting to an [`EventQueue`]
#[derive(Clone)]
pub struct QueueHandle {
    tx: Sender<Envelope>,
    label: Arc<str>,
    id: u64,
}

impl QueueHandle {
    /// Handle of the queue bound to the calling thread, if any
    pub fn current() -> Option<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Whether the calling thread owns this queue
    pub fn is_current(&self) -> bool {
        CURRENT.with(|current| current.borrow().as_ref().map(|h| h.id) == Some(self.id))
    }

    /// Ask the owning thread's `run()` to return
    pub fn quit(&self) -> Result<(), DispatchError> {
        self.tx.send(Envelope::Quit).map_err(|_| self.disconnected())
    }

    fn disconnected(&self) -> DispatchError {
        DispatchError::Disconnected {
            label: self.label.to_string(),
        }
    }
}

impl Dispatcher for QueueHandle {
    fn post(&self, message: Message) -> Result<(), DispatchError> {
        self.tx.send(Envelope::Run(message)).map_err(|_| self.disconnected())
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("label", &self.label)
            .field("id", &self.id)
            .finish()
    }
}
