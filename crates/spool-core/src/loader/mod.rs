//! Single-task background loader
//!
//! A [`Loader`] owns one worker thread and runs at most one [`Loadable`] on
//! it at a time. The outcome is delivered through the [`Dispatcher`] the load
//! was started with, normally the [`EventQueue`](crate::EventQueue) of the
//! thread that called `start_loading`.
//!
//! # State
//!
//! ```text
//!            start_loading*           terminal message delivered
//!   ┌──────┐ ─────────────► ┌─────────┐ ─────────────────────────► ┌──────┐
//!   │ Idle │                │ Loading │                            │ Idle │
//!   └──────┘ ◄───────────── └─────────┘                            └──────┘
//!                             │  cancel_loading: cancel + interrupt,
//!                             │  still Loading until delivery
//! ```
//!
//! Starting while loading, or canceling while idle, is a programming error
//! and comes back as a [`LoaderError`] without touching the active load.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use spool_core::{
//!     Callback, CancelFlag, EventQueue, Interrupt, LoadError, Loadable, Loader,
//! };
//!
//! struct Fetch { canceled: CancelFlag }
//!
//! impl Loadable for Fetch {
//!     fn cancel_load(&self) { self.canceled.cancel() }
//!     fn is_load_canceled(&self) -> bool { self.canceled.is_canceled() }
//!     fn load(&self, interrupt: &Interrupt) -> Result<(), LoadError> {
//!         interrupt.sleep(Duration::from_millis(10))?;
//!         Ok(())
//!     }
//! }
//!
//! struct Report;
//!
//! impl Callback<Fetch> for Report {
//!     fn on_load_canceled(&self, _: &Fetch) { println!("canceled") }
//!     fn on_load_completed(&self, _: &Fetch) { println!("done") }
//!     fn on_load_error(&self, _: &Fetch, e: LoadError) { println!("failed: {}", e) }
//! }
//!
//! let queue = EventQueue::prepare("main").unwrap();
//! let loader = Loader::new("fetch-loader").unwrap();
//! loader
//!     .start_loading(Arc::new(Fetch { canceled: CancelFlag::new() }), Report)
//!     .unwrap();
//! queue.run_until(Duration::from_secs(1), || !loader.is_loading());
//! ```

mod task;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::LoaderConfig;
use crate::dispatch::{Dispatcher, Message, QueueHandle};
use crate::error::{LoaderError, Result};
use crate::loadable::{Callback, Loadable};

use task::{LoadTask, TaskControl};
use worker::{Job, Worker};

/// Loader state: idle, or loading exactly one task
enum LoadState {
    Idle,
    Loading { task: Arc<dyn TaskControl> },
}

/// State shared between the loader and the messages it posts
pub(crate) struct LoaderShared {
    state: Mutex<LoadState>,
}

impl LoaderShared {
    fn lock(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return to idle if `task_id` is still the active task
    pub(crate) fn finish(&self, task_id: u64) {
        let mut state = self.lock();
        if matches!(&*state, LoadState::Loading { task } if task.id() == task_id) {
            *state = LoadState::Idle;
        }
    }
}

/// Runs one loadable at a time on a dedicated worker thread
pub struct Loader {
    name: String,
    /// `None` once released
    worker: Option<Worker>,
    shared: Arc<LoaderShared>,
    next_task_id: AtomicU64,
}

impl Loader {
    /// Create a loader whose worker thread is called `name`
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let worker = Worker::spawn(&name)?;

        log::info!("Loader '{}' created", name);

        Ok(Self {
            name,
            worker: Some(worker),
            shared: Arc::new(LoaderShared {
                state: Mutex::new(LoadState::Idle),
            }),
            next_task_id: AtomicU64::new(1),
        })
    }

    /// Create a loader from configuration
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        Self::new(config.thread_name.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start loading, delivering the outcome on the calling thread's event queue
    ///
    /// Fails with [`LoaderError::NoCurrentQueue`] if the calling thread has
    /// not prepared an [`EventQueue`](crate::EventQueue).
    pub fn start_loading<L, C>(&self, loadable: Arc<L>, callback: C) -> Result<()>
    where
        L: Loadable + ?Sized + 'static,
        C: Callback<L>,
    {
        self.start_loading_delayed(loadable, callback, Duration::ZERO)
    }

    /// Like [`start_loading`](Self::start_loading), waiting `delay` before `load()`
    pub fn start_loading_delayed<L, C>(
        &self,
        loadable: Arc<L>,
        callback: C,
        delay: Duration,
    ) -> Result<()>
    where
        L: Loadable + ?Sized + 'static,
        C: Callback<L>,
    {
        let queue = QueueHandle::current().ok_or(LoaderError::NoCurrentQueue)?;
        self.start_loading_on_delayed(queue, loadable, callback, delay)
    }

    /// Start loading, delivering the outcome through `dispatcher`
    pub fn start_loading_on<D, L, C>(&self, dispatcher: D, loadable: Arc<L>, callback: C) -> Result<()>
    where
        D: Dispatcher + 'static,
        L: Loadable + ?Sized + 'static,
        C: Callback<L>,
    {
        self.start_loading_on_delayed(dispatcher, loadable, callback, Duration::ZERO)
    }

    /// Start loading after `delay`, delivering the outcome through `dispatcher`
    ///
    /// Returns immediately. Fails with [`LoaderError::AlreadyLoading`] if a
    /// load is active and [`LoaderError::Released`] after [`release`](Self::release).
    pub fn start_loading_on_delayed<D, L, C>(
        &self,
        dispatcher: D,
        loadable: Arc<L>,
        callback: C,
        delay: Duration,
    ) -> Result<()>
    where
        D: Dispatcher + 'static,
        L: Loadable + ?Sized + 'static,
        C: Callback<L>,
    {
        let worker = self.worker.as_ref().ok_or_else(|| LoaderError::Released {
            name: self.name.clone(),
        })?;

        let task = {
            let mut state = self.shared.lock();
            if matches!(&*state, LoadState::Loading { .. }) {
                return Err(LoaderError::AlreadyLoading {
                    name: self.name.clone(),
                });
            }
            let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
            let task = Arc::new(LoadTask::new(id, loadable, delay));
            *state = LoadState::Loading { task: task.clone() };
            task
        };
        let id = task.id();

        log::debug!(
            "Loader '{}' starting task {} (delay {:?}, delivering to '{}')",
            self.name,
            id,
            delay,
            dispatcher.label()
        );

        let shared = self.shared.clone();
        let job: Job = Box::new(move || {
            let outcome = task.run();

            let delivery_shared = shared.clone();
            let delivery_task = task.clone();
            let message: Message = Box::new(move || {
                delivery_task.handle_message(outcome, callback, &delivery_shared);
            });

            if let Err(e) = dispatcher.post(message) {
                // Nobody is left to deliver to; don't leave the loader stuck
                log::warn!("Dropping outcome of task {}: {}", task.id(), e);
                shared.finish(task.id());
            }
        });

        if let Err(e) = worker.submit(job) {
            self.shared.finish(id);
            return Err(e);
        }

        Ok(())
    }

    /// Whether a load is active
    pub fn is_loading(&self) -> bool {
        matches!(&*self.shared.lock(), LoadState::Loading { .. })
    }

    /// Cancel the active load
    ///
    /// Cancels the loadable and interrupts any wait it is blocked in, or its
    /// start delay if the worker has not reached it yet. The canceled callback fires later, on the
    /// dispatcher; the loader stays loading until then.
    pub fn cancel_loading(&self) -> Result<()> {
        let task = match &*self.shared.lock() {
            LoadState::Loading { task } => task.clone(),
            LoadState::Idle => {
                return Err(LoaderError::NotLoading {
                    name: self.name.clone(),
                })
            }
        };

        log::debug!("Loader '{}' canceling task {}", self.name, task.id());
        // Outside the lock: quit() calls into user code
        task.quit();
        Ok(())
    }

    /// Cancel any active load and shut the worker down for good
    ///
    /// Does not wait for a running load; it finishes or is interrupted and its
    /// canceled callback is still delivered. Later starts fail with
    /// [`LoaderError::Released`]. Calling this twice is harmless.
    pub fn release(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        if self.is_loading() {
            let _ = self.cancel_loading();
        }
        worker.shutdown();

        log::info!("Loader '{}' released", self.name);
    }

    pub fn is_released(&self) -> bool {
        self.worker.is_none()
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.name)
            .field("loading", &self.is_loading())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventQueue;
    use crate::error::{LoadError, PanicError};
    use crate::interrupt::Interrupt;
    use crate::loadable::CancelFlag;
    use crossbeam::channel::{Receiver, Sender};
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::thread::{self, ThreadId};
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(5);

    enum Behavior {
        Complete,
        Fail(io::ErrorKind),
        Panic,
        /// Report an interrupt nobody raised
        InterruptSelf,
        /// Fail with an error type the loader does not know
        Foreign,
        /// Sleep through the interrupt handle until canceled
        BlockInterruptibly,
        /// Wait on the gate ignoring cancellation, then return `result`
        WaitForGate(Receiver<()>, Option<io::ErrorKind>),
    }

    struct TestLoadable {
        canceled: CancelFlag,
        behavior: Behavior,
        calls: AtomicUsize,
        started_tx: Sender<(ThreadId, Option<String>)>,
    }

    impl TestLoadable {
        fn new(behavior: Behavior) -> (Arc<Self>, Receiver<(ThreadId, Option<String>)>) {
            let (started_tx, started_rx) = crossbeam::channel::unbounded();
            let loadable = Arc::new(Self {
                canceled: CancelFlag::new(),
                behavior,
                calls: AtomicUsize::new(0),
                started_tx,
            });
            (loadable, started_rx)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Loadable for TestLoadable {
        fn cancel_load(&self) {
            self.canceled.cancel();
        }

        fn is_load_canceled(&self) -> bool {
            self.canceled.is_canceled()
        }

        fn load(&self, interrupt: &Interrupt) -> std::result::Result<(), LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = thread::current();
            let _ = self
                .started_tx
                .send((current.id(), current.name().map(str::to_string)));

            match &self.behavior {
                Behavior::Complete => Ok(()),
                Behavior::Fail(kind) => Err(io::Error::new(*kind, "test failure").into()),
                Behavior::Panic => panic!("loadable bug"),
                Behavior::InterruptSelf => Err(LoadError::Interrupted),
                Behavior::Foreign => {
                    let cause = "twelve".parse::<u32>().unwrap_err();
                    Err(LoadError::unexpected(cause))
                }
                Behavior::BlockInterruptibly => {
                    interrupt.sleep(Duration::from_secs(60))?;
                    Ok(())
                }
                Behavior::WaitForGate(gate, result) => {
                    let _ = gate.recv_timeout(TIMEOUT);
                    match result {
                        Some(kind) => Err(io::Error::new(*kind, "late failure").into()),
                        None => Ok(()),
                    }
                }
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Canceled,
        Completed,
        Error,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<(Kind, ThreadId)>>>,
        errors: Arc<Mutex<Vec<LoadError>>>,
    }

    impl Recorder {
        fn kinds(&self) -> Vec<Kind> {
            self.events.lock().unwrap().iter().map(|(k, _)| *k).collect()
        }

        fn threads(&self) -> Vec<ThreadId> {
            self.events.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }

        fn take_error(&self) -> Option<LoadError> {
            self.errors.lock().unwrap().pop()
        }

        fn record(&self, kind: Kind) {
            self.events.lock().unwrap().push((kind, thread::current().id()));
        }
    }

    impl<L: ?Sized> Callback<L> for Recorder {
        fn on_load_canceled(&self, _: &L) {
            self.record(Kind::Canceled);
        }

        fn on_load_completed(&self, _: &L) {
            self.record(Kind::Completed);
        }

        fn on_load_error(&self, _: &L, error: LoadError) {
            self.errors.lock().unwrap().push(error);
            self.record(Kind::Error);
        }
    }

    fn wait_idle(queue: &EventQueue, loader: &Loader) {
        assert!(
            queue.run_until(TIMEOUT, || !loader.is_loading()),
            "load did not finish in time"
        );
    }

    #[test]
    fn test_delayed_load_completes_on_queue_thread() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("delayed-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, started) = TestLoadable::new(Behavior::Complete);

        let start = Instant::now();
        loader
            .start_loading_delayed(loadable.clone(), recorder.clone(), Duration::from_millis(50))
            .unwrap();
        assert!(loader.is_loading());

        wait_idle(&queue, &loader);

        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(recorder.kinds(), vec![Kind::Completed]);
        assert_eq!(recorder.threads(), vec![thread::current().id()]);
        assert!(!loader.is_loading());

        let (worker_id, worker_name) = started.try_recv().unwrap();
        assert_ne!(worker_id, thread::current().id());
        assert_eq!(worker_name.as_deref(), Some("delayed-loader"));
    }

    #[test]
    fn test_start_while_loading_is_rejected() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("busy-loader").unwrap();
        let recorder = Recorder::default();
        let (blocking, started) = TestLoadable::new(Behavior::BlockInterruptibly);
        let (second, _) = TestLoadable::new(Behavior::Complete);

        loader.start_loading(blocking, recorder.clone()).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        let next_id = loader.next_task_id.load(Ordering::Relaxed);
        let err = loader.start_loading(second.clone(), recorder.clone()).unwrap_err();
        assert!(matches!(err, LoaderError::AlreadyLoading { .. }));
        assert!(err.is_illegal_state());
        assert!(loader.is_loading());
        assert_eq!(loader.next_task_id.load(Ordering::Relaxed), next_id);

        loader.cancel_loading().unwrap();
        wait_idle(&queue, &loader);
        queue.run_pending();

        assert_eq!(recorder.kinds(), vec![Kind::Canceled]);
        assert_eq!(second.calls(), 0);
    }

    #[test]
    fn test_cancel_before_load_skips_work() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("skip-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, _) = TestLoadable::new(Behavior::Complete);

        loader
            .start_loading_delayed(loadable.clone(), recorder.clone(), Duration::from_millis(200))
            .unwrap();
        loader.cancel_loading().unwrap();
        assert!(loader.is_loading(), "cancel is asynchronous");

        wait_idle(&queue, &loader);

        assert_eq!(loadable.calls(), 0);
        assert_eq!(recorder.kinds(), vec![Kind::Canceled]);
    }

    #[test]
    fn test_cancel_interrupts_blocking_load() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("interrupt-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, started) = TestLoadable::new(Behavior::BlockInterruptibly);

        loader.start_loading(loadable.clone(), recorder.clone()).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        let start = Instant::now();
        loader.cancel_loading().unwrap();
        wait_idle(&queue, &loader);

        assert!(start.elapsed() < TIMEOUT);
        assert_eq!(recorder.kinds(), vec![Kind::Canceled]);
        assert!(recorder.take_error().is_none());
    }

    #[test]
    fn test_io_error_delivered_verbatim() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("failing-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, _) = TestLoadable::new(Behavior::Fail(io::ErrorKind::ConnectionReset));

        loader.start_loading(loadable, recorder.clone()).unwrap();
        wait_idle(&queue, &loader);

        assert_eq!(recorder.kinds(), vec![Kind::Error]);
        match recorder.take_error() {
            Some(LoadError::Io(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(e.to_string(), "test failure");
            }
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_reported_as_unexpected_error() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("panicking-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, _) = TestLoadable::new(Behavior::Panic);

        loader.start_loading(loadable, recorder.clone()).unwrap();
        wait_idle(&queue, &loader);

        assert_eq!(recorder.kinds(), vec![Kind::Error]);
        match recorder.take_error() {
            Some(LoadError::Unexpected(e)) => {
                assert_eq!(e.to_string(), "Unexpected panic: loadable bug");
                let cause = e.cause().downcast_ref::<PanicError>().unwrap();
                assert_eq!(cause.message(), "loadable bug");
            }
            other => panic!("expected unexpected error, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_error_keeps_original_source() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("foreign-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, _) = TestLoadable::new(Behavior::Foreign);

        loader.start_loading(loadable, recorder.clone()).unwrap();
        wait_idle(&queue, &loader);

        assert_eq!(recorder.kinds(), vec![Kind::Error]);
        match recorder.take_error() {
            Some(LoadError::Unexpected(e)) => {
                assert_eq!(e.type_name(), "ParseIntError");
                assert_eq!(
                    e.to_string(),
                    "Unexpected ParseIntError: invalid digit found in string"
                );
                let source = std::error::Error::source(&e).unwrap();
                assert!(source.downcast_ref::<std::num::ParseIntError>().is_some());
            }
            other => panic!("expected unexpected error, got {:?}", other),
        }
    }

    #[test]
    fn test_interrupt_without_cancel_still_delivers() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("self-interrupting-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, _) = TestLoadable::new(Behavior::InterruptSelf);

        loader.start_loading(loadable, recorder.clone()).unwrap();
        wait_idle(&queue, &loader);

        assert_eq!(recorder.kinds(), vec![Kind::Error]);
        assert!(recorder.take_error().unwrap().is_interrupted());

        // Still usable afterwards
        let (next, _) = TestLoadable::new(Behavior::Complete);
        loader.start_loading(next, recorder.clone()).unwrap();
        wait_idle(&queue, &loader);
        assert_eq!(recorder.kinds(), vec![Kind::Error, Kind::Completed]);
    }

    #[test]
    fn test_cancel_during_unbounded_delay() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Loader::new("patient-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, _) = TestLoadable::new(Behavior::Complete);

        loader
            .start_loading_delayed(loadable.clone(), recorder.clone(), Duration::MAX)
            .unwrap();
        assert!(!queue.run_until(Duration::from_millis(30), || !loader.is_loading()));
        assert!(recorder.kinds().is_empty());

        loader.cancel_loading().unwrap();
        wait_idle(&queue, &loader);

        assert_eq!(loadable.calls(), 0);
        assert_eq!(recorder.kinds(), vec![Kind::Canceled]);
    }

    #[test]
    fn test_cancel_overrides_completed_and_failed_outcomes() {
        for late_result in [None, Some(io::ErrorKind::BrokenPipe)] {
            let queue = EventQueue::prepare("test").unwrap();
            let loader = Loader::new("stubborn-loader").unwrap();
            let recorder = Recorder::default();
            let (gate_tx, gate_rx) = crossbeam::channel::bounded(1);
            let (loadable, started) =
                TestLoadable::new(Behavior::WaitForGate(gate_rx, late_result));

            loader.start_loading(loadable.clone(), recorder.clone()).unwrap();
            started.recv_timeout(TIMEOUT).unwrap();

            // The loadable ignores both signals and finishes on its own terms
            loader.cancel_loading().unwrap();
            gate_tx.send(()).unwrap();
            wait_idle(&queue, &loader);

            assert_eq!(loadable.calls(), 1);
            assert_eq!(recorder.kinds(), vec![Kind::Canceled]);
            assert!(recorder.take_error().is_none());
        }
    }

    #[test]
    fn test_cancel_while_idle_fails() {
        let loader = Loader::new("idle-loader").unwrap();
        let err = loader.cancel_loading().unwrap_err();
        assert!(matches!(err, LoaderError::NotLoading { .. }));
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_start_without_queue_fails_but_explicit_dispatcher_works() {
        let queue = EventQueue::prepare("owner").unwrap();
        let handle = queue.handle();
        let loader = Arc::new(Loader::new("remote-loader").unwrap());
        let recorder = Recorder::default();

        let remote_loader = loader.clone();
        let remote_recorder = recorder.clone();
        let implicit_err = thread::spawn(move || {
            let (first, _) = TestLoadable::new(Behavior::Complete);
            let err = remote_loader
                .start_loading(first, remote_recorder.clone())
                .unwrap_err();

            let (second, _) = TestLoadable::new(Behavior::Complete);
            remote_loader
                .start_loading_on(handle, second, remote_recorder)
                .unwrap();
            err
        })
        .join()
        .unwrap();

        assert!(matches!(implicit_err, LoaderError::NoCurrentQueue));
        wait_idle(&queue, &loader);
        assert_eq!(recorder.kinds(), vec![Kind::Completed]);
        assert_eq!(recorder.threads(), vec![thread::current().id()]);
    }

    struct Chain {
        loader: Arc<Loader>,
        next: Mutex<Option<Arc<TestLoadable>>>,
        recorder: Recorder,
        loading_seen: Arc<Mutex<Vec<bool>>>,
    }

    impl Callback<TestLoadable> for Chain {
        fn on_load_canceled(&self, _: &TestLoadable) {}

        fn on_load_completed(&self, loadable: &TestLoadable) {
            self.loading_seen.lock().unwrap().push(self.loader.is_loading());
            self.recorder.on_load_completed(loadable);
            if let Some(next) = self.next.lock().unwrap().take() {
                self.loader.start_loading(next, self.recorder.clone()).unwrap();
            }
        }

        fn on_load_error(&self, _: &TestLoadable, _: LoadError) {}
    }

    #[test]
    fn test_callback_sees_idle_loader_and_can_start_next_load() {
        let queue = EventQueue::prepare("test").unwrap();
        let loader = Arc::new(Loader::new("chain-loader").unwrap());
        let recorder = Recorder::default();
        let loading_seen = Arc::new(Mutex::new(Vec::new()));
        let (first, first_started) = TestLoadable::new(Behavior::Complete);
        let (second, second_started) = TestLoadable::new(Behavior::Complete);

        let chain = Chain {
            loader: loader.clone(),
            next: Mutex::new(Some(second.clone())),
            recorder: recorder.clone(),
            loading_seen: loading_seen.clone(),
        };
        loader.start_loading(first, chain).unwrap();

        assert!(queue.run_until(TIMEOUT, || recorder.kinds().len() == 2));
        assert_eq!(*loading_seen.lock().unwrap(), vec![false]);
        assert_eq!(second.calls(), 1);
        assert!(!loader.is_loading());

        // Same dedicated worker thread for sequential loads
        let (first_worker, _) = first_started.try_recv().unwrap();
        let (second_worker, _) = second_started.try_recv().unwrap();
        assert_eq!(first_worker, second_worker);
    }

    #[test]
    fn test_release_idle_fires_no_callback() {
        let queue = EventQueue::prepare("test").unwrap();
        let mut loader = Loader::new("released-loader").unwrap();
        let recorder = Recorder::default();

        loader.release();
        assert!(loader.is_released());
        queue.run_until(Duration::from_millis(20), || false);
        assert!(recorder.kinds().is_empty());

        let (loadable, _) = TestLoadable::new(Behavior::Complete);
        let err = loader.start_loading(loadable.clone(), recorder).unwrap_err();
        assert!(matches!(err, LoaderError::Released { .. }));
        assert_eq!(loadable.calls(), 0);

        // Second release is a no-op
        loader.release();
    }

    #[test]
    fn test_release_while_loading_cancels() {
        let queue = EventQueue::prepare("test").unwrap();
        let mut loader = Loader::new("releasing-loader").unwrap();
        let recorder = Recorder::default();
        let (loadable, started) = TestLoadable::new(Behavior::BlockInterruptibly);

        loader.start_loading(loadable.clone(), recorder.clone()).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        loader.release();
        assert!(loadable.is_load_canceled());
        wait_idle(&queue, &loader);

        assert_eq!(recorder.kinds(), vec![Kind::Canceled]);
    }

    #[test]
    fn test_drop_cancels_active_load() {
        let queue = EventQueue::prepare("test").unwrap();
        let recorder = Recorder::default();
        let (loadable, started) = TestLoadable::new(Behavior::BlockInterruptibly);

        let loader = Loader::new("dropped-loader").unwrap();
        loader.start_loading(loadable.clone(), recorder.clone()).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();
        drop(loader);

        assert!(loadable.is_load_canceled());
        assert!(queue.run_until(TIMEOUT, || !recorder.kinds().is_empty()));
        assert_eq!(recorder.kinds(), vec![Kind::Canceled]);
    }

    #[test]
    fn test_dropped_queue_does_not_leave_loader_stuck() {
        let loader = Loader::new("orphan-loader").unwrap();
        let queue = EventQueue::prepare("short-lived").unwrap();
        let handle = queue.handle();
        drop(queue);

        let (loadable, _) = TestLoadable::new(Behavior::Complete);
        loader
            .start_loading_on(handle, loadable, Recorder::default())
            .unwrap();

        let deadline = Instant::now() + TIMEOUT;
        while loader.is_loading() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!loader.is_loading());
    }
}
