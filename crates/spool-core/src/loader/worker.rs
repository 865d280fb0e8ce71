//! Dedicated single-thread worker
//!
//! Runs submitted jobs one at a time, in submission order, on a named thread
//! that lives as long as the owning loader. Shutting down stops intake; the
//! job in progress (and anything queued before the shutdown) still runs.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender};

use crate::error::{LoaderError, Result};

/// A unit of work for the worker thread
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum WorkerCommand {
    Run(Job),
    Shutdown,
}

/// Handle to the worker thread
pub(crate) struct Worker {
    name: String,
    command_tx: Sender<WorkerCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker thread, named `name`
    pub(crate) fn spawn(name: &str) -> Result<Self> {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();

        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(thread_name, command_rx))
            .map_err(|source| LoaderError::WorkerSpawn {
                name: name.to_string(),
                source,
            })?;

        Ok(Self {
            name: name.to_string(),
            command_tx,
            thread_handle: Some(handle),
        })
    }

    /// Queue a job behind any already submitted
    pub(crate) fn submit(&self, job: Job) -> Result<()> {
        self.command_tx
            .send(WorkerCommand::Run(job))
            .map_err(|_| LoaderError::WorkerDisconnected {
                name: self.name.clone(),
            })
    }

    /// Stop accepting work. Does not wait for the thread.
    pub(crate) fn shutdown(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        // Detach: a job blocked inside load() must not block the caller
        self.thread_handle.take();
    }

    /// Whether the worker thread is still alive
    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

/// Worker thread main loop
fn run(name: String, command_rx: Receiver<WorkerCommand>) {
    log::info!("Loader worker '{}' started", name);

    while let Ok(cmd) = command_rx.recv() {
        match cmd {
            WorkerCommand::Run(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    log::error!("Loader worker '{}': job panicked outside load()", name);
                }
            }
            WorkerCommand::Shutdown => {
                log::info!("Loader worker '{}' shutting down", name);
                break;
            }
        }
    }

    log::info!("Loader worker '{}' stopped", name);
}
