//! Loadable that reads a file in chunks

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use spool_core::{CancelFlag, Interrupt, LoadError, Loadable};

const CHUNK_SIZE: usize = 64 * 1024;

/// Reads a whole file, checking for cancellation between chunks
pub struct FileLoadable {
    path: PathBuf,
    /// Pause after each chunk, to make slow media observable
    throttle: Duration,
    canceled: CancelFlag,
    bytes_read: AtomicU64,
}

impl FileLoadable {
    pub fn new(path: impl Into<PathBuf>, throttle: Duration) -> Self {
        Self {
            path: path.into(),
            throttle,
            canceled: CancelFlag::new(),
            bytes_read: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::SeqCst)
    }
}

impl Loadable for FileLoadable {
    fn cancel_load(&self) {
        self.canceled.cancel();
    }

    fn is_load_canceled(&self) -> bool {
        self.canceled.is_canceled()
    }

    fn load(&self, interrupt: &Interrupt) -> Result<(), LoadError> {
        let mut file = File::open(&self.path)?;
        let mut buf = vec![0u8; CHUNK_SIZE];

        while !self.canceled.is_canceled() {
            interrupt.check()?;
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.bytes_read.fetch_add(n as u64, Ordering::SeqCst);
            if !self.throttle.is_zero() {
                interrupt.sleep(self.throttle)?;
            }
        }

        log::debug!("Read {} bytes from {:?}", self.bytes_read(), self.path);
        Ok(())
    }
}
