//! Cancellation and tracking of background work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::types::Result;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Named background threads that must all finish before the owner releases
/// shared resources.
#[derive(Default)]
pub struct WorkTracker {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` on a new named thread and registers it.
    pub fn spawn<F>(&self, name: &str, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(work)?;
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        debug!(name, pending = handles.len(), "work.spawned");
        Ok(())
    }

    /// Number of registered threads that have not finished.
    pub fn pending(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Joins every registered thread, including threads registered while
    /// draining. Returns the number of joined threads.
    pub fn drain(&self) -> usize {
        let mut joined = 0;
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.handles.lock());
            if batch.is_empty() {
                return joined;
            }
            for handle in batch {
                let name = handle.thread().name().unwrap_or("unnamed").to_string();
                if handle.join().is_err() {
                    error!(thread = %name, "work.panicked");
                }
                joined += 1;
            }
        }
    }
}
