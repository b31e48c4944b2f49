//! Cooperative process-wide shutdown.
//!
//! Listener and timer threads never get killed. They poll a [`RunFlag`] at
//! least once per socket timeout or poll interval and return when it clears.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Shared "keep running" flag.
///
/// Clones observe the same flag. Once stopped, a flag stays stopped.
#[derive(Debug, Clone)]
pub struct RunFlag {
    inner: Arc<RunState>,
}

#[derive(Debug)]
struct RunState {
    running: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl RunFlag {
    /// Create a flag in the running state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RunState {
                running: AtomicBool::new(true),
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Request shutdown and wake every thread sleeping in [`wait_timeout`](Self::wait_timeout).
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            let _guard = self.inner.lock.lock();
            self.inner.wake.notify_all();
        }
    }

    /// Sleep for up to `timeout`, returning early if the flag is stopped.
    ///
    /// Returns `true` while the process should keep running.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if !self.is_running() {
            return false;
        }
        let _ = self.inner.wake.wait_for(&mut guard, timeout);
        self.is_running()
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}
