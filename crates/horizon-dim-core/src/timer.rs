//! Periodic background polling.
//!
//! Wheel release emulation and device expiry do not need precise deadlines.
//! A [`PollTimer`] wakes at a fixed interval and runs a tick callback, so two
//! timer-driven changes inside one interval resolve last-write-wins.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::logging::targets;
use crate::shutdown::RunFlag;

/// A background thread that calls a tick function at a fixed interval.
///
/// The thread exits when the process [`RunFlag`] stops, when
/// [`stop`](Self::stop) is called, or when the timer is dropped.
pub struct PollTimer {
    name: String,
    local: RunFlag,
    handle: Option<JoinHandle<()>>,
}

impl PollTimer {
    /// Spawn a poll thread.
    ///
    /// `tick` receives the wall-clock instant of each wake-up.
    pub fn spawn<F>(
        name: impl Into<String>,
        interval: Duration,
        run_flag: RunFlag,
        mut tick: F,
    ) -> Result<Self>
    where
        F: FnMut(Instant) + Send + 'static,
    {
        let name = name.into();
        let local = RunFlag::new();
        let thread_local = local.clone();
        let thread_name = name.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::debug!(target: targets::TIMER, timer = %thread_name, ?interval, "poll timer started");
                while run_flag.is_running() && thread_local.wait_timeout(interval) {
                    if !run_flag.is_running() {
                        break;
                    }
                    tick(Instant::now());
                }
                tracing::debug!(target: targets::TIMER, timer = %thread_name, "poll timer stopped");
            })?;

        Ok(Self {
            name,
            local,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the poll thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the timer and wait for its thread to exit.
    pub fn stop(&mut self) {
        self.local.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(target: targets::TIMER, timer = %self.name, "poll timer thread panicked");
            }
        }
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PollTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollTimer")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
