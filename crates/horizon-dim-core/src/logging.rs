//! Logging facilities for Horizon DIM.
//!
//! Horizon DIM uses the `tracing` crate for instrumentation. Nothing is printed
//! until the host process installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_dim::dispatch=debug,horizon_dim::device=info")
//!     .init();
//! ```
//!
//! Every subsystem logs under one of the [`targets`] so routing traces can be
//! enabled without the noise of per-sample device logging.

use std::time::{Duration, Instant};

/// Span names used throughout Horizon DIM for tracing.
pub mod span_names {
    /// Delivery of one device event.
    pub const DELIVER: &str = "horizon_dim::deliver";
    /// Handling of one hardware message.
    pub const HW_MESSAGE: &str = "horizon_dim::hw_message";
    /// Handling of one generic (session) event.
    pub const GENERIC: &str = "horizon_dim::generic";
}

/// Target names for log filtering.
pub mod targets {
    /// Core layer target.
    pub const CORE: &str = "horizon_dim_core";
    /// Event delivery and enter/leave synthesis.
    pub const DISPATCH: &str = "horizon_dim::dispatch";
    /// Spatial resolution.
    pub const HIT_TEST: &str = "horizon_dim::hit_test";
    /// Device normalization.
    pub const DEVICE: &str = "horizon_dim::device";
    /// Device lifecycle and driver lookup.
    pub const DEVICE_MANAGER: &str = "horizon_dim::device_manager";
    /// Hardware socket listener.
    pub const LISTENER: &str = "horizon_dim::listener";
    /// Multi-selection.
    pub const SELECT: &str = "horizon_dim::select";
    /// Background poll timers.
    pub const TIMER: &str = "horizon_dim::timer";
    /// Outbound display commands.
    pub const GATEWAY: &str = "horizon_dim::gateway";
}

/// Performance span guard.
///
/// Enters a trace-level span for its lifetime and, on drop, warns if the
/// guarded section ran longer than the configured budget.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
    name: &'static str,
    start: Instant,
    warn_after: Option<Duration>,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::trace_span!(target: "horizon_dim::perf", "perf", operation = name);
        Self {
            span: span.entered(),
            name,
            start: Instant::now(),
            warn_after: None,
        }
    }

    /// Warn on drop if the span outlives `budget`.
    pub fn warn_after(mut self, budget: Duration) -> Self {
        self.warn_after = Some(budget);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if let Some(budget) = self.warn_after {
            if elapsed > budget {
                tracing::warn!(
                    target: "horizon_dim::perf",
                    operation = self.name,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    budget_ms = budget.as_secs_f64() * 1000.0,
                    "slow operation; callbacks must not block"
                );
            }
        }
    }
}

/// Debug log under the core target.
#[macro_export]
macro_rules! dim_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "horizon_dim_core", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span_measures() {
        let span = PerfSpan::new("test_operation").warn_after(Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(2));
        assert!(span.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn test_slow_span_logs_under_subscriber() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || {
            let _span = PerfSpan::new("slow").warn_after(Duration::ZERO);
            dim_debug!("inside perf span");
        });
    }
}
