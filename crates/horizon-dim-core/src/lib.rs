//! Core systems for Horizon DIM.
//!
//! This crate provides the foundation the routing engine is built on:
//!
//! - **Geometry**: wall-space [`Bounds`] and [`Point`] with containment,
//!   overlap and distance tests
//! - **Scale**: the global UI scale factor derived from wall geometry
//! - **Configuration**: [`DimConfig`], loadable from TOML
//! - **Logging**: `tracing` targets, span names and [`PerfSpan`]
//! - **Shutdown**: the cooperative [`RunFlag`] polled by every background thread
//! - **Timers**: [`PollTimer`], a fixed-interval background tick
//!
//! # Example
//!
//! ```
//! use horizon_dim_core::{Bounds, DimConfig, global_scale};
//!
//! let wall = Bounds::new(0, 9600, 2160, 0);
//! let config = DimConfig::default();
//! let scale = global_scale(wall.width(), wall.height(), &config.scale);
//! assert!((scale - 2.0).abs() < 1e-9);
//! assert!(wall.contains(9600, 0));
//! ```

mod config;
mod error;
mod geometry;
pub mod logging;
mod scale;
mod shutdown;
mod timer;

pub use config::{DeviceConfig, DimConfig, DispatchConfig, ListenerConfig, ScaleConfig};
pub use error::{DimError, Result};
pub use geometry::{Bounds, Point};
pub use logging::PerfSpan;
pub use scale::{REFERENCE_HEIGHT, REFERENCE_WIDTH, enlarge_multiplier, global_scale};
pub use shutdown::RunFlag;
pub use timer::PollTimer;

static_assertions::assert_impl_all!(RunFlag: Send, Sync, Clone);
static_assertions::assert_impl_all!(PollTimer: Send);
static_assertions::assert_impl_all!(DimConfig: Send, Sync);
