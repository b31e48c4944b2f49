//! Runtime configuration.
//!
//! Every section has a `Default` that matches the behavior of a stock wall,
//! so a config file only needs to name the values it changes:
//!
//! ```ignore
//! use horizon_dim_core::DimConfig;
//!
//! let config = DimConfig::from_toml_str(r#"
//!     [device]
//!     double_click_threshold_ms = 500
//!
//!     [listener]
//!     bind = "127.0.0.1:20005"
//! "#)?;
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DimError, Result};

/// Top-level configuration for a routing process.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimConfig {
    /// Dispatcher behavior.
    pub dispatch: DispatchConfig,
    /// Per-device input conditioning.
    pub device: DeviceConfig,
    /// Global UI scale computation.
    pub scale: ScaleConfig,
    /// Hardware listener socket.
    pub listener: ListenerConfig,
}

impl DimConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DimError::config_io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        crate::dim_debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.device.smoothing_depth == 0 {
            return Err(DimError::invalid_config(
                "device.smoothing_depth",
                "must be at least 1",
            ));
        }
        if !(self.device.smoothing_factor > 0.0 && self.device.smoothing_factor <= 1.0) {
            return Err(DimError::invalid_config(
                "device.smoothing_factor",
                format!("{} is outside (0, 1]", self.device.smoothing_factor),
            ));
        }
        if self.device.poll_interval_ms == 0 {
            return Err(DimError::invalid_config(
                "device.poll_interval_ms",
                "must be non-zero",
            ));
        }
        if self.scale.min_scale <= 0.0 || self.scale.min_scale > self.scale.max_scale {
            return Err(DimError::invalid_config(
                "scale.min_scale",
                format!(
                    "{} must be positive and not above max_scale {}",
                    self.scale.min_scale, self.scale.max_scale
                ),
            ));
        }
        if self.scale.reference_ppi <= 0.0 || self.scale.display_ppi <= 0.0 {
            return Err(DimError::invalid_config("scale.ppi", "must be positive"));
        }
        if self.listener.read_timeout_ms == 0 {
            return Err(DimError::invalid_config(
                "listener.read_timeout_ms",
                "must be non-zero",
            ));
        }
        Ok(())
    }

    /// Replace the dispatch section.
    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Replace the device section.
    pub fn device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Replace the scale section.
    pub fn scale(mut self, scale: ScaleConfig) -> Self {
        self.scale = scale;
        self
    }

    /// Replace the listener section.
    pub fn listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = listener;
        self
    }
}

/// Dispatcher settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Grow buttons and menus as the pointer approaches them.
    pub enlarge_widgets: bool,
    /// Distance in pixels at which enlargement starts.
    pub enlarge_threshold_px: u32,
    /// Deliveries slower than this are logged at warn level.
    pub slow_delivery_warn_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enlarge_widgets: false,
            enlarge_threshold_px: 200,
            slow_delivery_warn_ms: 20,
        }
    }
}

impl DispatchConfig {
    /// Enable or disable pointer-proximity enlargement.
    pub fn enlarge_widgets(mut self, enabled: bool) -> Self {
        self.enlarge_widgets = enabled;
        self
    }

    /// Set the enlargement threshold.
    pub fn enlarge_threshold_px(mut self, px: u32) -> Self {
        self.enlarge_threshold_px = px;
        self
    }

    pub fn slow_delivery_warn(&self) -> Duration {
        Duration::from_millis(self.slow_delivery_warn_ms)
    }
}

/// Per-device input conditioning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Number of samples kept by the smoothing filter.
    pub smoothing_depth: usize,
    /// Geometric weight decay between consecutive samples.
    pub smoothing_factor: f64,
    /// Maximum time between two presses for a double click.
    pub double_click_threshold_ms: u64,
    /// Quiet time after the last wheel step before the synthetic release.
    pub wheel_release_ms: u64,
    /// Granularity of the background device poll.
    pub poll_interval_ms: u64,
    /// Drag distance (before scaling) that turns a selection press into a rubber band.
    pub selection_drag_px: u32,
    /// Touch drags on an app window this soon after touch-down are ignored. 0 disables.
    pub accidental_touch_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            smoothing_depth: 10,
            smoothing_factor: 0.2,
            double_click_threshold_ms: 700,
            wheel_release_ms: 400,
            poll_interval_ms: 100,
            selection_drag_px: 60,
            accidental_touch_ms: 0,
        }
    }
}

impl DeviceConfig {
    /// Set the smoothing history depth.
    pub fn smoothing_depth(mut self, depth: usize) -> Self {
        self.smoothing_depth = depth;
        self
    }

    /// Set the smoothing decay factor.
    pub fn smoothing_factor(mut self, factor: f64) -> Self {
        self.smoothing_factor = factor;
        self
    }

    /// Set the double-click threshold.
    pub fn double_click_threshold(mut self, threshold: Duration) -> Self {
        self.double_click_threshold_ms = threshold.as_millis() as u64;
        self
    }

    /// Set the wheel release delay.
    pub fn wheel_release(mut self, delay: Duration) -> Self {
        self.wheel_release_ms = delay.as_millis() as u64;
        self
    }

    /// Set the accidental-touch window.
    pub fn accidental_touch(mut self, window: Duration) -> Self {
        self.accidental_touch_ms = window.as_millis() as u64;
        self
    }

    pub fn double_click_window(&self) -> Duration {
        Duration::from_millis(self.double_click_threshold_ms)
    }

    pub fn wheel_release_delay(&self) -> Duration {
        Duration::from_millis(self.wheel_release_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn accidental_touch_window(&self) -> Duration {
        Duration::from_millis(self.accidental_touch_ms)
    }
}

/// Inputs to the global UI scale factor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Pixel density the UI artwork was designed for.
    pub reference_ppi: f64,
    /// Pixel density of the wall's tiles.
    pub display_ppi: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 5.0,
            reference_ppi: 92.0,
            display_ppi: 92.0,
        }
    }
}

impl ScaleConfig {
    /// Set the physical pixel density of the wall.
    pub fn display_ppi(mut self, ppi: f64) -> Self {
        self.display_ppi = ppi;
        self
    }

    /// Set the allowed scale range.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min_scale = min;
        self.max_scale = max;
        self
    }
}

/// Hardware listener socket settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address the listener binds to.
    pub bind: String,
    /// Socket read timeout; bounds how quickly shutdown is observed.
    pub read_timeout_ms: u64,
    /// Longest accepted message line in bytes.
    pub max_message_len: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:20005".into(),
            read_timeout_ms: 100,
            max_message_len: 4096,
        }
    }
}

impl ListenerConfig {
    /// Create a listener config bound to `bind`.
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            ..Default::default()
        }
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the longest accepted message line.
    pub fn max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    pub fn read_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
