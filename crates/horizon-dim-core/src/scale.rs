//! Global UI scale derived from wall geometry.

use crate::config::ScaleConfig;

/// Reference resolution the UI artwork targets.
pub const REFERENCE_WIDTH: f64 = 1920.0;
pub const REFERENCE_HEIGHT: f64 = 1080.0;

/// Compute the global UI scale for a wall of `width` x `height` pixels.
///
/// Wide walls scale by height, others by width, so a 16:9 tile grid scales
/// the same either way. The result is corrected for pixel density and clamped
/// to the configured range.
pub fn global_scale(width: i32, height: i32, config: &ScaleConfig) -> f64 {
    if width <= 0 || height <= 0 {
        return config.min_scale;
    }
    let w = f64::from(width);
    let h = f64::from(height);
    let raw = if w / h > 16.0 / 9.0 {
        h / REFERENCE_HEIGHT
    } else {
        w / REFERENCE_WIDTH
    };
    let density = config.reference_ppi / config.display_ppi;
    (raw / density).clamp(config.min_scale, config.max_scale)
}

/// Scale multiplier for a widget `distance` pixels away from the pointer.
///
/// Grows linearly from 1 at `threshold` to `max` at distance 0. Outside the
/// threshold the multiplier is exactly 1.
pub fn enlarge_multiplier(distance: f64, threshold: f64, max: f64) -> f64 {
    if threshold <= 0.0 || distance >= threshold {
        return 1.0;
    }
    max - (max - 1.0) * distance / threshold
}
