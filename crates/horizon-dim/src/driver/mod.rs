//! Device drivers and the registry that creates them by type name.
//!
//! A driver decodes one hardware protocol. It owns whatever protocol state it
//! needs and drives the shared [`DeviceCore`] for everything else: positions,
//! clicks, drags, modes.
//!
//! # Registering a driver
//!
//! ```ignore
//! use horizon_dim::{Driver, DriverRegistry};
//!
//! let mut registry = DriverRegistry::with_builtin();
//! registry.register("tracker", |_id| Box::new(TrackerDriver::default()));
//! assert!(registry.contains("tracker"));
//! ```

mod joystick;
mod mouse;
mod touch;

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::{FromStr, SplitWhitespace};
use std::sync::Arc;
use std::time::Instant;

pub use joystick::JoystickDriver;
pub use mouse::MouseDriver;
pub use touch::TouchDriver;

use crate::device::{DeviceCore, DeviceId};
use crate::error::{Result, RouteError};

/// Decodes raw messages from one kind of hardware.
pub trait Driver: Send {
    /// Handle one payload. `first` is true for the message that created the device.
    fn on_message(&mut self, core: &mut DeviceCore, payload: &str, first: bool, now: Instant) -> Result<()>;

    /// False once the device has finished and should be removed.
    fn is_alive(&self) -> bool {
        true
    }

    /// Whether the device gets an on-screen pointer.
    fn shows_pointer(&self) -> bool {
        true
    }

    /// Special devices get their own event channel.
    fn is_special(&self) -> bool {
        false
    }
}

/// Creates a driver instance for a newly seen device.
pub type DriverFactory = Arc<dyn Fn(&DeviceId) -> Box<dyn Driver> + Send + Sync>;

/// Driver factories keyed by device type name.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `mouse`, `touch` and `joystick` drivers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("mouse", |_| Box::new(MouseDriver::new()));
        registry.register("touch", |_| Box::new(TouchDriver::new()));
        registry.register("joystick", |_| Box::new(JoystickDriver::new()));
        registry
    }

    /// Register or replace the factory for `device_type`.
    pub fn register<F>(&mut self, device_type: impl Into<String>, factory: F)
    where
        F: Fn(&DeviceId) -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.factories.insert(device_type.into(), Arc::new(factory));
    }

    pub fn create(&self, device_type: &str, id: &DeviceId) -> Result<Box<dyn Driver>> {
        self.factories
            .get(device_type)
            .map(|factory| factory(id))
            .ok_or_else(|| RouteError::UnknownDeviceType(device_type.to_owned()))
    }

    pub fn contains(&self, device_type: &str) -> bool {
        self.factories.contains_key(device_type)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry").field("types", &self.names()).finish()
    }
}

/// Range of normalized screen coordinates.
pub(crate) const NORMALIZED: RangeInclusive<f64> = 0.0..=1.0;

/// Range of joystick axis deflection.
pub(crate) const AXIS: RangeInclusive<f64> = -1.0..=1.0;

/// How far past its nominal range a coordinate may stray before the message is rejected.
const RANGE_SLACK: f64 = 1.0;

/// Whitespace tokenizer shared by the text protocols.
pub(crate) struct Tokens<'a> {
    device: &'a DeviceId,
    inner: SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(device: &'a DeviceId, payload: &'a str) -> Self {
        Self {
            device,
            inner: payload.split_whitespace(),
        }
    }

    /// Parse the next token, failing with a malformed-message error.
    pub(crate) fn parse<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self
            .inner
            .next()
            .ok_or_else(|| RouteError::malformed(self.device, format!("missing {what}")))?;
        token
            .parse()
            .map_err(|_| RouteError::malformed(self.device, format!("bad {what} '{token}'")))
    }

    /// Parse a finite coordinate lying within `range`, give or take [`RANGE_SLACK`].
    pub(crate) fn normalized(&mut self, what: &str, range: RangeInclusive<f64>) -> Result<f64> {
        let value: f64 = self.parse(what)?;
        let allowed = (range.start() - RANGE_SLACK)..=(range.end() + RANGE_SLACK);
        if value.is_finite() && allowed.contains(&value) {
            Ok(value)
        } else {
            Err(RouteError::malformed(self.device, format!("{what} out of range: {value}")))
        }
    }

    /// Everything after the tokens consumed so far.
    pub(crate) fn rest(self) -> Vec<&'a str> {
        self.inner.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl Driver for Silent {
        fn on_message(&mut self, _core: &mut DeviceCore, _payload: &str, _first: bool, _now: Instant) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = DriverRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["joystick", "mouse", "touch"]);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let registry = DriverRegistry::new();
        let id = DeviceId::from("h:lens0");
        assert!(matches!(
            registry.create("lens", &id),
            Err(RouteError::UnknownDeviceType(t)) if t == "lens"
        ));
    }

    #[test]
    fn test_register_custom_driver() {
        let mut registry = DriverRegistry::new();
        registry.register("silent", |_| Box::new(Silent));
        let driver = registry.create("silent", &DeviceId::from("h:silent0")).unwrap();
        assert!(driver.is_alive());
        assert!(!driver.is_special());
    }

    #[test]
    fn test_tokens_report_what_is_missing() {
        let id = DeviceId::from("h:mouse0");
        let mut tokens = Tokens::new(&id, "1 0.5 oops");
        assert_eq!(tokens.parse::<i32>("code").unwrap(), 1);
        assert_eq!(tokens.parse::<f64>("x").unwrap(), 0.5);
        let err = tokens.parse::<f64>("y").unwrap_err();
        assert!(err.to_string().contains("bad y 'oops'"));
    }

    #[test]
    fn test_normalized_rejects_wild_values() {
        let id = DeviceId::from("h:mouse0");
        let mut tokens = Tokens::new(&id, "0.5 -0.2 1e12 inf NaN -1e12");
        assert_eq!(tokens.normalized("a", NORMALIZED).unwrap(), 0.5);
        assert_eq!(tokens.normalized("b", NORMALIZED).unwrap(), -0.2);
        for what in ["c", "d", "e"] {
            assert!(matches!(
                tokens.normalized(what, NORMALIZED),
                Err(RouteError::MalformedMessage { .. })
            ));
        }
        assert!(tokens.normalized("f", AXIS).is_err());
    }
}
