//! Routing raw hardware messages to device instances.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use horizon_dim_core::logging::{span_names, targets};
use horizon_dim_core::{DeviceConfig, PerfSpan, PollTimer, RunFlag};
use parking_lot::{Mutex, ReentrantMutex};

use crate::device::{Device, DeviceCore, DeviceId};
use crate::dispatcher::Dispatcher;
use crate::driver::DriverRegistry;
use crate::error::{Result, RouteError};

/// Deferred work for one device, see [`DeviceManager::queue`].
pub type DeviceCommand = Box<dyn FnOnce(&mut DeviceCore) + Send>;

/// One live device. The device lock is held while it handles a message;
/// the command queue never is.
struct Slot {
    device: ReentrantMutex<RefCell<Device>>,
    queued: Mutex<Vec<DeviceCommand>>,
}

impl Slot {
    fn new(device: Device) -> Self {
        Self {
            device: ReentrantMutex::new(RefCell::new(device)),
            queued: Mutex::new(Vec::new()),
        }
    }

    /// Run queued commands until none are left.
    fn drain(&self, device: &mut Device) {
        loop {
            let commands = std::mem::take(&mut *self.queued.lock());
            if commands.is_empty() {
                return;
            }
            for command in commands {
                command(device.core_mut());
            }
        }
    }

    /// Drain the queue now if the device is idle.
    fn try_drain(&self) {
        let Some(guard) = self.device.try_lock() else {
            return;
        };
        if let Ok(mut device) = guard.try_borrow_mut() {
            self.drain(&mut device);
        }
    }

    /// Liveness of an idle device; `None` while it is busy.
    fn idle_alive(&self) -> Option<bool> {
        let guard = self.device.try_lock()?;
        let alive = guard.try_borrow().ok()?.is_alive();
        Some(alive)
    }
}

struct ManagerState {
    devices: HashMap<DeviceId, Arc<Slot>>,
    /// Special devices seen so far; the next one gets this as its id.
    special_count: u32,
}

/// Owns every live device.
///
/// Devices are created lazily on their first message, from the driver
/// registered for the message's device type, and removed once they report
/// themselves dead. Each removal purges the device's routing state and its
/// pointer from the dispatcher.
///
/// The device map is only locked briefly. A device handling a message holds
/// its own lock, so widget callbacks may inspect the manager freely; to change
/// a device from a callback use [`queue`](Self::queue).
pub struct DeviceManager {
    dispatcher: Arc<Dispatcher>,
    registry: DriverRegistry,
    config: DeviceConfig,
    state: Mutex<ManagerState>,
}

impl DeviceManager {
    pub fn new(dispatcher: Arc<Dispatcher>, registry: DriverRegistry, config: &DeviceConfig) -> Self {
        Self {
            dispatcher,
            registry,
            config: config.clone(),
            state: Mutex::new(ManagerState {
                devices: HashMap::new(),
                special_count: 0,
            }),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Handle one raw message for `id`.
    pub fn on_hardware_message(&self, id: &DeviceId, device_type: &str, payload: &str) -> Result<()> {
        self.on_hardware_message_at(id, device_type, payload, Instant::now())
    }

    /// [`on_hardware_message`](Self::on_hardware_message) with an explicit clock.
    pub fn on_hardware_message_at(
        &self,
        id: &DeviceId,
        device_type: &str,
        payload: &str,
        now: Instant,
    ) -> Result<()> {
        let _span = PerfSpan::new(span_names::HW_MESSAGE);
        self.cleanup();
        let (slot, first) = self.slot_for(id, device_type)?;

        let guard = slot.device.lock();
        let mut device = guard.try_borrow_mut().map_err(|_| RouteError::Reentrant)?;
        let result = device.on_message(payload, first, now);
        if let Err(err) = &result {
            tracing::debug!(target: targets::DEVICE_MANAGER, device = %id, %err, "message dropped");
        }
        slot.drain(&mut device);
        result
    }

    /// The slot for `id`, created on first sight. The flag is true for a new device.
    fn slot_for(&self, id: &DeviceId, device_type: &str) -> Result<(Arc<Slot>, bool)> {
        let mut state = self.state.lock();
        if let Some(slot) = state.devices.get(id) {
            return Ok((slot.clone(), false));
        }
        let slot = Arc::new(Slot::new(self.create(&mut state, id, device_type)?));
        state.devices.insert(id.clone(), slot.clone());
        Ok((slot, true))
    }

    fn create(&self, state: &mut ManagerState, id: &DeviceId, device_type: &str) -> Result<Device> {
        let driver = self.registry.create(device_type, id).inspect_err(|_| {
            tracing::warn!(target: targets::DEVICE_MANAGER, device = %id, device_type, "no driver for device type");
        })?;
        let mut core = DeviceCore::new(id.clone(), device_type, self.dispatcher.clone(), &self.config);
        if driver.is_special() {
            core.set_special(state.special_count);
            state.special_count += 1;
        }
        tracing::info!(
            target: targets::DEVICE_MANAGER,
            device = %id,
            device_type,
            special = ?core.special_id(),
            "new pointer"
        );
        Ok(Device::new(core, driver))
    }

    /// Remove dead devices. Busy devices are looked at on a later pass.
    fn cleanup(&self) {
        let dead: Vec<DeviceId> = {
            let mut state = self.state.lock();
            let dead: Vec<DeviceId> = state
                .devices
                .iter()
                .filter(|(_, slot)| slot.idle_alive() == Some(false))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &dead {
                state.devices.remove(id);
            }
            dead
        };
        for id in dead {
            self.forget(&id);
        }
    }

    fn forget(&self, id: &DeviceId) {
        if let Err(err) = self.dispatcher.forget_device(id) {
            tracing::warn!(target: targets::DEVICE_MANAGER, device = %id, %err, "could not clear routing state");
        }
        tracing::info!(target: targets::DEVICE_MANAGER, device = %id, "removed pointer");
    }

    /// Remove a device now, whatever its state.
    pub fn remove(&self, id: &DeviceId) -> bool {
        let removed = self.state.lock().devices.remove(id).is_some();
        if removed {
            self.forget(id);
        }
        removed
    }

    fn slots(&self) -> Vec<Arc<Slot>> {
        self.state.lock().devices.values().cloned().collect()
    }

    /// Periodic work for every device, then cleanup.
    pub fn tick(&self, now: Instant) {
        for slot in self.slots() {
            let guard = slot.device.lock();
            let Ok(mut device) = guard.try_borrow_mut() else {
                continue;
            };
            device.tick(now);
            slot.drain(&mut device);
        }
        self.cleanup();
    }

    /// Call [`tick`](Self::tick) every poll interval until `run_flag` stops.
    pub fn spawn_ticker(self: &Arc<Self>, run_flag: RunFlag) -> horizon_dim_core::Result<PollTimer> {
        let manager = Arc::clone(self);
        PollTimer::spawn("dim-device-ticker", self.config.poll_interval(), run_flag, move |now| {
            manager.tick(now)
        })
    }

    pub fn len(&self) -> usize {
        self.state.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.state.lock().devices.contains_key(id)
    }

    /// Live device ids, sorted.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.state.lock().devices.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn slot(&self, id: &DeviceId) -> Result<Arc<Slot>> {
        self.state
            .lock()
            .devices
            .get(id)
            .cloned()
            .ok_or_else(|| RouteError::UnknownDevice(id.clone()))
    }

    /// The special channel id assigned to `id`.
    pub fn special_id(&self, id: &DeviceId) -> Option<u32> {
        self.with_device(id, |core| core.special_id()).ok().flatten()
    }

    /// Run `f` against one device's core, e.g. to switch its mode.
    ///
    /// Waits while the device is handling a message on another thread, so
    /// it must not be called from widget callbacks or generic subscribers:
    /// they run inside the dispatcher, which that message may be waiting on.
    /// From a callback on the device's own thread this fails with
    /// [`RouteError::Reentrant`]. Callbacks use [`queue`](Self::queue).
    pub fn with_device<R>(&self, id: &DeviceId, f: impl FnOnce(&mut DeviceCore) -> R) -> Result<R> {
        let slot = self.slot(id)?;
        let guard = slot.device.lock();
        let mut device = guard.try_borrow_mut().map_err(|_| RouteError::Reentrant)?;
        Ok(f(device.core_mut()))
    }

    /// Run `f` against one device's core without waiting.
    ///
    /// An idle device runs it immediately. A busy one runs it once its current
    /// message is handled, or at the latest on the next [`tick`](Self::tick).
    pub fn queue<F>(&self, id: &DeviceId, f: F) -> Result<()>
    where
        F: FnOnce(&mut DeviceCore) + Send + 'static,
    {
        let slot = self.slot(id)?;
        slot.queued.lock().push(Box::new(f));
        slot.try_drain();
        Ok(())
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("registry", &self.registry)
            .field("devices", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DeviceManager {
        DeviceManager::new(
            Arc::new(Dispatcher::with_defaults()),
            DriverRegistry::with_builtin(),
            &DeviceConfig::default(),
        )
    }

    #[test]
    fn test_devices_are_created_lazily() {
        let m = manager();
        let id = DeviceId::from("h:mouse0");
        assert!(m.is_empty());
        m.on_hardware_message(&id, "mouse", "1 0.5 0.5").unwrap();
        m.on_hardware_message(&id, "mouse", "1 0.6 0.5").unwrap();
        assert_eq!(m.device_ids(), vec![id]);
    }

    #[test]
    fn test_unknown_type_creates_nothing() {
        let m = manager();
        let id = DeviceId::from("h:lens0");
        assert!(matches!(
            m.on_hardware_message(&id, "lens", "1 2 3"),
            Err(RouteError::UnknownDeviceType(_))
        ));
        assert!(!m.contains(&id));
    }

    #[test]
    fn test_special_ids_count_up() {
        let m = manager();
        let a = DeviceId::from("h:joystick0");
        let b = DeviceId::from("h:joystick1");
        m.on_hardware_message(&a, "joystick", "1 0 0").unwrap();
        m.on_hardware_message(&b, "joystick", "1 0 0").unwrap();
        m.on_hardware_message(&DeviceId::from("h:mouse0"), "mouse", "1 0 0").unwrap();
        assert_eq!(m.special_id(&a), Some(0));
        assert_eq!(m.special_id(&b), Some(1));
    }

    #[test]
    fn test_dead_devices_are_removed() {
        let m = manager();
        let touch = DeviceId::from("h:touch0");
        m.on_hardware_message(&touch, "touch", "1 0.5 0.5 0").unwrap();
        m.on_hardware_message(&touch, "touch", "1 0.5 0.5 2").unwrap();
        assert!(m.contains(&touch));
        m.tick(Instant::now());
        assert!(!m.contains(&touch));
    }

    #[test]
    fn test_malformed_message_keeps_device() {
        let m = manager();
        let id = DeviceId::from("h:mouse0");
        m.on_hardware_message(&id, "mouse", "1 0.5 0.5").unwrap();
        assert!(m.on_hardware_message(&id, "mouse", "1 nope").is_err());
        assert!(m.contains(&id));
    }
}
