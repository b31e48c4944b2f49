//! Process-wide wiring.

use std::sync::Arc;

use horizon_dim_core::logging::targets;
use horizon_dim_core::{DimConfig, PollTimer, RunFlag};
use parking_lot::Mutex;

use crate::dispatcher::Dispatcher;
use crate::driver::DriverRegistry;
use crate::gateway::DisplayGateway;
use crate::listener::HardwareListener;
use crate::manager::DeviceManager;

/// Everything a routing process shares, built once at startup.
///
/// Components receive the pieces they need from here instead of reaching for
/// globals. [`shutdown`](Self::shutdown) stops the run flag and joins every
/// background thread the context started.
pub struct DispatcherContext {
    config: Arc<DimConfig>,
    gateway: Arc<dyn DisplayGateway>,
    dispatcher: Arc<Dispatcher>,
    devices: Arc<DeviceManager>,
    run_flag: RunFlag,
    listener: Mutex<Option<HardwareListener>>,
    ticker: Mutex<Option<PollTimer>>,
}

impl DispatcherContext {
    pub fn new(config: DimConfig, gateway: Arc<dyn DisplayGateway>, registry: DriverRegistry) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(&config, gateway.clone()));
        let devices = Arc::new(DeviceManager::new(dispatcher.clone(), registry, &config.device));
        Self {
            config: Arc::new(config),
            gateway,
            dispatcher,
            devices,
            run_flag: RunFlag::new(),
            listener: Mutex::new(None),
            ticker: Mutex::new(None),
        }
    }

    /// A context with the built-in drivers.
    pub fn with_builtin_drivers(config: DimConfig, gateway: Arc<dyn DisplayGateway>) -> Self {
        Self::new(config, gateway, DriverRegistry::with_builtin())
    }

    pub fn config(&self) -> &Arc<DimConfig> {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn DisplayGateway> {
        &self.gateway
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn devices(&self) -> &Arc<DeviceManager> {
        &self.devices
    }

    pub fn run_flag(&self) -> &RunFlag {
        &self.run_flag
    }

    pub fn is_running(&self) -> bool {
        self.run_flag.is_running()
    }

    /// Start the hardware listener on the configured address.
    ///
    /// Does nothing if it is already running.
    pub fn start_listener(&self) -> horizon_dim_core::Result<()> {
        let mut slot = self.listener.lock();
        if slot.is_none() {
            let listener = HardwareListener::start(&self.config.listener, self.devices.clone(), self.run_flag.clone())?;
            *slot = Some(listener);
        }
        Ok(())
    }

    /// Where the listener is bound, once started.
    pub fn listener_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.lock().as_ref().map(HardwareListener::local_addr)
    }

    /// Start the periodic device tick.
    pub fn start_ticker(&self) -> horizon_dim_core::Result<()> {
        let mut slot = self.ticker.lock();
        if slot.is_none() {
            *slot = Some(self.devices.spawn_ticker(self.run_flag.clone())?);
        }
        Ok(())
    }

    /// Stop everything and wait for background threads to exit.
    pub fn shutdown(&self) {
        self.run_flag.stop();
        if let Some(mut listener) = self.listener.lock().take() {
            listener.stop();
        }
        if let Some(mut ticker) = self.ticker.lock().take() {
            ticker.stop();
        }
        tracing::info!(target: targets::CORE, "dispatcher context shut down");
    }
}

impl Drop for DispatcherContext {
    fn drop(&mut self) {
        if self.run_flag.is_running() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for DispatcherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherContext")
            .field("running", &self.is_running())
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}
