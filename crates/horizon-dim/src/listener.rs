//! TCP listener for hardware messages.
//!
//! Hardware daemons connect and send newline-delimited envelopes:
//!
//! ```text
//! <device_id> <device_type> <payload...>
//! ```
//!
//! Each connection gets its own thread. Device ids are qualified with the
//! peer address, so `mouse0` sent from `10.0.0.7` becomes `10.0.0.7:mouse0`
//! and two hosts never share a device.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;

use horizon_dim_core::logging::targets;
use horizon_dim_core::{ListenerConfig, RunFlag};
use parking_lot::Mutex;

use crate::device::DeviceId;
use crate::error::{Result, RouteError};
use crate::manager::DeviceManager;

/// One parsed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub device: DeviceId,
    pub device_type: &'a str,
    pub payload: &'a str,
}

impl<'a> Envelope<'a> {
    /// Split a line into device id, type and payload, qualifying the id with `peer`.
    pub fn parse(line: &'a str, peer: IpAddr) -> Result<Self> {
        let line = line.trim();
        let (device, rest) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| RouteError::InvalidEnvelope(line.to_owned()))?;
        let rest = rest.trim_start();
        let (device_type, payload) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if device_type.is_empty() {
            return Err(RouteError::InvalidEnvelope(line.to_owned()));
        }
        Ok(Self {
            device: DeviceId::from(format!("{peer}:{device}")),
            device_type,
            payload: payload.trim_start(),
        })
    }
}

#[derive(Default)]
struct ListenerInner {
    connections: usize,
    workers: Vec<JoinHandle<()>>,
}

/// Accepts hardware connections and feeds their messages to a [`DeviceManager`].
///
/// Every thread polls both the process [`RunFlag`] and the listener's own
/// stop flag at least once per read timeout. [`stop`](Self::stop) joins them all.
pub struct HardwareListener {
    local_addr: SocketAddr,
    stop: RunFlag,
    inner: Arc<Mutex<ListenerInner>>,
    accept: Option<JoinHandle<()>>,
}

impl HardwareListener {
    /// Bind `config.bind` and start accepting.
    pub fn start(
        config: &ListenerConfig,
        manager: Arc<DeviceManager>,
        run_flag: RunFlag,
    ) -> horizon_dim_core::Result<Self> {
        let listener = TcpListener::bind(config.bind.as_str())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let stop = RunFlag::new();
        let inner = Arc::new(Mutex::new(ListenerInner::default()));
        let worker = Worker {
            config: config.clone(),
            manager,
            run_flag,
            stop: stop.clone(),
            inner: inner.clone(),
        };

        let accept = std::thread::Builder::new()
            .name("dim-listener".into())
            .spawn(move || worker.accept_loop(listener))?;

        tracing::info!(target: targets::LISTENER, %local_addr, "listening for hardware messages");
        Ok(Self {
            local_addr,
            stop,
            inner,
            accept: Some(accept),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently open.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections
    }

    pub fn is_listening(&self) -> bool {
        self.accept.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop accepting, close every connection and join all threads.
    pub fn stop(&mut self) {
        self.stop.stop();
        let Some(accept) = self.accept.take() else {
            return;
        };
        if accept.join().is_err() {
            tracing::warn!(target: targets::LISTENER, "accept thread panicked");
        }
        let workers = std::mem::take(&mut self.inner.lock().workers);
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!(target: targets::LISTENER, "connection thread panicked");
            }
        }
        tracing::info!(target: targets::LISTENER, local_addr = %self.local_addr, "listener stopped");
    }
}

impl Drop for HardwareListener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for HardwareListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareListener")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.connection_count())
            .finish()
    }
}

#[derive(Clone)]
struct Worker {
    config: ListenerConfig,
    manager: Arc<DeviceManager>,
    run_flag: RunFlag,
    stop: RunFlag,
    inner: Arc<Mutex<ListenerInner>>,
}

impl Worker {
    fn running(&self) -> bool {
        self.run_flag.is_running() && self.stop.is_running()
    }

    fn accept_loop(self, listener: TcpListener) {
        let timeout = self.config.read_timeout_duration();
        while self.running() {
            match listener.accept() {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    self.stop.wait_timeout(timeout);
                }
                Err(err) => {
                    tracing::warn!(target: targets::LISTENER, %err, "accept failed");
                    self.stop.wait_timeout(timeout);
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let setup = stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_read_timeout(Some(self.config.read_timeout_duration())));
        if let Err(err) = setup {
            tracing::warn!(target: targets::LISTENER, %peer, %err, "could not configure connection");
            return;
        }

        // counted before the thread starts, which decrements on exit
        let mut inner = self.inner.lock();
        inner.connections += 1;
        let worker = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("dim-conn-{peer}"))
            .spawn(move || worker.read_loop(stream, peer));
        match spawned {
            Ok(handle) => {
                inner.workers.retain(|h| !h.is_finished());
                inner.workers.push(handle);
            }
            Err(err) => {
                inner.connections -= 1;
                tracing::warn!(target: targets::LISTENER, %peer, %err, "could not spawn connection thread");
            }
        }
    }

    fn read_loop(self, stream: TcpStream, peer: SocketAddr) {
        tracing::debug!(target: targets::LISTENER, %peer, "hardware connected");
        let mut reader = BufReader::new(stream);
        let max = self.config.max_message_len;
        let mut frame = Vec::with_capacity(256);
        // set while skipping the tail of an oversized frame
        let mut discarding = false;

        while self.running() {
            let room = max.saturating_add(1).saturating_sub(frame.len()) as u64;
            match (&mut reader).take(room).read_until(b'\n', &mut frame) {
                Ok(0) => break,
                Ok(_) => {
                    if frame.last() == Some(&b'\n') {
                        if discarding {
                            discarding = false;
                        } else if frame.len() > max {
                            tracing::debug!(target: targets::LISTENER, %peer, len = frame.len(), "oversized message dropped");
                        } else {
                            self.handle_frame(&frame, peer.ip());
                        }
                        frame.clear();
                    } else if frame.len() > max {
                        if !discarding {
                            tracing::debug!(target: targets::LISTENER, %peer, max, "oversized message dropped");
                            discarding = true;
                        }
                        frame.clear();
                    }
                }
                // partial input stays in `frame` until the rest arrives
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(err) => {
                    tracing::debug!(target: targets::LISTENER, %peer, %err, "connection error");
                    break;
                }
            }
        }

        self.inner.lock().connections -= 1;
        tracing::debug!(target: targets::LISTENER, %peer, "hardware disconnected");
    }

    fn handle_frame(&self, frame: &[u8], peer: IpAddr) {
        match std::str::from_utf8(frame) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => self.handle_line(line, peer),
            Err(err) => {
                tracing::debug!(target: targets::LISTENER, %peer, %err, "non-UTF-8 message dropped");
            }
        }
    }

    fn handle_line(&self, line: &str, peer: IpAddr) {
        match Envelope::parse(line, peer) {
            Ok(envelope) => {
                // failures are logged by the manager; the connection carries on
                let _ = self
                    .manager
                    .on_hardware_message(&envelope.device, envelope.device_type, envelope.payload);
            }
            Err(err) => {
                tracing::debug!(target: targets::LISTENER, %peer, %err, "message dropped");
            }
        }
    }
}
