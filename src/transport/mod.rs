//! Fault-tolerant serial transport.
//!
//! A [`Transport`] owns one serial device and exposes a single blocking
//! [`exchange`](Transport::exchange) (write one request batch, read one
//! response batch).  A background watcher thread (re)acquires the device
//! whenever an exchange reports a link fault.
//!
//! ```text
//!                 watcher opens device
//!  Disconnected ───────────────────────▶ Ready ◀──────────┐
//!                                          │              │ watcher reopens
//!                          I/O fault or    │              │
//!                          overflow        ▼              │
//!                                     Reconnecting ───────┘
//!
//!  Ready | Reconnecting ──stop()──▶ Stopped   (terminal)
//! ```
//!
//! ## Locking
//!
//! One `parking_lot` mutex guards the device handle and the flags; one
//! condvar signals every change.  An exchange takes the handle out of the
//! shared state (marking it busy) before doing I/O and puts it back
//! afterwards, so the watcher and an exchange never touch the device at
//! the same time and no caller sees a half-open device.
//!
//! ## Framing
//!
//! Replies have no terminator or length prefix.  An exchange blocks for
//! the first byte (bounded by the device read timeout) and then drains
//! whatever is already buffered.  This assumes the microcontroller writes
//! its whole reply within one scheduling quantum of the first byte; a
//! slower writer yields a truncated reply that surfaces as
//! [`TransportError::MalformedResponse`].  Left as-is for compatibility
//! with the deployed firmware.

mod watcher;

use std::io::{self, Read as _, Write as _};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::app::ports::BatchExchange;
use crate::error::TransportError;
use crate::protocol::{DeviceOpener, RequestBatch, ResponseBatch, SerialDevice};

/// Ceiling on buffered-but-unread bytes before the link is considered
/// flooded.
pub const MAX_IN_WAITING: usize = 500;

/// Minimum delay between two failed acquisition attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

// ───────────────────────────────────────────────────────────────
// State
// ───────────────────────────────────────────────────────────────

/// Observable link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Not started, or started but the device has never been acquired.
    Disconnected,
    /// A fault was reported; the watcher is reopening the device.
    Reconnecting,
    Ready,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub retry_interval: Duration,
    pub max_in_waiting: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retry_interval: RETRY_INTERVAL,
            max_in_waiting: MAX_IN_WAITING,
        }
    }
}

struct LinkState<D> {
    device: Option<D>,
    needs_reconnect: bool,
    started: bool,
    stopped: bool,
    /// An exchange has the device checked out.
    busy: bool,
    acquired_once: bool,
}

struct Shared<D> {
    state: Mutex<LinkState<D>>,
    changed: Condvar,
}

// ───────────────────────────────────────────────────────────────
// Transport
// ───────────────────────────────────────────────────────────────

pub struct Transport<O: DeviceOpener> {
    shared: Arc<Shared<O::Device>>,
    /// Moved into the watcher thread by `start`.
    opener: Mutex<Option<O>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    device_name: String,
    config: TransportConfig,
}

impl<O: DeviceOpener> Transport<O> {
    pub fn new(opener: O) -> Self {
        Self::with_config(opener, TransportConfig::default())
    }

    pub fn with_config(opener: O, config: TransportConfig) -> Self {
        let device_name = opener.describe();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LinkState {
                    device: None,
                    needs_reconnect: false,
                    started: false,
                    stopped: false,
                    busy: false,
                    acquired_once: false,
                }),
                changed: Condvar::new(),
            }),
            opener: Mutex::new(Some(opener)),
            watcher: Mutex::new(None),
            device_name,
            config,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Spawn the watcher and block until the device is first acquired.
    ///
    /// On timeout the transport stops itself and stays inert; build a new
    /// one to try again (see [`acquire_transport`]).
    pub fn start(&self, timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;
        {
            let mut st = self.shared.state.lock();
            if st.stopped {
                return Err(TransportError::Device("start called after stop".into()));
            }
            if st.started {
                return Err(TransportError::Device("start called twice".into()));
            }
            st.started = true;
            st.needs_reconnect = true;
        }

        let Some(opener) = self.opener.lock().take() else {
            self.stop();
            return Err(TransportError::Device("device opener already consumed".into()));
        };
        let shared = Arc::clone(&self.shared);
        let retry = self.config.retry_interval;
        let spawned = thread::Builder::new()
            .name("serial-watcher".into())
            .spawn(move || watcher::run(&shared, opener, retry));
        match spawned {
            Ok(handle) => *self.watcher.lock() = Some(handle),
            Err(e) => {
                self.stop();
                return Err(TransportError::Device(format!("could not spawn watcher: {e}")));
            }
        }

        let acquired = {
            let mut st = self.shared.state.lock();
            while !st.acquired_once && !st.stopped {
                if self.shared.changed.wait_until(&mut st, deadline).timed_out() {
                    break;
                }
            }
            st.acquired_once && !st.stopped
        };

        if acquired {
            info!("Serial transport started on {}", self.device_name);
            Ok(())
        } else {
            self.stop();
            Err(TransportError::Device(format!(
                "could not acquire {} within {:?}",
                self.device_name, timeout
            )))
        }
    }

    /// Stop the watcher and release the device.  Safe to call repeatedly,
    /// before `start`, or while an exchange is in flight.
    pub fn stop(&self) {
        let was_stopped = {
            let mut st = self.shared.state.lock();
            std::mem::replace(&mut st.stopped, true)
        };
        self.shared.changed.notify_all();

        if let Some(handle) = self.watcher.lock().take()
            && handle.join().is_err()
        {
            error!("Serial watcher thread panicked");
        }

        let device = self.shared.state.lock().device.take();
        drop(device);

        if !was_stopped {
            info!("Serial transport on {} stopped", self.device_name);
        }
    }

    pub fn state(&self) -> TransportState {
        let st = self.shared.state.lock();
        if st.stopped {
            TransportState::Stopped
        } else if !st.started || !st.acquired_once {
            TransportState::Disconnected
        } else if st.needs_reconnect {
            TransportState::Reconnecting
        } else {
            TransportState::Ready
        }
    }

    // ── Exchange ──────────────────────────────────────────────

    /// Write `batch` and read back one response batch.
    ///
    /// Waits up to `timeout` for a reconnecting device.  Link faults
    /// (`Io`, `Overflow`) flag the device for reconnection before the
    /// error is returned; an undecodable reply does not.
    pub fn exchange(
        &self,
        batch: &RequestBatch,
        timeout: Duration,
    ) -> Result<ResponseBatch, TransportError> {
        let payload = batch
            .to_bytes()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let mut device = self.checkout(Instant::now() + timeout)?;

        let result = transact(&mut device, &payload, self.config.max_in_waiting);

        {
            let mut st = self.shared.state.lock();
            st.busy = false;
            if st.stopped {
                drop(st);
                drop(device);
                self.shared.changed.notify_all();
                return Err(TransportError::Stopped);
            }
            st.device = Some(device);
            if let Err(e) = &result
                && e.triggers_reconnect()
            {
                warn!("Serial link fault on {}: {e}; reconnecting", self.device_name);
                st.needs_reconnect = true;
            }
        }
        self.shared.changed.notify_all();

        let reply = result?;
        ResponseBatch::from_slice(&reply).map_err(|e| {
            debug!("Undecodable reply ({} bytes): {e}", reply.len());
            TransportError::MalformedResponse(e.to_string())
        })
    }

    /// Wait for a ready, idle device and take it out of the shared state.
    fn checkout(&self, deadline: Instant) -> Result<O::Device, TransportError> {
        let mut st = self.shared.state.lock();
        loop {
            if st.stopped {
                return Err(TransportError::Stopped);
            }
            if !st.started {
                return Err(TransportError::NotStarted);
            }
            if !st.needs_reconnect
                && !st.busy
                && let Some(device) = st.device.take()
            {
                st.busy = true;
                return Ok(device);
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            self.shared.changed.wait_until(&mut st, deadline);
        }
    }
}

impl<O: DeviceOpener> Drop for Transport<O> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<O: DeviceOpener> BatchExchange for Transport<O> {
    fn exchange(
        &mut self,
        batch: &RequestBatch,
        timeout: Duration,
    ) -> Result<ResponseBatch, TransportError> {
        Transport::exchange(self, batch, timeout)
    }
}

/// One write-then-read round trip on a checked-out device.
fn transact<D: SerialDevice>(
    device: &mut D,
    payload: &[u8],
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    device
        .write_all(payload)
        .and_then(|()| device.flush())
        .map_err(|e| TransportError::io(&e))?;

    // Block for the first byte; a read timeout just means an empty reply.
    let mut first = [0u8; 1];
    let got = match device.read(&mut first) {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
        Err(e) => return Err(TransportError::io(&e)),
    };

    let waiting = device.bytes_waiting().map_err(|e| TransportError::io(&e))?;
    if waiting > limit {
        return Err(TransportError::Overflow { waiting, limit });
    }

    let mut reply = Vec::with_capacity(got + waiting);
    reply.extend_from_slice(&first[..got]);
    reply.resize(got + waiting, 0);
    device
        .read_exact(&mut reply[got..])
        .map_err(|e| TransportError::io(&e))?;
    Ok(reply)
}

/// Build and start transports until one acquires its device.
///
/// A failed `start` leaves its transport inert, so each attempt gets a
/// fresh one from `factory`.  Never gives up.
pub fn acquire_transport<O, F>(
    mut factory: F,
    start_timeout: Duration,
    retry_delay: Duration,
) -> Transport<O>
where
    O: DeviceOpener,
    F: FnMut() -> Transport<O>,
{
    let mut attempt: u32 = 1;
    loop {
        let transport = factory();
        match transport.start(start_timeout) {
            Ok(()) => return transport,
            Err(e) => {
                warn!("Serial transport attempt {attempt} failed: {e}; retrying in {retry_delay:?}");
                drop(transport);
                thread::sleep(retry_delay);
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
