//! Device abstraction: any byte channel to the microcontroller.
//!
//! Concrete implementations:
//! - USB CDC serial port (`adapters::serial`)
//! - scripted mock devices in the integration tests
//!
//! The [`Transport`](crate::transport::Transport) is generic over
//! [`DeviceOpener`], so swapping the physical link needs no change to
//! the reconnection logic.

use std::io;

/// An open, byte-oriented link to the microcontroller.
///
/// `read` blocks until at least one byte arrives or the device's own read
/// timeout expires (reported as [`io::ErrorKind::TimedOut`]).
pub trait SerialDevice: io::Read + io::Write + Send {
    /// Bytes received but not yet read.
    fn bytes_waiting(&mut self) -> io::Result<usize>;
}

/// Opens fresh [`SerialDevice`] handles for the transport's watcher.
///
/// Called from the watcher thread only, once per (re)acquisition attempt.
pub trait DeviceOpener: Send + 'static {
    type Device: SerialDevice + 'static;

    fn open(&mut self) -> io::Result<Self::Device>;

    /// Human-readable name of the device, for logs.
    fn describe(&self) -> String;
}
