//! Serial request/response protocol spoken with the microcontroller.
//!
//! ```text
//!   ControlLoop ──▶ RequestBatch ──▶ JSON ──▶ serial ──▶ MCU
//!        ▲                                                 │
//!        └── StatusUpdate ◀── handlers ◀── ResponseBatch ◀─┘
//! ```
//!
//! - [`iface`]: the closed set of interfaces and actions.
//! - [`batch`]: ordered batch building, encoding, and result dispatch.
//! - [`device`]: the byte-level device abstraction the transport drives.

pub mod batch;
pub mod device;
pub mod iface;

pub use batch::{RequestBatch, ResponseBatch, StatusUpdate, SubRequest};
pub use device::{DeviceOpener, SerialDevice};
pub use iface::{Action, Interface};
