//! gritsbot on-board agent library.
//!
//! Bridges the robot's microcontroller (JSON request/response batches over
//! a serial line) to the fleet's pub/sub network.  The pure-logic modules
//! are exposed for integration testing; the serial and MQTT adapters are
//! behind the `agent` feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod mailbox;
pub mod protocol;
pub mod scheduler;
pub mod transport;

mod error;

pub use error::{
    BatchError, ConfigError, Error, FleetError, IdentityError, Result, TransportError,
};
