//! Application core: the control loop and its domain types.
//!
//! Everything here talks to the serial link, the inbound command stream,
//! and the fleet fabric only through the **port traits** in [`ports`], so
//! the loop is fully testable without a robot attached.

pub mod commands;
pub mod inbox;
pub mod ports;
pub mod service;
pub mod status;
