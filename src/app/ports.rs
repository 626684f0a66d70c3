//! Port traits: the hexagonal boundary between the control loop and the
//! outside world.
//!
//! ```text
//!   Transport ──▶ BatchExchange ─┐
//!   Mailbox   ──▶ CommandQueue  ─┼──▶ ControlLoop
//!   MqttLink  ──▶ FleetLink     ─┘
//! ```
//!
//! The [`ControlLoop`](super::service::ControlLoop) is generic over these
//! traits, so the whole loop runs against mocks in the integration tests.

use std::time::Duration;

use crate::error::{FleetError, TransportError};
use crate::protocol::{RequestBatch, ResponseBatch};

// ───────────────────────────────────────────────────────────────
// Serial exchange (domain ↔ microcontroller)
// ───────────────────────────────────────────────────────────────

/// One batched request/response round trip with the microcontroller.
pub trait BatchExchange {
    /// Waits at most `timeout` for a reconnecting device.
    fn exchange(
        &mut self,
        batch: &RequestBatch,
        timeout: Duration,
    ) -> Result<ResponseBatch, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Inbound message queue (fleet → domain)
// ───────────────────────────────────────────────────────────────

/// Non-blocking source of raw inbound messages.
///
/// "Empty" is a normal `None`, never an error.
pub trait CommandQueue {
    /// Current depth, used for backlog warnings.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_next(&mut self) -> Option<Vec<u8>>;
}

// ───────────────────────────────────────────────────────────────
// Fleet link (domain → fleet)
// ───────────────────────────────────────────────────────────────

/// Outbound side of the fleet messaging fabric.
pub trait FleetLink {
    /// Fire-and-forget publish.
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), FleetError>;

    /// Re-establish the session and its subscriptions.
    fn reconnect(&mut self) -> Result<(), FleetError>;
}
