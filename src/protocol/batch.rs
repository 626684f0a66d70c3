//! Request batch builder and response dispatch.
//!
//! Wire format (one JSON object each way, no framing):
//! ```text
//! request:  {"request": ["read", "write"], "iface": ["batt_volt", "motor"],
//!            "body": [{}, {"v": 0.5, "w": -0.1}]}
//! response: {"status": [1, 1], "body": [{"batt_volt": 4.1}, {}]}
//! ```
//!
//! `body` is omitted from the request when every sub-request body is
//! empty (a read-only batch).  The response arrays are positional: slot
//! `i` answers sub-request `i`.
//!
//! Each sub-request carries the [`ResultHandler`] that interprets its slot.
//! Dispatch is all-or-nothing: a response whose arrays do not match the
//! batch length produces a [`BatchError`] and no update at all.

use log::error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BatchError;

use super::iface::{Action, Interface};

/// Partial status-snapshot update produced by handlers.
pub type StatusUpdate = Map<String, Value>;

/// Interprets one response slot `(status, body)` for the sub-request it answers.
pub type ResultHandler = fn(&SubRequest, &Value, &Value) -> StatusUpdate;

// ───────────────────────────────────────────────────────────────
// Sub-requests and handlers
// ───────────────────────────────────────────────────────────────

/// One read or write against one interface.
#[derive(Debug, Clone, PartialEq)]
pub struct SubRequest {
    pub iface: Interface,
    pub action: Action,
    /// Empty for reads.
    pub body: Map<String, Value>,
}

impl SubRequest {
    pub fn read(iface: Interface) -> Self {
        Self {
            iface,
            action: Action::Read,
            body: Map::new(),
        }
    }

    pub fn write(iface: Interface, body: Map<String, Value>) -> Self {
        Self {
            iface,
            action: Action::Write,
            body,
        }
    }
}

/// Pull this interface's own key out of the slot body.
///
/// A missing key only costs that one telemetry field; it is logged and
/// yields an empty update.
pub fn read_handler(sub: &SubRequest, _status: &Value, body: &Value) -> StatusUpdate {
    let key = sub.iface.as_str();
    let mut update = StatusUpdate::new();
    match body.get(key) {
        Some(value) => {
            update.insert(key.to_owned(), value.clone());
        }
        None => error!("Read response for {key} missing its key: {body}"),
    }
    update
}

/// Writes are acknowledged only; they never touch the status snapshot.
pub fn write_handler(_sub: &SubRequest, _status: &Value, _body: &Value) -> StatusUpdate {
    StatusUpdate::new()
}

// ───────────────────────────────────────────────────────────────
// RequestBatch
// ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireRequest<'a> {
    request: Vec<Action>,
    iface: Vec<Interface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Vec<&'a Map<String, Value>>>,
}

/// Ordered, append-only batch of sub-requests for a single exchange.
#[derive(Debug, Clone, Default)]
pub struct RequestBatch {
    entries: Vec<(SubRequest, ResultHandler)>,
}

impl RequestBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a read of `iface`, answered by [`read_handler`].
    pub fn add_read(&mut self, iface: Interface) -> &mut Self {
        self.add_with(SubRequest::read(iface), read_handler)
    }

    /// Append a write of `body` to `iface`, answered by [`write_handler`].
    pub fn add_write(&mut self, iface: Interface, body: Map<String, Value>) -> &mut Self {
        self.add_with(SubRequest::write(iface, body), write_handler)
    }

    /// Append a sub-request with a caller-chosen handler.
    pub fn add_with(&mut self, sub: SubRequest, handler: ResultHandler) -> &mut Self {
        self.entries.push((sub, handler));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn requests(&self) -> impl Iterator<Item = &SubRequest> {
        self.entries.iter().map(|(sub, _)| sub)
    }

    /// Whether the encoded form carries a `body` array.
    pub fn has_body(&self) -> bool {
        self.requests().any(|sub| !sub.body.is_empty())
    }

    fn wire(&self) -> WireRequest<'_> {
        WireRequest {
            request: self.requests().map(|sub| sub.action).collect(),
            iface: self.requests().map(|sub| sub.iface).collect(),
            body: self
                .has_body()
                .then(|| self.requests().map(|sub| &sub.body).collect()),
        }
    }

    /// Encode as the JSON request object, preserving insertion order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.wire())
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.wire())
    }

    /// Fan the response slots out to each sub-request's handler, in order.
    ///
    /// Later keys overwrite earlier ones.  On a shape mismatch nothing is
    /// applied.
    pub fn dispatch(self, response: &ResponseBatch) -> Result<StatusUpdate, BatchError> {
        let expected = self.entries.len();
        if response.status.len() != expected || response.body.len() != expected {
            return Err(BatchError::LengthMismatch {
                expected,
                status: response.status.len(),
                body: response.body.len(),
            });
        }

        let mut update = StatusUpdate::new();
        for ((sub, handler), (status, body)) in self
            .entries
            .iter()
            .zip(response.status.iter().zip(&response.body))
        {
            update.extend(handler(sub, status, body));
        }
        Ok(update)
    }
}

// ───────────────────────────────────────────────────────────────
// ResponseBatch
// ───────────────────────────────────────────────────────────────

/// Positional results for a [`RequestBatch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBatch {
    pub status: Vec<Value>,
    pub body: Vec<Value>,
}

impl ResponseBatch {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
