//! Inbound command messages from the fleet.
//!
//! A command is a JSON object that may carry any subset of:
//!
//! | key         | meaning                         | write sub-request          |
//! |-------------|---------------------------------|----------------------------|
//! | `v`, `w`    | linear / angular velocity       | `motor {"v": .., "w": ..}` |
//! | `left_led`  | `[r, g, b]`                     | `left_led {"rgb": [..]}`   |
//! | `right_led` | `[r, g, b]`                     | `right_led {"rgb": [..]}`  |
//!
//! Unrecognised keys are ignored.  A recognised key with an unusable value
//! is logged and dropped without affecting the others.

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::protocol::{Interface, RequestBatch};

/// LED colour, one byte per channel.
pub type Rgb = [u8; 3];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub v: f64,
    pub w: f64,
}

/// A decoded command message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub motor: Option<Velocity>,
    pub left_led: Option<Rgb>,
    pub right_led: Option<Rgb>,
    raw: Map<String, Value>,
}

impl Command {
    /// Decode one raw message.  Anything that is not a JSON object is an
    /// error; individual fields are validated leniently.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: Map<String, Value> = serde_json::from_slice(bytes)?;

        let motor = match (raw.get("v"), raw.get("w")) {
            (Some(v), Some(w)) => match (v.as_f64(), w.as_f64()) {
                (Some(v), Some(w)) => Some(Velocity { v, w }),
                _ => {
                    warn!("Ignoring non-numeric velocity v={v} w={w}");
                    None
                }
            },
            _ => None,
        };

        Ok(Self {
            motor,
            left_led: field(&raw, "left_led"),
            right_led: field(&raw, "right_led"),
            raw,
        })
    }

    /// The message as received, for the periodic summary.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Append one write per present command, motor first.  Returns how many
    /// sub-requests were added.
    pub fn append_writes(&self, batch: &mut RequestBatch) -> usize {
        let before = batch.len();
        if let Some(Velocity { v, w }) = self.motor {
            batch.add_write(Interface::Motor, object(json!({"v": v, "w": w})));
        }
        if let Some(rgb) = self.left_led {
            batch.add_write(Interface::LeftLed, object(json!({"rgb": rgb})));
        }
        if let Some(rgb) = self.right_led {
            batch.add_write(Interface::RightLed, object(json!({"rgb": rgb})));
        }
        batch.len() - before
    }
}

fn field<T: DeserializeOwned>(raw: &Map<String, Value>, key: &str) -> Option<T> {
    let value = raw.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {key}={value}: {e}");
            None
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
