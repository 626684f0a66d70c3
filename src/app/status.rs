//! Last-known telemetry, republished to the fleet every tick.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::protocol::StatusUpdate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot(Map<String, Value>);

impl StatusSnapshot {
    /// Startup values: no battery reading yet, not charging.
    pub fn new() -> Self {
        let mut map = Map::new();
        map.insert("batt_volt".into(), json!(-1));
        map.insert("charge_status".into(), json!(false));
        Self(map)
    }

    pub fn apply(&mut self, update: StatusUpdate) {
        self.0.extend(update);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
