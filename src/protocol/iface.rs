//! Interface and action names as they appear on the wire.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A named capability exposed by the microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    /// Battery voltage (read).
    BattVolt,
    /// Whether the robot is on its charger (read).
    ChargeStatus,
    /// Differential drive, body `{"v": .., "w": ..}` (write).
    Motor,
    /// Left RGB LED, body `{"rgb": [r, g, b]}` (write).
    LeftLed,
    /// Right RGB LED, body `{"rgb": [r, g, b]}` (write).
    RightLed,
}

impl Interface {
    /// Telemetry interfaces polled on the status cadence, in request order.
    pub const TELEMETRY: [Interface; 2] = [Interface::BattVolt, Interface::ChargeStatus];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BattVolt => "batt_volt",
            Self::ChargeStatus => "charge_status",
            Self::Motor => "motor",
            Self::LeftLed => "left_led",
            Self::RightLed => "right_led",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sub-request does to its interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
}
