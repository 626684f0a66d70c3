//! Agent configuration parameters
//!
//! All tunable parameters for the on-board agent. The binary fills these
//! from the command line; everything else receives them as plain values.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Device path value that asks for auto-detection of the first `ttyACM*` port.
pub const AUTO_DETECT_DEVICE: &str = "auto";

/// Core agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    // --- Fleet network ---
    /// Broker host address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// JSON file mapping MAC addresses to robot ids
    pub mac_list: PathBuf,

    // --- Serial device ---
    /// Device node of the microcontroller, or `auto`
    pub serial_dev: String,
    pub baud_rate: u32,
    /// Bound on the blocking first-byte read of each exchange
    pub device_read_timeout: Duration,

    // --- Timing ---
    /// Control loop tick period
    pub tick_period: Duration,
    /// How often battery and charge status are polled
    pub status_period: Duration,
    /// How often the fleet link is heartbeat-checked (zero disables)
    pub heartbeat_period: Duration,
    /// How long `Transport::start` waits for the first acquisition
    pub start_timeout: Duration,
    /// How long an exchange waits for a reconnecting device
    pub exchange_timeout: Duration,
    /// Delay between startup attempts (fleet link and serial device)
    pub retry_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8080,
            mac_list: PathBuf::from("mac_list.json"),

            serial_dev: "/dev/ttyACM0".into(),
            baud_rate: 500_000,
            device_read_timeout: Duration::from_secs(1),

            tick_period: Duration::from_millis(16), // ~60 Hz
            status_period: Duration::from_secs(1),
            heartbeat_period: Duration::from_secs(1),
            start_timeout: Duration::from_secs(5),
            exchange_timeout: Duration::from_millis(50),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl AgentConfig {
    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host"));
        }
        if self.serial_dev.is_empty() {
            return Err(ConfigError::Invalid("serial_dev"));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate"));
        }
        if self.tick_period.is_zero() {
            return Err(ConfigError::Invalid("tick_period"));
        }
        if self.status_period.is_zero() {
            return Err(ConfigError::Invalid("status_period"));
        }
        if self.device_read_timeout.is_zero() {
            return Err(ConfigError::Invalid("device_read_timeout"));
        }
        if self.start_timeout.is_zero() {
            return Err(ConfigError::Invalid("start_timeout"));
        }
        Ok(())
    }

    /// Whether the serial device should be auto-detected.
    pub fn auto_detect_device(&self) -> bool {
        self.serial_dev == AUTO_DETECT_DEVICE
    }

    pub fn heartbeat_enabled(&self) -> bool {
        !self.heartbeat_period.is_zero()
    }
}
