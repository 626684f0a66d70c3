//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                  | Connects to                 |
//! |------------|-----------------------------|-----------------------------|
//! | `serial`   | DeviceOpener / SerialDevice | USB CDC microcontroller     |
//! | `mqtt`     | FleetLink                   | Fleet MQTT broker           |
//! |            | (feeds `Mailbox`es)         |                             |
//! | `identity` |                             | sysfs MAC + MAC list file   |

pub mod identity;
#[cfg(feature = "agent")]
pub mod mqtt;
#[cfg(feature = "agent")]
pub mod serial;
