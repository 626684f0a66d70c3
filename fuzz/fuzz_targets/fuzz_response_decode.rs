//! Fuzz target: `ResponseBatch::from_slice` + `RequestBatch::dispatch`
//!
//! Feeds arbitrary reply bytes through decoding and dispatch against a
//! fixed telemetry + motor batch.  Dispatch must either apply an update
//! for a correctly shaped reply or reject it, and never panic.
//!
//! cargo fuzz run fuzz_response_decode

#![no_main]

use gritsbot::protocol::{Interface, RequestBatch, ResponseBatch};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, json};

fuzz_target!(|data: &[u8]| {
    let Ok(response) = ResponseBatch::from_slice(data) else {
        return;
    };

    let mut motor = Map::new();
    motor.insert("v".into(), json!(0.1));
    motor.insert("w".into(), json!(0.0));

    let mut batch = RequestBatch::new();
    batch
        .add_read(Interface::BattVolt)
        .add_read(Interface::ChargeStatus)
        .add_write(Interface::Motor, motor);

    let shaped = response.status.len() == 3 && response.body.len() == 3;
    match batch.dispatch(&response) {
        Ok(update) => {
            assert!(shaped, "mis-shaped reply was applied");
            // Only read handlers contribute keys.
            assert!(update.keys().all(|k| k == "batt_volt" || k == "charge_status"));
        }
        Err(_) => assert!(!shaped, "well-shaped reply was rejected"),
    }
});
