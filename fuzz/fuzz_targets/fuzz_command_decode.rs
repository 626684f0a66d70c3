//! Fuzz target: `Command::decode` + `append_writes`
//!
//! Arbitrary inbound fleet messages must decode or fail cleanly, and a
//! decoded command never adds more than three write sub-requests.
//!
//! cargo fuzz run fuzz_command_decode

#![no_main]

use gritsbot::app::commands::Command;
use gritsbot::protocol::RequestBatch;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(cmd) = Command::decode(data) {
        let mut batch = RequestBatch::new();
        let added = cmd.append_writes(&mut batch);
        assert!(added <= 3);
        assert_eq!(added, batch.len());
        assert!(batch.to_bytes().is_ok());
    }
});
