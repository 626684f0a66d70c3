//! Background device (re)acquisition.
//!
//! Sleeps on the condvar until an exchange flags the device, drops the
//! stale handle, and reopens.  Failed opens are retried no sooner than
//! the configured retry interval.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::protocol::DeviceOpener;

use super::Shared;

pub(super) fn run<O: DeviceOpener>(shared: &Shared<O::Device>, mut opener: O, retry: Duration) {
    let name = opener.describe();
    debug!("Serial watcher for {name} running");

    loop {
        let stale = {
            let mut st = shared.state.lock();
            while !st.needs_reconnect && !st.stopped {
                shared.changed.wait(&mut st);
            }
            if st.stopped {
                break;
            }
            st.device.take()
        };
        // Close before reopening; some drivers refuse a second handle.
        drop(stale);

        match opener.open() {
            Ok(device) => {
                let mut st = shared.state.lock();
                if st.stopped {
                    break;
                }
                st.device = Some(device);
                st.needs_reconnect = false;
                st.acquired_once = true;
                drop(st);
                shared.changed.notify_all();
                info!("Serial device {name} ready");
            }
            Err(e) => {
                warn!("Could not open serial device {name}: {e}");
                let deadline = Instant::now() + retry;
                let mut st = shared.state.lock();
                while !st.stopped {
                    if shared.changed.wait_until(&mut st, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
    }

    let device = shared.state.lock().device.take();
    drop(device);
    debug!("Serial watcher for {name} exiting");
}
