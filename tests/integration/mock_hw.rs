//! Mock robot hardware for integration tests.
//!
//! [`Bench`] simulates the microcontroller and its USB cable: tests can
//! unplug and replug it, script raw replies, or let the simulated firmware
//! answer each batch from its telemetry table.  [`ScriptedExchange`] and
//! [`RecordingFleet`] stand in for the transport and fleet link when only
//! the control loop is under test.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gritsbot::app::ports::{BatchExchange, FleetLink};
use gritsbot::protocol::{DeviceOpener, RequestBatch, ResponseBatch, SerialDevice};
use gritsbot::transport::{Transport, TransportConfig, TransportState};
use gritsbot::{FleetError, TransportError};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

// ── Simulated microcontroller + cable ─────────────────────────

pub struct BenchState {
    pub plugged: bool,
    /// Bumped on every unplug; handles from an older generation are dead.
    generation: u64,
    pub opens: usize,
    /// Values the simulated firmware reports for read requests.
    pub telemetry: Map<String, Value>,
    /// Raw replies used instead of the simulated firmware, in order.
    pub scripted: VecDeque<Vec<u8>>,
    /// Every request batch received, decoded.
    pub requests: Vec<Value>,
    /// Delay inside each blocking read.
    pub read_delay: Duration,
}

#[derive(Clone)]
pub struct Bench(Arc<Mutex<BenchState>>);

#[allow(dead_code)]
impl Bench {
    pub fn new() -> Self {
        let mut telemetry = Map::new();
        telemetry.insert("batt_volt".into(), json!(4.1));
        telemetry.insert("charge_status".into(), json!(true));
        Self(Arc::new(Mutex::new(BenchState {
            plugged: true,
            generation: 0,
            opens: 0,
            telemetry,
            scripted: VecDeque::new(),
            requests: Vec::new(),
            read_delay: Duration::ZERO,
        })))
    }

    pub fn unplugged() -> Self {
        let bench = Self::new();
        bench.0.lock().plugged = false;
        bench
    }

    pub fn unplug(&self) {
        let mut st = self.0.lock();
        st.plugged = false;
        st.generation += 1;
    }

    pub fn replug(&self) {
        self.0.lock().plugged = true;
    }

    pub fn script(&self, reply: &[u8]) {
        self.0.lock().scripted.push_back(reply.to_vec());
    }

    pub fn set_telemetry(&self, key: &str, value: Value) {
        self.0.lock().telemetry.insert(key.into(), value);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.0.lock().read_delay = delay;
    }

    pub fn opens(&self) -> usize {
        self.0.lock().opens
    }

    pub fn requests(&self) -> Vec<Value> {
        self.0.lock().requests.clone()
    }

    pub fn opener(&self) -> MockOpener {
        MockOpener(self.clone())
    }

    /// Transport with a fast watcher retry so tests don't wait a full second.
    pub fn transport(&self) -> Transport<MockOpener> {
        Transport::with_config(
            self.opener(),
            TransportConfig {
                retry_interval: Duration::from_millis(20),
                ..TransportConfig::default()
            },
        )
    }
}

/// Answer a request the way the firmware does: status 1 per entry, read
/// bodies from the telemetry table, empty bodies for writes.
fn firmware_reply(request: &Value, telemetry: &Map<String, Value>) -> Vec<u8> {
    let actions = request["request"].as_array().cloned().unwrap_or_default();
    let ifaces = request["iface"].as_array().cloned().unwrap_or_default();
    let mut status = Vec::new();
    let mut body = Vec::new();
    for (action, iface) in actions.iter().zip(&ifaces) {
        status.push(json!(1));
        let key = iface.as_str().unwrap_or_default();
        match (action.as_str(), telemetry.get(key)) {
            (Some("read"), Some(value)) => body.push(json!({ key: value })),
            _ => body.push(json!({})),
        }
    }
    serde_json::to_vec(&json!({"status": status, "body": body})).unwrap()
}

pub struct MockDevice {
    bench: Bench,
    generation: u64,
    pending: VecDeque<u8>,
}

impl MockDevice {
    fn check_link(&self, st: &BenchState) -> io::Result<()> {
        if st.plugged && st.generation == self.generation {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        }
    }
}

impl io::Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut st = self.bench.0.lock();
        self.check_link(&st)?;
        let request: Value = serde_json::from_slice(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let reply = match st.scripted.pop_front() {
            Some(reply) => reply,
            None => firmware_reply(&request, &st.telemetry),
        };
        st.requests.push(request);
        self.pending.extend(reply);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_link(&self.bench.0.lock())
    }
}

impl io::Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let delay = {
            let st = self.bench.0.lock();
            self.check_link(&st)?;
            st.read_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.pending.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl SerialDevice for MockDevice {
    fn bytes_waiting(&mut self) -> io::Result<usize> {
        self.check_link(&self.bench.0.lock())?;
        Ok(self.pending.len())
    }
}

pub struct MockOpener(Bench);

impl DeviceOpener for MockOpener {
    type Device = MockDevice;

    fn open(&mut self) -> io::Result<MockDevice> {
        let mut st = self.0.0.lock();
        if !st.plugged {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no device"));
        }
        st.opens += 1;
        Ok(MockDevice {
            bench: self.0.clone(),
            generation: st.generation,
            pending: VecDeque::new(),
        })
    }

    fn describe(&self) -> String {
        "mock-acm0".into()
    }
}

/// Poll until the transport reaches `want` or `within` elapses.
#[allow(dead_code)]
pub fn wait_for_state(t: &Transport<MockOpener>, want: TransportState, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if t.state() == want {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    t.state() == want
}

// ── Scripted exchange (control loop tests) ────────────────────

#[derive(Default)]
pub struct ScriptedExchange {
    pub replies: VecDeque<Result<ResponseBatch, TransportError>>,
    /// Encoded form of every batch the loop sent.
    pub batches: Vec<Value>,
}

#[allow(dead_code)]
impl ScriptedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, status: Value, body: Value) -> Self {
        self.replies.push_back(Ok(serde_json::from_value(
            json!({"status": status, "body": body}),
        )
        .unwrap()));
        self
    }

    pub fn fail(mut self, err: TransportError) -> Self {
        self.replies.push_back(Err(err));
        self
    }
}

impl BatchExchange for ScriptedExchange {
    fn exchange(
        &mut self,
        batch: &RequestBatch,
        _timeout: Duration,
    ) -> Result<ResponseBatch, TransportError> {
        self.batches.push(batch.to_value().unwrap());
        self.replies.pop_front().unwrap_or(Err(TransportError::Timeout))
    }
}

// ── Recording fleet link ──────────────────────────────────────

#[derive(Default)]
pub struct RecordingFleet {
    pub published: Vec<(String, Vec<u8>)>,
    pub reconnects: usize,
    /// Payloads published on this topic are looped back into the mailbox,
    /// like a broker echoing our own heartbeat.
    pub echo: Option<(String, gritsbot::mailbox::Mailbox)>,
}

#[allow(dead_code)]
impl RecordingFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<&[u8]> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.as_slice())
            .collect()
    }

    pub fn last_json(&self, topic: &str) -> Option<Value> {
        self.on_topic(topic)
            .last()
            .map(|p| serde_json::from_slice(p).unwrap())
    }
}

impl FleetLink for RecordingFleet {
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), FleetError> {
        if let Some((echo_topic, mailbox)) = &self.echo
            && echo_topic == topic
        {
            mailbox.push(payload.clone());
        }
        self.published.push((topic.to_owned(), payload));
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), FleetError> {
        self.reconnects += 1;
        Ok(())
    }
}
