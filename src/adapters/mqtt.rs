//! MQTT fleet link.
//!
//! ```text
//!   ControlLoop ──publish──▶ Client ──▶ broker
//!                                         │
//!   Mailbox ◀──route by topic── connection thread
//! ```
//!
//! The rumqttc connection runs on its own named thread.  Every inbound
//! publish is pushed onto the [`Mailbox`] registered for its topic;
//! subscriptions are (re)issued on every `ConnAck`, so a broker restart
//! is picked up without intervention.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};

use crate::app::ports::FleetLink;
use crate::error::FleetError;
use crate::mailbox::Mailbox;

/// Pause after a connection error before the event loop retries.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Bound on queued outgoing requests inside the client.
const REQUEST_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
}

pub struct MqttLink {
    client: Client,
    topics: Vec<String>,
    running: Arc<AtomicBool>,
}

impl MqttLink {
    /// Connect and subscribe to every routed topic.  Waits up to `timeout`
    /// for the broker's first `ConnAck`.
    pub fn connect(
        settings: &MqttSettings,
        routes: Vec<(String, Mailbox)>,
        timeout: Duration,
    ) -> Result<Self, FleetError> {
        let mut opts = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        opts.set_keep_alive(settings.keep_alive);
        opts.set_clean_session(true);

        let (client, connection) = Client::new(opts, REQUEST_CAPACITY);
        let topics: Vec<String> = routes.iter().map(|(topic, _)| topic.clone()).collect();
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let task = ConnectionTask {
            client: client.clone(),
            topics: topics.clone(),
            routes: routes.into_iter().collect(),
            running: Arc::clone(&running),
            ready: Some(ready_tx),
        };
        thread::Builder::new()
            .name("mqtt-connection".into())
            .spawn(move || task.run(connection))
            .map_err(|e| FleetError::Connect(format!("could not spawn connection thread: {e}")))?;

        // Dropping `link` on any error path shuts the thread down.
        let link = Self {
            client,
            topics,
            running,
        };
        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                info!(
                    "Connected to fleet broker {}:{} as {}",
                    settings.host, settings.port, settings.client_id
                );
                Ok(link)
            }
            Ok(Err(msg)) => Err(FleetError::Connect(msg)),
            Err(_) => Err(FleetError::Connect(format!(
                "no answer from {}:{} within {timeout:?}",
                settings.host, settings.port
            ))),
        }
    }
}

impl FleetLink for MqttLink {
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), FleetError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| FleetError::Rejected(e.to_string()))
    }

    fn reconnect(&mut self) -> Result<(), FleetError> {
        info!("Resubscribing to {} fleet topics", self.topics.len());
        subscribe_all(&self.client, &self.topics)
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = self.client.try_disconnect();
    }
}

fn subscribe_all(client: &Client, topics: &[String]) -> Result<(), FleetError> {
    for topic in topics {
        client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| FleetError::Rejected(format!("subscribe {topic}: {e}")))?;
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Connection thread
// ───────────────────────────────────────────────────────────────

struct ConnectionTask {
    client: Client,
    topics: Vec<String>,
    routes: HashMap<String, Mailbox>,
    running: Arc<AtomicBool>,
    /// Reports the outcome of the first connection attempt.
    ready: Option<mpsc::Sender<Result<(), String>>>,
}

impl ConnectionTask {
    fn run(mut self, mut connection: Connection) {
        for notification in connection.iter() {
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            match notification {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if let Err(e) = subscribe_all(&self.client, &self.topics) {
                        warn!("Could not subscribe after connect: {e}");
                    }
                    if let Some(tx) = self.ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match self.routes.get(&publish.topic) {
                        Some(mailbox) => mailbox.push(publish.payload.to_vec()),
                        None => debug!("Ignoring message on unrouted topic {}", publish.topic),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if let Some(tx) = self.ready.take() {
                        let _ = tx.send(Err(e.to_string()));
                    }
                    if !self.running.load(Ordering::Relaxed) {
                        break;
                    }
                    warn!("Fleet connection error: {e}; retrying in {RECONNECT_BACKOFF:?}");
                    thread::sleep(RECONNECT_BACKOFF);
                }
            }
        }
        debug!("Fleet connection thread exiting");
    }
}
