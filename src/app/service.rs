//! Control loop: the hexagonal core.
//!
//! [`ControlLoop`] owns the status snapshot and drives one fixed-rate
//! cycle.  All I/O flows through the port traits, so the loop is tested
//! end-to-end against mocks.
//!
//! ```text
//!  CommandQueue ──▶ ┌──────────────────────────┐ ──▶ FleetLink
//!                   │       ControlLoop         │     (<id>/status)
//! BatchExchange ◀──▶│ cadences · batch · status │
//!                   └──────────────────────────┘
//! ```
//!
//! Per tick:
//! 1. heartbeat check (if enabled and due)
//! 2. telemetry reads (if the status cadence is due)
//! 3. newest decodable command → write sub-requests
//! 4. at most one exchange, skipped when the batch is empty
//! 5. all-or-nothing dispatch into the snapshot
//! 6. publish the snapshot
//! 7. periodic summary log

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use crate::config::AgentConfig;
use crate::error::TransportError;
use crate::mailbox::Mailbox;
use crate::protocol::{Interface, RequestBatch};
use crate::scheduler::{Cadence, sleep_budget};

use super::inbox::CommandInbox;
use super::ports::{BatchExchange, CommandQueue, FleetLink};
use super::status::StatusSnapshot;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Fleet topics for one robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub status: String,
    pub commands: String,
    pub heartbeat: String,
}

impl Topics {
    pub fn for_robot(id: &str) -> Self {
        Self {
            status: format!("{id}/status"),
            commands: format!("matlab_api/{id}"),
            heartbeat: format!("{id}/server_alive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    pub tick_period: Duration,
    pub status_period: Duration,
    /// Zero disables heartbeat supervision.
    pub heartbeat_period: Duration,
    pub exchange_timeout: Duration,
}

impl From<&AgentConfig> for LoopConfig {
    fn from(c: &AgentConfig) -> Self {
        Self {
            tick_period: c.tick_period,
            status_period: c.status_period,
            heartbeat_period: c.heartbeat_period,
            exchange_timeout: c.exchange_timeout,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to send; no exchange happened.
    Idle,
    /// An exchange of `requests` sub-requests succeeded and was applied.
    Applied { requests: usize },
    /// The reply could not be decoded or did not match the batch.
    Malformed,
    /// The exchange itself failed.
    Failed(TransportError),
}

struct Heartbeat {
    echoes: Mailbox,
    cadence: Cadence,
    awaiting_echo: bool,
}

// ───────────────────────────────────────────────────────────────
// ControlLoop
// ───────────────────────────────────────────────────────────────

pub struct ControlLoop<X, Q, F> {
    exchange: X,
    inbox: CommandInbox<Q>,
    fleet: F,
    heartbeat: Option<Heartbeat>,
    status: StatusSnapshot,
    topics: Topics,
    config: LoopConfig,
    status_cadence: Cadence,
    log_cadence: Cadence,
    last_command: Map<String, Value>,
    tick_count: u64,
}

impl<X, Q, F> ControlLoop<X, Q, F>
where
    X: BatchExchange,
    Q: CommandQueue,
    F: FleetLink,
{
    /// Build the loop.  Cadences count from `start`, so the first telemetry
    /// read happens one status period in.
    pub fn new(
        exchange: X,
        commands: Q,
        fleet: F,
        topics: Topics,
        config: LoopConfig,
        start: Instant,
    ) -> Self {
        Self {
            exchange,
            inbox: CommandInbox::new(commands),
            fleet,
            heartbeat: None,
            status: StatusSnapshot::new(),
            topics,
            config,
            status_cadence: Cadence::new(config.status_period, start),
            log_cadence: Cadence::new(config.status_period, start),
            last_command: Map::new(),
            tick_count: 0,
        }
    }

    /// Enable heartbeat supervision, with `echoes` receiving whatever
    /// arrives on the heartbeat topic.  No-op when the period is zero.
    pub fn with_heartbeat(mut self, echoes: Mailbox, start: Instant) -> Self {
        if !self.config.heartbeat_period.is_zero() {
            self.heartbeat = Some(Heartbeat {
                echoes,
                cadence: Cadence::new(self.config.heartbeat_period, start),
                awaiting_echo: false,
            });
        }
        self
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn status(&self) -> &StatusSnapshot {
        &self.status
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_command(&self) -> &Map<String, Value> {
        &self.last_command
    }

    pub fn exchange_port(&self) -> &X {
        &self.exchange
    }

    pub fn fleet(&self) -> &F {
        &self.fleet
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one cycle as of `now`.  Never fails; problems are logged and
    /// reported through the outcome.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.tick_count += 1;

        self.check_heartbeat(now);

        let mut batch = RequestBatch::new();
        if self.status_cadence.due(now) {
            for iface in Interface::TELEMETRY {
                batch.add_read(iface);
            }
        }

        if let Some(cmd) = self.inbox.next_command() {
            cmd.append_writes(&mut batch);
            self.last_command = cmd.raw().clone();
        }

        let outcome = if batch.is_empty() {
            TickOutcome::Idle
        } else {
            self.run_exchange(batch)
        };

        self.publish_status();

        if self.log_cadence.due(now) {
            info!("Status data ({})", Value::Object(self.status.as_map().clone()));
            info!(
                "Last input message received ({})",
                Value::Object(self.last_command.clone())
            );
        }

        outcome
    }

    /// Tick forever at the configured rate.
    pub fn run(&mut self) -> ! {
        info!(
            "Control loop running: tick {:?}, status every {:?}",
            self.config.tick_period, self.config.status_period
        );
        loop {
            let start = Instant::now();
            let outcome = self.tick(start);
            if outcome != TickOutcome::Idle {
                debug!("tick {}: {outcome:?}", self.tick_count);
            }
            thread::sleep(sleep_budget(self.config.tick_period, start, Instant::now()));
        }
    }

    fn run_exchange(&mut self, batch: RequestBatch) -> TickOutcome {
        let requests = batch.len();
        match self.exchange.exchange(&batch, self.config.exchange_timeout) {
            Ok(response) => match batch.dispatch(&response) {
                Ok(update) => {
                    self.status.apply(update);
                    TickOutcome::Applied { requests }
                }
                Err(e) => {
                    error!("Malformed response ({e}): {response:?}");
                    TickOutcome::Malformed
                }
            },
            Err(TransportError::MalformedResponse(msg)) => {
                error!("Malformed response: {msg}");
                TickOutcome::Malformed
            }
            Err(e) => {
                error!("Serial exchange failed: {e}");
                TickOutcome::Failed(e)
            }
        }
    }

    fn publish_status(&mut self) {
        match self.status.to_json() {
            Ok(payload) => {
                if let Err(e) = self.fleet.publish(&self.topics.status, payload) {
                    warn!("Could not publish status: {e}");
                }
            }
            Err(e) => error!("Could not encode status: {e}"),
        }
    }

    /// Check the previous heartbeat came back, then send a new one.
    fn check_heartbeat(&mut self, now: Instant) {
        let Some(hb) = self.heartbeat.as_mut() else {
            return;
        };
        if !hb.cadence.due(now) {
            return;
        }

        let echoed = hb.echoes.clear() > 0;
        if hb.awaiting_echo && !echoed {
            error!("Could not heartbeat server; reconnecting fleet link");
            if let Err(e) = self.fleet.reconnect() {
                error!("Could not reconnect to fleet network: {e}");
            }
        }

        match self.fleet.publish(&self.topics.heartbeat, Vec::new()) {
            Ok(()) => hb.awaiting_echo = true,
            Err(e) => {
                warn!("Could not publish heartbeat: {e}");
                hb.awaiting_echo = false;
            }
        }
    }
}
