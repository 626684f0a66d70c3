//! gritsbot agent main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  SerialOpener ─▶ Transport      MqttLink ─▶ Mailbox × 2      │
//! │  (USB CDC)       (watcher)      (fleet)     (commands, hb)   │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │        ControlLoop (BatchExchange · CommandQueue ·     │  │
//! │  │                     FleetLink)                         │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Startup: CLI → logging → identity → fleet link (retried) → serial
//! transport (retried) → control loop forever.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use tracing_subscriber::EnvFilter;

use gritsbot::adapters::identity::{self, MacList, format_mac};
use gritsbot::adapters::mqtt::{MqttLink, MqttSettings};
use gritsbot::adapters::serial::{DevicePath, SerialOpener};
use gritsbot::app::service::{ControlLoop, LoopConfig, Topics};
use gritsbot::config::AgentConfig;
use gritsbot::mailbox::Mailbox;
use gritsbot::transport::{Transport, acquire_transport};

/// MQTT keep-alive for the fleet session.
const KEEP_ALIVE: Duration = Duration::from_secs(5);

// ── CLI ───────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "gritsbot", version, about = "gritsbot on-board control agent")]
struct Cli {
    /// JSON file containing MAC to id mapping
    mac_list: PathBuf,

    /// MQTT host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// MQTT port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Seconds per control loop tick
    #[arg(long, default_value_t = 0.016)]
    update_rate: f64,

    /// Seconds between battery / charge status polls
    #[arg(long, default_value_t = 1.0)]
    status_update_rate: f64,

    /// Seconds between fleet heartbeats (0 disables; defaults to the status rate)
    #[arg(long)]
    heartbeat_rate: Option<f64>,

    /// Serial device node, or `auto` for the first ttyACM port
    #[arg(long, default_value = "/dev/ttyACM0")]
    serial_dev: String,

    #[arg(long, default_value_t = 500_000)]
    baud_rate: u32,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Where network interfaces are listed
    #[arg(long, default_value = identity::NET_CLASS_ROOT, hide = true)]
    net_root: PathBuf,
}

impl Cli {
    fn to_config(&self) -> Result<AgentConfig> {
        let defaults = AgentConfig::default();
        let status_period = seconds("status-update-rate", self.status_update_rate)?;
        let heartbeat_period = match self.heartbeat_rate {
            Some(rate) => seconds("heartbeat-rate", rate)?,
            None => status_period,
        };
        Ok(AgentConfig {
            host: self.host.clone(),
            port: self.port,
            mac_list: self.mac_list.clone(),
            serial_dev: self.serial_dev.clone(),
            baud_rate: self.baud_rate,
            tick_period: seconds("update-rate", self.update_rate)?,
            status_period,
            heartbeat_period,
            ..defaults
        })
    }
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("--{flag} must be a non-negative number of seconds, got {value}");
    }
    Ok(Duration::from_secs_f64(value))
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    info!("gritsbot agent v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.to_config()?;
    config.validate().context("invalid configuration")?;

    // ── 1. Who am I ───────────────────────────────────────────
    let mac = identity::read_mac(&cli.net_root).context("could not read MAC address")?;
    let macs = MacList::from_path(&config.mac_list)?;
    let robot_id = macs.resolve(&mac)?.to_owned();
    info!(
        "This is robot: ({robot_id}) with MAC address: ({})",
        format_mac(&mac)
    );
    let topics = Topics::for_robot(&robot_id);

    // ── 2. Fleet link ─────────────────────────────────────────
    let commands = Mailbox::new();
    let heartbeats = Mailbox::new();
    let fleet = connect_fleet(&config, &robot_id, &topics, &commands, &heartbeats);
    info!("Started fleet link");

    // ── 3. Serial device ──────────────────────────────────────
    let path = if config.auto_detect_device() {
        DevicePath::Detect
    } else {
        DevicePath::Fixed(config.serial_dev.clone())
    };
    let transport = acquire_transport(
        || {
            Transport::new(SerialOpener::new(
                path.clone(),
                config.baud_rate,
                config.device_read_timeout,
            ))
        },
        config.start_timeout,
        config.retry_delay,
    );
    info!("Acquired serial device");

    // ── 4. Control loop ───────────────────────────────────────
    let start = Instant::now();
    let mut control = ControlLoop::new(
        transport,
        commands,
        fleet,
        topics,
        LoopConfig::from(&config),
        start,
    )
    .with_heartbeat(heartbeats, start);
    control.run()
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Also installs the bridge that forwards `log` records.
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Connect to the broker, retrying until it answers.
fn connect_fleet(
    config: &AgentConfig,
    robot_id: &str,
    topics: &Topics,
    commands: &Mailbox,
    heartbeats: &Mailbox,
) -> MqttLink {
    let settings = MqttSettings {
        host: config.host.clone(),
        port: config.port,
        client_id: format!("gritsbot-{robot_id}"),
        keep_alive: KEEP_ALIVE,
    };
    loop {
        let routes = vec![
            (topics.commands.clone(), commands.clone()),
            (topics.heartbeat.clone(), heartbeats.clone()),
        ];
        match MqttLink::connect(&settings, routes, config.start_timeout) {
            Ok(link) => return link,
            Err(e) => {
                error!("Could not start fleet link: {e}");
                thread::sleep(config.retry_delay);
            }
        }
    }
}
