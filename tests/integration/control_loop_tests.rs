//! Control loop behaviour against scripted and simulated hardware.

use std::time::{Duration, Instant};

use gritsbot::TransportError;
use gritsbot::app::service::{ControlLoop, LoopConfig, TickOutcome, Topics};
use gritsbot::mailbox::Mailbox;
use gritsbot::transport::TransportState;
use serde_json::json;

use super::mock_hw::{Bench, RecordingFleet, ScriptedExchange, wait_for_state};

const SEC: Duration = Duration::from_secs(1);

fn control(
    exchange: ScriptedExchange,
    commands: &Mailbox,
    t0: Instant,
) -> ControlLoop<ScriptedExchange, Mailbox, RecordingFleet> {
    ControlLoop::new(
        exchange,
        commands.clone(),
        RecordingFleet::new(),
        Topics::for_robot("3"),
        LoopConfig::default(),
        t0,
    )
}

// ── Batching ──────────────────────────────────────────────────

#[test]
fn telemetry_and_motor_share_one_exchange() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    commands.push(br#"{"v":0.5,"w":-0.1}"#.to_vec());
    let exchange = ScriptedExchange::new().reply(
        json!([1, 1, 1]),
        json!([{"batt_volt": 4.1}, {"charge_status": true}, {}]),
    );
    let mut control = control(exchange, &commands, t0);

    assert_eq!(control.tick(t0 + SEC), TickOutcome::Applied { requests: 3 });
    assert_eq!(
        control.exchange_port().batches,
        vec![json!({
            "request": ["read", "read", "write"],
            "iface": ["batt_volt", "charge_status", "motor"],
            "body": [{}, {}, {"v": 0.5, "w": -0.1}],
        })]
    );
    assert_eq!(control.status().get("batt_volt"), Some(&json!(4.1)));
    assert_eq!(control.status().get("charge_status"), Some(&json!(true)));
    assert_eq!(
        control.fleet().last_json("3/status"),
        Some(json!({"batt_volt": 4.1, "charge_status": true}))
    );
    assert_eq!(control.last_command().get("v"), Some(&json!(0.5)));
}

#[test]
fn nothing_due_means_no_exchange() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    let mut control = control(ScriptedExchange::new(), &commands, t0);

    assert_eq!(control.tick(t0 + Duration::from_millis(16)), TickOutcome::Idle);
    assert!(control.exchange_port().batches.is_empty());
    // The snapshot is still published every tick.
    assert_eq!(
        control.fleet().last_json("3/status"),
        Some(json!({"batt_volt": -1, "charge_status": false}))
    );
}

#[test]
fn only_newest_command_is_applied() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    for v in [0.1, 0.2, 0.3] {
        commands.push(format!(r#"{{"v":{v},"w":0.0}}"#).into_bytes());
    }
    let exchange = ScriptedExchange::new().reply(json!([1]), json!([{}]));
    let mut control = control(exchange, &commands, t0);

    assert_eq!(
        control.tick(t0 + Duration::from_millis(16)),
        TickOutcome::Applied { requests: 1 }
    );
    assert_eq!(
        control.exchange_port().batches[0]["body"],
        json!([{"v": 0.3, "w": 0.0}])
    );
    assert!(commands.is_empty());
}

#[test]
fn malformed_command_is_dropped() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    commands.push(b"{\"v\": oops".to_vec());
    let mut control = control(ScriptedExchange::new(), &commands, t0);

    assert_eq!(control.tick(t0 + Duration::from_millis(16)), TickOutcome::Idle);
    assert!(control.exchange_port().batches.is_empty());
    assert!(control.last_command().is_empty());
}

// ── Failure handling ──────────────────────────────────────────

#[test]
fn mismatched_response_applies_nothing() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    commands.push(br#"{"v":0.5,"w":-0.1}"#.to_vec());
    let exchange = ScriptedExchange::new().reply(
        json!([1, 1]),
        json!([{"batt_volt": 4.1}, {"charge_status": true}, {}]),
    );
    let mut control = control(exchange, &commands, t0);

    assert_eq!(control.tick(t0 + SEC), TickOutcome::Malformed);
    assert_eq!(control.status().get("batt_volt"), Some(&json!(-1)));
    assert_eq!(control.status().get("charge_status"), Some(&json!(false)));
}

#[test]
fn failed_exchange_keeps_snapshot_and_loop_continues() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    let broken = TransportError::Io(std::io::ErrorKind::BrokenPipe, "unplugged".into());
    let exchange = ScriptedExchange::new()
        .reply(json!([1, 1]), json!([{"batt_volt": 3.8}, {"charge_status": false}]))
        .fail(broken.clone())
        .reply(json!([1, 1]), json!([{"batt_volt": 3.7}, {"charge_status": true}]));
    let mut control = control(exchange, &commands, t0);

    assert_eq!(control.tick(t0 + SEC), TickOutcome::Applied { requests: 2 });
    assert_eq!(control.tick(t0 + 2 * SEC), TickOutcome::Failed(broken));
    assert_eq!(control.status().get("batt_volt"), Some(&json!(3.8)));

    assert_eq!(control.tick(t0 + 3 * SEC), TickOutcome::Applied { requests: 2 });
    assert_eq!(control.status().get("batt_volt"), Some(&json!(3.7)));
    assert_eq!(control.tick_count(), 3);
}

#[test]
fn missing_read_key_only_costs_that_field() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    let exchange =
        ScriptedExchange::new().reply(json!([1, 1]), json!([{"batt_volt": 4.0}, {}]));
    let mut control = control(exchange, &commands, t0);

    assert_eq!(control.tick(t0 + SEC), TickOutcome::Applied { requests: 2 });
    assert_eq!(control.status().get("batt_volt"), Some(&json!(4.0)));
    assert_eq!(control.status().get("charge_status"), Some(&json!(false)));
}

// ── Heartbeat ─────────────────────────────────────────────────

#[test]
fn missing_heartbeat_echo_reconnects() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    let echoes = Mailbox::new();
    let mut control = control(ScriptedExchange::new(), &commands, t0).with_heartbeat(echoes, t0);

    control.tick(t0 + SEC);
    assert_eq!(control.fleet().on_topic("3/server_alive").len(), 1);
    assert_eq!(control.fleet().reconnects, 0);

    control.tick(t0 + 2 * SEC);
    assert_eq!(control.fleet().reconnects, 1);
    assert_eq!(control.fleet().on_topic("3/server_alive").len(), 2);
}

#[test]
fn echoed_heartbeat_keeps_link() {
    let t0 = Instant::now();
    let commands = Mailbox::new();
    let echoes = Mailbox::new();
    let mut fleet = RecordingFleet::new();
    fleet.echo = Some(("3/server_alive".into(), echoes.clone()));
    let mut control = ControlLoop::new(
        ScriptedExchange::new(),
        commands,
        fleet,
        Topics::for_robot("3"),
        LoopConfig::default(),
        t0,
    )
    .with_heartbeat(echoes.clone(), t0);

    for s in 1..=4 {
        control.tick(t0 + s * SEC);
    }
    assert_eq!(control.fleet().reconnects, 0);
    assert_eq!(control.fleet().on_topic("3/server_alive").len(), 4);
}

#[test]
fn zero_heartbeat_period_disables_supervision() {
    let t0 = Instant::now();
    let config = LoopConfig {
        heartbeat_period: Duration::ZERO,
        ..LoopConfig::default()
    };
    let mut control = ControlLoop::new(
        ScriptedExchange::new(),
        Mailbox::new(),
        RecordingFleet::new(),
        Topics::for_robot("3"),
        config,
        t0,
    )
    .with_heartbeat(Mailbox::new(), t0);

    control.tick(t0 + SEC);
    control.tick(t0 + 2 * SEC);
    assert!(control.fleet().on_topic("3/server_alive").is_empty());
    assert_eq!(control.fleet().reconnects, 0);
}

// ── End to end with the real transport ────────────────────────

#[test]
fn loop_survives_unplug_and_replug() {
    let bench = Bench::new();
    let transport = bench.transport();
    transport.start(Duration::from_secs(2)).unwrap();

    let t0 = Instant::now();
    let commands = Mailbox::new();
    let mut control = ControlLoop::new(
        transport,
        commands.clone(),
        RecordingFleet::new(),
        Topics::for_robot("9"),
        LoopConfig::default(),
        t0,
    );

    commands.push(br#"{"v":0.2,"w":0.0,"left_led":[1,2,3]}"#.to_vec());
    assert_eq!(control.tick(t0 + SEC), TickOutcome::Applied { requests: 4 });
    assert_eq!(control.status().get("batt_volt"), Some(&json!(4.1)));
    let sent = bench.requests();
    assert_eq!(
        sent[0],
        json!({
            "request": ["read", "read", "write", "write"],
            "iface": ["batt_volt", "charge_status", "motor", "left_led"],
            "body": [{}, {}, {"v": 0.2, "w": 0.0}, {"rgb": [1, 2, 3]}],
        })
    );

    bench.unplug();
    bench.set_telemetry("batt_volt", json!(3.9));
    commands.push(br#"{"v":0.0,"w":0.0}"#.to_vec());
    let outcome = control.tick(t0 + SEC + Duration::from_millis(16));
    assert!(
        matches!(outcome, TickOutcome::Failed(TransportError::Io(..))),
        "got {outcome:?}"
    );
    assert_eq!(control.exchange_port().state(), TransportState::Reconnecting);
    assert_eq!(control.status().get("batt_volt"), Some(&json!(4.1)));

    bench.replug();
    assert!(wait_for_state(
        control.exchange_port(),
        TransportState::Ready,
        Duration::from_secs(2)
    ));
    assert_eq!(
        control.tick(t0 + 2 * SEC),
        TickOutcome::Applied { requests: 2 }
    );
    assert_eq!(control.status().get("batt_volt"), Some(&json!(3.9)));
}
