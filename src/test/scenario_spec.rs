use std::sync::{Arc, Mutex};

use super::harness::n;
use crate::error::ScenarioError;
use crate::net::{DtnWorld, EventKind};
use crate::report::EventLog;
use crate::routing::RoutingSpec;
use crate::sim::{MessageSpec, ScenarioSpec, SimTime, Simulator};

const SINGLE_CONTACT: &str = r#"{
    "schema_version": 1,
    "meta": { "name": "single contact" },
    "topology": {
        "kind": "contacts",
        "contacts": [
            { "tx_node": 0, "rx_node": 1, "start_time": 10, "end_time": 20, "bit_rate": 1000, "delay": 1 }
        ]
    },
    "routing": { "kind": "sabr", "max_order_routes": 3 },
    "messages": [
        { "source": 0, "destination": 1, "size": 5000, "ttl": 100 }
    ]
}"#;

fn with_log() -> (Simulator, DtnWorld, Arc<Mutex<EventLog>>) {
    let mut world = DtnWorld::default();
    let log = Arc::new(Mutex::new(EventLog::new()));
    world.net.add_subscriber(Arc::clone(&log));
    (Simulator::default(), world, log)
}

fn times(log: &Arc<Mutex<EventLog>>, kind: EventKind) -> Vec<f64> {
    log.lock().expect("log lock").of_kind(kind).map(|e| e.t).collect()
}

#[test]
fn scenario_runs_end_to_end() {
    let spec = ScenarioSpec::from_json_str(SINGLE_CONTACT).expect("valid scenario");
    assert_eq!(spec.node_count(), 2);
    assert_eq!(spec.seed(), 0);
    match &spec.routing {
        Some(RoutingSpec::Sabr(cfg)) => assert_eq!(cfg.max_order_routes, 3),
        other => panic!("unexpected routing {other:?}"),
    }

    let (mut sim, mut world, log) = with_log();
    let run = spec.instantiate(&mut sim, &mut world).expect("instantiate");
    assert_eq!((run.nodes, run.contacts, run.messages), (2, 1, 1));
    assert_eq!(run.until, None);
    assert_eq!(world.net.node(n(1)).name(), "n1");

    sim.run(&mut world);
    assert_eq!(times(&log, EventKind::MessageDelivered), vec![16.0]);
    assert_eq!(times(&log, EventKind::MessageDeleted), vec![15.0]);
}

#[test]
fn run_until_stops_mid_transfer() {
    let raw = SINGLE_CONTACT.replace(r#""messages""#, r#""until": 12.0, "messages""#);
    let spec = ScenarioSpec::from_json_str(&raw).expect("valid scenario");
    let (mut sim, mut world, log) = with_log();
    let run = spec.instantiate(&mut sim, &mut world).expect("instantiate");
    let until = run.until.expect("until");

    sim.run_until(SimTime::from_secs_f64(until), &mut world);
    assert_eq!(times(&log, EventKind::MessageTransmissionStarted), vec![10.0]);
    assert!(times(&log, EventKind::MessageDelivered).is_empty());
    assert_eq!(sim.now_secs(), 12.0);
    assert!(sim.pending() > 0);
}

fn parse_err(raw: &str) -> ScenarioError {
    ScenarioSpec::from_json_str(raw).expect_err("scenario should be rejected")
}

#[test]
fn invalid_scenarios_are_rejected() {
    let contacts = |body: &str, extra: &str| {
        format!(
            r#"{{"schema_version": 1, "topology": {{"kind": "contacts", "contacts": [{body}]}} {extra}}}"#
        )
    };
    let link = r#"{"tx_node": 0, "rx_node": 1, "start_time": 0, "end_time": 10}"#;

    let raw = contacts(link, "").replace(r#""schema_version": 1"#, r#""schema_version": 2"#);
    assert!(matches!(parse_err(&raw), ScenarioError::SchemaVersion(2)));

    let raw = contacts(link, r#", "nodes": [{"id": 0}, {"id": 0}]"#);
    assert!(matches!(parse_err(&raw), ScenarioError::DuplicateNode(0)));

    let raw = contacts(
        r#"{"tx_node": 0, "rx_node": 2, "start_time": 0, "end_time": 10}"#,
        r#", "nodes": [{"id": 0}, {"id": 1}]"#,
    );
    assert!(matches!(parse_err(&raw), ScenarioError::UnknownNode(2)));

    let raw = contacts(r#"{"tx_node": 1, "rx_node": 1, "start_time": 0, "end_time": 10}"#, "");
    assert!(matches!(parse_err(&raw), ScenarioError::Invalid(_)));

    let raw = contacts(
        link,
        r#", "messages": [{"source": 0, "destination": 1, "start_time": 5, "size": 1, "deadline": 2}]"#,
    );
    assert!(matches!(parse_err(&raw), ScenarioError::Invalid(_)));

    let raw = contacts(
        link,
        r#", "messages": [{"source": 0, "destination": 1, "size": 1, "count": 3}]"#,
    );
    assert!(matches!(parse_err(&raw), ScenarioError::Invalid(_)));

    let raw = contacts(
        link,
        r#", "link": {"kind": "effective_rate", "bit_error_rate": 1.5, "packet_bits": 8}"#,
    );
    assert!(matches!(parse_err(&raw), ScenarioError::LinkModel(_)));

    assert!(matches!(parse_err("{not json"), ScenarioError::Json(_)));
}

#[test]
fn bad_contact_plans_fail_at_build_time() {
    let raw = r#"{"schema_version": 1, "topology": {"kind": "contacts", "contacts": [
        {"tx_node": 0, "rx_node": 1, "start_time": 10, "end_time": 5}]}}"#;
    let spec = ScenarioSpec::from_json_str(raw).expect("shape is valid");
    assert!(matches!(spec.build_ptvg(), Err(ScenarioError::ContactPlan(_))));
}

fn message_spec(raw: &str) -> MessageSpec {
    serde_json::from_str(raw).expect("message spec")
}

#[test]
fn repeated_messages_expand_with_their_lifetimes() {
    let spec = message_spec(
        r#"{"source": 0, "destination": 2, "start_time": 0, "size": 10, "ttl": 5, "count": 3, "interval": 10}"#,
    );
    let msgs = spec.expand();
    let starts: Vec<f64> = msgs.iter().map(|m| m.start_time).collect();
    let deadlines: Vec<f64> = msgs.iter().map(|m| m.deadline).collect();
    assert_eq!(starts, vec![0.0, 10.0, 20.0]);
    assert_eq!(deadlines, vec![5.0, 15.0, 25.0]);
    assert!(msgs.iter().all(|m| m.destination == n(2) && m.size == 10));

    let spec = message_spec(
        r#"{"source": 0, "destination": 1, "start_time": 0, "size": 1, "deadline": 50, "count": 2, "interval": 10}"#,
    );
    let deadlines: Vec<f64> = spec.expand().iter().map(|m| m.deadline).collect();
    assert_eq!(deadlines, vec![50.0, 60.0]);

    let spec = message_spec(r#"{"source": 0, "destination": 1, "size": 1}"#);
    let msgs = spec.expand();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].deadline, f64::INFINITY);
}

#[test]
fn topology_variants_build_the_plan() {
    let raw = r#"{"schema_version": 1, "topology": {"kind": "contacts", "contacts": [
        {"tx_node": 0, "rx_node": 1, "start_time": 0, "end_time": 10, "bit_rate": 100, "bidirectional": true}]},
        "messages": [{"source": 0, "destination": 3, "size": 1}]}"#;
    let spec = ScenarioSpec::from_json_str(raw).expect("valid");
    assert_eq!(spec.node_count(), 4);
    let ptvg = spec.build_ptvg().expect("ptvg");
    assert_eq!(ptvg.to_factual_contacts().len(), 2);
    assert_eq!(ptvg.vertices().len(), 4);

    let raw = r#"{"schema_version": 1, "topology": {"kind": "chain", "nodes": 3, "period": 100,
        "contact_duration": 20, "horizon": 250}}"#;
    let spec = ScenarioSpec::from_json_str(raw).expect("valid");
    assert_eq!(spec.node_count(), 3);
    assert_eq!(spec.build_ptvg().expect("chain").to_factual_contacts().len(), 12);
}

#[test]
fn node_resources_fall_back_to_defaults() {
    let raw = r#"{"schema_version": 1,
        "topology": {"kind": "contacts", "contacts": [
            {"tx_node": 0, "rx_node": 1, "start_time": 0, "end_time": 10, "bit_rate": 100}]},
        "defaults": {"buffer_bits": 4000, "tx_channels": 1},
        "nodes": [{"id": 0, "name": "ground"}, {"id": 1, "buffer_bits": 800}],
        "routing": {"kind": "spray_and_wait", "initial_copies": 4}}"#;
    let spec = ScenarioSpec::from_json_str(raw).expect("valid");
    let (mut sim, mut world, _) = with_log();
    spec.instantiate(&mut sim, &mut world).expect("instantiate");

    let ground = world.net.node(n(0));
    assert_eq!(ground.name(), "ground");
    assert_eq!(ground.core().buf.capacity(), Some(4_000));
    assert_eq!(world.net.node(n(1)).core().buf.capacity(), Some(800));
    assert_eq!(ground.policy().name(), "spray_and_wait");
}

#[test]
fn factual_options_sample_the_predicted_plan() {
    let raw = r#"{
        "schema_version": 1,
        "topology": {"kind": "contacts", "contacts": [
            {"tx_node": 0, "rx_node": 1, "start_time": 0, "end_time": 10, "bit_rate": 100, "probability": 0.0},
            {"tx_node": 1, "rx_node": 0, "start_time": 0, "end_time": 10, "bit_rate": 100, "bit_error_rate": 0.001}
        ]},
        "factual": {"remove_probabilistic": true},
        "seed": 3
    }"#;
    let spec = ScenarioSpec::from_json_str(raw).expect("valid scenario");
    let (mut sim, mut world, log) = with_log();
    let run = spec.instantiate(&mut sim, &mut world).expect("instantiate");
    assert_eq!(run.contacts, 1);
    assert_eq!(run.ptvg.contacts().count(), 2);

    sim.run(&mut world);
    let started: Vec<usize> = log
        .lock()
        .expect("log lock")
        .of_kind(EventKind::ContactStarted)
        .map(|e| e.node)
        .collect();
    assert_eq!(started, vec![1]);

    let plan = run.ptvg.to_factual_contacts();
    let noisy = plan.iter().find(|c| c.tx_node == n(1)).expect("reverse contact");
    assert_eq!(noisy.bit_error_rate, 0.001);
}
