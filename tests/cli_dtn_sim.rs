use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "dtnsim-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

fn run_dtn_sim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dtn_sim"))
        .env("RUST_LOG", "off")
        .args(args)
        .output()
        .expect("run dtn_sim")
}

fn summary_line(stdout: &str) -> String {
    stdout
        .lines()
        .find(|line| line.starts_with("done @ "))
        .unwrap_or_else(|| panic!("no summary line in stdout: {stdout}"))
        .to_string()
}

const TWO_HOP: &str = r#"
{
    "schema_version": 1,
    "meta": { "name": "two hop relay" },
    "topology": {
        "kind": "contacts",
        "contacts": [
            { "tx_node": 0, "rx_node": 1, "start_time": 0, "end_time": 10, "bit_rate": 1000, "delay": 1 },
            { "tx_node": 1, "rx_node": 2, "start_time": 20, "end_time": 30, "bit_rate": 1000, "delay": 1 }
        ]
    },
    "routing": { "kind": "sabr" },
    "messages": [
        { "source": 0, "destination": 2, "size": 1000, "ttl": 100 }
    ]
}
"#;

#[test]
fn dtn_sim_prints_summary_and_writes_events_json() {
    let dir = unique_temp_dir("dtn-sim-events");
    let scenario = write_file(&dir, "scenario.json", TWO_HOP);
    let out_json = dir.join("events.json");

    let output = run_dtn_sim(&[
        "--scenario",
        scenario.to_str().unwrap(),
        "--events-json",
        out_json.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "dtn_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = summary_line(&stdout);
    assert!(line.contains("nodes=3"), "unexpected summary: {line}");
    assert!(line.contains("contacts=2"), "unexpected summary: {line}");
    assert!(line.contains("injected=1"), "unexpected summary: {line}");
    assert!(line.contains("delivered=1"), "unexpected summary: {line}");
    assert!(line.contains("mean_latency=22.000s"), "unexpected summary: {line}");

    let raw = fs::read_to_string(&out_json).expect("read events.json");
    let v: Value = serde_json::from_str(&raw).expect("parse events.json");
    let arr = v.as_array().expect("events.json must be a JSON array");
    let delivered: Vec<&Value> = arr
        .iter()
        .filter(|e| e.get("kind").and_then(|k| k.as_str()) == Some("message_delivered"))
        .collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].get("node").and_then(|n| n.as_u64()), Some(2));
    assert_eq!(delivered[0].get("t").and_then(|t| t.as_f64()), Some(22.0));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn dtn_sim_routing_override_and_until() {
    let dir = unique_temp_dir("dtn-sim-override");
    let scenario = write_file(&dir, "scenario.json", TWO_HOP);

    let output = run_dtn_sim(&[
        "--scenario",
        scenario.to_str().unwrap(),
        "--routing",
        "epidemic",
        "--until",
        "15",
    ]);
    assert!(
        output.status.success(),
        "dtn_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let line = summary_line(&String::from_utf8_lossy(&output.stdout));
    assert!(line.starts_with("done @ 15.000s"), "unexpected summary: {line}");
    assert!(line.contains("delivered=0"), "unexpected summary: {line}");
    assert!(line.contains("mean_latency=n/a"), "unexpected summary: {line}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn dtn_sim_stats_json_counts_events() {
    let dir = unique_temp_dir("dtn-sim-stats");
    let scenario = write_file(&dir, "scenario.json", TWO_HOP);

    let output = run_dtn_sim(&[
        "--scenario",
        scenario.to_str().unwrap(),
        "--routing",
        "spray_and_wait",
        "--stats-json",
    ]);
    assert!(
        output.status.success(),
        "dtn_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let v: Value = serde_json::from_slice(&output.stdout).expect("stats json");
    assert_eq!(v.get("injected").and_then(|n| n.as_u64()), Some(1));
    assert_eq!(v.get("delivered").and_then(|n| n.as_u64()), Some(1));
    assert_eq!(
        v.pointer("/counts/message_delivered").and_then(|n| n.as_u64()),
        Some(1)
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn dtn_sim_rejects_bad_input() {
    let dir = unique_temp_dir("dtn-sim-bad");
    let bad = write_file(&dir, "bad.json", r#"{ "schema_version": 99, "topology": { "kind": "chain", "nodes": 2 } }"#);
    let output = run_dtn_sim(&["--scenario", bad.to_str().unwrap()]);
    assert!(!output.status.success(), "bad schema should fail");
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("schema_version"),
        "stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let good = write_file(&dir, "scenario.json", TWO_HOP);
    let output = run_dtn_sim(&["--scenario", good.to_str().unwrap(), "--routing", "flooding"]);
    assert!(!output.status.success(), "unknown routing should fail");

    let _ = fs::remove_dir_all(&dir);
}
