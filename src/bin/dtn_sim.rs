//! 场景仿真
//!
//! 读取 scenario.json，运行 DTN 仿真，输出交付统计，并可选地把事件写成 JSON。

use clap::Parser;
use dtnsim_rs::net::{DtnWorld, Stats};
use dtnsim_rs::report::EventLog;
use dtnsim_rs::routing::RoutingSpec;
use dtnsim_rs::sim::{ScenarioSpec, SimTime, Simulator};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "dtn-sim", about = "Run scenario.json on the DTN simulator")]
struct Args {
    /// Path to scenario.json
    #[arg(long)]
    scenario: PathBuf,

    /// Output recorded events as a JSON array
    #[arg(long)]
    events_json: Option<PathBuf>,

    /// Run until this time (seconds); overrides the scenario
    #[arg(long)]
    until: Option<f64>,

    /// Override routing: epidemic, simple_epidemic, spray_and_wait,
    /// one_epidemic, one_spray_and_wait or sabr
    #[arg(long)]
    routing: Option<String>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Print the statistics as JSON instead of a summary line
    #[arg(long)]
    stats_json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let mut scenario = match ScenarioSpec::load(&args.scenario) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "无法加载场景");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(name) = args.routing.as_deref() {
        match RoutingSpec::from_name(name) {
            Some(routing) => scenario.routing = Some(routing),
            None => {
                eprintln!("error: unknown routing {name:?}");
                return ExitCode::FAILURE;
            }
        }
    }
    if args.seed.is_some() {
        scenario.seed = args.seed;
    }

    let mut sim = Simulator::default();
    let mut world = DtnWorld::default();

    let stats = Arc::new(Mutex::new(Stats::default()));
    world.net.add_subscriber(stats.clone());
    let events = args.events_json.as_ref().map(|_| {
        let log = Arc::new(Mutex::new(EventLog::new()));
        world.net.add_subscriber(log.clone());
        log
    });

    let run = match scenario.instantiate(&mut sim, &mut world) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match args.until.or(run.until) {
        Some(until) => sim.run_until(SimTime::from_secs_f64(until), &mut world),
        None => sim.run(&mut world),
    }

    let stats = stats.lock().unwrap_or_else(|p| p.into_inner());
    if args.stats_json {
        let json = serde_json::to_string_pretty(&*stats).expect("serialize stats");
        println!("{json}");
    } else {
        println!(
            "done @ {:.3}s, nodes={}, contacts={}, injected={}, delivered={}, delivery_ratio={:.3}, mean_latency={}",
            sim.now_secs(),
            run.nodes,
            run.contacts,
            stats.injected,
            stats.delivered,
            stats.delivery_ratio(),
            stats
                .mean_latency()
                .map_or_else(|| "n/a".to_string(), |l| format!("{l:.3}s")),
        );
    }

    if let (Some(path), Some(log)) = (args.events_json, events) {
        let log = log.lock().unwrap_or_else(|p| p.into_inner());
        let json = log.to_json_pretty().expect("serialize events");
        fs::write(&path, json).expect("write events json");
        eprintln!("wrote {} events to {}", log.events.len(), path.display());
    }
    ExitCode::SUCCESS
}
