//! 链式拓扑仿真
//!
//! n0 <-> n1 <-> ... 的周期性契约上，从 n0 向最后一个节点周期性发送消息。

use clap::Parser;
use std::process::ExitCode;
use dtnsim_rs::net::{DtnWorld, Message, NodeId, NodeOptions, Stats};
use dtnsim_rs::routing::RoutingSpec;
use dtnsim_rs::sim::{SimTime, Simulator};
use dtnsim_rs::topo::{ChainOpts, build_chain};
use std::sync::{Arc, Mutex};

#[derive(Debug, Parser)]
#[command(name = "chain", about = "链式拓扑仿真：n0 -> n{k-1} 周期发送")]
struct Args {
    #[arg(long, default_value_t = 4)]
    nodes: usize,
    /// 契约周期（秒）
    #[arg(long, default_value_t = 100.0)]
    period: f64,
    /// 单个契约时长（秒）
    #[arg(long, default_value_t = 20.0)]
    contact_duration: f64,
    #[arg(long, default_value_t = 10_000.0)]
    bit_rate: f64,
    #[arg(long, default_value_t = 1.0)]
    delay: f64,
    /// 消息大小（bit）
    #[arg(long, default_value_t = 8_000)]
    msg_bits: u64,
    #[arg(long, default_value_t = 20)]
    msgs: u32,
    /// 两条消息的注入间隔（秒）
    #[arg(long, default_value_t = 10.0)]
    gap: f64,
    /// 消息生存期（秒）
    #[arg(long, default_value_t = 500.0)]
    ttl: f64,
    /// 路由策略：epidemic、simple_epidemic、spray_and_wait、sabr 等
    #[arg(long, default_value = "sabr", value_parser = parse_routing)]
    routing: RoutingSpec,
    /// 每个节点的缓冲区容量（bit），缺省不限
    #[arg(long)]
    buffer_bits: Option<u64>,
    /// 仿真运行到多少秒
    #[arg(long, default_value_t = 1_000.0)]
    until: f64,
}

fn parse_routing(name: &str) -> Result<RoutingSpec, String> {
    RoutingSpec::from_name(name).ok_or_else(|| format!("unknown routing {name:?}"))
}

fn main() -> ExitCode {
    // 初始化 tracing
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
    let routing = &args.routing;

    let ptvg = match build_chain(&ChainOpts {
        nodes: args.nodes,
        period: args.period,
        contact_duration: args.contact_duration,
        bit_rate: args.bit_rate,
        delay: args.delay,
        horizon: args.until,
        probability: 1.0,
    }) {
        Ok(ptvg) => ptvg,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut sim = Simulator::default();
    let mut world = DtnWorld::default();
    let stats = Arc::new(Mutex::new(Stats::default()));
    world.net.add_subscriber(stats.clone());

    let opts = NodeOptions {
        buffer_bits: args.buffer_bits,
        ..NodeOptions::default()
    };
    for i in 0..args.nodes {
        let policy = routing.build(NodeId(i), &ptvg, 0);
        world.net.add_node(&mut sim, format!("n{i}"), opts, policy);
    }
    for c in ptvg.to_factual_contacts() {
        world.net.schedule_contact(&mut sim, c);
    }

    // 注入消息
    let (src, dst) = (NodeId(0), NodeId(args.nodes.saturating_sub(1)));
    for i in 0..args.msgs {
        let start = i as f64 * args.gap;
        let msg = Message::new(src, dst, start, args.msg_bits, start + args.ttl);
        world.net.schedule_injection(&mut sim, src, msg);
    }

    sim.run_until(SimTime::from_secs_f64(args.until), &mut world);

    let stats = stats.lock().unwrap_or_else(|p| p.into_inner());
    println!(
        "done @ {:.3}s, injected={}, delivered={}, delivery_ratio={:.3}",
        sim.now_secs(),
        stats.injected,
        stats.delivered,
        stats.delivery_ratio()
    );
    ExitCode::SUCCESS
}
