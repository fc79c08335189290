//! 场景文件（scenario.json）
//!
//! 描述一次仿真：拓扑（显式契约列表或链式拓扑）、节点资源、路由策略、
//! 链路模型与注入的消息。`instantiate` 把场景装配进仿真器与世界。

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::simulator::Simulator;
use crate::error::ScenarioError;
use crate::net::{DtnWorld, LinkModel, Message, NodeId, NodeOptions};
use crate::routing::RoutingSpec;
use crate::topo::{ChainOpts, FactualOptions, Generation, PredictedContact, Ptvg, build_chain};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    #[serde(default)]
    pub meta: Option<ScenarioMeta>,
    pub topology: TopologySpec,
    #[serde(default)]
    pub defaults: Option<NodeDefaults>,
    /// 为空时按拓扑与消息中出现的最大节点编号推断
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub routing: Option<RoutingSpec>,
    #[serde(default)]
    pub link: Option<LinkModel>,
    /// 预测计划 → 真实契约的转换方式
    #[serde(default)]
    pub factual: Option<FactualOptions>,
    #[serde(default)]
    pub messages: Vec<MessageSpec>,
    #[serde(default)]
    pub seed: Option<u64>,
    /// 仿真结束时间（秒）；缺省时运行到事件队列为空
    #[serde(default)]
    pub until: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// 显式给出的预测契约
    Contacts { contacts: Vec<ContactSpec> },
    Chain {
        nodes: usize,
        #[serde(default)]
        period: Option<f64>,
        #[serde(default)]
        contact_duration: Option<f64>,
        #[serde(default)]
        bit_rate: Option<f64>,
        #[serde(default)]
        delay: Option<f64>,
        #[serde(default)]
        horizon: Option<f64>,
        #[serde(default)]
        probability: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactSpec {
    pub tx_node: usize,
    pub rx_node: usize,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub bit_rate: f64,
    #[serde(default)]
    pub delay: f64,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub bit_error_rate: f64,
    /// 多代预测；给出时忽略 bit_rate/delay/probability
    #[serde(default)]
    pub generations: Option<Vec<Generation>>,
    /// 双向契约：同时生成 rx -> tx
    #[serde(default)]
    pub bidirectional: bool,
}

impl ContactSpec {
    fn predicted(&self, tx: usize, rx: usize) -> PredictedContact {
        match &self.generations {
            Some(generations) => PredictedContact {
                tx_node: NodeId(tx),
                rx_node: NodeId(rx),
                start_time: self.start_time,
                end_time: self.end_time,
                generations: generations.clone(),
            },
            None => PredictedContact::simple(
                NodeId(tx),
                NodeId(rx),
                self.start_time,
                self.end_time,
                self.bit_rate,
                self.delay,
                self.probability.unwrap_or(1.0),
            )
            .with_bit_error_rate(self.bit_error_rate),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeDefaults {
    #[serde(default)]
    pub buffer_bits: Option<u64>,
    #[serde(default)]
    pub tx_channels: Option<usize>,
    #[serde(default)]
    pub rx_channels: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: usize,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub buffer_bits: Option<u64>,
    #[serde(default)]
    pub tx_channels: Option<usize>,
    #[serde(default)]
    pub rx_channels: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSpec {
    pub source: usize,
    pub destination: usize,
    #[serde(default)]
    pub start_time: f64,
    pub size: u64,
    /// 绝对截止时间（秒）
    #[serde(default)]
    pub deadline: Option<f64>,
    /// 相对 start_time 的生存期（秒），deadline 缺省时使用
    #[serde(default)]
    pub ttl: Option<f64>,
    /// 以 `interval` 为间隔重复注入的次数
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub interval: Option<f64>,
}

impl MessageSpec {
    fn deadline_for(&self, start_time: f64) -> f64 {
        match (self.deadline, self.ttl) {
            (Some(d), _) => d + (start_time - self.start_time),
            (None, Some(ttl)) => start_time + ttl,
            (None, None) => f64::INFINITY,
        }
    }

    /// 展开为具体消息
    pub fn expand(&self) -> Vec<Message> {
        let count = self.count.unwrap_or(1);
        let interval = self.interval.unwrap_or(0.0);
        (0..count)
            .map(|i| {
                let start = self.start_time + i as f64 * interval;
                Message::new(
                    NodeId(self.source),
                    NodeId(self.destination),
                    start,
                    self.size,
                    self.deadline_for(start),
                )
            })
            .collect()
    }
}

/// `instantiate` 的结果
#[derive(Debug)]
pub struct ScenarioRun {
    pub ptvg: Ptvg,
    pub nodes: usize,
    pub contacts: usize,
    pub messages: usize,
    pub until: Option<f64>,
}

impl ScenarioSpec {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ScenarioError> {
        let spec: ScenarioSpec = serde_json::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or(0)
    }

    /// 节点数：显式声明的节点，或拓扑/消息中出现的最大编号 + 1
    pub fn node_count(&self) -> usize {
        if !self.nodes.is_empty() {
            return self.nodes.len();
        }
        let topo_max = match &self.topology {
            TopologySpec::Contacts { contacts } => contacts
                .iter()
                .map(|c| c.tx_node.max(c.rx_node) + 1)
                .max()
                .unwrap_or(0),
            TopologySpec::Chain { nodes, .. } => *nodes,
        };
        let msg_max = self
            .messages
            .iter()
            .map(|m| m.source.max(m.destination) + 1)
            .max()
            .unwrap_or(0);
        topo_max.max(msg_max)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ScenarioError::SchemaVersion(self.schema_version));
        }
        let mut seen = HashSet::new();
        for n in &self.nodes {
            if !seen.insert(n.id) {
                return Err(ScenarioError::DuplicateNode(n.id));
            }
        }
        let count = self.node_count();
        if let Some(n) = self.nodes.iter().find(|n| n.id >= count) {
            return Err(ScenarioError::Invalid(format!(
                "node ids must be 0..{count}, got {}",
                n.id
            )));
        }
        let check = |id: usize| {
            if id < count {
                Ok(())
            } else {
                Err(ScenarioError::UnknownNode(id))
            }
        };
        if let TopologySpec::Contacts { contacts } = &self.topology {
            for c in contacts {
                check(c.tx_node)?;
                check(c.rx_node)?;
                if c.tx_node == c.rx_node {
                    return Err(ScenarioError::Invalid(format!(
                        "contact {}->{} connects a node to itself",
                        c.tx_node, c.rx_node
                    )));
                }
            }
        }
        if let Some(link) = &self.link {
            link.validate()?;
        }
        for m in &self.messages {
            check(m.source)?;
            check(m.destination)?;
            if m.deadline.is_some_and(|d| d < m.start_time) {
                return Err(ScenarioError::Invalid(format!(
                    "message {}->{} at {}: deadline before start_time",
                    m.source, m.destination, m.start_time
                )));
            }
            if m.count.unwrap_or(1) > 1 && m.interval.unwrap_or(0.0) <= 0.0 {
                return Err(ScenarioError::Invalid(format!(
                    "message {}->{}: repeated injection needs a positive interval",
                    m.source, m.destination
                )));
            }
        }
        Ok(())
    }

    /// 构建预测契约计划
    pub fn build_ptvg(&self) -> Result<Ptvg, ScenarioError> {
        let mut ptvg = match &self.topology {
            TopologySpec::Contacts { contacts } => {
                let mut ptvg = Ptvg::new();
                for c in contacts {
                    ptvg.add_contact(c.predicted(c.tx_node, c.rx_node))?;
                    if c.bidirectional {
                        ptvg.add_contact(c.predicted(c.rx_node, c.tx_node))?;
                    }
                }
                ptvg
            }
            TopologySpec::Chain {
                nodes,
                period,
                contact_duration,
                bit_rate,
                delay,
                horizon,
                probability,
            } => {
                let d = ChainOpts::default();
                build_chain(&ChainOpts {
                    nodes: *nodes,
                    period: period.unwrap_or(d.period),
                    contact_duration: contact_duration.unwrap_or(d.contact_duration),
                    bit_rate: bit_rate.unwrap_or(d.bit_rate),
                    delay: delay.unwrap_or(d.delay),
                    horizon: horizon.unwrap_or(d.horizon),
                    probability: probability.unwrap_or(d.probability),
                })?
            }
        };
        for i in 0..self.node_count() {
            ptvg.add_vertex(NodeId(i));
        }
        Ok(ptvg)
    }

    fn node_options(&self, id: usize) -> (String, NodeOptions) {
        let defaults = self.defaults.clone().unwrap_or_default();
        let spec = self.nodes.iter().find(|n| n.id == id);
        let name = spec
            .and_then(|n| n.name.clone())
            .unwrap_or_else(|| format!("n{id}"));
        let opts = NodeOptions {
            buffer_bits: spec.and_then(|n| n.buffer_bits).or(defaults.buffer_bits),
            tx_channels: spec.and_then(|n| n.tx_channels).or(defaults.tx_channels),
            rx_channels: spec.and_then(|n| n.rx_channels).or(defaults.rx_channels),
        };
        (name, opts)
    }

    /// 把场景装配进仿真：添加节点、为真实契约和消息注入排期。
    pub fn instantiate(
        &self,
        sim: &mut Simulator,
        world: &mut DtnWorld,
    ) -> Result<ScenarioRun, ScenarioError> {
        let ptvg = self.build_ptvg()?;
        let seed = self.seed();
        let routing = self
            .routing
            .clone()
            .unwrap_or_else(|| RoutingSpec::Epidemic(Default::default()));
        world
            .net
            .set_link_model(self.link.clone().unwrap_or_default(), seed)?;

        let nodes = self.node_count();
        for i in 0..nodes {
            let (name, opts) = self.node_options(i);
            let policy = routing.build(NodeId(i), &ptvg, seed);
            let id = world.net.add_node(sim, name, opts, policy);
            debug_assert_eq!(id, NodeId(i));
        }

        let factual = match self.factual {
            Some(opts) => ptvg.sample_factual_contacts(opts, &mut StdRng::seed_from_u64(seed)),
            None => ptvg.to_factual_contacts(),
        };
        for c in &factual {
            world.net.schedule_contact(sim, *c);
        }

        let mut messages = 0;
        for spec in &self.messages {
            for msg in spec.expand() {
                world.net.schedule_injection(sim, msg.source, msg);
                messages += 1;
            }
        }
        info!(nodes, contacts = factual.len(), messages, "📦 场景已装配");
        debug!(meta = ?self.meta, "场景元信息");

        Ok(ScenarioRun {
            ptvg,
            nodes,
            contacts: factual.len(),
            messages,
            until: self.until,
        })
    }
}
