//! 预测契约计划（PCP）
//!
//! 每个预测契约有固定的时间窗口，以及若干“代”（generation）的预测：
//! 每一代从 `valid_from` 起生效，给出发生概率和分段的特性（比特率、时延）。
//! 后生效的代覆盖之前的代。

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ContactPlanError;
use crate::net::{Contact, NodeId};

/// 从 `starting_at` 起生效的链路特性
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Characteristics {
    #[serde(default)]
    pub starting_at: f64,
    pub bit_rate: f64,
    #[serde(default)]
    pub delay: f64,
    /// 残余误码率，取值 [0, 1]
    #[serde(default)]
    pub bit_error_rate: f64,
}

/// 一代预测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    #[serde(default)]
    pub valid_from: f64,
    #[serde(default = "certain")]
    pub probability: f64,
    pub characteristics: Vec<Characteristics>,
}

fn certain() -> f64 {
    1.0
}

impl Generation {
    fn characteristics_index_at(&self, time: f64) -> Option<usize> {
        self.characteristics
            .partition_point(|c| c.starting_at <= time)
            .checked_sub(1)
    }

    /// 在契约时间窗口内按时长加权求和
    fn duration_weighted_sum(&self, start: f64, end: f64, value: impl Fn(&Characteristics) -> f64) -> f64 {
        let mut sum = 0.0;
        for (i, c) in self.characteristics.iter().enumerate() {
            let seg_start = start.max(c.starting_at);
            let seg_end = self
                .characteristics
                .get(i + 1)
                .map_or(end, |next| end.min(next.starting_at));
            if seg_end <= seg_start {
                continue;
            }
            sum += (seg_end - seg_start) * value(c);
            if seg_end == end {
                break;
            }
        }
        sum
    }
}

/// 预测契约
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedContact {
    pub tx_node: NodeId,
    pub rx_node: NodeId,
    pub start_time: f64,
    pub end_time: f64,
    pub generations: Vec<Generation>,
}

impl PredictedContact {
    /// 只有一代、一段特性的简单预测契约
    pub fn simple(
        tx_node: NodeId,
        rx_node: NodeId,
        start_time: f64,
        end_time: f64,
        bit_rate: f64,
        delay: f64,
        probability: f64,
    ) -> Self {
        Self {
            tx_node,
            rx_node,
            start_time,
            end_time,
            generations: vec![Generation {
                valid_from: 0.0,
                probability,
                characteristics: vec![Characteristics {
                    starting_at: start_time,
                    bit_rate,
                    delay,
                    bit_error_rate: 0.0,
                }],
            }],
        }
    }

    /// 所有代、所有特性段统一使用 `ber`
    pub fn with_bit_error_rate(mut self, ber: f64) -> Self {
        for generation in &mut self.generations {
            for c in &mut generation.characteristics {
                c.bit_error_rate = ber;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ContactPlanError> {
        let (tx, rx) = (self.tx_node.0, self.rx_node.0);
        if self.start_time < 0.0 {
            return Err(ContactPlanError::NegativeStart {
                tx,
                rx,
                start: self.start_time,
            });
        }
        if self.end_time < self.start_time {
            return Err(ContactPlanError::EndBeforeStart {
                tx,
                rx,
                start: self.start_time,
                end: self.end_time,
            });
        }
        let Some(first) = self.generations.first() else {
            return Err(ContactPlanError::Empty {
                tx,
                rx,
                what: "generations",
            });
        };
        if first.valid_from > 0.0 {
            return Err(ContactPlanError::NoCharacteristics { tx, rx, time: 0.0 });
        }
        let mut last_validity = f64::NEG_INFINITY;
        for generation in &self.generations {
            if generation.valid_from < last_validity {
                return Err(ContactPlanError::Unordered {
                    tx,
                    rx,
                    what: "generations",
                });
            }
            last_validity = generation.valid_from;
            if !(0.0..=1.0).contains(&generation.probability) {
                return Err(ContactPlanError::InvalidProbability {
                    tx,
                    rx,
                    probability: generation.probability,
                });
            }
            let Some(first_char) = generation.characteristics.first() else {
                return Err(ContactPlanError::Empty {
                    tx,
                    rx,
                    what: "characteristics",
                });
            };
            if first_char.starting_at > self.start_time {
                return Err(ContactPlanError::NoCharacteristics {
                    tx,
                    rx,
                    time: self.start_time,
                });
            }
            let mut last_start = f64::NEG_INFINITY;
            for c in &generation.characteristics {
                if c.starting_at < last_start {
                    return Err(ContactPlanError::Unordered {
                        tx,
                        rx,
                        what: "characteristics",
                    });
                }
                last_start = c.starting_at;
                if c.bit_rate < 0.0 {
                    return Err(ContactPlanError::NegativeBitRate {
                        tx,
                        rx,
                        bit_rate: c.bit_rate,
                    });
                }
                if c.delay < 0.0 {
                    return Err(ContactPlanError::NegativeDelay {
                        tx,
                        rx,
                        delay: c.delay,
                    });
                }
                if !(0.0..=1.0).contains(&c.bit_error_rate) {
                    return Err(ContactPlanError::InvalidBitErrorRate {
                        tx,
                        rx,
                        bit_error_rate: c.bit_error_rate,
                    });
                }
            }
        }
        Ok(())
    }

    /// 在 `time` 生效的一代
    pub fn generation_at(&self, time: f64) -> Option<&Generation> {
        let idx = self
            .generations
            .partition_point(|g| g.valid_from <= time)
            .checked_sub(1)?;
        self.generations.get(idx)
    }

    /// 按 `time` 生效的预测具体化为一个契约：比特率为时长加权平均值，
    /// 时延取契约开始时的特性，发生概率放在 `param` 中。
    pub fn to_contact_at(&self, time: f64) -> Option<Contact> {
        self.contact_from(self.generation_at(time)?)
    }

    fn contact_from(&self, generation: &Generation) -> Option<Contact> {
        let duration = self.end_time - self.start_time;
        let bit_rate = if duration > 0.0 {
            generation.duration_weighted_sum(self.start_time, self.end_time, |c| c.bit_rate)
                / duration
        } else {
            generation.characteristics.first()?.bit_rate
        };
        let at_start = generation
            .characteristics_index_at(self.start_time)
            .and_then(|i| generation.characteristics.get(i))?;
        Some(
            Contact::new(
                self.tx_node,
                self.rx_node,
                self.start_time,
                self.end_time,
                bit_rate,
                at_start.delay,
            )
            .with_bit_error_rate(at_start.bit_error_rate)
            .with_param(generation.probability),
        )
    }

    /// 契约总容量（bit），按 `time` 生效的一代计算
    pub fn volume_at(&self, time: f64) -> Option<f64> {
        let generation = self.generation_at(time)?;
        Some(generation.duration_weighted_sum(self.start_time, self.end_time, |c| c.bit_rate))
    }
}

/// 把预测计划转成真实契约时选用哪一代
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactualGeneration {
    /// 契约开始时生效的一代
    #[default]
    AtContactStart,
    /// 最后一代
    Latest,
}

/// 预测计划 → 真实契约的转换选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FactualOptions {
    #[serde(default)]
    pub generation: FactualGeneration,
    /// 按所选一代的发生概率随机保留契约
    #[serde(default)]
    pub remove_probabilistic: bool,
}

/// 预测时变图（PTVG）：按 (tx, rx) 边分组的预测契约，每条边按开始时间排序。
#[derive(Debug, Clone, Default)]
pub struct Ptvg {
    vertices: BTreeSet<NodeId>,
    edges: BTreeMap<(NodeId, NodeId), Vec<PredictedContact>>,
}

impl Ptvg {
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验并构建
    pub fn from_contacts(
        contacts: impl IntoIterator<Item = PredictedContact>,
    ) -> Result<Self, ContactPlanError> {
        let mut ptvg = Self::new();
        for contact in contacts {
            ptvg.add_contact(contact)?;
        }
        Ok(ptvg)
    }

    pub fn add_vertex(&mut self, node: NodeId) {
        self.vertices.insert(node);
    }

    pub fn add_contact(&mut self, contact: PredictedContact) -> Result<(), ContactPlanError> {
        contact.validate()?;
        self.vertices.insert(contact.tx_node);
        self.vertices.insert(contact.rx_node);
        let edge = self
            .edges
            .entry((contact.tx_node, contact.rx_node))
            .or_default();
        let idx = edge.partition_point(|c| c.start_time <= contact.start_time);
        edge.insert(idx, contact);
        Ok(())
    }

    pub fn vertices(&self) -> &BTreeSet<NodeId> {
        &self.vertices
    }

    pub fn edges(&self) -> &BTreeMap<(NodeId, NodeId), Vec<PredictedContact>> {
        &self.edges
    }

    pub fn contacts(&self) -> impl Iterator<Item = &PredictedContact> + '_ {
        self.edges.values().flatten()
    }

    /// `tx` 作为发送方的所有预测契约
    pub fn outgoing(&self, tx: NodeId) -> impl Iterator<Item = (&NodeId, &Vec<PredictedContact>)> + '_ {
        self.edges
            .range((tx, NodeId(0))..=(tx, NodeId(usize::MAX)))
            .map(|((_, rx), contacts)| (rx, contacts))
    }

    /// 所有预测代的生效时刻，升序去重
    pub fn generation_change_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .contacts()
            .flat_map(|c| c.generations.iter().map(|g| g.valid_from))
            .collect();
        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// 在 `time` 生效的契约计划，按开始时间排序
    pub fn to_contact_plan_at(&self, time: f64) -> Vec<Contact> {
        let mut plan: Vec<Contact> = self
            .contacts()
            .filter_map(|c| c.to_contact_at(time))
            .collect();
        sort_by_start(&mut plan);
        plan
    }

    /// 确定性场景：把预测计划当作真实发生的契约（使用契约开始时生效的一代）
    pub fn to_factual_contacts(&self) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self
            .contacts()
            .filter_map(|c| c.to_contact_at(c.start_time))
            .collect();
        sort_by_start(&mut contacts);
        contacts
    }

    /// 按 `opts` 生成真实契约。开启 `remove_probabilistic` 时每个契约以
    /// 所选一代的概率保留，`rng` 决定抽样结果。
    pub fn sample_factual_contacts(&self, opts: FactualOptions, rng: &mut impl Rng) -> Vec<Contact> {
        let mut removed = 0usize;
        let mut contacts = Vec::new();
        for pc in self.contacts() {
            let generation = match opts.generation {
                FactualGeneration::AtContactStart => pc.generation_at(pc.start_time),
                FactualGeneration::Latest => pc.generations.last(),
            };
            let Some(generation) = generation else {
                continue;
            };
            if opts.remove_probabilistic && !rng.gen_bool(generation.probability) {
                removed += 1;
                continue;
            }
            contacts.extend(pc.contact_from(generation));
        }
        debug!(kept = contacts.len(), removed, "真实契约已生成");
        sort_by_start(&mut contacts);
        contacts
    }
}

fn sort_by_start(contacts: &mut [Contact]) {
    contacts.sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then_with(|| a.cmp(b)));
}
