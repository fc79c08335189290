//! 链路模型
//!
//! 契约在建立时被包装成一个 [`Link`]：负责计算每条消息的传输结果。
//! 理想链路只按比特率计算时长；受损链路还会考虑误码，赶不上截止时间时丢弃。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::contact::Contact;
use super::message::Message;
use crate::error::LinkModelError;

/// 一次传输的计划结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TxPlan {
    /// `duration` 秒后发送完成
    Deliver { duration: f64 },
    /// 比特率 ≤ 0：挂起直到契约结束
    Stall,
    /// 链路无法在截止时间前送达：`after` 秒后判定失败，不产生接收，消息交还路由策略
    Fail { after: f64 },
}

/// 契约期间使用的链路
pub trait Link: Send + std::fmt::Debug {
    fn contact(&self) -> &Contact;

    /// 契约开始时调用
    fn establish(&mut self) {}

    /// 契约结束时调用（无论传输是否完成）
    fn teardown(&mut self) {}

    /// 计算在 `now` 开始发送 `msg` 的结果
    fn plan_transmission(&mut self, msg: &Message, now: f64) -> TxPlan;
}

/// 理想链路：时长 = size / bit_rate
#[derive(Debug)]
pub struct IdealLink {
    contact: Contact,
}

impl IdealLink {
    pub fn new(contact: Contact) -> Self {
        Self { contact }
    }
}

impl Link for IdealLink {
    fn contact(&self) -> &Contact {
        &self.contact
    }

    fn plan_transmission(&mut self, msg: &Message, _now: f64) -> TxPlan {
        if self.contact.bit_rate <= 0.0 {
            return TxPlan::Stall;
        }
        TxPlan::Deliver {
            duration: msg.size as f64 / self.contact.bit_rate,
        }
    }
}

/// 受损链路的截止时间检查：完成时刻晚于截止时间的消息照常占用链路，
/// 但在发送结束时判定失败。
fn bounded_by_deadline(duration: f64, msg: &Message, now: f64) -> TxPlan {
    if now + duration > msg.deadline {
        TxPlan::Fail { after: duration }
    } else {
        TxPlan::Deliver { duration }
    }
}

/// 模型误码率与契约自身误码率视为相互独立的误码来源
fn combined_ber(model_ber: f64, contact: &Contact) -> f64 {
    1.0 - (1.0 - model_ber) * (1.0 - contact.bit_error_rate)
}

/// 分块冗余链路：消息切成 `block_bits` 大小的块，每块带 `redundancy` 开销发送，
/// 块出错（概率 `1 - (1-ber)^block_bits`）时重传，最多 `max_retries` 次。
#[derive(Debug)]
pub struct BlockRedundancyLink {
    contact: Contact,
    block_bits: u64,
    redundancy: f64,
    max_retries: u32,
    block_error_rate: f64,
    rng: StdRng,
}

impl BlockRedundancyLink {
    pub fn new(
        contact: Contact,
        block_bits: u64,
        redundancy: f64,
        max_retries: u32,
        bit_error_rate: f64,
        seed: u64,
    ) -> Self {
        let block_bits = block_bits.max(1);
        let ber = combined_ber(bit_error_rate, &contact);
        Self {
            contact,
            block_bits,
            redundancy: redundancy.max(0.0),
            max_retries,
            block_error_rate: 1.0 - (1.0 - ber).powf(block_bits as f64),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Link for BlockRedundancyLink {
    fn contact(&self) -> &Contact {
        &self.contact
    }

    fn plan_transmission(&mut self, msg: &Message, now: f64) -> TxPlan {
        let rate = self.contact.bit_rate;
        if rate <= 0.0 {
            return TxPlan::Stall;
        }
        let mut remaining = msg.size;
        let mut elapsed = 0.0;
        while remaining > 0 {
            let block = remaining.min(self.block_bits);
            remaining -= block;
            let block_time = block as f64 * (1.0 + self.redundancy) / rate;
            let mut attempts = 0;
            loop {
                elapsed += block_time;
                attempts += 1;
                if !self.rng.gen_bool(self.block_error_rate) {
                    break;
                }
                if attempts > self.max_retries {
                    trace!(attempts, "块重传次数耗尽");
                    return TxPlan::Fail { after: elapsed };
                }
            }
        }
        bounded_by_deadline(elapsed, msg, now)
    }
}

/// 有效速率链路：`bit_rate × (1-ber)^packet_bits / (1 + overhead)`，确定性计算。
#[derive(Debug)]
pub struct EffectiveRateLink {
    contact: Contact,
    effective_rate: f64,
}

impl EffectiveRateLink {
    pub fn new(contact: Contact, bit_error_rate: f64, packet_bits: u64, overhead: f64) -> Self {
        let ber = combined_ber(bit_error_rate, &contact);
        let effective_rate = contact.bit_rate * (1.0 - ber).powf(packet_bits as f64)
            / (1.0 + overhead.max(0.0));
        Self {
            contact,
            effective_rate,
        }
    }

    pub fn effective_rate(&self) -> f64 {
        self.effective_rate
    }
}

impl Link for EffectiveRateLink {
    fn contact(&self) -> &Contact {
        &self.contact
    }

    fn plan_transmission(&mut self, msg: &Message, now: f64) -> TxPlan {
        if self.effective_rate <= 0.0 {
            return TxPlan::Stall;
        }
        bounded_by_deadline(msg.size as f64 / self.effective_rate, msg, now)
    }
}

/// 链路模型配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkModel {
    #[default]
    Ideal,
    BlockRedundancy {
        block_bits: u64,
        #[serde(default)]
        redundancy: f64,
        #[serde(default)]
        max_retries: u32,
        bit_error_rate: f64,
    },
    EffectiveRate {
        bit_error_rate: f64,
        packet_bits: u64,
        #[serde(default)]
        overhead: f64,
    },
}

impl LinkModel {
    /// 误码率必须在 [0, 1] 内（NaN 也会被拒绝），冗余/开销不能为负
    pub fn validate(&self) -> Result<(), LinkModelError> {
        let (ber, extra) = match *self {
            LinkModel::Ideal => return Ok(()),
            LinkModel::BlockRedundancy {
                bit_error_rate,
                redundancy,
                ..
            } => (bit_error_rate, ("redundancy", redundancy)),
            LinkModel::EffectiveRate {
                bit_error_rate,
                overhead,
                ..
            } => (bit_error_rate, ("overhead", overhead)),
        };
        if !(0.0..=1.0).contains(&ber) {
            return Err(LinkModelError::BitErrorRate(ber));
        }
        let (what, value) = extra;
        if !(value.is_finite() && value >= 0.0) {
            return Err(LinkModelError::Negative { what, value });
        }
        Ok(())
    }

    /// 为一个契约建立链路；`seed` 用于受损链路的随机数。
    pub fn build(&self, contact: Contact, seed: u64) -> Box<dyn Link> {
        match *self {
            LinkModel::Ideal => Box::new(IdealLink::new(contact)),
            LinkModel::BlockRedundancy {
                block_bits,
                redundancy,
                max_retries,
                bit_error_rate,
            } => Box::new(BlockRedundancyLink::new(
                contact,
                block_bits,
                redundancy,
                max_retries,
                bit_error_rate,
                seed,
            )),
            LinkModel::EffectiveRate {
                bit_error_rate,
                packet_bits,
                overhead,
            } => Box::new(EffectiveRateLink::new(
                contact,
                bit_error_rate,
                packet_bits,
                overhead,
            )),
        }
    }
}
