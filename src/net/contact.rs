//! 契约（Contact）
//!
//! 一个契约表示一段时间内可用的有向链路：`tx_node -> rx_node`，
//! 在 `[start_time, end_time)` 内以 `bit_rate` 发送，传播时延为 `delay`。
//! 相等/哈希/排序按 (tx_node, rx_node, start_time, end_time, bit_rate, delay)
//! 字典序进行，`bit_error_rate` 和 `param` 不参与比较。

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use super::id::NodeId;

/// 有向链路可用的时间窗口。
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    pub tx_node: NodeId,
    pub rx_node: NodeId,
    /// 开始时间（秒）
    pub start_time: f64,
    /// 结束时间（秒）
    pub end_time: f64,
    /// 比特率（bit/s）
    pub bit_rate: f64,
    /// 单向传播时延（秒，OWLT）
    pub delay: f64,
    /// 契约自身的残余误码率，由受损链路模型叠加使用
    pub bit_error_rate: f64,
    /// 不透明的附加参数；概率路由把它当作契约发生概率读取。
    pub param: Option<f64>,
}

impl Contact {
    pub fn new(
        tx_node: NodeId,
        rx_node: NodeId,
        start_time: f64,
        end_time: f64,
        bit_rate: f64,
        delay: f64,
    ) -> Self {
        Self {
            tx_node,
            rx_node,
            start_time,
            end_time,
            bit_rate,
            delay,
            bit_error_rate: 0.0,
            param: None,
        }
    }

    pub fn with_bit_error_rate(mut self, ber: f64) -> Self {
        self.bit_error_rate = ber;
        self
    }

    pub fn with_param(mut self, param: f64) -> Self {
        self.param = Some(param);
        self
    }

    /// 契约持续时长（秒）
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// 契约总容量（bit）= 时长 × 比特率
    pub fn volume(&self) -> f64 {
        self.duration() * self.bit_rate
    }

    /// 契约发生概率；未设置 `param` 时视为确定发生。
    pub fn probability(&self) -> f64 {
        self.param.unwrap_or(1.0)
    }

    fn sort_key(&self) -> (NodeId, NodeId, u64, u64, u64, u64) {
        (
            self.tx_node,
            self.rx_node,
            self.start_time.to_bits(),
            self.end_time.to_bits(),
            self.bit_rate.to_bits(),
            self.delay.to_bits(),
        )
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl Ord for Contact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tx_node
            .cmp(&other.tx_node)
            .then_with(|| self.rx_node.cmp(&other.rx_node))
            .then_with(|| self.start_time.total_cmp(&other.start_time))
            .then_with(|| self.end_time.total_cmp(&other.end_time))
            .then_with(|| self.bit_rate.total_cmp(&other.bit_rate))
            .then_with(|| self.delay.total_cmp(&other.delay))
    }
}

impl PartialOrd for Contact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
