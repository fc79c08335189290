//! 链式拓扑构建

use crate::error::ContactPlanError;
use crate::net::NodeId;

use super::contact_plan::{PredictedContact, Ptvg};

/// 链式拓扑配置选项
#[derive(Debug, Clone)]
pub struct ChainOpts {
    pub nodes: usize,
    /// 每对相邻节点的契约周期（秒）
    pub period: f64,
    /// 单个契约的时长（秒）
    pub contact_duration: f64,
    pub bit_rate: f64,
    pub delay: f64,
    /// 生成契约的时间上限（秒）
    pub horizon: f64,
    /// 契约发生概率
    pub probability: f64,
}

impl Default for ChainOpts {
    fn default() -> Self {
        Self {
            nodes: 4,
            period: 100.0,
            contact_duration: 20.0,
            bit_rate: 10_000.0,
            delay: 1.0,
            horizon: 1_000.0,
            probability: 1.0,
        }
    }
}

/// 构建链式拓扑
///
/// 拓扑结构：n0 <-> n1 <-> ... <-> n{k-1}
/// 第 i 跳的契约在每个周期内错开 `i * contact_duration` 开始，
/// 使消息可以沿链逐跳前进。两个方向各有一份契约。
pub fn build_chain(opts: &ChainOpts) -> Result<Ptvg, ContactPlanError> {
    let mut ptvg = Ptvg::new();
    for i in 0..opts.nodes {
        ptvg.add_vertex(NodeId(i));
    }
    if opts.nodes < 2 || opts.period <= 0.0 || opts.contact_duration <= 0.0 {
        return Ok(ptvg);
    }
    for hop in 0..opts.nodes - 1 {
        let (a, b) = (NodeId(hop), NodeId(hop + 1));
        let offset = (hop as f64 * opts.contact_duration) % opts.period;
        let mut start = offset;
        while start + opts.contact_duration <= opts.horizon {
            let end = start + opts.contact_duration;
            for (tx, rx) in [(a, b), (b, a)] {
                let contact = PredictedContact::simple(
                    tx,
                    rx,
                    start,
                    end,
                    opts.bit_rate,
                    opts.delay,
                    opts.probability,
                );
                ptvg.add_contact(contact)?;
            }
            start += opts.period;
        }
    }
    Ok(ptvg)
}
