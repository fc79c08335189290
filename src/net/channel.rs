//! 信道准入
//!
//! 每个节点有有限个发送（TX）与接收（RX）槽位。一次传输需要同时持有
//! 本地 TX 槽和对端 RX 槽。内核单线程运行，成对获取要么整体成功，要么什么都不占。

use std::collections::VecDeque;

use super::id::NodeId;
use super::session::SessionId;

/// 一类信道槽位（TX 或 RX）
#[derive(Debug, Default)]
pub struct ChannelSlots {
    /// None 表示不限
    limit: Option<usize>,
    in_use: usize,
    waiters: VecDeque<SessionId>,
}

impl ChannelSlots {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn try_acquire(&mut self) -> bool {
        if self.limit.is_some_and(|limit| self.in_use >= limit) {
            return false;
        }
        self.in_use += 1;
        true
    }

    pub fn release(&mut self) {
        assert!(self.in_use > 0, "channel slot released without being held");
        self.in_use -= 1;
    }

    /// 把会话挂到本槽位的等待队列（重复挂起只记一次）。
    pub fn park(&mut self, session: SessionId) {
        if !self.waiters.contains(&session) {
            self.waiters.push_back(session);
        }
    }

    pub fn unpark(&mut self, session: SessionId) {
        self.waiters.retain(|s| *s != session);
    }

    pub fn take_waiters(&mut self) -> Vec<SessionId> {
        self.waiters.drain(..).collect()
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

/// 节点的 TX/RX 槽位
#[derive(Debug, Default)]
pub struct NodeChannels {
    pub tx: ChannelSlots,
    pub rx: ChannelSlots,
}

impl NodeChannels {
    pub fn new(tx_limit: Option<usize>, rx_limit: Option<usize>) -> Self {
        Self {
            tx: ChannelSlots::new(tx_limit),
            rx: ChannelSlots::new(rx_limit),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// 已获取的一对槽位：`tx` 节点的 TX 槽 + `rx` 节点的 RX 槽。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelGrant {
    pub tx: NodeId,
    pub rx: NodeId,
}

/// 获取失败时挡住调用方的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
    LocalTx,
    PeerRx,
}

/// 成对获取 `local_tx` 与 `peer_rx`。
///
/// 先按“本地 TX → 对端 RX”尝试，失败则释放已拿到的槽并按对称顺序
/// “对端 RX → 本地 TX”再试一次。返回 `Err` 时两个槽位都未被占用。
pub fn acquire_pair(
    local_tx: &mut ChannelSlots,
    peer_rx: &mut ChannelSlots,
) -> Result<(), Blocker> {
    if local_tx.try_acquire() {
        if peer_rx.try_acquire() {
            return Ok(());
        }
        local_tx.release();
    }
    if peer_rx.try_acquire() {
        if local_tx.try_acquire() {
            return Ok(());
        }
        peer_rx.release();
        return Err(Blocker::LocalTx);
    }
    Err(Blocker::PeerRx)
}

/// 释放成对槽位；完成与中止都必须调用。
pub fn release_pair(local_tx: &mut ChannelSlots, peer_rx: &mut ChannelSlots) {
    local_tx.release();
    peer_rx.release();
}
