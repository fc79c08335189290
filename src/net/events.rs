//! 契约会话事件
//!
//! 契约开始/结束、传输完成/失败、会话唤醒与策略定时器。
//! 每个事件只携带标识符，执行时从 [`DtnWorld`](super::DtnWorld) 中找回网络。

use super::net_world::network_of;
use super::session::SessionId;
use super::id::NodeId;
use crate::routing::PolicyTimer;
use crate::sim::{Event, Simulator, World};

/// 契约开始
#[derive(Debug)]
pub struct ContactStart {
    pub session: SessionId,
}

impl Event for ContactStart {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        network_of(world).contact_start(self.session, sim);
    }
}

/// 契约结束
#[derive(Debug)]
pub struct ContactEnd {
    pub session: SessionId,
}

impl Event for ContactEnd {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        network_of(world).contact_end(self.session, sim);
    }
}

/// 当前消息发送完毕。`epoch` 与会话不一致时说明传输已被取消，忽略。
#[derive(Debug)]
pub struct TransmissionDone {
    pub session: SessionId,
    pub epoch: u64,
}

impl Event for TransmissionDone {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        network_of(world).transmission_done(self.session, self.epoch, sim);
    }
}

/// 受损链路判定本次传输失败
#[derive(Debug)]
pub struct TransmissionFailed {
    pub session: SessionId,
    pub epoch: u64,
}

impl Event for TransmissionFailed {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        network_of(world).transmission_failed(self.session, self.epoch, sim);
    }
}

/// 唤醒等待新消息的会话
#[derive(Debug)]
pub struct PumpSession {
    pub session: SessionId,
}

impl Event for PumpSession {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        network_of(world).pump(self.session, sim);
    }
}

/// 唤醒等待信道的会话
#[derive(Debug)]
pub struct RetryChannel {
    pub session: SessionId,
}

impl Event for RetryChannel {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        network_of(world).try_transmit(self.session, sim);
    }
}

/// 路由策略定时器
#[derive(Debug)]
pub struct PolicyTimerFired {
    pub node: NodeId,
    pub timer: PolicyTimer,
}

impl Event for PolicyTimerFired {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        network_of(world).policy_timer(self.node, self.timer, sim);
    }
}
