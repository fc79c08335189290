//! 契约会话
//!
//! 每个被调度的契约对应一个会话，记录它在
//! pending → established → transmitting → torn down 生命周期中的位置。

use std::fmt;

use super::channel::ChannelGrant;
use super::contact::Contact;
use super::link::Link;
use super::message::Message;
use crate::routing::Metadata;
use crate::sim::SimTime;

/// 会话标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// 正在处理的一条出站消息
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub message: Message,
    pub metadata: Metadata,
    /// 已获取的信道；等待信道期间为 None
    pub grant: Option<ChannelGrant>,
}

#[derive(Debug)]
pub(crate) enum SessionState {
    /// 契约尚未开始
    Pending,
    /// 已建立，准备从路由策略拉取下一条消息
    Idle,
    /// 策略暂时没有可发的消息，等待节点缓冲区有新内容
    AwaitingMessage,
    /// 已取到消息，等待信道
    AwaitingChannel(InFlight),
    /// 正在发送
    Transmitting(InFlight),
    /// 比特率为 0，挂起到契约结束
    Stalled(InFlight),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Idle => "idle",
            SessionState::AwaitingMessage => "awaiting_message",
            SessionState::AwaitingChannel(_) => "awaiting_channel",
            SessionState::Transmitting(_) => "transmitting",
            SessionState::Stalled(_) => "stalled",
        }
    }
}

#[derive(Debug)]
pub(crate) struct ContactSession {
    pub contact: Contact,
    pub link: Box<dyn Link>,
    pub state: SessionState,
    /// 每开始一次传输加一；过期的完成事件据此被忽略
    pub epoch: u64,
    /// 当前传输的完成时刻
    pub done_at: Option<SimTime>,
}

impl ContactSession {
    pub fn new(contact: Contact, link: Box<dyn Link>) -> Self {
        Self {
            contact,
            link,
            state: SessionState::Pending,
            epoch: 0,
            done_at: None,
        }
    }

    /// 在 `now` 或之前就该完成的传输对应的 epoch
    pub fn completing_by(&self, now: SimTime) -> Option<u64> {
        match (&self.state, self.done_at) {
            (SessionState::Transmitting(_), Some(at)) if at <= now => Some(self.epoch),
            _ => None,
        }
    }
}
