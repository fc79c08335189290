//! 仿真节点
//!
//! `SimNode` = 固定的节点核心（缓冲区、已交付集合、信道槽位）+ 可插拔的路由策略。
//! 所有消息都经过 [`SimNode::route`] 的固定六步流程。

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use super::buffer::Buffer;
use super::channel::NodeChannels;
use super::dispatcher::EventDispatcher;
use super::id::NodeId;
use super::message::{Message, MessageKey};
use super::session::SessionId;
use crate::routing::{Metadata, PolicyTimer, RoutingPolicy};

/// 节点核心状态，路由策略通过 [`NodeCtx`] 访问。
#[derive(Debug)]
pub struct NodeCore {
    pub id: NodeId,
    pub name: String,
    pub buf: Buffer,
    /// 已在本节点交付的消息
    pub delivered: HashSet<MessageKey>,
    new_message: bool,
}

impl NodeCore {
    pub fn new(id: NodeId, name: impl Into<String>, buf: Buffer) -> Self {
        Self {
            id,
            name: name.into(),
            buf,
            delivered: HashSet::new(),
            new_message: false,
        }
    }

    /// 缓冲区有了新内容：唤醒所有在等消息的会话。
    pub fn signal_new_message(&mut self) {
        self.new_message = true;
    }

    pub(crate) fn take_new_message_signal(&mut self) -> bool {
        std::mem::take(&mut self.new_message)
    }
}

/// 路由策略回调的上下文：当前时间、节点核心和事件分发器。
pub struct NodeCtx<'a> {
    pub now: f64,
    pub core: &'a mut NodeCore,
    pub events: &'a mut EventDispatcher,
}

impl<'a> NodeCtx<'a> {
    pub fn new(now: f64, core: &'a mut NodeCore, events: &'a mut EventDispatcher) -> Self {
        Self { now, core, events }
    }

    pub fn id(&self) -> NodeId {
        self.core.id
    }

    /// 存入缓冲区并发出 `message_scheduled`；失败时发出 `message_rejected`。
    pub fn store(&mut self, msg: Message) -> bool {
        let key = msg.key();
        match self.core.buf.add(msg.clone()) {
            Ok(()) => {
                self.events.message_scheduled(self.now, self.core.id, &msg);
                self.core.signal_new_message();
                true
            }
            Err(e) => {
                warn!(node = %self.core.id, ?key, error = %e, "存入缓冲区失败");
                self.reject(&msg);
                false
            }
        }
    }

    pub fn reject(&mut self, msg: &Message) {
        self.events.message_rejected(self.now, self.core.id, msg);
    }

    /// 从缓冲区移除并发出 `message_dropped`（超时或被淘汰）。
    pub fn drop_message(&mut self, key: &MessageKey) -> Option<Message> {
        let msg = self.core.buf.remove(key).ok()?;
        trace!(node = %self.core.id, ?key, "丢弃消息");
        self.events.message_dropped(self.now, self.core.id, &msg);
        Some(msg)
    }

    /// 从缓冲区移除并发出 `message_deleted`（不再需要的副本）。
    pub fn delete_message(&mut self, key: &MessageKey) -> Option<Message> {
        let msg = self.core.buf.remove(key).ok()?;
        self.events.message_deleted(self.now, self.core.id, &msg);
        Some(msg)
    }
}

/// 对端节点的只读视图（契约开始或拉取消息时同步读取）。
#[derive(Clone, Copy)]
pub struct PeerView<'a> {
    pub id: NodeId,
    core: Option<&'a NodeCore>,
}

impl<'a> PeerView<'a> {
    pub fn new(id: NodeId, core: Option<&'a NodeCore>) -> Self {
        Self { id, core }
    }

    /// 对端是否已持有或已交付该消息
    pub fn knows(&self, key: &MessageKey) -> bool {
        self.core
            .is_some_and(|c| c.buf.contains(key) || c.delivered.contains(key))
    }

    /// 摘要向量：对端缓冲区 ∪ 已交付集合
    pub fn summary_vector(&self) -> HashSet<MessageKey> {
        let Some(core) = self.core else {
            return HashSet::new();
        };
        core.buf
            .keys()
            .chain(core.delivered.iter())
            .copied()
            .collect()
    }
}

/// `route` 的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Dropped,
    Delivered,
    Rejected,
    /// 交给路由策略的 `store_and_schedule`
    Handed,
}

/// 仿真节点
pub struct SimNode {
    pub(crate) core: NodeCore,
    pub(crate) channels: NodeChannels,
    pub(crate) policy: Box<dyn RoutingPolicy>,
    /// 等待新消息的会话
    pub(crate) waiting: Vec<SessionId>,
}

impl SimNode {
    pub fn new(core: NodeCore, channels: NodeChannels, policy: Box<dyn RoutingPolicy>) -> Self {
        Self {
            core,
            channels,
            policy,
            waiting: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn core(&self) -> &NodeCore {
        &self.core
    }

    pub fn channels(&self) -> &NodeChannels {
        &self.channels
    }

    pub fn policy(&self) -> &dyn RoutingPolicy {
        self.policy.as_ref()
    }

    /// 处理注入或收到的消息。
    #[tracing::instrument(skip_all, fields(node = %self.core.id, src = %msg.source, dst = %msg.destination, from = ?tx_node))]
    pub fn route(
        &mut self,
        now: f64,
        events: &mut EventDispatcher,
        msg: Message,
        tx_node: Option<NodeId>,
        metadata: Metadata,
    ) -> RouteOutcome {
        let mut ctx = NodeCtx::new(now, &mut self.core, events);
        if let Some(from) = tx_node {
            self.policy.observe_reception(&mut ctx, &msg, from, &metadata);
        }

        if msg.is_expired(now) {
            debug!("⌛ 消息已过期");
            ctx.events.message_dropped(now, ctx.core.id, &msg);
            return RouteOutcome::Dropped;
        }

        if msg.destination == ctx.core.id {
            debug!("🎯 消息交付");
            ctx.core.delivered.insert(msg.key());
            ctx.events.message_delivered(now, ctx.core.id, &msg);
            return RouteOutcome::Delivered;
        }

        if ctx.core.buf.contains(&msg.key()) || !ctx.core.buf.fits_total(msg.size) {
            trace!("重复或超出总容量，拒绝");
            ctx.reject(&msg);
            return RouteOutcome::Rejected;
        }

        self.policy.drop_messages(&mut ctx, &msg, tx_node);

        if msg.size > ctx.core.buf.free() {
            trace!(free = ctx.core.buf.free(), "淘汰后空间仍不足，拒绝");
            ctx.reject(&msg);
            return RouteOutcome::Rejected;
        }

        self.policy.store_and_schedule(&mut ctx, msg, tx_node, metadata);
        RouteOutcome::Handed
    }

    pub(crate) fn contact_started(&mut self, now: f64, events: &mut EventDispatcher, peer: &PeerView<'_>) {
        let mut ctx = NodeCtx::new(now, &mut self.core, events);
        self.policy.on_contact_started(&mut ctx, peer);
    }

    pub(crate) fn contact_ended(&mut self, now: f64, events: &mut EventDispatcher, peer: NodeId) {
        let mut ctx = NodeCtx::new(now, &mut self.core, events);
        self.policy.on_contact_ended(&mut ctx, peer);
    }

    pub(crate) fn next_message(
        &mut self,
        now: f64,
        events: &mut EventDispatcher,
        peer: &PeerView<'_>,
    ) -> Option<(Message, Metadata)> {
        let mut ctx = NodeCtx::new(now, &mut self.core, events);
        self.policy.next_message(&mut ctx, peer)
    }

    pub(crate) fn cancel(&mut self, now: f64, events: &mut EventDispatcher, peer: NodeId) {
        let mut ctx = NodeCtx::new(now, &mut self.core, events);
        self.policy.cancel(&mut ctx, peer);
    }

    pub(crate) fn transmitted(&mut self, now: f64, events: &mut EventDispatcher, peer: NodeId) {
        let mut ctx = NodeCtx::new(now, &mut self.core, events);
        self.policy.transmitted(&mut ctx, peer);
    }

    pub(crate) fn timer_fired(&mut self, now: f64, events: &mut EventDispatcher, timer: PolicyTimer) {
        let mut ctx = NodeCtx::new(now, &mut self.core, events);
        self.policy.on_timer(&mut ctx, timer);
    }
}
