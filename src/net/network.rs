//! DTN 网络
//!
//! 持有所有节点与契约会话，负责契约生命周期、信道准入、传输调度，
//! 并把注入/接收的消息交给节点的 `route` 流程。

use std::collections::BTreeMap;

use super::channel::{Blocker, ChannelGrant, ChannelSlots, NodeChannels, acquire_pair, release_pair};
use super::buffer::Buffer;
use super::contact::Contact;
use super::deliver_message::{DeliverMessage, InjectMessage};
use super::dispatcher::{EventDispatcher, Subscriber};
use super::events::{
    ContactEnd, ContactStart, PolicyTimerFired, PumpSession, RetryChannel, TransmissionDone,
    TransmissionFailed,
};
use super::id::NodeId;
use super::link::{LinkModel, TxPlan};
use super::message::Message;
use super::node::{NodeCore, PeerView, SimNode};
use super::session::{ContactSession, InFlight, SessionId, SessionState};
use crate::error::LinkModelError;
use crate::routing::{Metadata, PolicyTimer, RoutingPolicy};
use crate::sim::{SimTime, Simulator};
use tracing::{debug, info, trace, warn};

/// 节点资源配置；`None` 表示不限。
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeOptions {
    pub buffer_bits: Option<u64>,
    pub tx_channels: Option<usize>,
    pub rx_channels: Option<usize>,
}

/// DTN 网络
#[derive(Default)]
pub struct Network {
    nodes: Vec<Option<SimNode>>,
    sessions: BTreeMap<SessionId, ContactSession>,
    next_session: u64,
    events: EventDispatcher,
    link_model: LinkModel,
    seed: u64,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置契约建立时使用的链路模型；`seed` 派生每条受损链路的随机数种子。
    pub fn set_link_model(&mut self, model: LinkModel, seed: u64) -> Result<(), LinkModelError> {
        model.validate()?;
        self.link_model = model;
        self.seed = seed;
        Ok(())
    }

    /// 注册事件订阅者
    pub fn add_subscriber(&mut self, subscriber: impl Subscriber + 'static) {
        self.events.add_subscriber(subscriber);
    }

    pub fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    /// 添加节点并为路由策略的定时器排期
    pub fn add_node(
        &mut self,
        sim: &mut Simulator,
        name: impl Into<String>,
        opts: NodeOptions,
        policy: Box<dyn RoutingPolicy>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let timers = policy.timers();
        debug!(node = %id, policy = policy.name(), timers = timers.len(), "添加节点");
        for (at, timer) in timers {
            sim.schedule_at_secs(at, PolicyTimerFired { node: id, timer });
        }
        let core = NodeCore::new(id, name, Buffer::with_capacity(opts.buffer_bits));
        let channels = NodeChannels::new(opts.tx_channels, opts.rx_channels);
        self.nodes.push(Some(SimNode::new(core, channels, policy)));
        id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &SimNode {
        self.nodes[id.0].as_ref().expect("node exists")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut SimNode {
        self.nodes[id.0].as_mut().expect("node exists")
    }

    /// 以具体类型查看某个节点的路由策略
    pub fn policy<T: 'static>(&self, id: NodeId) -> Option<&T> {
        self.node(id).policy().as_any().downcast_ref::<T>()
    }

    /// 尚未结束的契约会话数
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 为一个（真实发生的）契约排期开始与结束事件
    pub fn schedule_contact(&mut self, sim: &mut Simulator, contact: Contact) -> SessionId {
        assert!(
            contact.tx_node.0 < self.nodes.len() && contact.rx_node.0 < self.nodes.len(),
            "contact {:?} references an unknown node",
            contact
        );
        assert_ne!(contact.tx_node, contact.rx_node, "contact must connect two distinct nodes");
        let sid = SessionId(self.next_session);
        self.next_session += 1;
        let link = self
            .link_model
            .build(contact, self.seed ^ sid.0.wrapping_mul(0xA24B_AED4_963E_E407));
        self.sessions.insert(sid, ContactSession::new(contact, link));
        sim.schedule_at_secs(contact.start_time, ContactStart { session: sid });
        sim.schedule_at_secs(contact.end_time, ContactEnd { session: sid });
        trace!(session = %sid, tx = %contact.tx_node, rx = %contact.rx_node, "契约已排期");
        sid
    }

    /// 在消息的 `start_time` 把它注入 `node`
    pub fn schedule_injection(&mut self, sim: &mut Simulator, node: NodeId, msg: Message) {
        sim.schedule_at_secs(msg.start_time, InjectMessage { node, msg });
    }

    /// 在 `at_secs` 让 `to` 收到来自 `from` 的消息
    pub fn schedule_reception(
        &mut self,
        sim: &mut Simulator,
        at_secs: f64,
        to: NodeId,
        from: NodeId,
        msg: Message,
        metadata: Metadata,
    ) {
        sim.schedule_at_secs(
            at_secs,
            DeliverMessage {
                to,
                from,
                msg,
                metadata,
            },
        );
    }

    #[tracing::instrument(skip_all, fields(node = %node))]
    pub(crate) fn inject(&mut self, node: NodeId, msg: Message, sim: &mut Simulator) {
        let now = sim.now_secs();
        info!(dst = %msg.destination, size = msg.size, "💉 注入消息");
        self.events.message_injected(now, node, &msg);
        let target = self.nodes[node.0].as_mut().expect("node exists");
        target.route(now, &mut self.events, msg, None, Metadata::None);
        self.flush_wakeups(node, sim);
    }

    pub(crate) fn receive(
        &mut self,
        to: NodeId,
        from: NodeId,
        msg: Message,
        metadata: Metadata,
        sim: &mut Simulator,
    ) {
        let now = sim.now_secs();
        self.events.message_received(now, to, from, &msg);
        let target = self.nodes[to.0].as_mut().expect("node exists");
        let outcome = target.route(now, &mut self.events, msg, Some(from), metadata);
        trace!(?outcome, "接收处理完成");
        self.flush_wakeups(to, sim);
    }

    pub(crate) fn policy_timer(&mut self, node: NodeId, timer: PolicyTimer, sim: &mut Simulator) {
        let now = sim.now_secs();
        trace!(node = %node, ?timer, "⏰ 策略定时器");
        let target = self.nodes[node.0].as_mut().expect("node exists");
        target.timer_fired(now, &mut self.events, timer);
        self.flush_wakeups(node, sim);
    }

    #[tracing::instrument(skip_all, fields(session = %sid))]
    pub(crate) fn contact_start(&mut self, sid: SessionId, sim: &mut Simulator) {
        let now = sim.now_secs();
        let Some(session) = self.sessions.get_mut(&sid) else {
            return;
        };
        if !matches!(session.state, SessionState::Pending) {
            warn!(state = session.state.name(), "契约重复开始");
            return;
        }
        session.link.establish();
        session.state = SessionState::Idle;
        let contact = session.contact;
        debug!(tx = %contact.tx_node, rx = %contact.rx_node, "🔗 契约开始");
        self.events.contact_started(now, contact.tx_node, &contact);

        // 暂时把节点取出来，读取对端视图时避免重叠借用。
        let mut node = self.nodes[contact.tx_node.0].take().expect("node exists");
        {
            let peer = PeerView::new(
                contact.rx_node,
                self.nodes[contact.rx_node.0].as_ref().map(|n| &n.core),
            );
            node.contact_started(now, &mut self.events, &peer);
        }
        self.nodes[contact.tx_node.0] = Some(node);

        self.pump(sid, sim);
    }

    #[tracing::instrument(skip_all, fields(session = %sid))]
    pub(crate) fn contact_end(&mut self, sid: SessionId, sim: &mut Simulator) {
        // 恰好在契约结束时刻发完的消息算作送达
        let finishing = self.sessions.get(&sid).and_then(|s| s.completing_by(sim.now()));
        if let Some(epoch) = finishing {
            self.transmission_done(sid, epoch, sim);
        }
        let now = sim.now_secs();
        let Some(mut session) = self.sessions.remove(&sid) else {
            return;
        };
        let contact = session.contact;
        let (tx, rx) = (contact.tx_node, contact.rx_node);
        match std::mem::replace(&mut session.state, SessionState::Idle) {
            SessionState::Pending => {
                warn!("契约在开始之前结束");
                return;
            }
            SessionState::Transmitting(flight) | SessionState::Stalled(flight) => {
                debug!(src = %flight.message.source, "✂️ 契约结束，中止传输");
                self.release_grant(flight.grant, sim);
                self.events
                    .message_transmission_aborted(now, tx, rx, &flight.message);
                let node = self.nodes[tx.0].as_mut().expect("node exists");
                node.cancel(now, &mut self.events, rx);
            }
            SessionState::AwaitingChannel(_) => {
                let (local_tx, peer_rx) = self.channel_pair(tx, rx);
                local_tx.unpark(sid);
                peer_rx.unpark(sid);
                let node = self.nodes[tx.0].as_mut().expect("node exists");
                node.cancel(now, &mut self.events, rx);
            }
            SessionState::AwaitingMessage => {
                self.node_mut(tx).waiting.retain(|s| *s != sid);
            }
            SessionState::Idle => {}
        }
        session.link.teardown();
        debug!(tx = %tx, rx = %rx, "契约结束");
        self.events.contact_ended(now, tx, &contact);
        let node = self.nodes[tx.0].as_mut().expect("node exists");
        node.contact_ended(now, &mut self.events, rx);
        self.flush_wakeups(tx, sim);
    }

    /// 从路由策略拉取下一条消息；没有则挂起等待新消息。
    pub(crate) fn pump(&mut self, sid: SessionId, sim: &mut Simulator) {
        let Some(session) = self.sessions.get(&sid) else {
            return;
        };
        if !matches!(
            session.state,
            SessionState::Idle | SessionState::AwaitingMessage
        ) {
            return;
        }
        let (tx, rx) = (session.contact.tx_node, session.contact.rx_node);
        let now = sim.now_secs();
        if now >= session.contact.end_time {
            trace!(session = %sid, "契约窗口已关闭，不再取消息");
            return;
        }

        let mut node = self.nodes[tx.0].take().expect("node exists");
        let item = {
            let peer = PeerView::new(rx, self.nodes[rx.0].as_ref().map(|n| &n.core));
            node.next_message(now, &mut self.events, &peer)
        };
        node.waiting.retain(|s| *s != sid);
        if item.is_none() {
            node.waiting.push(sid);
        }
        self.nodes[tx.0] = Some(node);

        let session = self.sessions.get_mut(&sid).expect("session exists");
        match item {
            None => {
                trace!(session = %sid, "暂无可发消息，等待");
                session.state = SessionState::AwaitingMessage;
            }
            Some((message, metadata)) => {
                session.state = SessionState::AwaitingChannel(InFlight {
                    message,
                    metadata,
                    grant: None,
                });
                self.try_transmit(sid, sim);
            }
        }
        self.flush_wakeups(tx, sim);
    }

    /// 获取信道并开始发送；获取失败时挂到阻塞的槽位上。
    pub(crate) fn try_transmit(&mut self, sid: SessionId, sim: &mut Simulator) {
        let Some(session) = self.sessions.get(&sid) else {
            return;
        };
        if !matches!(session.state, SessionState::AwaitingChannel(_)) {
            return;
        }
        let (tx, rx) = (session.contact.tx_node, session.contact.rx_node);

        let (local_tx, peer_rx) = self.channel_pair(tx, rx);
        match acquire_pair(local_tx, peer_rx) {
            Ok(()) => {}
            Err(Blocker::LocalTx) => {
                trace!(session = %sid, "本地 TX 槽已满，等待");
                local_tx.park(sid);
                return;
            }
            Err(Blocker::PeerRx) => {
                trace!(session = %sid, "对端 RX 槽已满，等待");
                peer_rx.park(sid);
                return;
            }
        }

        let now = sim.now_secs();
        let session = self.sessions.get_mut(&sid).expect("session exists");
        let SessionState::AwaitingChannel(mut flight) =
            std::mem::replace(&mut session.state, SessionState::Idle)
        else {
            unreachable!("state checked above");
        };
        flight.grant = Some(ChannelGrant { tx, rx });
        session.epoch += 1;
        let epoch = session.epoch;

        self.events
            .message_transmission_started(now, tx, rx, &flight.message);
        let plan = session.link.plan_transmission(&flight.message, now);
        debug!(session = %sid, src = %flight.message.source, ?plan, "📤 开始发送");
        match plan {
            TxPlan::Deliver { duration } => {
                session.state = SessionState::Transmitting(flight);
                let at = sim.now().saturating_add(SimTime::from_secs_f64(duration));
                session.done_at = Some(at);
                sim.schedule(at, TransmissionDone { session: sid, epoch });
            }
            TxPlan::Stall => {
                session.state = SessionState::Stalled(flight);
            }
            TxPlan::Fail { after } => {
                session.state = SessionState::Transmitting(flight);
                session.done_at = None;
                sim.schedule_in_secs(after, TransmissionFailed { session: sid, epoch });
            }
        }
    }

    /// 结束当前传输；事件已过期时返回 None。
    fn finish_transmission(&mut self, sid: SessionId, epoch: u64) -> Option<(Contact, InFlight)> {
        let session = self.sessions.get_mut(&sid)?;
        if session.epoch != epoch || !matches!(session.state, SessionState::Transmitting(_)) {
            trace!(session = %sid, epoch, "忽略过期的传输事件");
            return None;
        }
        session.done_at = None;
        match std::mem::replace(&mut session.state, SessionState::Idle) {
            SessionState::Transmitting(flight) => Some((session.contact, flight)),
            _ => None,
        }
    }

    pub(crate) fn transmission_done(&mut self, sid: SessionId, epoch: u64, sim: &mut Simulator) {
        let Some((contact, flight)) = self.finish_transmission(sid, epoch) else {
            return;
        };
        let now = sim.now_secs();
        let (tx, rx) = (contact.tx_node, contact.rx_node);
        self.release_grant(flight.grant, sim);
        self.events
            .message_transmission_completed(now, tx, rx, &flight.message);
        debug!(session = %sid, delay = contact.delay, "✅ 发送完成");
        self.schedule_reception(sim, now + contact.delay, rx, tx, flight.message, flight.metadata);

        let node = self.nodes[tx.0].as_mut().expect("node exists");
        node.transmitted(now, &mut self.events, rx);
        self.flush_wakeups(tx, sim);
        self.pump(sid, sim);
    }

    pub(crate) fn transmission_failed(&mut self, sid: SessionId, epoch: u64, sim: &mut Simulator) {
        let Some((contact, flight)) = self.finish_transmission(sid, epoch) else {
            return;
        };
        let now = sim.now_secs();
        let (tx, rx) = (contact.tx_node, contact.rx_node);
        self.release_grant(flight.grant, sim);
        debug!(session = %sid, "❌ 链路传输失败");
        self.events
            .message_transmission_aborted(now, tx, rx, &flight.message);

        let node = self.nodes[tx.0].as_mut().expect("node exists");
        node.cancel(now, &mut self.events, rx);
        self.flush_wakeups(tx, sim);
        self.pump(sid, sim);
    }

    /// `tx` 的 TX 槽与 `rx` 的 RX 槽
    fn channel_pair(&mut self, tx: NodeId, rx: NodeId) -> (&mut ChannelSlots, &mut ChannelSlots) {
        let (a, b) = if tx.0 < rx.0 {
            let (left, right) = self.nodes.split_at_mut(rx.0);
            (&mut left[tx.0], &mut right[0])
        } else {
            let (left, right) = self.nodes.split_at_mut(tx.0);
            (&mut right[0], &mut left[rx.0])
        };
        let a = a.as_mut().expect("node exists");
        let b = b.as_mut().expect("node exists");
        (&mut a.channels.tx, &mut b.channels.rx)
    }

    /// 释放信道并唤醒两端节点上所有等待信道的会话
    fn release_grant(&mut self, grant: Option<ChannelGrant>, sim: &mut Simulator) {
        let Some(grant) = grant else {
            return;
        };
        let (local_tx, peer_rx) = self.channel_pair(grant.tx, grant.rx);
        release_pair(local_tx, peer_rx);

        let mut woken = Vec::new();
        for id in [grant.tx, grant.rx] {
            let node = self.node_mut(id);
            woken.extend(node.channels.tx.take_waiters());
            woken.extend(node.channels.rx.take_waiters());
        }
        woken.sort();
        woken.dedup();
        for session in woken {
            sim.schedule(sim.now(), RetryChannel { session });
        }
    }

    /// 节点缓冲区有新内容时，唤醒在该节点上等待消息的会话
    fn flush_wakeups(&mut self, id: NodeId, sim: &mut Simulator) {
        let node = self.node_mut(id);
        if !node.core.take_new_message_signal() {
            return;
        }
        let waiting = std::mem::take(&mut node.waiting);
        for session in waiting {
            sim.schedule(sim.now(), PumpSession { session });
        }
    }
}
