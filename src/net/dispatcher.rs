//! 事件分发器
//!
//! 进程内的发布/订阅中心：给仿真生命周期事件打上虚拟时间戳并分发给订阅者。
//! 订阅者在节点构建时一次性注册；某类事件没有订阅者时，对应方法什么都不做。

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::contact::Contact;
use super::id::NodeId;
use super::message::Message;

/// 事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ContactStarted,
    ContactEnded,
    MessageInjected,
    MessageReceived,
    MessageScheduled,
    MessageRejected,
    MessageDropped,
    MessageDeleted,
    MessageDelivered,
    MessageTransmissionStarted,
    MessageTransmissionCompleted,
    MessageTransmissionAborted,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::ContactStarted,
        EventKind::ContactEnded,
        EventKind::MessageInjected,
        EventKind::MessageReceived,
        EventKind::MessageScheduled,
        EventKind::MessageRejected,
        EventKind::MessageDropped,
        EventKind::MessageDeleted,
        EventKind::MessageDelivered,
        EventKind::MessageTransmissionStarted,
        EventKind::MessageTransmissionCompleted,
        EventKind::MessageTransmissionAborted,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// 一条仿真事件。`node` 总是事件发生所在的节点。
#[derive(Debug, Clone)]
pub enum SimEvent {
    ContactStarted { node: NodeId, contact: Contact },
    ContactEnded { node: NodeId, contact: Contact },
    MessageInjected { node: NodeId, message: Message },
    MessageReceived { node: NodeId, from: NodeId, message: Message },
    MessageScheduled { node: NodeId, message: Message },
    MessageRejected { node: NodeId, message: Message },
    MessageDropped { node: NodeId, message: Message },
    MessageDeleted { node: NodeId, message: Message },
    MessageDelivered { node: NodeId, message: Message },
    TransmissionStarted { node: NodeId, peer: NodeId, message: Message },
    TransmissionCompleted { node: NodeId, peer: NodeId, message: Message },
    TransmissionAborted { node: NodeId, peer: NodeId, message: Message },
}

impl SimEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SimEvent::ContactStarted { .. } => EventKind::ContactStarted,
            SimEvent::ContactEnded { .. } => EventKind::ContactEnded,
            SimEvent::MessageInjected { .. } => EventKind::MessageInjected,
            SimEvent::MessageReceived { .. } => EventKind::MessageReceived,
            SimEvent::MessageScheduled { .. } => EventKind::MessageScheduled,
            SimEvent::MessageRejected { .. } => EventKind::MessageRejected,
            SimEvent::MessageDropped { .. } => EventKind::MessageDropped,
            SimEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
            SimEvent::MessageDelivered { .. } => EventKind::MessageDelivered,
            SimEvent::TransmissionStarted { .. } => EventKind::MessageTransmissionStarted,
            SimEvent::TransmissionCompleted { .. } => EventKind::MessageTransmissionCompleted,
            SimEvent::TransmissionAborted { .. } => EventKind::MessageTransmissionAborted,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            SimEvent::ContactStarted { node, .. }
            | SimEvent::ContactEnded { node, .. }
            | SimEvent::MessageInjected { node, .. }
            | SimEvent::MessageReceived { node, .. }
            | SimEvent::MessageScheduled { node, .. }
            | SimEvent::MessageRejected { node, .. }
            | SimEvent::MessageDropped { node, .. }
            | SimEvent::MessageDeleted { node, .. }
            | SimEvent::MessageDelivered { node, .. }
            | SimEvent::TransmissionStarted { node, .. }
            | SimEvent::TransmissionCompleted { node, .. }
            | SimEvent::TransmissionAborted { node, .. } => *node,
        }
    }

    /// 对端节点：契约事件为接收端，传输事件为 peer，接收事件为发送端。
    pub fn peer(&self) -> Option<NodeId> {
        match self {
            SimEvent::ContactStarted { contact, .. } | SimEvent::ContactEnded { contact, .. } => {
                Some(contact.rx_node)
            }
            SimEvent::MessageReceived { from, .. } => Some(*from),
            SimEvent::TransmissionStarted { peer, .. }
            | SimEvent::TransmissionCompleted { peer, .. }
            | SimEvent::TransmissionAborted { peer, .. } => Some(*peer),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            SimEvent::ContactStarted { .. } | SimEvent::ContactEnded { .. } => None,
            SimEvent::MessageInjected { message, .. }
            | SimEvent::MessageReceived { message, .. }
            | SimEvent::MessageScheduled { message, .. }
            | SimEvent::MessageRejected { message, .. }
            | SimEvent::MessageDropped { message, .. }
            | SimEvent::MessageDeleted { message, .. }
            | SimEvent::MessageDelivered { message, .. }
            | SimEvent::TransmissionStarted { message, .. }
            | SimEvent::TransmissionCompleted { message, .. }
            | SimEvent::TransmissionAborted { message, .. } => Some(message),
        }
    }

    pub fn contact(&self) -> Option<&Contact> {
        match self {
            SimEvent::ContactStarted { contact, .. } | SimEvent::ContactEnded { contact, .. } => {
                Some(contact)
            }
            _ => None,
        }
    }
}

/// 事件订阅者
pub trait Subscriber: Send {
    /// 是否关心某类事件；注册时查询一次。
    fn handles(&self, _kind: EventKind) -> bool {
        true
    }

    /// `time` 为事件发生时的虚拟时间（秒）。
    fn on_event(&mut self, time: f64, event: &SimEvent);
}

/// 共享订阅者：驱动方保留一个 `Arc` 克隆，仿真结束后读取结果。
impl<S: Subscriber> Subscriber for Arc<Mutex<S>> {
    fn handles(&self, kind: EventKind) -> bool {
        match self.lock() {
            Ok(s) => s.handles(kind),
            Err(poisoned) => poisoned.into_inner().handles(kind),
        }
    }

    fn on_event(&mut self, time: f64, event: &SimEvent) {
        match self.lock() {
            Ok(mut s) => s.on_event(time, event),
            Err(poisoned) => poisoned.into_inner().on_event(time, event),
        }
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: Vec<Box<dyn Subscriber>>,
    by_kind: [Vec<usize>; EventKind::ALL.len()],
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者：按它声明关心的事件类别登记，不影响已经分发过的事件。
    pub fn add_subscriber(&mut self, subscriber: impl Subscriber + 'static) {
        let idx = self.subscribers.len();
        for kind in EventKind::ALL {
            if subscriber.handles(kind) {
                self.by_kind[kind.index()].push(idx);
            }
        }
        self.subscribers.push(Box::new(subscriber));
    }

    /// 某类事件的订阅者数量
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.by_kind[kind.index()].len()
    }

    fn dispatch(&mut self, time: f64, kind: EventKind, build: impl FnOnce() -> SimEvent) {
        let targets = &self.by_kind[kind.index()];
        if targets.is_empty() {
            return;
        }
        let event = build();
        trace!(time, ?kind, node = %event.node(), "分发事件");
        for &idx in targets {
            self.subscribers[idx].on_event(time, &event);
        }
    }

    pub fn contact_started(&mut self, time: f64, node: NodeId, contact: &Contact) {
        self.dispatch(time, EventKind::ContactStarted, || SimEvent::ContactStarted {
            node,
            contact: *contact,
        });
    }

    pub fn contact_ended(&mut self, time: f64, node: NodeId, contact: &Contact) {
        self.dispatch(time, EventKind::ContactEnded, || SimEvent::ContactEnded {
            node,
            contact: *contact,
        });
    }

    pub fn message_injected(&mut self, time: f64, node: NodeId, message: &Message) {
        self.dispatch(time, EventKind::MessageInjected, || SimEvent::MessageInjected {
            node,
            message: message.clone(),
        });
    }

    pub fn message_received(&mut self, time: f64, node: NodeId, from: NodeId, message: &Message) {
        self.dispatch(time, EventKind::MessageReceived, || SimEvent::MessageReceived {
            node,
            from,
            message: message.clone(),
        });
    }

    pub fn message_scheduled(&mut self, time: f64, node: NodeId, message: &Message) {
        self.dispatch(time, EventKind::MessageScheduled, || SimEvent::MessageScheduled {
            node,
            message: message.clone(),
        });
    }

    pub fn message_rejected(&mut self, time: f64, node: NodeId, message: &Message) {
        self.dispatch(time, EventKind::MessageRejected, || SimEvent::MessageRejected {
            node,
            message: message.clone(),
        });
    }

    pub fn message_dropped(&mut self, time: f64, node: NodeId, message: &Message) {
        self.dispatch(time, EventKind::MessageDropped, || SimEvent::MessageDropped {
            node,
            message: message.clone(),
        });
    }

    pub fn message_deleted(&mut self, time: f64, node: NodeId, message: &Message) {
        self.dispatch(time, EventKind::MessageDeleted, || SimEvent::MessageDeleted {
            node,
            message: message.clone(),
        });
    }

    pub fn message_delivered(&mut self, time: f64, node: NodeId, message: &Message) {
        self.dispatch(time, EventKind::MessageDelivered, || SimEvent::MessageDelivered {
            node,
            message: message.clone(),
        });
    }

    pub fn message_transmission_started(
        &mut self,
        time: f64,
        node: NodeId,
        peer: NodeId,
        message: &Message,
    ) {
        self.dispatch(time, EventKind::MessageTransmissionStarted, || {
            SimEvent::TransmissionStarted {
                node,
                peer,
                message: message.clone(),
            }
        });
    }

    pub fn message_transmission_completed(
        &mut self,
        time: f64,
        node: NodeId,
        peer: NodeId,
        message: &Message,
    ) {
        self.dispatch(time, EventKind::MessageTransmissionCompleted, || {
            SimEvent::TransmissionCompleted {
                node,
                peer,
                message: message.clone(),
            }
        });
    }

    pub fn message_transmission_aborted(
        &mut self,
        time: f64,
        node: NodeId,
        peer: NodeId,
        message: &Message,
    ) {
        self.dispatch(time, EventKind::MessageTransmissionAborted, || {
            SimEvent::TransmissionAborted {
                node,
                peer,
                message: message.clone(),
            }
        });
    }
}
