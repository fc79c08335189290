use serde::{Deserialize, Serialize};

use crate::net::{Contact, EventKind, Message, SimEvent, Subscriber};

/// 消息摘要（不含 payload）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub source: usize,
    pub destination: usize,
    pub start_time: f64,
    pub size: u64,
    pub deadline: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_offset: Option<u64>,
}

impl From<&Message> for MessageInfo {
    fn from(m: &Message) -> Self {
        Self {
            source: m.source.0,
            destination: m.destination.0,
            start_time: m.start_time,
            size: m.size,
            deadline: m.deadline,
            fragment_offset: m.fragment_offset,
        }
    }
}

/// 契约摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub tx_node: usize,
    pub rx_node: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub bit_rate: f64,
    pub delay: f64,
}

impl From<&Contact> for ContactInfo {
    fn from(c: &Contact) -> Self {
        Self {
            tx_node: c.tx_node.0,
            rx_node: c.rx_node.0,
            start_time: c.start_time,
            end_time: c.end_time,
            bit_rate: c.bit_rate,
            delay: c.delay,
        }
    }
}

/// 一条记录下来的仿真事件（JSON）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 仿真时间（秒）
    pub t: f64,
    pub kind: EventKind,
    pub node: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactInfo>,
}

impl EventRecord {
    pub fn from_event(t: f64, ev: &SimEvent) -> Self {
        Self {
            t,
            kind: ev.kind(),
            node: ev.node().0,
            peer: ev.peer().map(|p| p.0),
            message: ev.message().map(MessageInfo::from),
            contact: ev.contact().map(ContactInfo::from),
        }
    }
}

/// 简单的事件收集器：存在内存里，仿真结束后写成 JSON 数组。
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<EventRecord>,
    /// 只记录这些类别；为空表示全部记录
    kinds: Vec<EventKind>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只记录 `kinds` 中的事件
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            events: Vec::new(),
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn push(&mut self, ev: EventRecord) {
        self.events.push(ev);
    }

    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &EventRecord> + '_ {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}

impl Subscriber for EventLog {
    fn handles(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    fn on_event(&mut self, time: f64, event: &SimEvent) {
        self.push(EventRecord::from_event(time, event));
    }
}
