//! 统计信息
//!
//! 订阅事件流，统计各类事件次数、交付率与平均时延。

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::dispatcher::{EventKind, SimEvent, Subscriber};
use super::message::MessageKey;

/// 交付统计
#[derive(Debug, Default, Serialize)]
pub struct Stats {
    pub counts: BTreeMap<String, u64>,
    pub injected: u64,
    /// 去重后的交付消息数
    pub delivered: u64,
    pub delivered_bits: u64,
    latency_sum: f64,
    #[serde(skip)]
    seen: HashSet<MessageKey>,
}

impl Stats {
    /// 交付率 = 去重交付数 / 注入数
    pub fn delivery_ratio(&self) -> f64 {
        if self.injected == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.injected as f64
    }

    /// 平均交付时延（秒）
    pub fn mean_latency(&self) -> Option<f64> {
        (self.delivered > 0).then(|| self.latency_sum / self.delivered as f64)
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts.get(kind_name(kind)).copied().unwrap_or(0)
    }
}

fn kind_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::ContactStarted => "contact_started",
        EventKind::ContactEnded => "contact_ended",
        EventKind::MessageInjected => "message_injected",
        EventKind::MessageReceived => "message_received",
        EventKind::MessageScheduled => "message_scheduled",
        EventKind::MessageRejected => "message_rejected",
        EventKind::MessageDropped => "message_dropped",
        EventKind::MessageDeleted => "message_deleted",
        EventKind::MessageDelivered => "message_delivered",
        EventKind::MessageTransmissionStarted => "message_transmission_started",
        EventKind::MessageTransmissionCompleted => "message_transmission_completed",
        EventKind::MessageTransmissionAborted => "message_transmission_aborted",
    }
}

impl Subscriber for Stats {
    fn on_event(&mut self, time: f64, event: &SimEvent) {
        *self
            .counts
            .entry(kind_name(event.kind()).to_string())
            .or_default() += 1;
        match event {
            SimEvent::MessageInjected { .. } => self.injected += 1,
            SimEvent::MessageDelivered { message, .. } => {
                if self.seen.insert(message.key()) {
                    self.delivered += 1;
                    self.delivered_bits += message.size;
                    self.latency_sum += time - message.start_time;
                }
            }
            _ => {}
        }
    }
}
