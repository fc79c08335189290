//! 消息（bundle）
//!
//! 消息在注入时创建，之后不再修改。身份（相等/哈希）只由
//! (start_time, source) 决定，即“同一源在同一时刻注入”的消息被视为同一个。

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::id::NodeId;

/// 消息身份：(注入时间, 源节点)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    start_time_bits: u64,
    pub source: NodeId,
}

impl MessageKey {
    pub fn new(start_time: f64, source: NodeId) -> Self {
        Self {
            start_time_bits: start_time.to_bits(),
            source,
        }
    }

    pub fn start_time(&self) -> f64 {
        f64::from_bits(self.start_time_bits)
    }
}

impl Ord for MessageKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_time()
            .total_cmp(&other.start_time())
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl PartialOrd for MessageKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 一个 bundle。
#[derive(Debug, Clone)]
pub struct Message {
    pub source: NodeId,
    pub destination: NodeId,
    /// 注入时间（秒）
    pub start_time: f64,
    /// 大小（bit）
    pub size: u64,
    /// 绝对截止时间（秒），之后转发已无意义
    pub deadline: f64,
    /// 分片在原消息中的偏移（bit）
    pub fragment_offset: Option<u64>,
    /// 分片所属原消息的总大小（bit）
    pub total_size: Option<u64>,
    pub data: Option<Arc<[u8]>>,
}

impl Message {
    pub fn new(
        source: NodeId,
        destination: NodeId,
        start_time: f64,
        size: u64,
        deadline: f64,
    ) -> Self {
        Self {
            source,
            destination,
            start_time,
            size,
            deadline,
            fragment_offset: None,
            total_size: None,
            data: None,
        }
    }

    /// 构造本消息的一个分片。
    pub fn fragment(&self, offset: u64, size: u64) -> Self {
        Self {
            size,
            fragment_offset: Some(offset),
            total_size: Some(self.total_size.unwrap_or(self.size)),
            ..self.clone()
        }
    }

    pub fn with_data(mut self, data: impl Into<Arc<[u8]>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.start_time, self.source)
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset.is_some()
    }

    /// 还原完整消息的身份（用于跟踪）：同 start_time/source，完整大小，无分片字段。
    pub fn original_message(&self) -> Message {
        Message {
            size: self.total_size.unwrap_or(self.size),
            fragment_offset: None,
            total_size: None,
            ..self.clone()
        }
    }

    /// 截止时间是否已过
    pub fn is_expired(&self, now: f64) -> bool {
        now > self.deadline
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
