//! 节点缓冲区
//!
//! 按总比特容量约束的消息存储：`used = Σ size ≤ capacity`。
//! 同时维护截止时间索引（EDF peek/pop/有序遍历）与插入顺序索引（FIFO 淘汰）。
//! 缓冲区由单个节点独占，不加锁。

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::message::{Message, MessageKey};
use crate::error::BufferError;

/// EDF 索引键：先按截止时间，再按消息的自然顺序（start_time, source）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdfKey {
    deadline_bits: u64,
    key: MessageKey,
}

impl EdfKey {
    fn of(msg: &Message) -> Self {
        Self {
            deadline_bits: msg.deadline.to_bits(),
            key: msg.key(),
        }
    }
}

impl Ord for EdfKey {
    fn cmp(&self, other: &Self) -> Ordering {
        f64::from_bits(self.deadline_bits)
            .total_cmp(&f64::from_bits(other.deadline_bits))
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for EdfKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Entry {
    msg: Message,
    seq: u64,
}

/// 消息缓冲区（容量单位：bit）。
#[derive(Debug, Default)]
pub struct Buffer {
    /// None 表示无限容量
    capacity: Option<u64>,
    used: u64,
    entries: HashMap<MessageKey, Entry>,
    edf: BTreeSet<EdfKey>,
    fifo: BTreeMap<u64, MessageKey>,
    next_seq: u64,
}

impl Buffer {
    /// 创建容量为 `capacity_bits` 的缓冲区
    pub fn new(capacity_bits: u64) -> Self {
        Self::with_capacity(Some(capacity_bits))
    }

    /// 创建无限容量的缓冲区
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<u64>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// 剩余容量；无限容量时为 `u64::MAX`。
    pub fn free(&self) -> u64 {
        match self.capacity {
            Some(cap) => cap.saturating_sub(self.used),
            None => u64::MAX,
        }
    }

    /// 消息是否可能放进（空的）缓冲区
    pub fn fits_total(&self, size: u64) -> bool {
        self.capacity.is_none_or(|cap| size <= cap)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &MessageKey) -> Option<&Message> {
        self.entries.get(key).map(|e| &e.msg)
    }

    /// 加入消息：已存在或空间不足时报错。
    pub fn add(&mut self, msg: Message) -> Result<(), BufferError> {
        let key = msg.key();
        if self.entries.contains_key(&key) {
            return Err(BufferError::AlreadyPresent(key));
        }
        let free = self.free();
        if msg.size > free {
            return Err(BufferError::InsufficientSpace {
                key,
                size: msg.size,
                free,
            });
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.used = self.used.saturating_add(msg.size);
        self.edf.insert(EdfKey::of(&msg));
        self.fifo.insert(seq, key);
        self.entries.insert(key, Entry { msg, seq });
        Ok(())
    }

    /// 移除消息：不存在时报错。
    pub fn remove(&mut self, key: &MessageKey) -> Result<Message, BufferError> {
        let entry = self
            .entries
            .remove(key)
            .ok_or(BufferError::NotPresent(*key))?;
        self.edf.remove(&EdfKey::of(&entry.msg));
        self.fifo.remove(&entry.seq);
        self.used = self.used.saturating_sub(entry.msg.size);
        Ok(entry.msg)
    }

    /// 截止时间最早的消息
    pub fn peek_edf(&self) -> Option<&Message> {
        let first = self.edf.first()?;
        self.get(&first.key)
    }

    /// 取出截止时间最早的消息
    pub fn pop_edf(&mut self) -> Option<Message> {
        let key = self.edf.first()?.key;
        self.remove(&key).ok()
    }

    /// 截止时间最晚的消息（LDF 淘汰用）
    pub fn peek_ldf(&self) -> Option<&Message> {
        let last = self.edf.last()?;
        self.get(&last.key)
    }

    /// 最早加入的消息（FIFO 淘汰用）
    pub fn oldest(&self) -> Option<&Message> {
        let (_, key) = self.fifo.first_key_value()?;
        self.get(key)
    }

    /// 按截止时间顺序的第 `index` 条消息
    pub fn nth_edf(&self, index: usize) -> Option<&Message> {
        let k = self.edf.iter().nth(index)?;
        self.get(&k.key)
    }

    /// 按截止时间顺序遍历
    pub fn iter_edf(&self) -> impl Iterator<Item = &Message> + '_ {
        self.edf.iter().filter_map(|k| self.get(&k.key))
    }

    /// 按加入顺序遍历
    pub fn iter_fifo(&self) -> impl Iterator<Item = &Message> + '_ {
        self.fifo.values().filter_map(|k| self.get(k))
    }

    pub fn keys(&self) -> impl Iterator<Item = &MessageKey> + '_ {
        self.entries.keys()
    }
}
