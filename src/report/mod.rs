//! 事件记录（用于离线分析）
//!
//! - **结构化**：订阅事件分发器，逐条保存为 JSON 事件，而不是解析文本日志
//! - **轻量**：仿真结束后一次性写出

mod types;

pub use types::{ContactInfo, EventLog, EventRecord, MessageInfo};
