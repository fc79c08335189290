//! 标识符类型
//!
//! 定义节点（EID）的唯一标识符。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 节点标识符（EID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}
