//! 事件与世界
//!
//! 内核只认识这两个 trait：事件被调度、到点执行；世界持有业务状态
//! （DTN 网络），事件执行时通过 `as_any_mut` 取回具体类型。

use super::simulator::Simulator;
use std::any::Any;

/// 可调度的事件。`self: Box<Self>` 让事件执行时拿回所有权（消息等负载直接 move 出去）。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);

    /// 日志里显示的事件名
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("event")
    }
}

/// 仿真世界（例如 [`DtnWorld`](crate::net::DtnWorld)）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
