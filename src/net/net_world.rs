//! DTN 仿真世界
//!
//! 定义仿真的世界（World）实现，持有网络。

use super::network::Network;
use crate::sim::World;
use std::any::Any;

/// 默认的 DTN 世界实现：持有 Network。
#[derive(Default)]
pub struct DtnWorld {
    pub net: Network,
}

impl World for DtnWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 事件执行时从 `World` 取回网络。
pub(crate) fn network_of(world: &mut dyn World) -> &mut Network {
    &mut world
        .as_any_mut()
        .downcast_mut::<DtnWorld>()
        .expect("world must be DtnWorld")
        .net
}
