//! 消息到达事件
//!
//! 发送完成后经过契约传播时延，把消息交给接收节点。

use super::id::NodeId;
use super::message::Message;
use super::net_world::network_of;
use crate::routing::Metadata;
use crate::sim::{Event, Simulator, World};
use tracing::{debug, trace};

/// 事件：把一条消息交给 `to` 节点处理，`from` 为发送节点。
#[derive(Debug)]
pub struct DeliverMessage {
    pub to: NodeId,
    pub from: NodeId,
    pub msg: Message,
    pub metadata: Metadata,
}

impl Event for DeliverMessage {
    #[tracing::instrument(skip(self, sim, world), fields(to = %self.to, from = %self.from, src = %self.msg.source))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverMessage {
            to,
            from,
            msg,
            metadata,
        } = *self;

        debug!(
            size = msg.size,
            dst = %msg.destination,
            now = sim.now_secs(),
            "📨 消息到达节点"
        );

        network_of(world).receive(to, from, msg, metadata, sim);

        trace!("DeliverMessage::execute 完成");
    }
}

/// 事件：在消息的 `start_time` 把它注入源节点。
#[derive(Debug)]
pub struct InjectMessage {
    pub node: NodeId,
    pub msg: Message,
}

impl Event for InjectMessage {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let InjectMessage { node, msg } = *self;
        network_of(world).inject(node, msg, sim);
    }
}
