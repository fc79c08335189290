//! DTN 网络模块
//!
//! 此模块包含网络仿真的核心组件：契约、消息、缓冲区、信道、链路、节点与网络。

// 子模块声明
mod id;
mod contact;
mod message;
mod buffer;
mod channel;
mod dispatcher;
mod link;
mod session;
mod node;
mod stats;
mod network;
mod events;
mod deliver_message;
mod net_world;

// 重新导出公共接口
pub use id::NodeId;
pub use contact::Contact;
pub use message::{Message, MessageKey};
pub use buffer::Buffer;
pub use channel::{Blocker, ChannelGrant, ChannelSlots, NodeChannels, acquire_pair, release_pair};
pub use dispatcher::{EventDispatcher, EventKind, SimEvent, Subscriber};
pub use link::{BlockRedundancyLink, EffectiveRateLink, IdealLink, Link, LinkModel, TxPlan};
pub use session::SessionId;
pub use node::{NodeCore, NodeCtx, PeerView, RouteOutcome, SimNode};
pub use stats::Stats;
pub use network::{Network, NodeOptions};
pub use events::{
    ContactEnd, ContactStart, PolicyTimerFired, PumpSession, RetryChannel, TransmissionDone,
    TransmissionFailed,
};
pub use deliver_message::{DeliverMessage, InjectMessage};
pub use net_world::DtnWorld;
