//! Routing policies.
//!
//! A [`RoutingPolicy`] is plugged into every [`SimNode`](crate::net::SimNode)
//! and decides what is stored, what is evicted and which message goes out next
//! on an active contact. Outbound traffic is pull-based: the contact session
//! calls [`RoutingPolicy::next_message`] and later reports the outcome through
//! [`RoutingPolicy::transmitted`] or [`RoutingPolicy::cancel`].

mod epidemic;
mod eviction;
mod one;
mod simple_epidemic;
mod spray_and_wait;

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::cgr::{SabrConfig, SabrPolicy};
use crate::net::{Message, NodeCtx, NodeId, PeerView};
use crate::topo::Ptvg;

pub use epidemic::{Epidemic, EpidemicConfig};
pub use eviction::{EvictionPolicy, drop_expired, evict_for};
pub use one::{OneEpidemic, OneSprayAndWait};
pub use simple_epidemic::SimpleEpidemic;
pub use spray_and_wait::SprayAndWait;

/// Per-transmission data handed from the sender's policy to the receiver's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metadata {
    #[default]
    None,
    /// Spray-and-wait copy tokens carried with the message.
    Copies(u32),
    /// Remaining forwarding hops (epidemic `max_hops`).
    HopsLeft(u32),
}

/// Timers a policy asks the node to fire at absolute times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyTimer {
    /// A predicted contact of this node ended.
    PredictedContactEnd { rx_node: NodeId, end_time: f64 },
    /// The contact graph snapshot valid from `valid_from` becomes active.
    GraphChange { valid_from: f64 },
}

pub trait RoutingPolicy: Send {
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Called for every received message before the admission checks.
    fn observe_reception(
        &mut self,
        _ctx: &mut NodeCtx<'_>,
        _msg: &Message,
        _from: NodeId,
        _metadata: &Metadata,
    ) {
    }

    /// Make room for `incoming`. The default only evicts expired messages.
    fn drop_messages(&mut self, ctx: &mut NodeCtx<'_>, _incoming: &Message, _tx_node: Option<NodeId>) {
        drop_expired(ctx);
    }

    /// Buffer the message and make it available for forwarding.
    fn store_and_schedule(
        &mut self,
        ctx: &mut NodeCtx<'_>,
        msg: Message,
        _tx_node: Option<NodeId>,
        _metadata: Metadata,
    ) {
        ctx.store(msg);
    }

    fn on_contact_started(&mut self, _ctx: &mut NodeCtx<'_>, _peer: &PeerView<'_>) {}

    fn on_contact_ended(&mut self, _ctx: &mut NodeCtx<'_>, _peer: NodeId) {}

    /// Next message to send to `peer`, or `None` to wait for new buffer content.
    fn next_message(&mut self, ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) -> Option<(Message, Metadata)>;

    /// The in-flight message to `peer` was not sent; requeue it.
    fn cancel(&mut self, ctx: &mut NodeCtx<'_>, peer: NodeId);

    /// The in-flight message to `peer` left the node.
    fn transmitted(&mut self, ctx: &mut NodeCtx<'_>, peer: NodeId);

    /// Absolute-time timers to arm when the node is added.
    fn timers(&self) -> Vec<(f64, PolicyTimer)> {
        Vec::new()
    }

    fn on_timer(&mut self, _ctx: &mut NodeCtx<'_>, _timer: PolicyTimer) {}
}

/// Routing configuration shared by all nodes of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingSpec {
    Epidemic(EpidemicConfig),
    SimpleEpidemic {
        #[serde(default)]
        eviction: EvictionPolicy,
    },
    SprayAndWait {
        #[serde(default = "default_copies")]
        initial_copies: u32,
        #[serde(default)]
        eviction: EvictionPolicy,
    },
    OneEpidemic {
        #[serde(default)]
        eviction: EvictionPolicy,
    },
    OneSprayAndWait {
        #[serde(default = "default_copies")]
        initial_copies: u32,
        #[serde(default)]
        eviction: EvictionPolicy,
    },
    Sabr(SabrConfig),
}

fn default_copies() -> u32 {
    8
}

impl RoutingSpec {
    /// Short name accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        let eviction = EvictionPolicy::default();
        Some(match name {
            "epidemic" => RoutingSpec::Epidemic(EpidemicConfig::default()),
            "simple_epidemic" => RoutingSpec::SimpleEpidemic { eviction },
            "spray_and_wait" => RoutingSpec::SprayAndWait {
                initial_copies: default_copies(),
                eviction,
            },
            "one_epidemic" => RoutingSpec::OneEpidemic { eviction },
            "one_spray_and_wait" => RoutingSpec::OneSprayAndWait {
                initial_copies: default_copies(),
                eviction,
            },
            "sabr" => RoutingSpec::Sabr(SabrConfig::default()),
            _ => return None,
        })
    }

    /// Instantiate the policy of node `node`. `seed` is mixed with the node id.
    pub fn build(&self, node: NodeId, ptvg: &Ptvg, seed: u64) -> Box<dyn RoutingPolicy> {
        let seed = seed ^ (node.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        match self {
            RoutingSpec::Epidemic(cfg) => Box::new(Epidemic::new(cfg.clone(), seed)),
            RoutingSpec::SimpleEpidemic { eviction } => Box::new(SimpleEpidemic::new(*eviction, seed)),
            RoutingSpec::SprayAndWait {
                initial_copies,
                eviction,
            } => Box::new(SprayAndWait::new(*initial_copies, *eviction, seed)),
            RoutingSpec::OneEpidemic { eviction } => Box::new(OneEpidemic::new(*eviction, seed)),
            RoutingSpec::OneSprayAndWait {
                initial_copies,
                eviction,
            } => Box::new(OneSprayAndWait::new(*initial_copies, *eviction, seed)),
            RoutingSpec::Sabr(cfg) => Box::new(SabrPolicy::new(node, ptvg, cfg.clone())),
        }
    }
}
