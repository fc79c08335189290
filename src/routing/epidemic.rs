//! Epidemic routing with summary vectors.
//!
//! At contact start the node takes the peer's summary vector (buffered plus
//! delivered keys) and only offers messages missing from it.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{EvictionPolicy, Metadata, RoutingPolicy, evict_for};
use crate::net::{Message, MessageKey, NodeCtx, NodeId, PeerView};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpidemicConfig {
    /// Forwarding hops a message may take; `None` is unlimited.
    pub max_hops: Option<u32>,
    /// Offer messages destined to the peer before anything else.
    pub prioritize_direct: bool,
    /// `true`: the sent-set is reset at every contact start.
    /// `false`: what was sent to a peer is remembered for the whole run.
    pub send_once_per_contact: bool,
    pub eviction: EvictionPolicy,
}

impl Default for EpidemicConfig {
    fn default() -> Self {
        Self {
            max_hops: None,
            prioritize_direct: true,
            send_once_per_contact: true,
            eviction: EvictionPolicy::default(),
        }
    }
}

pub struct Epidemic {
    cfg: EpidemicConfig,
    hops_left: HashMap<MessageKey, u32>,
    /// Keys the peer is known to hold or to have been sent.
    known: HashMap<NodeId, HashSet<MessageKey>>,
    in_flight: HashMap<NodeId, MessageKey>,
    rng: StdRng,
}

impl Epidemic {
    pub fn new(cfg: EpidemicConfig, seed: u64) -> Self {
        Self {
            cfg,
            hops_left: HashMap::new(),
            known: HashMap::new(),
            in_flight: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn hops_left(&self, key: &MessageKey) -> Option<u32> {
        self.hops_left.get(key).copied()
    }
}

impl RoutingPolicy for Epidemic {
    fn name(&self) -> &'static str {
        "epidemic"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn drop_messages(&mut self, ctx: &mut NodeCtx<'_>, incoming: &Message, _tx_node: Option<NodeId>) {
        for key in evict_for(ctx, incoming.size, self.cfg.eviction, &mut self.rng) {
            self.hops_left.remove(&key);
        }
    }

    fn store_and_schedule(
        &mut self,
        ctx: &mut NodeCtx<'_>,
        msg: Message,
        _tx_node: Option<NodeId>,
        metadata: Metadata,
    ) {
        let key = msg.key();
        let hops = match metadata {
            Metadata::HopsLeft(h) => Some(h),
            _ => self.cfg.max_hops,
        };
        if ctx.store(msg) {
            if let Some(h) = hops {
                self.hops_left.insert(key, h);
            }
        }
    }

    fn on_contact_started(&mut self, _ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) {
        let summary = peer.summary_vector();
        let known = self.known.entry(peer.id).or_default();
        if self.cfg.send_once_per_contact {
            *known = summary;
        } else {
            known.extend(summary);
        }
    }

    fn next_message(&mut self, ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) -> Option<(Message, Metadata)> {
        let known = self.known.entry(peer.id).or_default();
        let mut expired = Vec::new();
        let mut first = None;
        let mut direct = None;
        for msg in ctx.core.buf.iter_edf() {
            let key = msg.key();
            if known.contains(&key) {
                continue;
            }
            if msg.is_expired(ctx.now) {
                expired.push(key);
                continue;
            }
            let is_direct = msg.destination == peer.id;
            if !is_direct && self.hops_left.get(&key).is_some_and(|h| *h == 0) {
                continue;
            }
            if is_direct && self.cfg.prioritize_direct {
                direct = Some(key);
                break;
            }
            if first.is_none() {
                first = Some(key);
                if !self.cfg.prioritize_direct {
                    break;
                }
            }
        }
        for key in &expired {
            ctx.drop_message(key);
            self.hops_left.remove(key);
        }

        let key = direct.or(first)?;
        let msg = ctx.core.buf.get(&key)?.clone();
        let metadata = match self.hops_left.get(&key) {
            Some(h) => Metadata::HopsLeft(h.saturating_sub(1)),
            None => Metadata::None,
        };
        trace!(peer = %peer.id, ?key, "epidemic offer");
        self.in_flight.insert(peer.id, key);
        Some((msg, metadata))
    }

    fn cancel(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        self.in_flight.remove(&peer);
    }

    fn transmitted(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        if let Some(key) = self.in_flight.remove(&peer) {
            self.known.entry(peer).or_default().insert(key);
        }
    }
}
