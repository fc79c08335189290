use std::any::Any;
use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{EvictionPolicy, Metadata, RoutingPolicy, evict_for};
use crate::net::{Message, MessageKey, NodeCtx, NodeId, PeerView};

/// Epidemic without vector exchange: a uniformly random buffered message that
/// was not yet sent during the current contact.
pub struct SimpleEpidemic {
    eviction: EvictionPolicy,
    sent: HashMap<NodeId, HashSet<MessageKey>>,
    in_flight: HashMap<NodeId, MessageKey>,
    rng: StdRng,
}

impl SimpleEpidemic {
    pub fn new(eviction: EvictionPolicy, seed: u64) -> Self {
        Self {
            eviction,
            sent: HashMap::new(),
            in_flight: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RoutingPolicy for SimpleEpidemic {
    fn name(&self) -> &'static str {
        "simple_epidemic"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn drop_messages(&mut self, ctx: &mut NodeCtx<'_>, incoming: &Message, _tx_node: Option<NodeId>) {
        evict_for(ctx, incoming.size, self.eviction, &mut self.rng);
    }

    fn on_contact_started(&mut self, _ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) {
        self.sent.insert(peer.id, HashSet::new());
    }

    fn next_message(&mut self, ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) -> Option<(Message, Metadata)> {
        let sent = self.sent.entry(peer.id).or_default();
        loop {
            let candidates: Vec<MessageKey> = ctx
                .core
                .buf
                .iter_edf()
                .map(|m| m.key())
                .filter(|k| !sent.contains(k))
                .collect();
            if candidates.is_empty() {
                return None;
            }
            let key = candidates[self.rng.gen_range(0..candidates.len())];
            let msg = ctx.core.buf.get(&key)?.clone();
            if msg.is_expired(ctx.now) {
                ctx.drop_message(&key);
                continue;
            }
            self.in_flight.insert(peer.id, key);
            return Some((msg, Metadata::None));
        }
    }

    fn cancel(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        self.in_flight.remove(&peer);
    }

    fn transmitted(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        if let Some(key) = self.in_flight.remove(&peer) {
            self.sent.entry(peer).or_default().insert(key);
        }
    }
}
