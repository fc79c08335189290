//! Binary spray-and-wait.
//!
//! A message starts with `initial_copies` tokens. Relaying hands over
//! `floor(n/2)` and keeps `ceil(n/2)`; the last token is only ever given to the
//! destination. Tokens received for a message already held accumulate.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{EvictionPolicy, Metadata, RoutingPolicy, evict_for};
use crate::net::{Message, MessageKey, NodeCtx, NodeId, PeerView};

pub struct SprayAndWait {
    initial_copies: u32,
    eviction: EvictionPolicy,
    copies: HashMap<MessageKey, u32>,
    /// (key, tokens handed over) per peer
    in_flight: HashMap<NodeId, (MessageKey, u32)>,
    /// Relayed during the current contact with each peer.
    relayed: HashMap<NodeId, HashSet<MessageKey>>,
    rng: StdRng,
}

impl SprayAndWait {
    pub fn new(initial_copies: u32, eviction: EvictionPolicy, seed: u64) -> Self {
        Self {
            initial_copies: initial_copies.max(1),
            eviction,
            copies: HashMap::new(),
            in_flight: HashMap::new(),
            relayed: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn copies(&self, key: &MessageKey) -> Option<u32> {
        self.copies.get(key).copied()
    }
}

/// Tokens held for a freshly stored message.
pub(super) fn initial_tokens(metadata: Metadata, initial: u32) -> u32 {
    match metadata {
        Metadata::Copies(n) => n.max(1),
        _ => initial,
    }
}

/// Post-transmission bookkeeping shared by the spray-and-wait flavours:
/// a direct delivery deletes the local copy, a relay keeps the remainder.
pub(super) fn settle_tokens(
    ctx: &mut NodeCtx<'_>,
    copies: &mut HashMap<MessageKey, u32>,
    peer: NodeId,
    key: MessageKey,
    handed: u32,
) {
    let direct = ctx.core.buf.get(&key).is_some_and(|m| m.destination == peer);
    if direct {
        copies.remove(&key);
        ctx.delete_message(&key);
    } else if let Some(n) = copies.get_mut(&key) {
        *n = n.saturating_sub(handed).max(1);
    }
}

impl RoutingPolicy for SprayAndWait {
    fn name(&self) -> &'static str {
        "spray_and_wait"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn observe_reception(
        &mut self,
        ctx: &mut NodeCtx<'_>,
        msg: &Message,
        _from: NodeId,
        metadata: &Metadata,
    ) {
        let key = msg.key();
        if !ctx.core.buf.contains(&key) {
            return;
        }
        if let (Metadata::Copies(n), Some(held)) = (metadata, self.copies.get_mut(&key)) {
            *held = held.saturating_add(*n);
        }
    }

    fn drop_messages(&mut self, ctx: &mut NodeCtx<'_>, incoming: &Message, _tx_node: Option<NodeId>) {
        for key in evict_for(ctx, incoming.size, self.eviction, &mut self.rng) {
            self.copies.remove(&key);
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
        if ctx.store(msg) {
            self.copies
                .insert(key, initial_tokens(metadata, self.initial_copies));
        }
    }

    fn on_contact_started(&mut self, _ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) {
        self.relayed.insert(peer.id, HashSet::new());
    }

    fn next_message(&mut self, ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) -> Option<(Message, Metadata)> {
        let relayed = self.relayed.entry(peer.id).or_default();
        let mut expired = Vec::new();
        let mut relay = None;
        let mut direct = None;
        for msg in ctx.core.buf.iter_edf() {
            let key = msg.key();
            if msg.is_expired(ctx.now) {
                expired.push(key);
                continue;
            }
            if peer.knows(&key) || relayed.contains(&key) {
                continue;
            }
            let n = self.copies.get(&key).copied().unwrap_or(1);
            if msg.destination == peer.id {
                direct = Some((key, n));
                break;
            }
            if n > 1 && relay.is_none() {
                relay = Some((key, n / 2));
            }
        }
        for key in &expired {
            ctx.drop_message(key);
            self.copies.remove(key);
        }

        let (key, handed) = direct.or(relay)?;
        let msg = ctx.core.buf.get(&key)?.clone();
        self.in_flight.insert(peer.id, (key, handed));
        Some((msg, Metadata::Copies(handed)))
    }

    fn cancel(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        self.in_flight.remove(&peer);
    }

    fn transmitted(&mut self, ctx: &mut NodeCtx<'_>, peer: NodeId) {
        if let Some((key, handed)) = self.in_flight.remove(&peer) {
            self.relayed.entry(peer).or_default().insert(key);
            settle_tokens(ctx, &mut self.copies, peer, key, handed);
        }
    }
}
