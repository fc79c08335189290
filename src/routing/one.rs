//! Variants following the ONE simulator's message selection.
//!
//! Direct deliveries go first. Otherwise a random buffered message is picked
//! among those the peer provably lacks, checked synchronously against the
//! peer's buffer and delivered set.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::spray_and_wait::{initial_tokens, settle_tokens};
use super::{EvictionPolicy, Metadata, RoutingPolicy, evict_for};
use crate::net::{Message, MessageKey, NodeCtx, NodeId, PeerView};

/// Selection state shared by both ONE flavours.
struct OneSelector {
    eviction: EvictionPolicy,
    offered: HashMap<NodeId, HashSet<MessageKey>>,
    rng: StdRng,
}

impl OneSelector {
    fn new(eviction: EvictionPolicy, seed: u64) -> Self {
        Self {
            eviction,
            offered: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pick the next key for `peer`; `relayable` filters non-direct candidates.
    fn select(
        &mut self,
        ctx: &mut NodeCtx<'_>,
        peer: &PeerView<'_>,
        relayable: impl Fn(&MessageKey) -> bool,
    ) -> Option<MessageKey> {
        let offered = self.offered.entry(peer.id).or_default();
        let mut expired = Vec::new();
        let mut direct = None;
        let mut others = Vec::new();
        for msg in ctx.core.buf.iter_edf() {
            let key = msg.key();
            if msg.is_expired(ctx.now) {
                expired.push(key);
                continue;
            }
            if peer.knows(&key) || offered.contains(&key) {
                continue;
            }
            if msg.destination == peer.id {
                if direct.is_none() {
                    direct = Some(key);
                }
            } else if relayable(&key) {
                others.push(key);
            }
        }
        for key in &expired {
            ctx.drop_message(key);
        }
        if direct.is_some() {
            return direct;
        }
        if others.is_empty() {
            return None;
        }
        Some(others[self.rng.gen_range(0..others.len())])
    }

    fn reset(&mut self, peer: NodeId) {
        self.offered.insert(peer, HashSet::new());
    }

    fn mark_sent(&mut self, peer: NodeId, key: MessageKey) {
        self.offered.entry(peer).or_default().insert(key);
    }
}

pub struct OneEpidemic {
    selector: OneSelector,
    in_flight: HashMap<NodeId, MessageKey>,
}

impl OneEpidemic {
    pub fn new(eviction: EvictionPolicy, seed: u64) -> Self {
        Self {
            selector: OneSelector::new(eviction, seed),
            in_flight: HashMap::new(),
        }
    }
}

impl RoutingPolicy for OneEpidemic {
    fn name(&self) -> &'static str {
        "one_epidemic"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn drop_messages(&mut self, ctx: &mut NodeCtx<'_>, incoming: &Message, _tx_node: Option<NodeId>) {
        evict_for(ctx, incoming.size, self.selector.eviction, &mut self.selector.rng);
    }

    fn on_contact_started(&mut self, _ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) {
        self.selector.reset(peer.id);
    }

    fn next_message(&mut self, ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) -> Option<(Message, Metadata)> {
        let key = self.selector.select(ctx, peer, |_| true)?;
        let msg = ctx.core.buf.get(&key)?.clone();
        self.in_flight.insert(peer.id, key);
        Some((msg, Metadata::None))
    }

    fn cancel(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        self.in_flight.remove(&peer);
    }

    fn transmitted(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        if let Some(key) = self.in_flight.remove(&peer) {
            self.selector.mark_sent(peer, key);
        }
    }
}

pub struct OneSprayAndWait {
    initial_copies: u32,
    selector: OneSelector,
    copies: HashMap<MessageKey, u32>,
    in_flight: HashMap<NodeId, (MessageKey, u32)>,
}

impl OneSprayAndWait {
    pub fn new(initial_copies: u32, eviction: EvictionPolicy, seed: u64) -> Self {
        Self {
            initial_copies: initial_copies.max(1),
            selector: OneSelector::new(eviction, seed),
            copies: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn copies(&self, key: &MessageKey) -> Option<u32> {
        self.copies.get(key).copied()
    }
}

impl RoutingPolicy for OneSprayAndWait {
    fn name(&self) -> &'static str {
        "one_spray_and_wait"
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
        for key in evict_for(ctx, incoming.size, self.selector.eviction, &mut self.selector.rng) {
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
        self.selector.reset(peer.id);
    }

    fn next_message(&mut self, ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) -> Option<(Message, Metadata)> {
        let copies = &self.copies;
        let key = self
            .selector
            .select(ctx, peer, |k| copies.get(k).is_some_and(|n| *n > 1))?;
        let msg = ctx.core.buf.get(&key)?.clone();
        let n = self.copies.get(&key).copied().unwrap_or(1);
        let handed = if msg.destination == peer.id { n } else { n / 2 };
        self.in_flight.insert(peer.id, (key, handed));
        Some((msg, Metadata::Copies(handed)))
    }

    fn cancel(&mut self, _ctx: &mut NodeCtx<'_>, peer: NodeId) {
        self.in_flight.remove(&peer);
    }

    fn transmitted(&mut self, ctx: &mut NodeCtx<'_>, peer: NodeId) {
        if let Some((key, handed)) = self.in_flight.remove(&peer) {
            self.selector.mark_sent(peer, key);
            settle_tokens(ctx, &mut self.copies, peer, key, handed);
        }
    }
}
