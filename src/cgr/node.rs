//! SABR routing policy.
//!
//! Every node keeps one contact graph snapshot per validity interval, a queue
//! per (neighbor, contact end) holding the bundles booked for that contact,
//! and per-contact volume usage counters. Bundles are routed when stored and
//! re-routed when their contact ends before they were sent or when a new
//! snapshot shrinks the volume they were booked on.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::generator::RouteGeneratorKind;
use super::graph::{SabrGraphData, StartTimeBasedDict};
use super::route::Route;
use super::sabr::{
    RoutingRequest, SabrAlgorithm, VolumeView, candidate_routes, estimated_volume_consumption,
};
use crate::net::{Contact, Message, MessageKey, NodeCtx, NodeId, PeerView};
use crate::routing::{Metadata, PolicyTimer, RoutingPolicy, drop_expired};
use crate::topo::Ptvg;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SabrConfig {
    /// Cap on the routes examined per decision; unbounded if `None`.
    pub max_routes: Option<usize>,
    /// Number of candidate routes compared per decision.
    pub max_order_routes: usize,
    /// Re-route bundles still queued when their contact ends.
    pub re_schedule_delayed: bool,
    /// Re-route bundles booked on contacts whose predicted volume shrank.
    pub re_schedule_overbooked: bool,
    /// Reject received bundles that this node already forwarded.
    pub reject_looping: bool,
    /// Only consider the best route for bundles this node already forwarded.
    pub no_alt_for_looping: bool,
    /// Generation changes closer than this (seconds) share one snapshot.
    pub graph_update_min_interval: f64,
    pub generator: RouteGeneratorKind,
    pub algorithm: SabrAlgorithm,
}

impl Default for SabrConfig {
    fn default() -> Self {
        Self {
            max_routes: None,
            max_order_routes: 6,
            re_schedule_delayed: true,
            re_schedule_overbooked: true,
            reject_looping: false,
            no_alt_for_looping: false,
            graph_update_min_interval: 0.0,
            generator: RouteGeneratorKind::default(),
            algorithm: SabrAlgorithm::default(),
        }
    }
}

/// Predicted and booked volume of one contact (bits).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cvu {
    pub predicted: f64,
    pub used: f64,
}

/// Volume bookkeeping: contact usage keyed by (tx, rx, end time) and the
/// volume queued towards each neighbor.
#[derive(Debug, Default)]
pub struct VolumeLedger {
    cvu: HashMap<(NodeId, NodeId), HashMap<u64, Cvu>>,
    queue_volumes: HashMap<NodeId, f64>,
}

impl VolumeLedger {
    pub fn cvu(&self, contact: &Contact) -> Option<Cvu> {
        self.cvu
            .get(&(contact.tx_node, contact.rx_node))?
            .get(&contact.end_time.to_bits())
            .copied()
    }

    fn cvu_mut(&mut self, contact: &Contact) -> &mut Cvu {
        self.cvu
            .entry((contact.tx_node, contact.rx_node))
            .or_default()
            .entry(contact.end_time.to_bits())
            .or_insert(Cvu {
                predicted: contact.volume(),
                used: 0.0,
            })
    }

    /// Add `delta` bits to the usage of every contact on the path.
    pub fn update_cvu(&mut self, path: &[Contact], delta: f64) {
        for c in path {
            let cvu = self.cvu_mut(c);
            cvu.used += delta;
            debug_assert!(cvu.used >= -1e-6, "contact volume usage went negative");
        }
    }

    fn add_queue_volume(&mut self, neighbor: NodeId, delta: f64) {
        *self.queue_volumes.entry(neighbor).or_default() += delta;
    }
}

impl VolumeView for VolumeLedger {
    fn tx_queue_volume(&self, neighbor: NodeId) -> f64 {
        self.queue_volumes.get(&neighbor).copied().unwrap_or(0.0)
    }

    fn max_transmission_volume(&self, contact: &Contact) -> f64 {
        match self.cvu(contact) {
            Some(cvu) if cvu.used > cvu.predicted => 0.0,
            Some(cvu) => cvu.predicted - cvu.used,
            None => contact.volume(),
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedBundle {
    message: Message,
    route: Route,
    /// Matches [`Scheduling::ticket`] while this booking is current.
    ticket: u64,
}

#[derive(Debug)]
struct TxQueue {
    end_time: f64,
    bundles: VecDeque<QueuedBundle>,
}

#[derive(Debug, Clone, Copy)]
struct Scheduling {
    refcount: usize,
    ticket: u64,
}

pub struct SabrPolicy {
    eid: NodeId,
    cfg: SabrConfig,
    cgr_data: StartTimeBasedDict<SabrGraphData>,
    tx_queues: BTreeMap<NodeId, Vec<TxQueue>>,
    ledger: VolumeLedger,
    sched: HashMap<MessageKey, Scheduling>,
    next_ticket: u64,
    known_bundles: HashSet<MessageKey>,
    last_forwarder: HashMap<MessageKey, NodeId>,
    in_flight: HashMap<NodeId, (f64, QueuedBundle)>,
    timers: Vec<(f64, PolicyTimer)>,
}

impl SabrPolicy {
    pub fn new(eid: NodeId, ptvg: &Ptvg, cfg: SabrConfig) -> Self {
        let cgr_data = snapshots(ptvg, cfg.graph_update_min_interval, eid);

        let mut tx_queues: BTreeMap<NodeId, Vec<TxQueue>> = BTreeMap::new();
        let mut timers = Vec::new();
        for (rx, contacts) in ptvg.outgoing(eid) {
            tx_queues.insert(
                *rx,
                contacts
                    .iter()
                    .map(|c| TxQueue {
                        end_time: c.end_time,
                        bundles: VecDeque::new(),
                    })
                    .collect(),
            );
            for c in contacts {
                timers.push((
                    c.end_time,
                    PolicyTimer::PredictedContactEnd {
                        rx_node: *rx,
                        end_time: c.end_time,
                    },
                ));
            }
        }
        for valid_from in cgr_data.keys().skip(1) {
            timers.push((valid_from, PolicyTimer::GraphChange { valid_from }));
        }

        let mut ledger = VolumeLedger::default();
        if let Some(first) = cgr_data.get_entry_for(0.0) {
            for c in &first.contact_plan {
                ledger.cvu_mut(c);
            }
        }
        debug!(node = %eid, snapshots = cgr_data.len(), neighbors = tx_queues.len(), "sabr policy ready");

        Self {
            eid,
            cfg,
            cgr_data,
            tx_queues,
            ledger,
            sched: HashMap::new(),
            next_ticket: 0,
            known_bundles: HashSet::new(),
            last_forwarder: HashMap::new(),
            in_flight: HashMap::new(),
            timers,
        }
    }

    pub fn config(&self) -> &SabrConfig {
        &self.cfg
    }

    pub fn ledger(&self) -> &VolumeLedger {
        &self.ledger
    }

    pub fn cvu(&self, contact: &Contact) -> Option<Cvu> {
        self.ledger.cvu(contact)
    }

    pub fn update_cvu(&mut self, path: &[Contact], delta: f64) {
        self.ledger.update_cvu(path, delta);
    }

    /// Number of live routes booked for `key`.
    pub fn refcount(&self, key: &MessageKey) -> usize {
        self.sched.get(key).map_or(0, |s| s.refcount)
    }

    /// Bundles queued towards `neighbor`, over all of its contacts.
    pub fn queued_towards(&self, neighbor: NodeId) -> usize {
        self.tx_queues
            .get(&neighbor)
            .map_or(0, |qs| qs.iter().map(|q| q.bundles.len()).sum())
    }

    pub fn is_known(&self, key: &MessageKey) -> bool {
        self.known_bundles.contains(key)
    }

    pub fn snapshot_count(&self) -> usize {
        self.cgr_data.len()
    }

    fn track_looping(&self) -> bool {
        self.cfg.reject_looping || self.cfg.no_alt_for_looping
    }

    fn is_live(&self, ctx: &NodeCtx<'_>, entry: &QueuedBundle) -> bool {
        let key = entry.message.key();
        self.sched.get(&key).is_some_and(|s| s.ticket == entry.ticket) && ctx.core.buf.contains(&key)
    }

    fn queue_mut(&mut self, neighbor: NodeId, end_time: f64) -> &mut TxQueue {
        let queues = self.tx_queues.entry(neighbor).or_default();
        let idx = match queues.iter().position(|q| q.end_time == end_time) {
            Some(idx) => idx,
            None => {
                let idx = queues.partition_point(|q| q.end_time < end_time);
                queues.insert(
                    idx,
                    TxQueue {
                        end_time,
                        bundles: VecDeque::new(),
                    },
                );
                idx
            }
        };
        &mut queues[idx]
    }

    fn enqueue(&mut self, message: &Message, route: Route, ticket: u64) {
        let evc = estimated_volume_consumption(message.size);
        let first = *route.first_contact();
        self.ledger.update_cvu(&route.contact_path, evc);
        self.ledger.add_queue_volume(first.rx_node, evc);
        self.queue_mut(first.rx_node, first.end_time)
            .bundles
            .push_back(QueuedBundle {
                message: message.clone(),
                route,
                ticket,
            });
    }

    /// Undo the queue and contact volume booked by one queue entry.
    fn release(&mut self, entry: &QueuedBundle) {
        let evc = estimated_volume_consumption(entry.message.size);
        self.ledger.add_queue_volume(entry.route.neighbor_eid, -evc);
        self.ledger.update_cvu(&entry.route.contact_path, -evc);
    }

    fn forget(&mut self, key: &MessageKey) {
        self.sched.remove(key);
        self.last_forwarder.remove(key);
    }

    /// Route `msg` and book it on every selected route; reject if none.
    #[tracing::instrument(skip_all, fields(node = %self.eid, dst = %msg.destination))]
    fn schedule_bundle(
        &mut self,
        ctx: &mut NodeCtx<'_>,
        msg: Message,
        tx_node: Option<NodeId>,
        excluded: &[NodeId],
    ) {
        let key = msg.key();
        if self.refcount(&key) > 0 {
            trace!("already scheduled");
            ctx.reject(&msg);
            return;
        }
        let known = self.known_bundles.contains(&key);
        if tx_node.is_some() && self.cfg.reject_looping && known {
            trace!("looping bundle rejected");
            ctx.reject(&msg);
            return;
        }
        let order = if self.cfg.no_alt_for_looping && known {
            1
        } else {
            self.cfg.max_order_routes
        };

        let Some(gd) = self.cgr_data.get_entry_and_drop_predecessors(ctx.now) else {
            ctx.reject(&msg);
            return;
        };
        let req = RoutingRequest {
            bundle: &msg,
            cur_eid: self.eid,
            cur_time: ctx.now,
            excluded,
            max_routes: self.cfg.max_routes,
        };
        let candidates = candidate_routes(gd, self.cfg.generator, req, &self.ledger);
        let routes = self.cfg.algorithm.select(candidates, order);

        if routes.is_empty() {
            debug!("no route found");
            ctx.reject(&msg);
            return;
        }
        if !ctx.store(msg.clone()) {
            return;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.sched.insert(
            key,
            Scheduling {
                refcount: routes.len(),
                ticket,
            },
        );
        for route in routes {
            trace!(neighbor = %route.neighbor_eid, hops = route.hops(), "bundle booked");
            self.enqueue(&msg, route, ticket);
        }
    }

    /// One transmitted copy; the message is deleted once every copy is out.
    fn drop_copy(&mut self, ctx: &mut NodeCtx<'_>, key: &MessageKey) {
        let Some(s) = self.sched.get_mut(key) else {
            return;
        };
        s.refcount = s.refcount.saturating_sub(1);
        if s.refcount == 0 {
            self.forget(key);
            ctx.delete_message(key);
        }
    }

    /// Route a queued bundle again, as if it had just been received.
    fn re_schedule(&mut self, ctx: &mut NodeCtx<'_>, entry: QueuedBundle) {
        self.release(&entry);
        if !self.is_live(ctx, &entry) {
            return;
        }
        let key = entry.message.key();
        let remaining = match self.sched.get_mut(&key) {
            Some(s) => {
                s.refcount = s.refcount.saturating_sub(1);
                s.refcount
            }
            None => return,
        };

        if ctx.now > entry.message.deadline {
            if remaining == 0 {
                self.forget(&key);
                ctx.drop_message(&key);
            }
            return;
        }
        // other copies are still booked
        if remaining > 0 {
            return;
        }

        let excluded: Vec<NodeId> = self.last_forwarder.get(&key).copied().into_iter().collect();
        self.sched.remove(&key);
        let Ok(msg) = ctx.core.buf.remove(&key) else {
            return;
        };
        debug!(node = %self.eid, ?key, "re-scheduling bundle");
        self.schedule_bundle(ctx, msg, None, &excluded);
        if self.refcount(&key) == 0 {
            self.last_forwarder.remove(&key);
        }
    }

    fn predicted_contact_ended(&mut self, ctx: &mut NodeCtx<'_>, rx_node: NodeId, end_time: f64) {
        if !self.cfg.re_schedule_delayed {
            return;
        }
        let mut flushed = Vec::new();
        if let Some(queues) = self.tx_queues.get_mut(&rx_node) {
            for q in queues.iter_mut().filter(|q| q.end_time <= end_time) {
                flushed.extend(q.bundles.drain(..));
            }
        }
        if !flushed.is_empty() {
            info!(node = %self.eid, peer = %rx_node, bundles = flushed.len(), "contact ended with bundles queued");
        }
        for entry in flushed {
            self.re_schedule(ctx, entry);
        }
    }

    fn graph_changed(&mut self, ctx: &mut NodeCtx<'_>, valid_from: f64) {
        let Some(gd) = self.cgr_data.get_entry_for(valid_from) else {
            return;
        };
        let start = gd.start_time;
        let plan = gd.contact_plan.clone();
        info!(node = %self.eid, start, contacts = plan.len(), "contact graph changed");

        for c in plan.iter().filter(|c| c.start_time >= start) {
            self.ledger.cvu_mut(c).predicted = c.volume();
        }
        if !self.cfg.re_schedule_overbooked {
            return;
        }
        let (now, eid) = (ctx.now, self.eid);
        for c in plan.iter().filter(|c| c.start_time > now && c.tx_node == eid) {
            let cvu = *self.ledger.cvu_mut(c);
            if cvu.used <= cvu.predicted {
                continue;
            }
            let mut excess = cvu.used - cvu.predicted;
            while excess > 0.0 {
                let Some(entry) = self.queue_mut(c.rx_node, c.end_time).bundles.pop_back() else {
                    break;
                };
                excess -= estimated_volume_consumption(entry.message.size);
                self.re_schedule(ctx, entry);
            }
        }
    }
}

/// Snapshots keyed by their validity start; generation changes closer than
/// `min_interval` to the previous snapshot are folded into it.
fn snapshots(ptvg: &Ptvg, min_interval: f64, eid: NodeId) -> StartTimeBasedDict<SabrGraphData> {
    let mut keys: Vec<f64> = Vec::new();
    for t in ptvg.generation_change_times() {
        match keys.last() {
            Some(last) if t - last < min_interval => {}
            _ => keys.push(t),
        }
    }
    if keys.is_empty() {
        keys.push(0.0);
    }
    let mut dict = StartTimeBasedDict::new();
    for t in keys {
        dict.insert(t, SabrGraphData::new(t, ptvg.to_contact_plan_at(t), eid));
    }
    dict
}

impl RoutingPolicy for SabrPolicy {
    fn name(&self) -> &'static str {
        "sabr"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn drop_messages(&mut self, ctx: &mut NodeCtx<'_>, _incoming: &Message, _tx_node: Option<NodeId>) {
        for key in drop_expired(ctx) {
            self.forget(&key);
        }
    }

    fn store_and_schedule(
        &mut self,
        ctx: &mut NodeCtx<'_>,
        msg: Message,
        tx_node: Option<NodeId>,
        _metadata: Metadata,
    ) {
        let key = msg.key();
        let excluded: Vec<NodeId> = tx_node.into_iter().collect();
        self.schedule_bundle(ctx, msg, tx_node, &excluded);
        if let Some(from) = tx_node {
            if self.refcount(&key) > 0 {
                self.last_forwarder.insert(key, from);
            }
        }
    }

    fn next_message(&mut self, ctx: &mut NodeCtx<'_>, peer: &PeerView<'_>) -> Option<(Message, Metadata)> {
        loop {
            let (end_time, entry) = self
                .tx_queues
                .get_mut(&peer.id)?
                .iter_mut()
                .find_map(|q| q.bundles.pop_front().map(|e| (q.end_time, e)))?;
            if !self.is_live(ctx, &entry) {
                self.release(&entry);
                continue;
            }
            let key = entry.message.key();
            if entry.message.is_expired(ctx.now) {
                self.release(&entry);
                self.forget(&key);
                ctx.drop_message(&key);
                continue;
            }
            let msg = ctx.core.buf.get(&key)?.clone();
            self.in_flight.insert(peer.id, (end_time, entry));
            return Some((msg, Metadata::None));
        }
    }

    fn cancel(&mut self, ctx: &mut NodeCtx<'_>, peer: NodeId) {
        let Some((end_time, entry)) = self.in_flight.remove(&peer) else {
            return;
        };
        // the queue of an ended contact was already flushed
        if end_time <= ctx.now && self.cfg.re_schedule_delayed {
            self.re_schedule(ctx, entry);
        } else {
            self.queue_mut(peer, end_time).bundles.push_front(entry);
        }
    }

    fn transmitted(&mut self, ctx: &mut NodeCtx<'_>, peer: NodeId) {
        let Some((_, entry)) = self.in_flight.remove(&peer) else {
            return;
        };
        let evc = estimated_volume_consumption(entry.message.size);
        self.ledger.add_queue_volume(peer, -evc);
        let key = entry.message.key();
        if self.is_live(ctx, &entry) {
            self.drop_copy(ctx, &key);
        }
        if self.track_looping() {
            self.known_bundles.insert(key);
        }
    }

    fn timers(&self) -> Vec<(f64, PolicyTimer)> {
        self.timers.clone()
    }

    fn on_timer(&mut self, ctx: &mut NodeCtx<'_>, timer: PolicyTimer) {
        match timer {
            PolicyTimer::PredictedContactEnd { rx_node, end_time } => {
                self.predicted_contact_ended(ctx, rx_node, end_time)
            }
            PolicyTimer::GraphChange { valid_from } => self.graph_changed(ctx, valid_from),
        }
    }
}
