//! Time-varying Dijkstra over a [`ContactGraph`].
//!
//! The metric is the earliest arrival time. For a node reached at time `t`
//! only the first contact of each outgoing edge that is usable at `t` is
//! relaxed: edges are sorted by start time, so any later contact cannot
//! yield an earlier arrival.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::graph::ContactGraph;
use crate::net::{Contact, NodeId};

/// Arrival times closer than this are considered equal; the tie goes to
/// the path with fewer hops.
pub const EAT_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy)]
struct Label {
    eat: f64,
    hops: usize,
    node: NodeId,
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl Ord for Label {
    // reversed: BinaryHeap pops the smallest label first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .eat
            .total_cmp(&self.eat)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Path reconstructed from a [`DijkstraResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct PathInfo {
    pub hops: usize,
    /// Source first, destination last.
    pub nodes: Vec<NodeId>,
    pub contacts: Vec<Contact>,
    /// Arrival time at each entry of `nodes`; the first is the start time.
    pub arrival_times: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct DijkstraResult {
    pub source: NodeId,
    pub start_time: f64,
    eat: HashMap<NodeId, f64>,
    hops: HashMap<NodeId, usize>,
    pred: HashMap<NodeId, (NodeId, Contact)>,
}

impl DijkstraResult {
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.eat.contains_key(&node)
    }

    /// (earliest arrival time, hop count) at `node`.
    pub fn metrics(&self, node: NodeId) -> Option<(f64, usize)> {
        Some((*self.eat.get(&node)?, *self.hops.get(&node)?))
    }

    pub fn path(&self, node: NodeId) -> Option<PathInfo> {
        if !self.is_reachable(node) {
            return None;
        }
        let mut nodes = vec![node];
        let mut contacts = Vec::new();
        let mut cur = node;
        while let Some((prev, contact)) = self.pred.get(&cur) {
            contacts.push(*contact);
            nodes.push(*prev);
            cur = *prev;
        }
        nodes.reverse();
        contacts.reverse();
        let arrival_times = nodes.iter().map(|n| self.eat[n]).collect();
        Some(PathInfo {
            hops: contacts.len(),
            nodes,
            contacts,
            arrival_times,
        })
    }
}

/// Earliest-arrival search from `source` starting at `start_time`.
///
/// Stops early once `dest` is settled. Blacklisted nodes are never entered
/// and blacklisted contacts never used.
pub fn tvdijkstra(
    graph: &ContactGraph,
    source: NodeId,
    dest: Option<NodeId>,
    start_time: f64,
    node_blacklist: &HashSet<NodeId>,
    contact_blacklist: &HashSet<Contact>,
) -> DijkstraResult {
    let mut result = DijkstraResult {
        source,
        start_time,
        eat: HashMap::from([(source, start_time)]),
        hops: HashMap::from([(source, 0)]),
        pred: HashMap::new(),
    };
    let mut settled: HashSet<NodeId> = HashSet::new();
    let mut heap = BinaryHeap::from([Label {
        eat: start_time,
        hops: 0,
        node: source,
    }]);

    while let Some(Label { eat, hops, node }) = heap.pop() {
        if !settled.insert(node) {
            continue;
        }
        if dest == Some(node) {
            break;
        }
        for (neighbor, contacts) in graph.neighbors(node) {
            let neighbor = *neighbor;
            if neighbor == source || settled.contains(&neighbor) || node_blacklist.contains(&neighbor) {
                continue;
            }
            let Some(contact) = contacts
                .iter()
                .find(|c| c.end_time > eat && c.bit_rate > 0.0 && !contact_blacklist.contains(c))
            else {
                continue;
            };
            let arrival = contact.start_time.max(eat) + contact.delay;
            let new_hops = hops + 1;
            let better = match result.eat.get(&neighbor) {
                None => true,
                Some(&cur) => {
                    arrival < cur
                        || ((arrival - cur).abs() < EAT_EPSILON && new_hops < result.hops[&neighbor])
                }
            };
            if better {
                result.eat.insert(neighbor, arrival);
                result.hops.insert(neighbor, new_hops);
                result.pred.insert(neighbor, (node, *contact));
                heap.push(Label {
                    eat: arrival,
                    hops: new_hops,
                    node: neighbor,
                });
            }
        }
    }
    result
}
