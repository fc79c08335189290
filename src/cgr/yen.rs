//! Yen's k-shortest paths on top of [`tvdijkstra`].
//!
//! Path cost is the arrival time at the destination. Spur searches start at
//! the arrival time of the root path at the spur node, so the time-varying
//! semantics of the root are kept.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use tracing::trace;

use super::dijkstra::tvdijkstra;
use super::generator::RouteGenerator;
use super::graph::ContactGraph;
use crate::net::{Contact, NodeId};

#[derive(Debug, Clone)]
struct KnownPath {
    contacts: Vec<Contact>,
    /// Arrival time at the receiver of each contact.
    arrivals: Vec<f64>,
}

impl KnownPath {
    fn arrival(&self) -> f64 {
        self.arrivals.last().copied().unwrap_or(f64::INFINITY)
    }
}

struct Candidate {
    arrival: f64,
    hops: usize,
    seq: u64,
    path: KnownPath,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    // reversed for a min-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .arrival
            .total_cmp(&self.arrival)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct YenRouteGenerator {
    graph: Arc<ContactGraph>,
    source: NodeId,
    dest: NodeId,
    start_time: f64,
    excluded: HashSet<NodeId>,
    max_routes: usize,
    accepted: Vec<KnownPath>,
    candidates: BinaryHeap<Candidate>,
    seen: HashSet<Vec<Contact>>,
    next_seq: u64,
    started: bool,
}

impl YenRouteGenerator {
    pub fn new(
        graph: Arc<ContactGraph>,
        source: NodeId,
        dest: NodeId,
        start_time: f64,
        excluded: &[NodeId],
        max_routes: usize,
    ) -> Self {
        Self {
            graph,
            source,
            dest,
            start_time,
            excluded: excluded.iter().copied().collect(),
            max_routes,
            accepted: Vec::new(),
            candidates: BinaryHeap::new(),
            seen: HashSet::new(),
            next_seq: 0,
            started: false,
        }
    }

    fn shortest_path(
        &self,
        from: NodeId,
        at: f64,
        node_blacklist: &HashSet<NodeId>,
        contact_blacklist: &HashSet<Contact>,
    ) -> Option<KnownPath> {
        let result = tvdijkstra(
            &self.graph,
            from,
            Some(self.dest),
            at,
            node_blacklist,
            contact_blacklist,
        );
        let info = result.path(self.dest)?;
        if info.contacts.is_empty() {
            return None;
        }
        Some(KnownPath {
            arrivals: info.arrival_times[1..].to_vec(),
            contacts: info.contacts,
        })
    }

    /// Push every spur deviation of the most recently accepted path.
    fn expand_last(&mut self) {
        let Some(last) = self.accepted.last().cloned() else {
            return;
        };
        for i in 0..last.contacts.len() {
            let root = &last.contacts[..i];
            let (spur_node, spur_time) = match i {
                0 => (self.source, self.start_time),
                _ => (last.contacts[i - 1].rx_node, last.arrivals[i - 1]),
            };

            let mut contact_blacklist: HashSet<Contact> = root.iter().copied().collect();
            for known in &self.accepted {
                if known.contacts.len() > i && &known.contacts[..i] == root {
                    contact_blacklist.insert(known.contacts[i]);
                }
            }
            let mut node_blacklist = self.excluded.clone();
            node_blacklist.insert(self.source);
            node_blacklist.extend(root.iter().map(|c| c.rx_node));
            node_blacklist.remove(&spur_node);

            let Some(spur) = self.shortest_path(spur_node, spur_time, &node_blacklist, &contact_blacklist)
            else {
                continue;
            };
            let mut contacts = root.to_vec();
            contacts.extend_from_slice(&spur.contacts);
            if !self.seen.insert(contacts.clone()) {
                continue;
            }
            let mut arrivals = last.arrivals[..i].to_vec();
            arrivals.extend_from_slice(&spur.arrivals);
            let path = KnownPath { contacts, arrivals };
            let seq = self.next_seq;
            self.next_seq += 1;
            self.candidates.push(Candidate {
                arrival: path.arrival(),
                hops: path.contacts.len(),
                seq,
                path,
            });
        }
    }
}

impl RouteGenerator for YenRouteGenerator {
    fn next_route(&mut self) -> Option<Vec<Contact>> {
        if self.accepted.len() >= self.max_routes {
            return None;
        }
        if !self.started {
            self.started = true;
            let path = self.shortest_path(self.source, self.start_time, &self.excluded, &HashSet::new())?;
            self.seen.insert(path.contacts.clone());
            self.accepted.push(path.clone());
            return Some(path.contacts);
        }
        self.expand_last();
        let best = self.candidates.pop()?.path;
        trace!(k = self.accepted.len(), arrival = best.arrival(), "yen accepted path");
        self.accepted.push(best.clone());
        Some(best.contacts)
    }
}
