//! Route generators: produce successive contact paths towards one destination.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::dijkstra::tvdijkstra;
use super::graph::ContactGraph;
use super::yen::YenRouteGenerator;
use crate::net::{Contact, NodeId};

/// Lazily yields contact paths, best first as far as the method allows.
pub trait RouteGenerator: Send {
    fn next_route(&mut self) -> Option<Vec<Contact>>;
}

/// Which contact of a found path is blacklisted to look for the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitingCriterion {
    EarliestEnding,
    LeastProbable,
    SmallestVolume,
}

impl LimitingCriterion {
    /// The limiting contact of `path`; the first one wins ties.
    pub fn limiting_contact(self, path: &[Contact]) -> Option<Contact> {
        let key = |c: &Contact| match self {
            LimitingCriterion::EarliestEnding => c.end_time,
            LimitingCriterion::LeastProbable => c.probability(),
            LimitingCriterion::SmallestVolume => c.volume(),
        };
        path.iter()
            .copied()
            .reduce(|best, c| if key(&c) < key(&best) { c } else { best })
    }
}

/// Sequential elimination: rerun Dijkstra, each time blacklisting the
/// limiting contact of the previous path. With several criteria every found
/// path spawns one blacklist per criterion, explored breadth-first.
pub struct EliminationRouteGenerator {
    graph: Arc<ContactGraph>,
    source: NodeId,
    dest: NodeId,
    start_time: f64,
    excluded: HashSet<NodeId>,
    criteria: Vec<LimitingCriterion>,
    pending: VecDeque<Vec<Contact>>,
    seen_blacklists: HashSet<Vec<Contact>>,
    seen_paths: HashSet<Vec<Contact>>,
}

impl EliminationRouteGenerator {
    pub fn new(
        graph: Arc<ContactGraph>,
        source: NodeId,
        dest: NodeId,
        start_time: f64,
        excluded: &[NodeId],
        criteria: Vec<LimitingCriterion>,
    ) -> Self {
        let criteria = if criteria.is_empty() {
            vec![LimitingCriterion::EarliestEnding]
        } else {
            criteria
        };
        Self {
            graph,
            source,
            dest,
            start_time,
            excluded: excluded.iter().copied().collect(),
            criteria,
            pending: VecDeque::from([Vec::new()]),
            seen_blacklists: HashSet::from([Vec::new()]),
            seen_paths: HashSet::new(),
        }
    }
}

impl RouteGenerator for EliminationRouteGenerator {
    fn next_route(&mut self) -> Option<Vec<Contact>> {
        while let Some(blacklist) = self.pending.pop_front() {
            let contact_blacklist: HashSet<Contact> = blacklist.iter().copied().collect();
            let result = tvdijkstra(
                &self.graph,
                self.source,
                Some(self.dest),
                self.start_time,
                &self.excluded,
                &contact_blacklist,
            );
            let Some(path) = result.path(self.dest) else {
                continue;
            };
            for criterion in &self.criteria {
                let Some(limiting) = criterion.limiting_contact(&path.contacts) else {
                    continue;
                };
                let mut next = blacklist.clone();
                next.push(limiting);
                next.sort();
                if self.seen_blacklists.insert(next.clone()) {
                    self.pending.push_back(next);
                }
            }
            if self.seen_paths.insert(path.contacts.clone()) {
                trace!(hops = path.hops, dest = %self.dest, "elimination found route");
                return Some(path.contacts);
            }
        }
        None
    }
}

/// Route generator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteGeneratorKind {
    /// Blacklist the earliest-ending contact after every path.
    Elimination,
    /// Also branch on the least-probable and smallest-volume contacts.
    ProbabilisticElimination,
    /// Yen's k-shortest paths, at most `max_routes_yen` of them.
    Yen { max_routes_yen: usize },
}

impl Default for RouteGeneratorKind {
    fn default() -> Self {
        RouteGeneratorKind::Elimination
    }
}

impl RouteGeneratorKind {
    pub fn build(
        self,
        graph: Arc<ContactGraph>,
        source: NodeId,
        dest: NodeId,
        start_time: f64,
        excluded: &[NodeId],
    ) -> Box<dyn RouteGenerator> {
        match self {
            RouteGeneratorKind::Elimination => Box::new(EliminationRouteGenerator::new(
                graph,
                source,
                dest,
                start_time,
                excluded,
                vec![LimitingCriterion::EarliestEnding],
            )),
            RouteGeneratorKind::ProbabilisticElimination => {
                Box::new(EliminationRouteGenerator::new(
                    graph,
                    source,
                    dest,
                    start_time,
                    excluded,
                    vec![
                        LimitingCriterion::EarliestEnding,
                        LimitingCriterion::LeastProbable,
                        LimitingCriterion::SmallestVolume,
                    ],
                ))
            }
            RouteGeneratorKind::Yen { max_routes_yen } => Box::new(YenRouteGenerator::new(
                graph,
                source,
                dest,
                start_time,
                excluded,
                max_routes_yen,
            )),
        }
    }
}
