//! Schedule-Aware Bundle Routing: candidate route discovery and selection.
//!
//! Section numbers in the comments refer to CCSDS 734.3-B-1.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::generator::RouteGeneratorKind;
use super::graph::SabrGraphData;
use super::route::Route;
use crate::net::{Contact, Message, NodeId};

/// Projected arrival times closer than this are ranked by the tie-breakers.
pub const PBAT_EPSILON: f64 = 1e-6;

/// Queue and contact volume state the route filters consult.
pub trait VolumeView {
    /// Bits already queued towards `neighbor`.
    fn tx_queue_volume(&self, neighbor: NodeId) -> f64;

    /// Remaining bookable volume of `contact`.
    fn max_transmission_volume(&self, contact: &Contact) -> f64;
}

// 2.4.3, sizes already include the convergence-layer overhead
pub fn estimated_volume_consumption(size: u64) -> f64 {
    size as f64
}

// 3.2.6.2 a)
pub fn adjusted_start_time(contact: &Contact, cur_time: f64) -> f64 {
    contact.start_time.max(cur_time)
}

/// Time needed to drain the backlog towards the neighbor before the initial
/// contact can be used, net of the relief offered by earlier contacts on the
/// same edge (3.2.6.2 b-h).
pub fn backlog_lien(
    neighbor_contacts: &[Contact],
    queued_volume: f64,
    initial_contact: &Contact,
    cur_time: f64,
) -> f64 {
    let relief: f64 = if initial_contact.start_time > cur_time {
        neighbor_contacts
            .iter()
            .filter(|c| c.end_time > cur_time && c.start_time < initial_contact.start_time)
            .map(|c| (c.end_time - adjusted_start_time(c, cur_time)) * c.bit_rate)
            .sum()
    } else {
        0.0
    };
    let residual = (queued_volume - relief).max(0.0);
    if residual == 0.0 {
        return 0.0;
    }
    if initial_contact.bit_rate <= 0.0 {
        return f64::INFINITY;
    }
    residual / initial_contact.bit_rate
}

// 3.2.6.6
pub fn last_byte_arrival_time(contact: &Contact, size: u64, first_byte_tx_time: f64) -> f64 {
    first_byte_tx_time + estimated_volume_consumption(size) / contact.bit_rate + contact.delay
}

/// Last-byte arrival time at the end of every hop. The first hop starts at
/// the earliest transmission opportunity, later hops at
/// `max(contact start, previous arrival)`.
pub fn last_byte_arrival_times(path: &[Contact], size: u64, eto: f64) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(path.len());
    for (i, c) in path.iter().enumerate() {
        let first_byte = match i {
            0 => eto,
            _ => c.start_time.max(out[i - 1]),
        };
        out.push(last_byte_arrival_time(c, size, first_byte));
    }
    out
}

/// Bottleneck volume of the route (3.2.6.8.10).
pub fn route_volume_limit(
    route: &Route,
    lbats: &[f64],
    eto: f64,
    volumes: &impl VolumeView,
) -> f64 {
    let mut limit = f64::INFINITY;
    for (i, c) in route.contact_path.iter().enumerate() {
        let mut effective_start = c.start_time;
        if i > 0 && lbats[i - 1] > effective_start {
            effective_start = lbats[i - 1];
        } else if eto > effective_start {
            effective_start = eto;
        }
        let duration = route.effective_stop_times[i] - effective_start;
        let hop_limit = (duration * c.bit_rate).min(volumes.max_transmission_volume(c));
        limit = limit.min(hop_limit);
    }
    limit
}

// 3.2.4.1
pub fn earliest_arrival_time(contact: &Contact, arrival_at_tx: f64) -> f64 {
    contact.start_time.max(arrival_at_tx) + contact.delay
}

/// Arrival time ignoring queueing and transmission (3.2.4.2).
pub fn best_case_delivery_time(path: &[Contact], cur_time: f64) -> f64 {
    path.iter()
        .fold(cur_time, |t, c| earliest_arrival_time(c, t))
}

/// Parameters of one routing decision.
#[derive(Debug, Clone, Copy)]
pub struct RoutingRequest<'a> {
    pub bundle: &'a Message,
    pub cur_eid: NodeId,
    pub cur_time: f64,
    pub excluded: &'a [NodeId],
    /// Cap on the number of routes examined; `None` is unbounded.
    pub max_routes: Option<usize>,
}

/// Lazily yields `(route, projected arrival time)` for every route that
/// passes the candidate filters (3.2.6.9).
///
/// Cached routes come first, then the generator is resumed. Every route the
/// generator produces is appended to the snapshot cache even if filtered out.
pub struct CandidateRoutes<'g, 'r, V: VolumeView> {
    gd: &'g mut SabrGraphData,
    req: RoutingRequest<'r>,
    volumes: &'r V,
    cursor: usize,
    budget: Option<usize>,
    exhausted: bool,
}

pub fn candidate_routes<'g, 'r, V: VolumeView>(
    gd: &'g mut SabrGraphData,
    generator: RouteGeneratorKind,
    req: RoutingRequest<'r>,
    volumes: &'r V,
) -> CandidateRoutes<'g, 'r, V> {
    let dest = req.bundle.destination;
    if !gd.route_gens.contains_key(&dest) {
        let route_gen = generator.build(
            gd.graph.clone(),
            req.cur_eid,
            dest,
            gd.start_time,
            req.excluded,
        );
        gd.route_gens.insert(dest, route_gen);
        gd.route_lists.insert(dest, Vec::new());
    }
    let list = gd.route_lists.entry(dest).or_default();
    list.retain(|r| r.end_time >= req.cur_time);
    let budget = req.max_routes.map(|m| m.saturating_sub(list.len()));
    CandidateRoutes {
        gd,
        req,
        volumes,
        cursor: 0,
        budget,
        exhausted: false,
    }
}

impl<V: VolumeView> CandidateRoutes<'_, '_, V> {
    fn next_raw(&mut self) -> Option<Route> {
        let dest = self.req.bundle.destination;
        let cached = self.gd.cached_routes(dest).get(self.cursor).cloned();
        if let Some(route) = cached {
            self.cursor += 1;
            return Some(route);
        }
        if self.budget == Some(0) {
            return None;
        }
        let path = self.gd.route_gens.get_mut(&dest)?.next_route()?;
        let route = Route::from_path(path);
        self.gd.route_lists.entry(dest).or_default().push(route.clone());
        self.cursor += 1;
        if let Some(b) = self.budget.as_mut() {
            *b -= 1;
        }
        Some(route)
    }

    /// Filters 1 to 5; `Some(pbat)` if the route is a candidate.
    fn evaluate(&self, route: &Route) -> Option<f64> {
        let bundle = self.req.bundle;
        let cur_time = self.req.cur_time;
        let first = route.first_contact();

        if best_case_delivery_time(&route.contact_path, cur_time) > bundle.deadline {
            return None;
        }
        if self.req.excluded.contains(&route.neighbor_eid) {
            return None;
        }

        // 3.2.6.2 i)
        let neighbor_contacts = self
            .gd
            .neighbor_contact_lists
            .get(&route.neighbor_eid)
            .map_or(&[][..], Vec::as_slice);
        let eto = route.start_time.max(cur_time)
            + backlog_lien(
                neighbor_contacts,
                self.volumes.tx_queue_volume(route.neighbor_eid),
                first,
                cur_time,
            );
        if eto > first.end_time {
            return None;
        }

        let lbats = last_byte_arrival_times(&route.contact_path, bundle.size, eto);
        let pbat = *lbats.last()?;
        if pbat > bundle.deadline {
            return None;
        }

        let limit = route_volume_limit(route, &lbats, eto, self.volumes);
        if limit <= 0.0 || limit <= estimated_volume_consumption(bundle.size) {
            return None;
        }
        Some(pbat)
    }
}

impl<V: VolumeView> Iterator for CandidateRoutes<'_, '_, V> {
    type Item = (Route, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        while let Some(route) = self.next_raw() {
            if let Some(pbat) = self.evaluate(&route) {
                return Some((route, pbat));
            }
        }
        self.exhausted = true;
        info!(dest = %self.req.bundle.destination, "route list exhausted");
        None
    }
}

/// Ranking of two candidates (3.2.8.1.4): earlier arrival, then fewer hops,
/// then the later-ending limiting contact, then the smaller entry vertex id.
/// `Ordering::Less` means `a` is preferred.
pub fn compare_candidates(a: (&Route, f64), b: (&Route, f64)) -> Ordering {
    let (ra, pa) = a;
    let (rb, pb) = b;
    if (pa - pb).abs() >= PBAT_EPSILON {
        return pa.total_cmp(&pb);
    }
    match ra.hops().cmp(&rb.hops()) {
        Ordering::Equal => {}
        other => return other,
    }
    if (ra.end_time - rb.end_time).abs() >= PBAT_EPSILON {
        return rb.end_time.total_cmp(&ra.end_time);
    }
    ra.entry_vid.cmp(&rb.entry_vid)
}

/// Best of the first `max_order_routes` candidates.
pub fn sabr(candidates: impl Iterator<Item = (Route, f64)>, max_order_routes: usize) -> Option<Route> {
    let mut best: Option<(Route, f64)> = None;
    for (route, pbat) in candidates.take(max_order_routes.max(1)) {
        let better = match &best {
            None => true,
            Some((b, bp)) => compare_candidates((&route, pbat), (b, *bp)) == Ordering::Less,
        };
        if better {
            best = Some((route, pbat));
        }
    }
    best.map(|(route, pbat)| {
        debug!(neighbor = %route.neighbor_eid, hops = route.hops(), pbat, "route selected");
        route
    })
}

/// Which probability a route contributes to the delivery confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityMode {
    /// Probability of the first contact only.
    #[default]
    FirstHop,
    /// Product over the whole path.
    Path,
}

impl ProbabilityMode {
    fn probability(self, route: &Route) -> f64 {
        match self {
            ProbabilityMode::FirstHop => route.first_contact().probability(),
            ProbabilityMode::Path => route.path_probability(),
        }
    }
}

/// Multi-path variant: takes candidates in ranking order until the combined
/// failure probability drops to `1 - target_confidence`. Returns what it
/// collected even if the target is never reached.
pub fn probsabr(
    candidates: impl Iterator<Item = (Route, f64)>,
    max_order_routes: usize,
    target_confidence: f64,
    mode: ProbabilityMode,
) -> Vec<Route> {
    let mut ranked: Vec<(Route, f64)> = candidates.take(max_order_routes.max(1)).collect();
    ranked.sort_by(|a, b| compare_candidates((&a.0, a.1), (&b.0, b.1)));

    let max_failure = 1.0 - target_confidence;
    let mut failure = 1.0;
    let mut chosen = Vec::new();
    for (route, _) in ranked {
        failure *= 1.0 - mode.probability(&route);
        chosen.push(route);
        if failure <= max_failure {
            break;
        }
    }
    debug!(routes = chosen.len(), confidence = 1.0 - failure, "probsabr selection");
    chosen
}

/// Selection step run on the candidate routes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SabrAlgorithm {
    Sabr,
    ProbSabr {
        target_confidence: f64,
        #[serde(default)]
        mode: ProbabilityMode,
    },
}

impl Default for SabrAlgorithm {
    fn default() -> Self {
        SabrAlgorithm::Sabr
    }
}

impl SabrAlgorithm {
    pub fn select(
        self,
        candidates: impl Iterator<Item = (Route, f64)>,
        max_order_routes: usize,
    ) -> Vec<Route> {
        match self {
            SabrAlgorithm::Sabr => sabr(candidates, max_order_routes).into_iter().collect(),
            SabrAlgorithm::ProbSabr {
                target_confidence,
                mode,
            } => probsabr(candidates, max_order_routes, target_confidence, mode),
        }
    }
}
