use std::cmp::Ordering;

use super::harness::{contact, message, n};
use crate::cgr::sabr::{
    backlog_lien, best_case_delivery_time, last_byte_arrival_times, route_volume_limit,
};
use crate::cgr::{
    ProbabilityMode, Route, RouteGeneratorKind, RoutingRequest, SabrAlgorithm, SabrConfig,
    SabrGraphData, StartTimeBasedDict, VolumeLedger, VolumeView, candidate_routes,
    compare_candidates, probsabr, sabr,
};
use crate::net::{Contact, NodeId};

/// `bits` queued towards `neighbor`, nothing elsewhere.
struct Backlog {
    neighbor: NodeId,
    bits: f64,
}

impl VolumeView for Backlog {
    fn tx_queue_volume(&self, neighbor: NodeId) -> f64 {
        if neighbor == self.neighbor { self.bits } else { 0.0 }
    }

    fn max_transmission_volume(&self, contact: &Contact) -> f64 {
        contact.volume()
    }
}

fn route(path: &[Contact]) -> Route {
    Route::from_path(path.to_vec())
}

#[test]
fn route_records_first_hop_and_bottleneck() {
    let r = route(&[
        contact(0, 1, 5.0, 100.0, 10.0, 1.0),
        contact(1, 2, 0.0, 40.0, 10.0, 1.0),
        contact(2, 3, 0.0, 80.0, 10.0, 1.0),
    ]);
    assert_eq!(r.start_time, 5.0);
    assert_eq!(r.end_time, 40.0);
    assert_eq!(r.neighbor_eid, n(1));
    assert_eq!(r.effective_stop_times, vec![40.0, 40.0, 80.0]);
    assert_eq!(r.hops(), 3);
}

#[test]
fn earlier_arrival_wins_over_hops() {
    let direct = route(&[contact(0, 2, 0.0, 100.0, 10.0, 0.0)]);
    let relayed = route(&[contact(0, 1, 0.0, 100.0, 10.0, 0.0), contact(1, 2, 0.0, 100.0, 10.0, 0.0)]);
    assert_eq!(compare_candidates((&relayed, 3.0), (&direct, 4.0)), Ordering::Less);
    // within the tolerance the hop count decides
    assert_eq!(compare_candidates((&relayed, 4.0), (&direct, 4.0 + 1e-7)), Ordering::Greater);
}

#[test]
fn later_ending_route_wins_a_tie() {
    let long = route(&[contact(0, 1, 0.0, 100.0, 10.0, 0.0)]);
    let short = route(&[contact(0, 2, 0.0, 50.0, 10.0, 0.0)]);
    assert_eq!(compare_candidates((&long, 4.0), (&short, 4.0)), Ordering::Less);
    assert_eq!(compare_candidates((&short, 4.0), (&long, 4.0)), Ordering::Greater);
}

#[test]
fn entry_vertex_breaks_the_last_tie() {
    let a = route(&[contact(0, 1, 0.0, 100.0, 10.0, 0.0)]);
    let b = route(&[contact(0, 2, 0.0, 100.0, 10.0, 0.0)]);
    assert_ne!(a.entry_vid, b.entry_vid);
    assert_eq!(compare_candidates((&a, 4.0), (&b, 4.0)), a.entry_vid.cmp(&b.entry_vid));
    assert_eq!(compare_candidates((&a, 4.0), (&a, 4.0)), Ordering::Equal);
}

#[test]
fn sabr_only_compares_the_first_candidates() {
    let slow = route(&[contact(0, 1, 0.0, 100.0, 10.0, 0.0)]);
    let fast = route(&[contact(0, 2, 0.0, 100.0, 10.0, 0.0)]);
    let fastest = route(&[contact(0, 3, 0.0, 100.0, 10.0, 0.0)]);
    let candidates = || {
        vec![(slow.clone(), 10.0), (fast.clone(), 5.0), (fastest.clone(), 1.0)].into_iter()
    };
    assert_eq!(sabr(candidates(), 2), Some(fast.clone()));
    assert_eq!(sabr(candidates(), 3), Some(fastest.clone()));
    assert_eq!(sabr(std::iter::empty(), 3), None);
    assert_eq!(SabrAlgorithm::Sabr.select(candidates(), 1), vec![slow.clone()]);
}

#[test]
fn probsabr_stops_once_confident() {
    let r = |rx: usize, p: f64| route(&[contact(0, rx, 0.0, 100.0, 10.0, 0.0).with_param(p)]);
    let candidates = vec![(r(1, 0.5), 3.0), (r(2, 0.5), 1.0), (r(3, 0.5), 2.0)];

    let chosen = probsabr(candidates.clone().into_iter(), 6, 0.7, ProbabilityMode::FirstHop);
    let firsts: Vec<_> = chosen.iter().map(|r| r.neighbor_eid).collect();
    assert_eq!(firsts, vec![n(2), n(3)]);

    // unreachable target: every examined route is returned
    let chosen = probsabr(candidates.into_iter(), 6, 0.99, ProbabilityMode::FirstHop);
    assert_eq!(chosen.len(), 3);
}

#[test]
fn path_probability_uses_every_hop() {
    let two_hop = route(&[
        contact(0, 1, 0.0, 100.0, 10.0, 0.0).with_param(0.9),
        contact(1, 2, 0.0, 100.0, 10.0, 0.0).with_param(0.5),
    ]);
    assert!((two_hop.path_probability() - 0.45).abs() < 1e-12);

    let alt = route(&[contact(0, 2, 0.0, 100.0, 10.0, 0.0).with_param(0.9)]);
    let algorithm = SabrAlgorithm::ProbSabr {
        target_confidence: 0.9,
        mode: ProbabilityMode::Path,
    };
    let chosen = algorithm.select(vec![(two_hop.clone(), 1.0), (alt, 2.0)].into_iter(), 6);
    assert_eq!(chosen.len(), 2);

    let first_hop = SabrAlgorithm::ProbSabr {
        target_confidence: 0.9,
        mode: ProbabilityMode::FirstHop,
    };
    assert_eq!(first_hop.select(vec![(two_hop.clone(), 1.0)].into_iter(), 6), vec![two_hop]);
}

#[test]
fn backlog_is_relieved_by_earlier_contacts() {
    let earlier = contact(0, 1, 0.0, 10.0, 100.0, 0.0);
    let initial = contact(0, 1, 50.0, 60.0, 1000.0, 0.0);
    let list = [earlier, initial];

    assert_eq!(backlog_lien(&list, 0.0, &initial, 0.0), 0.0);
    assert_eq!(backlog_lien(&list, 500.0, &initial, 0.0), 0.0);
    assert_eq!(backlog_lien(&list, 3000.0, &initial, 0.0), 2.0);
    // the earlier contact is half over
    assert_eq!(backlog_lien(&list, 3000.0, &initial, 5.0), 2.5);
    // already open: no relief
    assert_eq!(backlog_lien(&list, 3000.0, &initial, 55.0), 3.0);

    let dead = contact(0, 1, 50.0, 60.0, 0.0, 0.0);
    assert_eq!(backlog_lien(&[dead], 1.0, &dead, 0.0), f64::INFINITY);
}

#[test]
fn arrival_time_estimates() {
    let path = [
        contact(0, 1, 0.0, 100.0, 1000.0, 1.0),
        contact(1, 2, 20.0, 100.0, 500.0, 2.0),
    ];
    assert_eq!(last_byte_arrival_times(&path, 1000, 0.0), vec![2.0, 24.0]);
    assert_eq!(best_case_delivery_time(&path, 0.0), 22.0);
    assert_eq!(best_case_delivery_time(&path, 30.0), 33.0);

    let r = route(&path);
    let lbats = last_byte_arrival_times(&path, 1000, 0.0);
    // second hop runs from 20 to 100 at 500 bit/s
    assert_eq!(route_volume_limit(&r, &lbats, 0.0, &Backlog { neighbor: n(1), bits: 0.0 }), 40_000.0);

    let mut ledger = VolumeLedger::default();
    ledger.update_cvu(&path[..1], 99_000.0);
    assert_eq!(route_volume_limit(&r, &lbats, 0.0, &ledger), 1_000.0);
}

fn graph_data() -> (SabrGraphData, [Contact; 3]) {
    let plan = [
        contact(0, 1, 0.0, 100.0, 1000.0, 1.0),
        contact(1, 2, 0.0, 100.0, 1000.0, 1.0),
        contact(0, 2, 50.0, 60.0, 1000.0, 0.0),
    ];
    (SabrGraphData::new(0.0, plan.to_vec(), n(0)), plan)
}

fn request<'a>(msg: &'a crate::net::Message, excluded: &'a [NodeId]) -> RoutingRequest<'a> {
    RoutingRequest {
        bundle: msg,
        cur_eid: n(0),
        cur_time: 0.0,
        excluded,
        max_routes: None,
    }
}

#[test]
fn candidates_carry_their_projected_arrival() {
    let (mut gd, plan) = graph_data();
    let msg = message(0, 2, 0.0, 1000, 100.0);
    let ledger = VolumeLedger::default();

    let found: Vec<_> =
        candidate_routes(&mut gd, RouteGeneratorKind::Elimination, request(&msg, &[]), &ledger)
            .map(|(r, pbat)| (r.contact_path, pbat))
            .collect();
    assert_eq!(found, vec![(vec![plan[0], plan[1]], 4.0), (vec![plan[2]], 51.0)]);
    assert_eq!(gd.cached_routes(n(2)).len(), 2);

    // cached routes are filtered again per request
    let tight = message(0, 2, 0.0, 1000, 20.0);
    let found: Vec<_> =
        candidate_routes(&mut gd, RouteGeneratorKind::Elimination, request(&tight, &[]), &ledger)
            .collect();
    assert_eq!(found.len(), 1);

    let excluded = [n(1)];
    let found: Vec<_> = candidate_routes(
        &mut gd,
        RouteGeneratorKind::Elimination,
        request(&msg, &excluded),
        &ledger,
    )
    .map(|(r, _)| r.neighbor_eid)
    .collect();
    assert_eq!(found, vec![n(2)]);
}

#[test]
fn route_budget_limits_generation() {
    let (mut gd, _) = graph_data();
    let msg = message(0, 2, 0.0, 1000, 100.0);
    let mut req = request(&msg, &[]);
    req.max_routes = Some(1);
    let found = candidate_routes(&mut gd, RouteGeneratorKind::Elimination, req, &VolumeLedger::default()).count();
    assert_eq!(found, 1);
    assert_eq!(gd.cached_routes(n(2)).len(), 1);
}

#[test]
fn booked_and_backlogged_contacts_are_filtered() {
    let (mut gd, plan) = graph_data();
    let msg = message(0, 2, 0.0, 1000, 100.0);

    let mut ledger = VolumeLedger::default();
    ledger.update_cvu(&plan[2..], 9_500.0);
    let found: Vec<_> =
        candidate_routes(&mut gd, RouteGeneratorKind::Elimination, request(&msg, &[]), &ledger)
            .map(|(r, _)| r.neighbor_eid)
            .collect();
    assert_eq!(found, vec![n(1)]);

    // 200 s of backlog towards n1 pushes past the end of its contact
    let found: Vec<_> = candidate_routes(
        &mut gd,
        RouteGeneratorKind::Elimination,
        request(&msg, &[]),
        &Backlog {
            neighbor: n(1),
            bits: 200_000.0,
        },
    )
    .map(|(r, _)| r.neighbor_eid)
    .collect();
    assert_eq!(found, vec![n(2)]);
}

#[test]
fn start_time_dict_lookups() {
    let mut dict = StartTimeBasedDict::new();
    dict.insert(50.0, "b");
    dict.insert(0.0, "a");
    dict.insert(100.0, "c");
    assert_eq!(dict.keys().collect::<Vec<_>>(), vec![0.0, 50.0, 100.0]);
    assert_eq!(dict.get_entry_for(-5.0), None);
    assert_eq!(dict.get_entry_for(0.0), Some(&"a"));
    assert_eq!(dict.get_entry_for(49.9), Some(&"a"));
    assert_eq!(dict.get_entry_for(50.0), Some(&"b"));
    assert_eq!(dict.get_entry_for(1e9), Some(&"c"));
    assert_eq!(dict.get_exact(50.0), Some(&"b"));
    assert_eq!(dict.get_exact(60.0), None);

    dict.insert(50.0, "b2");
    assert_eq!(dict.len(), 3);
    assert_eq!(dict.get_entry_and_drop_predecessors(75.0), Some(&mut "b2"));
    assert_eq!(dict.keys().collect::<Vec<_>>(), vec![50.0, 100.0]);
    assert_eq!(dict.get_entry_for(10.0), None);
    assert!(dict.get_entry_for_mut(49.0).is_none());
    assert!(StartTimeBasedDict::<u8>::new().get_entry_for(0.0).is_none());
}

#[test]
fn sabr_config_fills_in_defaults() {
    let cfg: SabrConfig = serde_json::from_str(
        r#"{"max_order_routes": 2, "generator": {"kind": "yen", "max_routes_yen": 4},
            "algorithm": {"kind": "prob_sabr", "target_confidence": 0.8}}"#,
    )
    .expect("parse");
    assert_eq!(cfg.max_order_routes, 2);
    assert_eq!(cfg.generator, RouteGeneratorKind::Yen { max_routes_yen: 4 });
    assert_eq!(
        cfg.algorithm,
        SabrAlgorithm::ProbSabr {
            target_confidence: 0.8,
            mode: ProbabilityMode::FirstHop
        }
    );
    assert!(cfg.re_schedule_delayed);
    assert!(!cfg.reject_looping);
    assert_eq!(cfg.max_routes, None);
}
