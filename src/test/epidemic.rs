use super::harness::{Harness, assert_times, contact, message, n};
use crate::net::{EventKind, MessageKey};
use crate::routing::{Epidemic, EpidemicConfig, EvictionPolicy, RoutingSpec};

fn key(src: usize, start: f64) -> MessageKey {
    MessageKey::new(start, n(src))
}

#[test]
fn epidemic_relays_along_a_chain() {
    let plan = [
        contact(0, 1, 0.0, 10.0, 1_000.0, 0.0),
        contact(1, 2, 20.0, 30.0, 1_000.0, 0.0),
    ];
    let mut h = Harness::with_plan(&RoutingSpec::Epidemic(EpidemicConfig::default()), &plan, 3);
    h.inject(message(0, 2, 0.0, 1_000, 100.0));
    h.run();

    assert_times(&h.times(EventKind::MessageScheduled, 1), &[1.0]);
    assert_times(&h.times(EventKind::MessageDelivered, 2), &[21.0]);
    // epidemic keeps its copies after forwarding
    assert!(h.world.net.node(n(0)).core().buf.contains(&key(0, 0.0)));
    assert!(h.world.net.node(n(1)).core().buf.contains(&key(0, 0.0)));
}

#[test]
fn summary_vector_suppresses_resending_to_a_holder() {
    let plan = [
        contact(0, 1, 0.0, 10.0, 1_000.0, 0.0),
        contact(0, 1, 20.0, 30.0, 1_000.0, 0.0),
    ];
    let mut h = Harness::with_plan(&RoutingSpec::Epidemic(EpidemicConfig::default()), &plan, 3);
    h.inject(message(0, 2, 0.0, 1_000, 100.0));
    h.run();

    assert_eq!(h.count(EventKind::ContactStarted), 2);
    assert_eq!(h.count(EventKind::MessageTransmissionStarted), 1);
    assert_eq!(h.count(EventKind::MessageRejected), 0);
}

#[test]
fn max_hops_stops_relaying_but_not_direct_delivery() {
    let plan = [
        contact(0, 1, 0.0, 10.0, 1_000.0, 0.0),
        contact(1, 2, 20.0, 30.0, 1_000.0, 0.0),
        contact(1, 3, 20.0, 30.0, 1_000.0, 0.0),
    ];
    let cfg = EpidemicConfig {
        max_hops: Some(1),
        ..EpidemicConfig::default()
    };
    let mut h = Harness::with_plan(&RoutingSpec::Epidemic(cfg), &plan, 4);
    h.inject(message(0, 3, 0.0, 1_000, 100.0));
    h.run();

    let relay = h.world.net.policy::<Epidemic>(n(1)).expect("epidemic policy");
    assert_eq!(relay.hops_left(&key(0, 0.0)), Some(0));
    assert!(h.world.net.node(n(2)).core().buf.is_empty());
    assert_times(&h.times(EventKind::MessageDelivered, 3), &[21.0]);
}

#[test]
fn direct_messages_go_first() {
    let plan = [contact(0, 1, 10.0, 20.0, 1_000.0, 0.0)];
    let mut h = Harness::with_plan(&RoutingSpec::Epidemic(EpidemicConfig::default()), &plan, 3);
    h.inject(message(0, 2, 0.0, 1_000, 50.0));
    h.inject(message(0, 1, 1.0, 1_000, 90.0));
    h.run();

    let first = h
        .events()
        .into_iter()
        .find(|e| e.kind == EventKind::MessageTransmissionStarted)
        .and_then(|e| e.message)
        .expect("a transmission");
    assert_eq!(first.destination, 1);
}

#[test]
fn simple_epidemic_resends_at_every_new_contact() {
    let plan = [
        contact(0, 1, 0.0, 10.0, 1_000.0, 0.0),
        contact(0, 1, 20.0, 30.0, 1_000.0, 0.0),
    ];
    let routing = RoutingSpec::SimpleEpidemic {
        eviction: EvictionPolicy::ExpiredOnly,
    };
    let mut h = Harness::with_plan(&routing, &plan, 3);
    h.inject(message(0, 2, 0.0, 1_000, 100.0));
    h.run();

    // no vector exchange: the copy goes out again and the peer rejects it
    assert_times(&h.times(EventKind::MessageTransmissionStarted, 0), &[0.0, 20.0]);
    assert_times(&h.times(EventKind::MessageRejected, 1), &[21.0]);
}

#[test]
fn one_epidemic_checks_the_peer_buffer() {
    let plan = [
        contact(0, 1, 0.0, 10.0, 1_000.0, 0.0),
        contact(0, 1, 20.0, 30.0, 1_000.0, 0.0),
    ];
    let routing = RoutingSpec::OneEpidemic {
        eviction: EvictionPolicy::ExpiredOnly,
    };
    let mut h = Harness::with_plan(&routing, &plan, 3);
    h.inject(message(0, 2, 0.0, 1_000, 100.0));
    h.inject(message(0, 1, 25.0, 1_000, 100.0));
    h.run();

    assert_times(&h.times(EventKind::MessageTransmissionStarted, 0), &[0.0, 25.0]);
    assert_times(&h.times(EventKind::MessageDelivered, 1), &[26.0]);
    assert_eq!(h.count(EventKind::MessageRejected), 0);
}

#[test]
fn fifo_eviction_drops_the_oldest_message() {
    let ptvg = super::harness::ptvg_of(&[]);
    let opts = crate::net::NodeOptions {
        buffer_bits: Some(1_000),
        ..Default::default()
    };
    let cfg = EpidemicConfig {
        eviction: EvictionPolicy::Fifo,
        ..EpidemicConfig::default()
    };
    let mut h = Harness::new(&RoutingSpec::Epidemic(cfg), &ptvg, &[opts, opts]);
    h.inject(message(0, 1, 0.0, 600, 50.0));
    h.inject(message(0, 1, 1.0, 600, 10.0));
    h.run();

    assert_times(&h.times(EventKind::MessageDropped, 0), &[1.0]);
    let buf = &h.world.net.node(n(0)).core().buf;
    assert!(buf.contains(&key(0, 1.0)));
    assert!(!buf.contains(&key(0, 0.0)));
}
