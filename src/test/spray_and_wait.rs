use super::harness::{Harness, assert_times, contact, message, n};
use crate::net::{EventKind, MessageKey};
use crate::routing::{EvictionPolicy, OneSprayAndWait, RoutingSpec, SprayAndWait};

fn spray(initial_copies: u32) -> RoutingSpec {
    RoutingSpec::SprayAndWait {
        initial_copies,
        eviction: EvictionPolicy::ExpiredOnly,
    }
}

#[test]
fn binary_spray_halves_tokens_and_waits_for_the_destination() {
    let plan = [
        contact(0, 1, 0.0, 10.0, 1_000.0, 0.0),
        contact(0, 2, 20.0, 30.0, 1_000.0, 0.0),
        contact(0, 3, 40.0, 50.0, 1_000.0, 0.0),
    ];
    let mut h = Harness::with_plan(&spray(4), &plan, 4);
    h.inject(message(0, 3, 0.0, 100, 100.0));
    h.run();

    let key = MessageKey::new(0.0, n(0));
    let copies = |node: usize| {
        h.world
            .net
            .policy::<SprayAndWait>(n(node))
            .expect("spray policy")
            .copies(&key)
    };
    assert_eq!(copies(1), Some(2));
    assert_eq!(copies(2), Some(1));
    // the direct delivery consumed the last local token
    assert_eq!(copies(0), None);
    assert_eq!(h.times(EventKind::MessageDeleted, 0).len(), 1);
    assert_eq!(h.times(EventKind::MessageDelivered, 3).len(), 1);
}

#[test]
fn a_single_token_is_never_relayed() {
    let plan = [contact(0, 1, 0.0, 10.0, 1_000.0, 0.0)];
    let mut h = Harness::with_plan(&spray(1), &plan, 3);
    h.inject(message(0, 2, 0.0, 100, 100.0));
    h.run();

    assert_eq!(h.count(EventKind::MessageTransmissionStarted), 0);
    assert_eq!(h.world.net.node(n(0)).core().buf.len(), 1);
}

#[test]
fn tokens_for_a_held_message_accumulate() {
    // n0 and n2 both start sending to n1 before either copy arrives
    let plan = [
        contact(0, 2, 0.0, 10.0, 1_000.0, 0.0),
        contact(0, 1, 20.0, 30.0, 1_000.0, 5.0),
        contact(2, 1, 20.0, 30.0, 1_000.0, 5.0),
    ];
    let mut h = Harness::with_plan(&spray(8), &plan, 4);
    h.inject(message(0, 3, 0.0, 100, 100.0));
    h.run();

    let key = MessageKey::new(0.0, n(0));
    let copies = |node: usize| {
        h.world
            .net
            .policy::<SprayAndWait>(n(node))
            .expect("spray policy")
            .copies(&key)
    };
    // n0: 8 -> 4 (to n2) -> 2 (to n1); n2: 4 -> 2 (to n1); n1: 2 + 2
    assert_eq!(copies(0), Some(2));
    assert_eq!(copies(2), Some(2));
    assert_eq!(copies(1), Some(4));
    assert_times(&h.times(EventKind::MessageRejected, 1), &[25.1]);
}

#[test]
fn one_spray_and_wait_relays_half() {
    let plan = [contact(0, 1, 0.0, 10.0, 1_000.0, 0.0)];
    let routing = RoutingSpec::OneSprayAndWait {
        initial_copies: 2,
        eviction: EvictionPolicy::ExpiredOnly,
    };
    let mut h = Harness::with_plan(&routing, &plan, 3);
    h.inject(message(0, 2, 0.0, 100, 100.0));
    h.run();

    let key = MessageKey::new(0.0, n(0));
    let copies = |node: usize| {
        h.world
            .net
            .policy::<OneSprayAndWait>(n(node))
            .expect("one spray policy")
            .copies(&key)
    };
    assert_eq!(copies(0), Some(1));
    assert_eq!(copies(1), Some(1));
    assert_eq!(h.count(EventKind::MessageTransmissionStarted), 1);
}
