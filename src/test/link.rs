use super::harness::{contact, message};
use crate::error::LinkModelError;
use crate::net::{BlockRedundancyLink, EffectiveRateLink, IdealLink, Link, LinkModel, TxPlan};

#[test]
fn ideal_link_takes_size_over_rate() {
    let mut link = IdealLink::new(contact(0, 1, 10.0, 20.0, 1_000.0, 1.0));
    let plan = link.plan_transmission(&message(0, 1, 0.0, 5_000, 100.0), 10.0);
    assert_eq!(plan, TxPlan::Deliver { duration: 5.0 });
}

#[test]
fn zero_rate_links_stall() {
    let mut ideal = IdealLink::new(contact(0, 1, 0.0, 20.0, 0.0, 0.0));
    assert_eq!(
        ideal.plan_transmission(&message(0, 1, 0.0, 1, 100.0), 0.0),
        TxPlan::Stall
    );
    let mut impaired = EffectiveRateLink::new(contact(0, 1, 0.0, 20.0, 0.0, 0.0), 0.0, 100, 0.0);
    assert_eq!(
        impaired.plan_transmission(&message(0, 1, 0.0, 1, 100.0), 0.0),
        TxPlan::Stall
    );
}

#[test]
fn effective_rate_accounts_for_errors_and_overhead() {
    let link = EffectiveRateLink::new(contact(0, 1, 0.0, 100.0, 1_000.0, 0.0), 0.0, 1_000, 1.0);
    assert_eq!(link.effective_rate(), 500.0);

    let lossy = EffectiveRateLink::new(contact(0, 1, 0.0, 100.0, 1_000.0, 0.0), 0.5, 1, 0.0);
    assert_eq!(lossy.effective_rate(), 500.0);
}

#[test]
fn impaired_link_fails_past_the_deadline() {
    let mut link = EffectiveRateLink::new(contact(0, 1, 0.0, 100.0, 1_000.0, 0.0), 0.0, 1, 0.0);
    let late = message(0, 1, 0.0, 5_000, 3.0);
    assert_eq!(link.plan_transmission(&late, 0.0), TxPlan::Fail { after: 5.0 });
    let on_time = message(0, 1, 0.0, 5_000, 5.0);
    assert_eq!(
        link.plan_transmission(&on_time, 0.0),
        TxPlan::Deliver { duration: 5.0 }
    );
}

#[test]
fn error_free_blocks_cost_only_redundancy() {
    let c = contact(0, 1, 0.0, 100.0, 100.0, 0.0);
    let mut link = BlockRedundancyLink::new(c, 100, 0.5, 3, 0.0, 1);
    let plan = link.plan_transmission(&message(0, 1, 0.0, 250, 100.0), 0.0);
    // three blocks (100 + 100 + 50 bits), each sent with 50% redundancy
    assert_eq!(plan, TxPlan::Deliver { duration: 3.75 });
}

#[test]
fn blocks_that_always_fail_give_up_after_the_retries() {
    let c = contact(0, 1, 0.0, 100.0, 100.0, 0.0);
    let mut link = BlockRedundancyLink::new(c, 100, 0.0, 2, 1.0, 1);
    let plan = link.plan_transmission(&message(0, 1, 0.0, 300, 100.0), 0.0);
    assert_eq!(plan, TxPlan::Fail { after: 3.0 });
}

#[test]
fn link_model_defaults_to_ideal() {
    let c = contact(0, 1, 0.0, 10.0, 10.0, 0.0);
    let mut link = LinkModel::default().build(c, 0);
    assert_eq!(link.contact(), &c);
    assert_eq!(
        link.plan_transmission(&message(0, 1, 0.0, 20, 1.0), 0.0),
        TxPlan::Deliver { duration: 2.0 }
    );

    let model: LinkModel = serde_json::from_str(
        r#"{ "kind": "effective_rate", "bit_error_rate": 0.0, "packet_bits": 8 }"#,
    )
    .expect("parse link model");
    assert!(matches!(model, LinkModel::EffectiveRate { overhead, .. } if overhead == 0.0));
}

#[test]
fn contact_bit_error_rate_adds_to_the_model() {
    let noisy = contact(0, 1, 0.0, 100.0, 1_000.0, 0.0).with_bit_error_rate(0.5);
    let link = EffectiveRateLink::new(noisy, 0.5, 1, 0.0);
    assert_eq!(link.effective_rate(), 250.0);

    let mut always_broken = BlockRedundancyLink::new(noisy.with_bit_error_rate(1.0), 100, 0.0, 0, 0.0, 7);
    assert_eq!(
        always_broken.plan_transmission(&message(0, 1, 0.0, 100, 100.0), 0.0),
        TxPlan::Fail { after: 0.1 }
    );
}

#[test]
fn non_finite_bit_error_rates_are_rejected() {
    let nan = LinkModel::BlockRedundancy {
        block_bits: 100,
        redundancy: 0.0,
        max_retries: 1,
        bit_error_rate: f64::NAN,
    };
    assert!(matches!(nan.validate(), Err(LinkModelError::BitErrorRate(ber)) if ber.is_nan()));

    let too_high = LinkModel::EffectiveRate {
        bit_error_rate: 1.5,
        packet_bits: 8,
        overhead: 0.0,
    };
    assert_eq!(too_high.validate(), Err(LinkModelError::BitErrorRate(1.5)));

    let negative_overhead = LinkModel::EffectiveRate {
        bit_error_rate: 0.0,
        packet_bits: 8,
        overhead: -1.0,
    };
    assert_eq!(
        negative_overhead.validate(),
        Err(LinkModelError::Negative {
            what: "overhead",
            value: -1.0,
        })
    );

    let mut net = crate::net::Network::new();
    assert!(net.set_link_model(nan, 1).is_err());
    assert!(LinkModel::Ideal.validate().is_ok());
}
