use crate::sim::{SimTime, wait_duration, wake_time};

#[test]
fn sim_time_unit_conversions() {
    assert_eq!(SimTime::from_micros(1), SimTime(1_000));
    assert_eq!(SimTime::from_millis(1), SimTime(1_000_000));
    assert_eq!(SimTime::from_secs(1), SimTime(1_000_000_000));
    assert_eq!(SimTime::from_secs(u64::MAX), SimTime::MAX);
}

#[test]
fn seconds_round_trip_through_nanoseconds() {
    assert_eq!(SimTime::from_secs_f64(1.5), SimTime(1_500_000_000));
    assert_eq!(SimTime::from_secs_f64(16.0).as_secs_f64(), 16.0);
    assert_eq!(SimTime::from_secs_f64(0.000_000_001), SimTime(1));
}

#[test]
fn negative_nan_and_infinite_seconds_are_clamped() {
    assert_eq!(SimTime::from_secs_f64(-3.0), SimTime::ZERO);
    assert_eq!(SimTime::from_secs_f64(f64::NAN), SimTime::ZERO);
    assert_eq!(SimTime::from_secs_f64(f64::INFINITY), SimTime::MAX);
}

#[test]
fn wait_duration_is_zero_for_past_targets() {
    let now = SimTime::from_secs(10);
    assert_eq!(wait_duration(now, 12.5), 2.5);
    assert_eq!(wait_duration(now, 4.0), 0.0);
    assert_eq!(wait_duration(now, 10.0), 0.0);
}

#[test]
fn wake_time_never_lies_in_the_past() {
    let now = SimTime::from_secs(10);
    assert_eq!(wake_time(now, 3.0), now);
    assert_eq!(wake_time(now, 20.0), SimTime::from_secs(20));
    assert_eq!(SimTime::MAX.saturating_add(SimTime(1)), SimTime::MAX);
}
