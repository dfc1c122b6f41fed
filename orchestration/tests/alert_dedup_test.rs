//! Alert engine threshold, dedup, and routing scenarios

use chrono::{Duration, Utc};
use orchestration::{AlertEngine, Channel, Severity};

#[test]
fn error_rate_sequence_produces_one_deduplicated_critical() {
    let mut engine = AlertEngine::new();
    let start = Utc::now();
    let step = Duration::minutes(15);

    // [0.2%, 0.2%, 6%, 6%, 6%] sampled every 15 minutes
    let samples = [0.002, 0.002, 0.06, 0.06, 0.06];
    let mut emitted = Vec::new();
    for (i, value) in samples.iter().enumerate() {
        let at = start + step * i as i32;
        if let Some(alert) = engine.evaluate_at("error_rate", "api", *value, at) {
            emitted.push(alert);
        }
    }

    // Exactly one alert record, raised by the third sample
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].severity, Severity::Critical);
    assert_eq!(emitted[0].channel(), Channel::Immediate);

    let active = engine.active_alert("error_rate", "api").unwrap();
    assert_eq!(active.count_in_window, 3);
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn window_expiry_opens_a_fresh_alert() {
    let mut engine = AlertEngine::new();
    let start = Utc::now();

    let first = engine.evaluate_at("error_rate", "api", 0.06, start).unwrap();
    assert_eq!(first.count_in_window, 1);

    // Silence past the 15-minute critical window, then a new breach
    let second = engine
        .evaluate_at("error_rate", "api", 0.07, start + Duration::minutes(30))
        .expect("fresh window expected");
    assert_eq!(second.count_in_window, 1);
    assert_eq!(engine.history().len(), 2);

    // The fresh record starts a fresh count
    let active = engine.active_alert("error_rate", "api").unwrap();
    assert_eq!(active.first_seen, second.first_seen);
}

#[test]
fn same_metric_different_components_do_not_dedup() {
    let mut engine = AlertEngine::new();
    let now = Utc::now();

    let api = engine.evaluate_at("error_rate", "api", 0.06, now).unwrap();
    let worker = engine.evaluate_at("error_rate", "worker", 0.06, now).unwrap();
    assert_ne!(api.fingerprint, worker.fingerprint);
    assert_eq!(engine.active().len(), 2);
}

#[test]
fn traffic_thresholds_track_the_rolling_baseline() {
    let mut engine = AlertEngine::new();
    let start = Utc::now() - Duration::days(4);

    // Two days of healthy traffic around 200 req/s: no alerts, and no
    // baseline-relative alert before a day of history exists
    for hour in 0..48 {
        assert!(engine
            .evaluate_at("traffic", "web", 200.0, start + Duration::hours(hour))
            .is_none());
    }

    // 50 req/s is 25% of baseline: a medium drop, batched into summaries
    let drop = engine
        .evaluate_at("traffic", "web", 50.0, start + Duration::hours(49))
        .expect("drop below 30% of baseline should alert");
    assert_eq!(drop.severity, Severity::Medium);
    assert_eq!(drop.channel(), Channel::Summary);
}

#[test]
fn severity_routes_to_the_right_channel() {
    assert_eq!(Severity::Critical.channel(), Channel::Immediate);
    assert_eq!(Severity::High.channel(), Channel::QueuedSla);
    assert_eq!(Severity::Medium.channel(), Channel::Summary);
    assert_eq!(Severity::Low.channel(), Channel::Summary);
    assert_eq!(Severity::Info.channel(), Channel::Summary);
}
