//! End-to-end scenarios on the synchronous monitor
//!
//! Time is driven by the test, so every scenario is deterministic.

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use probe_monitoring::{
    Entity, EntityId, Metric,
    events::{EventKind, Severity},
    probe::ProbeOutcome,
    scheduler::ProbePhase,
    state::StateDistribution,
};

use crate::helpers::*;

#[test]
fn test_concurrency_bound_holds_across_ticks() {
    let mut config = test_config(&[Metric::Liveness]);
    config.scheduler.max_concurrent_probes = 3;
    config.scheduler.top_k = 5;
    let (mut monitor, _) = create_monitor(config);
    for i in 0..10 {
        monitor.on_entity_added(Entity::host(&format!("00:00:00:00:00:{i:02x}")));
    }

    let first = monitor.tick(at(0));
    assert_eq!(first.dispatched.len(), 3);
    assert_eq!(monitor.in_flight(), 3);

    // budget exhausted: nothing more until something resolves
    let second = monitor.tick(at(2));
    assert!(second.dispatched.is_empty());
    assert_eq!(monitor.in_flight(), 3);

    let keys: BTreeSet<_> = first.dispatched.iter().map(|d| d.task.key.clone()).collect();
    assert_eq!(keys.len(), 3);

    for dispatch in &first.dispatched {
        monitor.handle_outcome(ProbeOutcome::new(&dispatch.task, up(true), at(3)));
    }
    assert_eq!(monitor.in_flight(), 0);

    let third = monitor.tick(at(4));
    assert_eq!(third.dispatched.len(), 3);
}

#[test]
fn test_minimum_reprobe_interval() {
    let mut config = test_config(&[Metric::Liveness]);
    config.scheduler.min_reprobe_interval = 5;
    let (mut monitor, _) = create_monitor(config);
    monitor.on_entity_added(Entity::host("aa:bb"));

    assert_eq!(run_round(&mut monitor, 0, |_| up(true)), 1);
    assert_eq!(run_round(&mut monitor, 3, |_| up(true)), 0);
    // exactly at the interval is still too early
    assert_eq!(run_round(&mut monitor, 5, |_| up(true)), 0);
    assert_eq!(run_round(&mut monitor, 6, |_| up(true)), 1);
}

#[test]
fn test_liveness_converges_to_observed_rate() {
    let (mut monitor, _) = create_monitor(test_config(&[Metric::Liveness]));
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());

    for t in 0..20 {
        run_round(&mut monitor, t * 2, |_| up(true));
    }

    let estimate = monitor.estimate(&host.id, Metric::Liveness).unwrap();
    assert_eq!(estimate.observations, 20);
    assert!((estimate.confidence.unwrap() - 21.0 / 22.0).abs() < 1e-12);
    assert_eq!(estimate.phase, ProbePhase::Fused);
}

#[test]
fn test_latency_estimate_tracks_measurements() {
    let (mut monitor, _) = create_monitor(test_config(&[Metric::Latency]));
    let link = Entity::link(1, 2, 3, 4);
    monitor.on_entity_added(link.clone());

    for t in 0..10 {
        run_round(&mut monitor, t * 2, |_| value(42.0));
    }

    let estimate = monitor.estimate(&EntityId::new("link_1_2_3_4"), Metric::Latency).unwrap();
    assert_matches!(estimate.distribution, StateDistribution::Continuous(_));
    assert!((estimate.mean.unwrap() - 42.0).abs() < 4.0);
    assert!(estimate.variance.unwrap() < 0.2);
    assert_eq!(estimate.samples, 10);
}

#[test]
fn test_stable_pair_backs_off() {
    let mut config = test_config(&[Metric::Latency]);
    config.scheduler.min_reprobe_interval = 5;
    config.scheduler.max_probe_interval = 30;
    config.scheduler.interval_gain = 0.1;
    let (mut monitor, _) = create_monitor(config);
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());

    let mut dispatched = 0;
    for t in 0..200 {
        dispatched += run_round(&mut monitor, t, |_| value(10.0));
    }

    let interval = monitor.estimate(&host.id, Metric::Latency).unwrap().probe_interval;
    assert!(interval > 5.0);
    assert!(interval <= 30.0);
    // a fixed 5s interval would have probed 200 / 6 = 33 times
    assert!(dispatched < 33, "dispatched {dispatched} probes");
}

#[test]
fn test_unstable_pair_stays_at_floor() {
    let mut config = test_config(&[Metric::Latency]);
    config.scheduler.min_reprobe_interval = 5;
    config.scheduler.interval_gain = 0.1;
    let (mut monitor, _) = create_monitor(config);
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());

    let mut flip = false;
    for t in 0..60 {
        let report = monitor.tick(at(t));
        for dispatch in report.dispatched {
            flip = !flip;
            let measured = if flip { 0.0 } else { 100.0 };
            monitor.handle_outcome(ProbeOutcome::new(&dispatch.task, value(measured), at(t)));
        }
    }

    let estimate = monitor.estimate(&host.id, Metric::Latency).unwrap();
    assert_eq!(estimate.stability_score, 1.0);
    assert_eq!(estimate.probe_interval, 5.0);
}

fn spike_series(n: usize) -> Vec<f64> {
    let mut series: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 }).collect();
    series.push(1000.0);
    series
}

#[test]
fn test_latency_spike_raises_deviation_event() {
    let (mut monitor, sink) = create_monitor(test_config(&[Metric::Latency]));
    let link = Entity::link(1, 1, 2, 1);
    monitor.on_entity_added(link.clone());

    for (i, measured) in spike_series(12).into_iter().enumerate() {
        run_round(&mut monitor, i as i64 * 2, |_| value(measured));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.kind == EventKind::ValueDeviation));
    let severities: BTreeSet<_> = events.iter().map(|e| e.severity).collect();
    assert_eq!(severities, BTreeSet::from([Severity::Warning, Severity::Critical]));

    let summary = monitor.anomaly_summary();
    assert_eq!(summary.value_deviations.len(), 2);
    assert!(summary.liveness_issues.is_empty());
    assert_eq!(monitor.events_for_entity(&link.id).len(), 2);
}

#[test]
fn test_core_entity_latency_event_triggers_siblings() {
    let link = Entity::link(1, 1, 2, 1);
    let other = Entity::link(3, 1, 4, 1);

    let mut config = test_config(&[Metric::Latency]);
    config.events.core_entities = vec![link.id.clone()];
    let (mut monitor, _) = create_monitor(config);
    monitor.on_entity_added(link.clone());

    for (i, measured) in spike_series(12).into_iter().enumerate() {
        run_round(&mut monitor, i as i64 * 2, |_| value(measured));
    }
    // latency, loss and bandwidth of the core link
    assert_eq!(monitor.statistics(at(30)).events.active_triggers, 3);

    let mut config = test_config(&[Metric::Latency]);
    config.events.core_entities = vec![link.id.clone()];
    let (mut monitor, _) = create_monitor(config);
    monitor.on_entity_added(other.clone());

    for (i, measured) in spike_series(12).into_iter().enumerate() {
        run_round(&mut monitor, i as i64 * 2, |_| value(measured));
    }
    assert_eq!(monitor.statistics(at(30)).events.active_triggers, 1);
}

#[test]
fn test_removing_entity_clears_its_events() {
    let (mut monitor, sink) = create_monitor(test_config(&[Metric::Liveness]));
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());

    run_round(&mut monitor, 0, |_| up(false));
    assert_eq!(monitor.open_events().len(), 1);

    assert!(monitor.on_entity_removed(&host.id, at(1)));
    assert!(monitor.open_events().is_empty());

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].cleared_at, Some(at(1)));
}

#[test]
fn test_statistics_report() {
    let mut config = test_config(&[Metric::Liveness, Metric::Latency]);
    config.entities = vec![Entity::link(1, 1, 2, 1), Entity::host("aa:bb")];
    let (mut monitor, _) = create_monitor(config);

    for t in 0..5 {
        run_round(&mut monitor, t * 2, |task| match task.key.metric {
            Metric::Liveness => up(true),
            _ => value(12.0),
        });
    }

    let stats = monitor.statistics(at(60));
    assert_eq!(stats.rounds, 5);
    assert_eq!(stats.entities, 2);
    assert_eq!(stats.pairs, 4);
    assert_eq!(stats.uptime_secs, 60);
    assert_eq!(stats.fusion.fused, 20);
    assert_eq!(stats.success_rate, 1.0);
    assert_eq!(stats.scheduler.tasks_dispatched, 20);
    assert_eq!(stats.scheduler.in_flight, 0);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["fusion"]["fused"], 20);
}
