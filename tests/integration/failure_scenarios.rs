//! Failure tests for the monitor and its actors
//!
//! These tests verify that the system handles failures gracefully:
//! - Executor errors and silent executors
//! - Invalid measurements
//! - Outcomes for removed entities
//! - Unreachable alert webhooks

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use probe_monitoring::{
    Entity, Metric,
    actors::{alert::AlertHandle, monitor::MonitorHandle},
    config::{Alert, Webhook},
    fusion::FusionReport,
    probe::{ProbeOutcome, ProbeResult},
    scheduler::{ProbePhase, Strategy},
    state::StateDistribution,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[test]
fn test_executor_failure_leaves_belief_untouched() {
    let (mut monitor, _) = create_monitor(test_config(&[Metric::Latency]));
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());
    let before = monitor.estimate(&host.id, Metric::Latency).unwrap().distribution;

    let report = monitor.tick(at(0));
    let outcome = monitor.handle_outcome(ProbeOutcome::new(
        &report.dispatched[0].task,
        ProbeResult::Failed("no route to host".to_string()),
        at(1),
    ));
    assert_matches!(
        outcome.fusion,
        FusionReport::TimedOut { reward, reason: Some(_), .. } if reward == -0.1
    );

    let estimate = monitor.estimate(&host.id, Metric::Latency).unwrap();
    assert_eq!(estimate.distribution, before);
    assert_eq!(estimate.observations, 0);
    assert_eq!(estimate.phase, ProbePhase::TimedOut);
    assert_eq!(monitor.statistics(at(1)).fusion.failed, 1);

    // eligible again after the re-probe interval
    assert_eq!(monitor.tick(at(2)).dispatched.len(), 1);
}

#[test]
fn test_invalid_measurements_are_rejected() {
    let (mut monitor, _) = create_monitor(test_config(&[Metric::Loss]));
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());
    let before = monitor.estimate(&host.id, Metric::Loss).unwrap().distribution;

    for (t, measured) in [(0, f64::NAN), (2, 1.5), (4, -0.2), (6, f64::INFINITY)] {
        let report = monitor.tick(at(t));
        let outcome = monitor.handle_outcome(ProbeOutcome::new(
            &report.dispatched[0].task,
            value(measured),
            at(t),
        ));
        assert_matches!(outcome.fusion, FusionReport::Rejected { .. });
        assert!(outcome.events.is_empty());
    }

    let estimate = monitor.estimate(&host.id, Metric::Loss).unwrap();
    assert_eq!(estimate.distribution, before);
    assert_eq!(estimate.samples, 0);

    let stats = monitor.statistics(at(10));
    assert_eq!(stats.fusion.rejected, 4);
    assert_eq!(stats.fusion.fused, 0);
    assert!(stats.fusion.cumulative_reward < 0.0);
}

#[test]
fn test_wrong_observation_kind_is_rejected() {
    let (mut monitor, _) = create_monitor(test_config(&[Metric::Liveness]));
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());

    let report = monitor.tick(at(0));
    let outcome =
        monitor.handle_outcome(ProbeOutcome::new(&report.dispatched[0].task, value(1.0), at(0)));
    assert_matches!(outcome.fusion, FusionReport::Rejected { .. });
    assert_matches!(
        monitor.estimate(&host.id, Metric::Liveness).unwrap().distribution,
        StateDistribution::Binary(b) if b.alpha == 1.0 && b.beta == 1.0
    );
}

#[test]
fn test_duplicate_delivery_is_stale() {
    let (mut monitor, _) = create_monitor(test_config(&[Metric::Liveness]));
    let host = Entity::host("aa:bb");
    monitor.on_entity_added(host.clone());

    let task = monitor.tick(at(0)).dispatched.remove(0).task;
    let first = monitor.handle_outcome(ProbeOutcome::new(&task, up(true), at(1)));
    let second = monitor.handle_outcome(ProbeOutcome::new(&task, up(true), at(1)));

    assert_matches!(first.fusion, FusionReport::Fused { .. });
    assert_matches!(second.fusion, FusionReport::Stale { .. });
    assert_eq!(monitor.estimate(&host.id, Metric::Liveness).unwrap().observations, 1);
    assert_eq!(monitor.statistics(at(2)).fusion.stale, 1);
}

#[test]
fn test_timeouts_penalize_the_selecting_strategy() {
    let (mut monitor, _) = create_monitor(test_config(&[Metric::Liveness]));
    monitor.on_entity_added(Entity::host("aa:bb"));

    monitor.tick(at(0));
    let report = monitor.tick(at(10));
    assert_eq!(report.timed_out.len(), 1);

    let stats = monitor.statistics(at(10));
    assert_eq!(stats.fusion.timed_out, 1);
    let greedy = &stats.scheduler.strategies[&Strategy::GreedyHighestGain];
    assert_eq!(greedy.rewards, 1);
    assert_eq!(greedy.average_reward, -0.1);
    // the penalized arm loses the next exploitation round
    assert_eq!(report.strategy, Some(Strategy::WeightedRandomByGain));
}

#[tokio::test]
async fn test_failing_executor_does_not_stop_the_loop() {
    let monitor = MonitorHandle::spawn(
        test_config(&[Metric::Liveness]),
        Arc::new(ScriptedExecutor(ProbeResult::Failed("boom".to_string()))),
    )
    .unwrap();
    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();

    for _ in 0..3 {
        monitor.tick_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
    }

    let stats = monitor.stats().await.unwrap();
    assert_eq!(stats.fusion.failed, 3);
    assert_eq!(stats.fusion.fused, 0);
    assert!(stats.events.raised == 0);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_silent_executor_is_timed_out() {
    let mut config = test_config(&[Metric::Liveness]);
    config.scheduler.probe_timeout = 1;
    let monitor = MonitorHandle::spawn(config, Arc::new(SilentExecutor)).unwrap();
    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();

    assert_eq!(monitor.tick_now().await.unwrap().dispatched.len(), 1);

    let handle = &monitor;
    let timed_out = eventually(Duration::from_secs(4), move || async move {
        handle.stats().await.unwrap().fusion.timed_out == 1
    })
    .await;
    assert!(timed_out);
    assert_eq!(monitor.stats().await.unwrap().scheduler.in_flight, 0);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_removal_during_flight_discards_outcome() {
    let monitor =
        MonitorHandle::spawn(test_config(&[Metric::Liveness]), Arc::new(SilentExecutor)).unwrap();
    let host = Entity::host("aa:bb");
    monitor.add_entity(host.clone()).await.unwrap();

    monitor.tick_now().await.unwrap();
    assert!(monitor.remove_entity(host.id.clone()).await.unwrap());

    let stats = monitor.stats().await.unwrap();
    assert_eq!(stats.scheduler.in_flight, 0);
    assert_eq!(stats.pairs, 0);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_alert_actor_survives_webhook_errors() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut config = test_config(&[Metric::Liveness]);
    config.alert = Some(Alert::Webhook(Webhook {
        url: mock_server.uri(),
    }));
    let alert = config.alert.clone();

    let monitor = MonitorHandle::spawn(config, FixedExecutor::new(false)).unwrap();
    let alerts = AlertHandle::spawn(alert, monitor.subscribe_events());

    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();
    monitor.add_entity(Entity::host("cc:dd")).await.unwrap();
    monitor.tick_now().await.unwrap();

    let handle = &alerts;
    let failed = eventually(Duration::from_secs(2), move || async move {
        handle.get_state().await.is_some_and(|state| state.failed == 2)
    })
    .await;
    assert!(failed);
    assert_eq!(alerts.get_state().await.unwrap().delivered, 0);

    alerts.shutdown().await;
    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_alert_actor_survives_unreachable_webhook() {
    let alert = Some(Alert::Webhook(Webhook {
        url: "http://127.0.0.1:9/hook".to_string(),
    }));

    let monitor =
        MonitorHandle::spawn(test_config(&[Metric::Liveness]), FixedExecutor::new(false)).unwrap();
    let alerts = AlertHandle::spawn(alert, monitor.subscribe_events());

    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();
    monitor.tick_now().await.unwrap();

    let handle = &alerts;
    let failed = eventually(Duration::from_secs(5), move || async move {
        handle.get_state().await.is_some_and(|state| state.failed == 1)
    })
    .await;
    assert!(failed);

    alerts.shutdown().await;
    monitor.shutdown().await.unwrap();
}
