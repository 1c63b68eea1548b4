//! Integration tests for the full actor pipeline
//!
//! These tests verify that actors work correctly together:
//! - Monitor → executor → fusion → event broadcast
//! - Event broadcast → AlertActor → webhook
//! - Graceful shutdown of the whole system

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use probe_monitoring::{
    Entity, Metric,
    actors::{alert::AlertHandle, monitor::MonitorHandle},
    config::{Alert, Webhook},
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_outcomes_flow_back_into_estimates() {
    let executor = FixedExecutor::new(true);
    let handle = MonitorHandle::spawn(
        test_config(&[Metric::Liveness, Metric::Latency]),
        executor.clone(),
    )
    .unwrap();

    let host = Entity::host("aa:bb");
    handle.add_entity(host.clone()).await.unwrap();

    let report = handle.tick_now().await.unwrap();
    assert_eq!(report.dispatched.len(), 2);

    let monitor = &handle;
    let fused = eventually(Duration::from_secs(1), move || async move {
        monitor.stats().await.unwrap().fusion.fused == 2
    })
    .await;
    assert!(fused);
    assert_eq!(executor.calls(), 2);

    let latency = handle
        .estimate(host.id.clone(), Metric::Latency)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latency.observations, 1);
    assert!(latency.variance.unwrap() < 1.0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_event_is_delivered_to_webhook() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(serde_json::json!({
            "entity": "host_aa:bb",
            "metric": "liveness",
            "severity": "warning",
            "status": "raised"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = test_config(&[Metric::Liveness]);
    config.alert = Some(Alert::Webhook(Webhook {
        url: format!("{}/hook", mock_server.uri()),
    }));
    let alert = config.alert.clone();

    let monitor = MonitorHandle::spawn(config, FixedExecutor::new(false)).unwrap();
    let alerts = AlertHandle::spawn(alert, monitor.subscribe_events());

    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();
    monitor.tick_now().await.unwrap();

    let handle = &alerts;
    let delivered = eventually(Duration::from_secs(2), move || async move {
        handle.get_state().await.is_some_and(|state| state.delivered == 1)
    })
    .await;
    assert!(delivered);

    let state = alerts.get_state().await.unwrap();
    assert_eq!(state.received, 1);
    assert_eq!(state.failed, 0);

    alerts.shutdown().await;
    monitor.shutdown().await.unwrap();
    mock_server.verify().await;
}

#[tokio::test]
async fn test_muted_alerts_are_not_delivered() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = test_config(&[Metric::Liveness]);
    config.alert = Some(Alert::Webhook(Webhook {
        url: mock_server.uri(),
    }));
    let alert = config.alert.clone();

    let monitor = MonitorHandle::spawn(config, FixedExecutor::new(false)).unwrap();
    let alerts = AlertHandle::spawn(alert, monitor.subscribe_events());
    alerts.mute_alerts(3600).await;
    assert!(alerts.get_state().await.unwrap().muted);

    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();
    monitor.tick_now().await.unwrap();

    let handle = &alerts;
    let suppressed = eventually(Duration::from_secs(1), move || async move {
        handle.get_state().await.is_some_and(|state| state.suppressed == 1)
    })
    .await;
    assert!(suppressed);

    alerts.shutdown().await;
    monitor.shutdown().await.unwrap();
    mock_server.verify().await;
}

#[tokio::test]
async fn test_every_subscriber_sees_events() {
    let monitor = MonitorHandle::spawn(
        test_config(&[Metric::Liveness]),
        FixedExecutor::new(false),
    )
    .unwrap();
    let mut first = monitor.subscribe_events();
    let mut second = monitor.subscribe_events();

    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();
    monitor.add_entity(Entity::host("cc:dd")).await.unwrap();
    monitor.tick_now().await.unwrap();

    for rx in [&mut first, &mut second] {
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(event.is_open());
        }
    }
    assert_eq!(monitor.open_events().await.unwrap().len(), 2);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_clients_share_one_monitor() {
    let monitor = MonitorHandle::spawn(
        test_config(&[Metric::Liveness]),
        Arc::new(SilentExecutor),
    )
    .unwrap();

    let added = join_all((0..8).map(|i| {
        let handle = monitor.clone();
        async move {
            handle
                .add_entity(Entity::host(&format!("00:00:00:00:00:{i:02x}")))
                .await
                .unwrap()
        }
    }))
    .await;
    assert!(added.into_iter().all(|new| new));

    let stats = join_all((0..4).map(|_| monitor.stats())).await;
    for stats in stats {
        assert_eq!(stats.unwrap().entities, 8);
    }

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let monitor = MonitorHandle::spawn(
        test_config(&[Metric::Liveness]),
        Arc::new(SilentExecutor),
    )
    .unwrap();
    let alerts = AlertHandle::spawn(None, monitor.subscribe_events());

    monitor.add_entity(Entity::host("aa:bb")).await.unwrap();
    monitor.tick_now().await.unwrap();

    alerts.shutdown().await;
    monitor.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(monitor.stats().await.is_err());
    assert!(alerts.get_state().await.is_none());
}
