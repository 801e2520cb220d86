//! Router dispatch: defaults, validation, animation-frame rejection,
//! idempotent authoritative updates.

mod common;

use std::time::Duration;

use common::{harness, wait_for, HOST, PREFIX};
use core_bus::{BusClient, BusMessage, SinkRecord};
use serde_json::json;

#[tokio::test]
async fn animation_frames_are_dropped_without_side_effects() {
    let h = harness(|_| vec![]).await;
    h.state_upd(json!({"scene": "blank", "_isAnimationFrame": true, "generationId": 99}))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.sink.records().is_empty(), "no events of any kind");
    let snap = h.manager.device_state(HOST).unwrap();
    assert_eq!(snap.generation, 0, "no switch happened");
    assert_eq!(snap.status.as_str(), "idle");
    assert_eq!(h.manager.device_metrics(HOST).unwrap().pushes, 0);
}

#[tokio::test]
async fn identical_updates_each_run_the_full_switch() {
    let h = harness(|_| vec![]).await;
    h.state_upd(json!({"scene": "blank"})).await;
    assert!(
        wait_for(Duration::from_secs(2), || h
            .sink
            .frame_oks(HOST)
            .iter()
            .any(|f| f.generation_id == 1))
        .await
    );
    h.state_upd(json!({"scene": "blank"})).await;
    assert!(
        wait_for(Duration::from_secs(2), || h
            .sink
            .frame_oks(HOST)
            .iter()
            .any(|f| f.generation_id == 2))
        .await
    );

    let pairs: Vec<(String, u64)> = h
        .sink
        .transitions(HOST)
        .into_iter()
        .filter(|(s, _)| s == "switching" || s == "running")
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("switching".to_string(), 1),
            ("running".to_string(), 1),
            ("switching".to_string(), 2),
            ("running".to_string(), 2),
        ]
    );
}

#[tokio::test]
async fn scene_set_updates_the_default_used_by_bare_updates() {
    let h = harness(|_| vec![]).await;
    h.command("scene", "set", json!({"name": "blank"})).await;

    let acks: Vec<_> = h
        .sink
        .records()
        .into_iter()
        .filter_map(|r| match r {
            SinkRecord::Ack { ev, .. } => Some(ev),
            _ => None,
        })
        .collect();
    assert_eq!(acks.len(), 1);
    assert!(acks[0].ok);
    assert_eq!(acks[0].section, "scene");

    // A bare update now resolves to the configured default.
    h.state_upd(json!({})).await;
    assert!(
        wait_for(Duration::from_secs(2), || h
            .sink
            .frame_oks(HOST)
            .iter()
            .any(|f| f.scene == "blank"))
        .await
    );
}

#[tokio::test]
async fn bare_update_without_default_falls_back_to_empty() {
    let h = harness(|_| vec![]).await;
    // No `empty` scene registered in the harness: the fallback resolution
    // surfaces as an unknown-scene error event, not a crash.
    h.state_upd(json!({})).await;
    assert!(
        wait_for(Duration::from_secs(1), || !h.sink.errors(HOST).is_empty()).await
    );
    assert!(h.sink.errors(HOST)[0].error.contains("empty"));
    assert_eq!(h.manager.device_state(HOST).unwrap().generation, 0);
}

#[tokio::test]
async fn invalid_payloads_become_error_events_never_crashes() {
    let h = harness(|_| vec![]).await;

    h.command("scene", "set", json!({"nom": "blank"})).await;
    h.command("scene", "set", json!({"name": "missing"})).await;
    h.command("driver", "set", json!({"driver": "serial"})).await;
    h.command("blorp", "set", json!({})).await;

    let errors = h.sink.errors(HOST);
    assert_eq!(errors.len(), 4);
    assert!(errors[0].error.contains("name"));
    assert!(errors[1].error.contains("missing"));
    assert!(errors[2].error.contains("driver"));
    assert!(errors[3].error.contains("unsupported"));

    // The device itself was never touched.
    assert_eq!(h.manager.device_state(HOST).unwrap().generation, 0);
}

#[tokio::test]
async fn router_consumes_from_the_bus_subscription() {
    let h = harness(|_| vec![]).await;
    let router = h.router.clone();
    tokio::spawn(router.run());
    // Give the subscription a beat to land before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.bus
        .publish(
            &format!("{PREFIX}/{HOST}/state/upd"),
            json!({"scene": "blank"}),
        )
        .unwrap();
    assert!(
        wait_for(Duration::from_secs(2), || h
            .sink
            .frame_oks(HOST)
            .iter()
            .any(|f| f.scene == "blank"))
        .await,
        "bus-delivered command should switch the scene"
    );

    // Commands for other prefixes are ignored entirely.
    h.bus
        .publish("other/desk/state/upd", json!({"scene": "blank"}))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.manager.device_state(HOST).unwrap().generation, 1);
}

#[tokio::test]
async fn unknown_hosts_get_a_default_device_on_first_use() {
    let h = harness(|_| vec![]).await;
    h.router
        .handle(BusMessage::new(
            format!("{PREFIX}/attic/state/upd"),
            json!({"scene": "blank"}),
        ))
        .await;
    assert!(
        wait_for(Duration::from_secs(2), || h
            .sink
            .frame_oks("attic")
            .iter()
            .any(|f| f.scene == "blank"))
        .await,
        "unlisted host should be served by a default-driver device"
    );
    assert_eq!(
        h.manager.device_driver("attic"),
        Some(core_driver::DriverKind::Mock)
    );
}
