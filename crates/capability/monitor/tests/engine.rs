use domain::{DeviceProfile, DeviceSignal, DeviceStatus, RelayAck, RelayConfig, RelayStates, SignalEnvelope};
use sentinel_control::{
    InMemoryPublisher, InMemoryShadowClient, NamedScenario, RelayDispatcher, ScenarioRequest,
};
use sentinel_ingest::{NoopSubscriber, SignalHandler};
use sentinel_monitor::{
    ActivityKind, DeviceChanges, MonitorConfig, MonitorError, MonitorHandle, spawn_monitor,
};
use sentinel_realtime::OutboundMessage;
use sentinel_status::ManualClock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const NOW_MS: i64 = 1_700_000_000_000;
const TENANT_A: &str = "tenant-a";
const TENANT_B: &str = "tenant-b";

struct Harness {
    handle: MonitorHandle,
    publisher: Arc<InMemoryPublisher>,
    clock: ManualClock,
}

fn start() -> Harness {
    start_with_shadow(None)
}

fn start_with_shadow(shadow: Option<Arc<InMemoryShadowClient>>) -> Harness {
    let clock = ManualClock::new(NOW_MS);
    let publisher = Arc::new(InMemoryPublisher::new());
    let shadow = shadow.map(|shadow| shadow as Arc<dyn sentinel_control::ShadowClient>);
    let dispatcher = RelayDispatcher::new(publisher.clone(), shadow);
    let (handle, _join) = spawn_monitor(
        MonitorConfig::default(),
        dispatcher,
        Arc::new(NoopSubscriber),
        Arc::new(clock.clone()),
    );
    Harness {
        handle,
        publisher,
        clock,
    }
}

fn profile(tenant_id: &str, device_id: &str) -> DeviceProfile {
    DeviceProfile {
        id: device_id.to_string(),
        tenant_id: tenant_id.to_string(),
        name: device_id.to_string(),
        location: "Gate".to_string(),
        lat: 0.0,
        lng: 0.0,
        group: None,
        relay_config: RelayConfig::default(),
    }
}

fn connected() -> DeviceSignal {
    DeviceSignal::Connection {
        status: "connected".to_string(),
    }
}

fn ack(relays: RelayStates) -> DeviceSignal {
    DeviceSignal::RelayAck(RelayAck {
        relays,
        signal_strength: Some(-67),
        battery_level: Some(88.5),
    })
}

async fn dashboard(handle: &MonitorHandle, id: &str, tenant_id: &str) -> mpsc::Receiver<OutboundMessage> {
    let (sender, receiver) = mpsc::channel(64);
    handle
        .register_connection(id.to_string(), sender)
        .await
        .expect("register");
    handle
        .bind_connection(id, tenant_id)
        .await
        .expect("bind")
        .expect("registered connection");
    receiver
}

fn drain(receiver: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Value> {
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(serde_json::from_str(&message).expect("json"));
    }
    messages
}

fn of_type<'a>(messages: &'a [Value], kind: &str) -> Vec<&'a Value> {
    messages.iter().filter(|message| message["type"] == kind).collect()
}

async fn online_device(harness: &Harness, tenant_id: &str, device_id: &str) {
    harness
        .handle
        .register_device(profile(tenant_id, device_id))
        .await
        .expect("register");
    harness
        .handle
        .record_signal(Some(tenant_id), device_id, connected())
        .await
        .expect("signal");
}

#[tokio::test(start_paused = true)]
async fn zonex_3_end_to_end() {
    let harness = start();
    let handle = &harness.handle;
    let device = handle
        .register_device(profile(TENANT_A, "zonex_3"))
        .await
        .expect("register");
    assert_eq!(device.status, DeviceStatus::Offline);
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;
    drain(&mut socket);

    handle
        .record_signal(Some(TENANT_A), "zonex_3", connected())
        .await
        .expect("connection");
    let device = handle.get_device(TENANT_A, "zonex_3").await.expect("device");
    assert_eq!(device.status, DeviceStatus::Online);

    let relays = RelayStates {
        relay1: true,
        ..RelayStates::default()
    };
    handle
        .record_signal(Some(TENANT_A), "zonex_3", ack(relays))
        .await
        .expect("ack");
    let device = handle.get_device(TENANT_A, "zonex_3").await.expect("device");
    assert!(device.features.siren);
    assert!(!device.features.beacon && !device.features.announcement && !device.features.dispenser);
    assert_eq!(device.status, DeviceStatus::ActiveOnline);
    assert_eq!(device.signal_strength, Some(-67));
    let messages = drain(&mut socket);
    let last = messages.last().expect("broadcast");
    assert_eq!(last["type"], "device_status_update");
    assert_eq!(last["data"]["source"], "relay_ack");
    assert_eq!(last["data"]["device"]["status"], "active+online");

    let outcome = handle
        .send_command(TENANT_A, "zonex_3", "siren_off")
        .await
        .expect("command");
    assert_eq!(outcome.payload, RelayStates::default());
    assert_eq!(
        harness.publisher.published(),
        vec![("zonex_3/relay/control".to_string(), RelayStates::default())]
    );
    let device = handle.get_device(TENANT_A, "zonex_3").await.expect("device");
    assert!(device.features.siren);
    assert!(device.relay_states.relay1);
    assert_eq!(of_type(&drain(&mut socket), "command_sent").len(), 1);

    tokio::time::sleep(Duration::from_secs(16)).await;
    handle.get_device(TENANT_A, "zonex_3").await.expect("flush");
    let messages = drain(&mut socket);
    let timeouts = of_type(&messages, "ack_timeout");
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0]["data"]["deviceId"], "zonex_3");
    assert_eq!(timeouts[0]["data"]["feature"], "siren");
}

#[tokio::test(start_paused = true)]
async fn matching_ack_cancels_timeout() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;

    handle
        .send_command(TENANT_A, "pole-1", "beacon_on")
        .await
        .expect("command");
    let relays = RelayStates {
        relay2: true,
        ..RelayStates::default()
    };
    handle
        .record_signal(Some(TENANT_A), "pole-1", ack(relays))
        .await
        .expect("ack");

    tokio::time::sleep(Duration::from_secs(20)).await;
    handle.get_device(TENANT_A, "pole-1").await.expect("flush");
    assert!(of_type(&drain(&mut socket), "ack_timeout").is_empty());

    let activity = handle.activity(TENANT_A, 50).await.expect("activity");
    assert!(activity.iter().any(|entry| entry.kind == ActivityKind::AckConfirmed));
    assert!(activity.iter().any(|entry| entry.kind == ActivityKind::CommandSent));
}

#[tokio::test(start_paused = true)]
async fn ack_for_other_feature_keeps_waiting() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;

    handle
        .send_command(TENANT_A, "pole-1", "siren_on")
        .await
        .expect("command");
    let relays = RelayStates {
        relay4: true,
        ..RelayStates::default()
    };
    handle
        .record_signal(Some(TENANT_A), "pole-1", ack(relays))
        .await
        .expect("ack");

    tokio::time::sleep(Duration::from_secs(16)).await;
    handle.get_device(TENANT_A, "pole-1").await.expect("flush");
    let messages = drain(&mut socket);
    let timeouts = of_type(&messages, "ack_timeout");
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0]["data"]["feature"], "siren");
}

#[tokio::test]
async fn relay_status_without_change_is_suppressed() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;
    drain(&mut socket);

    handle
        .record_signal(Some(TENANT_A), "pole-1", DeviceSignal::RelayStatus)
        .await
        .expect("ping");
    assert!(drain(&mut socket).is_empty());

    handle
        .record_signal(Some(TENANT_A), "pole-1", ack(RelayStates::default()))
        .await
        .expect("ack");
    let messages = drain(&mut socket);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["data"]["source"], "relay_ack");
}

#[tokio::test]
async fn tenants_are_isolated() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;
    let mut other = dashboard(handle, "socket-b", TENANT_B).await;
    drain(&mut other);

    assert!(handle.list_devices(TENANT_B).await.expect("list").is_empty());
    let err = handle
        .send_command(TENANT_B, "pole-1", "siren_on")
        .await
        .expect_err("foreign device");
    assert!(matches!(err, MonitorError::DeviceNotFound(_)));

    handle
        .record_signal(Some(TENANT_A), "pole-1", ack(RelayStates::default()))
        .await
        .expect("ack");
    assert!(drain(&mut other).is_empty());
    assert!(harness.publisher.published().is_empty());
}

#[tokio::test]
async fn scenario_rejects_whole_batch_when_any_device_offline() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "D1").await;
    handle
        .register_device(profile(TENANT_A, "D2"))
        .await
        .expect("register");

    let err = handle
        .execute_scenario(
            TENANT_A,
            vec!["D1".to_string(), "D2".to_string()],
            ScenarioRequest::Named(NamedScenario::Fire),
        )
        .await
        .expect_err("rejected");
    match err {
        MonitorError::ScenarioRejected { offline, missing } => {
            assert_eq!(offline, vec!["D2".to_string()]);
            assert!(missing.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.publisher.published().is_empty());
}

#[tokio::test]
async fn scenario_publishes_to_every_device() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "D1").await;
    online_device(&harness, TENANT_A, "D2").await;
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;
    drain(&mut socket);

    let outcome = handle
        .execute_scenario(
            TENANT_A,
            vec!["D1".to_string(), "D2".to_string()],
            ScenarioRequest::Named(NamedScenario::War),
        )
        .await
        .expect("scenario");
    assert_eq!(outcome.scenario, "WAR");
    assert!(outcome.results.iter().all(|item| item.result.is_ok()));

    let expected = RelayStates {
        relay1: true,
        relay2: false,
        relay3: true,
        relay4: true,
    };
    let published = harness.publisher.published();
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|(_, relays)| *relays == expected));

    let messages = drain(&mut socket);
    assert_eq!(of_type(&messages, "command_sent").len(), 2);
    let executed = of_type(&messages, "scenario_executed");
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0]["data"]["deviceIds"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn offline_device_rejects_command() {
    let harness = start();
    let handle = &harness.handle;
    handle
        .register_device(profile(TENANT_A, "pole-1"))
        .await
        .expect("register");
    let err = handle
        .send_command(TENANT_A, "pole-1", "siren_on")
        .await
        .expect_err("offline");
    assert!(matches!(err, MonitorError::DeviceOffline { .. }));
    assert!(err.to_string().contains("online or active+online"));

    let err = handle
        .send_command(TENANT_A, "pole-1", "launch_rocket")
        .await
        .expect_err("unknown");
    assert!(matches!(err, MonitorError::Control(_)));
}

#[tokio::test]
async fn publish_failure_marks_device_disconnected() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;
    harness.publisher.set_failing(true);

    let err = handle
        .send_command(TENANT_A, "pole-1", "siren_on")
        .await
        .expect_err("dispatch");
    assert!(matches!(err, MonitorError::Dispatch(_)));
    let device = handle.get_device(TENANT_A, "pole-1").await.expect("device");
    assert_eq!(device.status, DeviceStatus::Offline);
}

#[tokio::test]
async fn colliding_device_id_updates_each_owner() {
    let harness = start();
    let handle = &harness.handle;
    for tenant_id in [TENANT_A, TENANT_B] {
        handle
            .register_device(profile(tenant_id, "pole-1"))
            .await
            .expect("register");
    }
    handle
        .record_signal(None, "pole-1", connected())
        .await
        .expect("signal");
    for tenant_id in [TENANT_A, TENANT_B] {
        let device = handle.get_device(tenant_id, "pole-1").await.expect("device");
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.tenant_id, tenant_id);
    }
}

#[tokio::test]
async fn older_signal_does_not_rewind_connection() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;

    handle
        .submit_signal(SignalEnvelope {
            tenant_id: Some(TENANT_A.to_string()),
            device_id: "pole-1".to_string(),
            signal: DeviceSignal::Connection {
                status: "disconnected".to_string(),
            },
            received_at_ms: NOW_MS - 1_000,
        })
        .await
        .expect("submit");
    let device = handle.get_device(TENANT_A, "pole-1").await.expect("device");
    assert_eq!(device.status, DeviceStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn status_check_marks_stale_device_offline() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;
    drain(&mut socket);

    harness.clock.advance_ms(21 * 60 * 1_000);
    tokio::time::sleep(Duration::from_secs(31)).await;
    let device = handle.get_device(TENANT_A, "pole-1").await.expect("device");
    assert_eq!(device.status, DeviceStatus::Offline);

    let messages = drain(&mut socket);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["data"]["source"], "status_check");
}

#[tokio::test]
async fn bound_connection_receives_device_snapshots() {
    let harness = start();
    let handle = &harness.handle;
    for device_id in ["pole-1", "pole-2"] {
        handle
            .register_device(profile(TENANT_A, device_id))
            .await
            .expect("register");
    }
    let (sender, mut socket) = mpsc::channel(64);
    handle
        .register_connection("socket-1".to_string(), sender)
        .await
        .expect("register");
    let snapshot = handle
        .bind_connection("socket-1", TENANT_A)
        .await
        .expect("bind")
        .expect("registered connection");
    let snapshot: Vec<Value> = snapshot
        .iter()
        .map(|event| serde_json::from_str(&event.to_json().expect("json")).expect("value"))
        .collect();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|message| message["type"] == "device_status_update"));
    assert!(snapshot.iter().all(|message| message["data"]["source"] == "snapshot"));

    let messages = drain(&mut socket);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "connection_status");
    assert_eq!(messages[0]["data"]["connected"], true);
}

#[tokio::test]
async fn snapshot_larger_than_connection_buffer_keeps_connection() {
    let harness = start();
    let handle = &harness.handle;
    for index in 0..8 {
        handle
            .register_device(profile(TENANT_A, &format!("pole-{index}")))
            .await
            .expect("register");
    }
    let (sender, mut socket) = mpsc::channel(4);
    handle
        .register_connection("socket-1".to_string(), sender)
        .await
        .expect("register");
    let snapshot = handle
        .bind_connection("socket-1", TENANT_A)
        .await
        .expect("bind")
        .expect("registered connection");
    assert_eq!(snapshot.len(), 8);
    drain(&mut socket);

    online_device(&harness, TENANT_A, "pole-9").await;
    let messages = drain(&mut socket);
    assert_eq!(of_type(&messages, "device_created").len(), 1);
    let updates = of_type(&messages, "device_status_update");
    assert!(updates.iter().any(|message| message["data"]["deviceId"] == "pole-9"));
}

#[tokio::test]
async fn binding_unknown_connection_returns_none() {
    let harness = start();
    let snapshot = harness
        .handle
        .bind_connection("missing", TENANT_A)
        .await
        .expect("bind");
    assert!(snapshot.is_none());
}

#[tokio::test]
async fn broker_status_reaches_every_connection() {
    let harness = start();
    let handle = &harness.handle;
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;
    drain(&mut socket);

    handle.broker_status(true).await;
    handle.list_devices(TENANT_A).await.expect("flush");
    assert!(handle.mqtt_connected());
    let messages = drain(&mut socket);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["data"]["mqttConnected"], true);

    handle.broker_status(true).await;
    handle.list_devices(TENANT_A).await.expect("flush");
    assert!(drain(&mut socket).is_empty());
}

#[tokio::test]
async fn deregister_removes_device_and_broadcasts() {
    let harness = start();
    let handle = &harness.handle;
    handle
        .register_device(profile(TENANT_A, "pole-1"))
        .await
        .expect("register");
    let mut socket = dashboard(handle, "socket-1", TENANT_A).await;
    drain(&mut socket);

    handle
        .deregister_device(TENANT_A, "pole-1")
        .await
        .expect("deregister");
    assert!(handle.list_devices(TENANT_A).await.expect("list").is_empty());
    assert_eq!(of_type(&drain(&mut socket), "device_deleted").len(), 1);
    assert!(matches!(
        handle.deregister_device(TENANT_A, "pole-1").await,
        Err(MonitorError::DeviceNotFound(_))
    ));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let harness = start();
    let handle = &harness.handle;
    handle
        .register_device(profile(TENANT_A, "pole-1"))
        .await
        .expect("register");
    assert!(matches!(
        handle.register_device(profile(TENANT_A, "pole-1")).await,
        Err(MonitorError::DeviceExists(_))
    ));
    handle
        .register_device(profile(TENANT_B, "pole-1"))
        .await
        .expect("other tenant");
}

#[tokio::test]
async fn relay_config_update_recomputes_features() {
    let harness = start();
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;
    let relays = RelayStates {
        relay1: true,
        ..RelayStates::default()
    };
    handle
        .record_signal(Some(TENANT_A), "pole-1", ack(relays))
        .await
        .expect("ack");

    let swapped = RelayConfig {
        relay1: domain::Feature::Beacon,
        relay2: domain::Feature::Siren,
        ..RelayConfig::default()
    };
    let device = handle
        .update_device(
            TENANT_A,
            "pole-1",
            DeviceChanges {
                relay_config: Some(swapped),
                ..DeviceChanges::default()
            },
        )
        .await
        .expect("update");
    assert!(device.features.beacon);
    assert!(!device.features.siren);

    let invalid = RelayConfig {
        relay1: domain::Feature::Siren,
        relay2: domain::Feature::Siren,
        ..RelayConfig::default()
    };
    let err = handle
        .update_device(
            TENANT_A,
            "pole-1",
            DeviceChanges {
                relay_config: Some(invalid),
                ..DeviceChanges::default()
            },
        )
        .await
        .expect_err("invalid");
    assert!(matches!(err, MonitorError::Control(_)));
}

#[tokio::test]
async fn group_membership_follows_assignment() {
    let harness = start();
    let handle = &harness.handle;
    for device_id in ["pole-1", "pole-2"] {
        handle
            .register_device(profile(TENANT_A, device_id))
            .await
            .expect("register");
    }
    let changed = handle
        .assign_group(TENANT_A, "perimeter", vec!["pole-1".to_string()])
        .await
        .expect("assign");
    assert_eq!(changed.len(), 1);
    let device = handle.get_device(TENANT_A, "pole-1").await.expect("device");
    assert_eq!(device.group.as_deref(), Some("perimeter"));

    let cleared = handle.clear_group(TENANT_A, "perimeter").await.expect("clear");
    assert_eq!(cleared.len(), 1);
    let device = handle.get_device(TENANT_A, "pole-1").await.expect("device");
    assert!(device.group.is_none());
}

#[tokio::test]
async fn sync_reads_shadow_reported_state() {
    let shadow = Arc::new(InMemoryShadowClient::new());
    let harness = start_with_shadow(Some(shadow.clone()));
    let handle = &harness.handle;
    online_device(&harness, TENANT_A, "pole-1").await;

    shadow.set_reported(
        "pole-1",
        RelayStates {
            relay3: true,
            ..RelayStates::default()
        },
    );
    let device = handle.sync_device(TENANT_A, "pole-1").await.expect("sync");
    assert!(device.features.announcement);
    assert_eq!(device.status, DeviceStatus::ActiveOnline);

    shadow.set_failing("pole-1", true);
    let device = handle.sync_device(TENANT_A, "pole-1").await.expect("sync");
    assert_eq!(device.status, DeviceStatus::Offline);
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let harness = start();
    let handle = &harness.handle;
    handle.shutdown().await.expect("shutdown");
    assert!(matches!(
        handle.list_devices(TENANT_A).await,
        Err(MonitorError::Stopped)
    ));
}
