use sentinel_realtime::{ConnectionRegistry, OutboundMessage, ServerEvent};
use tokio::sync::mpsc;

fn deleted(tenant: &str) -> ServerEvent {
    ServerEvent::DeviceDeleted {
        device_id: "pole-1".to_string(),
        tenant_id: tenant.to_string(),
        timestamp: 1,
    }
}

fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(serde_json::from_str(&message).expect("json"));
    }
    out
}

#[test]
fn register_sends_greeting() {
    let mut registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel(8);
    registry.register("c-1".to_string(), tx, 10);
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "connection_status");
    assert_eq!(messages[0]["data"]["connected"], true);
}

#[test]
fn tenant_broadcast_skips_other_and_unbound_connections() {
    let mut registry = ConnectionRegistry::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let (tx_unbound, mut rx_unbound) = mpsc::channel(8);
    registry.register("a".to_string(), tx_a, 0);
    registry.register("b".to_string(), tx_b, 0);
    registry.register("u".to_string(), tx_unbound, 0);
    assert!(registry.bind("a", "tenant-a"));
    assert!(registry.bind("b", "tenant-b"));
    drain(&mut rx_a);
    drain(&mut rx_b);
    drain(&mut rx_unbound);

    let delivered = registry.broadcast_to_tenant("tenant-a", &deleted("tenant-a"));
    assert_eq!(delivered, 1);
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert!(drain(&mut rx_b).is_empty());
    assert!(drain(&mut rx_unbound).is_empty());
}

#[test]
fn broadcast_to_all_reaches_unbound() {
    let mut registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel(8);
    registry.register("u".to_string(), tx, 0);
    drain(&mut rx);
    let event = ServerEvent::ConnectionStatus {
        connected: None,
        mqtt_connected: Some(false),
        timestamp: 2,
    };
    assert_eq!(registry.broadcast_to_all(&event), 1);
    let messages = drain(&mut rx);
    assert_eq!(messages[0]["data"]["mqttConnected"], false);
    assert!(messages[0]["data"].get("connected").is_none());
}

#[test]
fn closed_connection_is_pruned() {
    let mut registry = ConnectionRegistry::new();
    let (tx, rx) = mpsc::channel(8);
    registry.register("gone".to_string(), tx, 0);
    registry.bind("gone", "tenant-a");
    drop(rx);
    assert_eq!(registry.broadcast_to_tenant("tenant-a", &deleted("tenant-a")), 0);
    assert!(registry.is_empty());
}

#[test]
fn full_buffer_is_pruned() {
    let mut registry = ConnectionRegistry::new();
    let (tx, _rx) = mpsc::channel(1);
    // greeting fills the only slot
    registry.register("slow".to_string(), tx, 0);
    registry.bind("slow", "tenant-a");
    assert_eq!(registry.broadcast_to_tenant("tenant-a", &deleted("tenant-a")), 0);
    assert_eq!(registry.len(), 0);
}

#[test]
fn rebinding_moves_connection() {
    let mut registry = ConnectionRegistry::new();
    let (tx, _rx) = mpsc::channel(8);
    registry.register("c".to_string(), tx, 0);
    registry.bind("c", "tenant-a");
    registry.bind("c", "tenant-b");
    assert_eq!(registry.tenant_of("c"), Some("tenant-b"));
    assert_eq!(registry.tenant_connection_count("tenant-a"), 0);
    assert!(registry.unregister("c"));
    assert!(!registry.bind("c", "tenant-a"));
}
