//! 看板连接注册表。
//!
//! 只由状态引擎的事件循环持有和修改，因此不加锁。
//! 每条连接对应一个有界 mpsc 发送端，写满或已关闭即视为发送失败并移除该连接。

use crate::ServerEvent;
use sentinel_telemetry::{record_broadcast_sent, record_connection_pruned};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type ConnectionId = String;

/// 已序列化的推送报文（一次序列化，多连接共享）。
pub type OutboundMessage = Arc<str>;

pub fn new_connection_id() -> ConnectionId {
    uuid::Uuid::new_v4().to_string()
}

struct Connection {
    sender: mpsc::Sender<OutboundMessage>,
    tenant_id: Option<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接并发送 `connection_status{connected: true}` 问候。
    pub fn register(
        &mut self,
        id: ConnectionId,
        sender: mpsc::Sender<OutboundMessage>,
        now_ms: i64,
    ) {
        self.connections.insert(
            id.clone(),
            Connection {
                sender,
                tenant_id: None,
            },
        );
        info!(
            target: "sentinel.realtime",
            connection_id = %id,
            connections = self.connections.len(),
            "connection_registered"
        );
        let greeting = ServerEvent::ConnectionStatus {
            connected: Some(true),
            mqtt_connected: None,
            timestamp: now_ms,
        };
        self.send_to(&id, &greeting);
    }

    /// 绑定租户（可重复声明，以最后一次为准）。未注册的连接返回 `false`。
    pub fn bind(&mut self, id: &str, tenant_id: &str) -> bool {
        let Some(connection) = self.connections.get_mut(id) else {
            return false;
        };
        connection.tenant_id = Some(tenant_id.to_string());
        info!(
            target: "sentinel.realtime",
            connection_id = %id,
            tenant_id = %tenant_id,
            "connection_bound"
        );
        true
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            info!(
                target: "sentinel.realtime",
                connection_id = %id,
                connections = self.connections.len(),
                "connection_unregistered"
            );
        }
        removed
    }

    pub fn tenant_of(&self, id: &str) -> Option<&str> {
        self.connections.get(id)?.tenant_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn tenant_connection_count(&self, tenant_id: &str) -> usize {
        self.connections
            .values()
            .filter(|connection| connection.tenant_id.as_deref() == Some(tenant_id))
            .count()
    }

    /// 单播，发送失败时移除连接。
    pub fn send_to(&mut self, id: &str, event: &ServerEvent) -> bool {
        let Some(message) = serialize(event) else {
            return false;
        };
        let Some(connection) = self.connections.get(id) else {
            return false;
        };
        if connection.sender.try_send(message).is_ok() {
            return true;
        }
        self.prune(vec![id.to_string()]);
        false
    }

    /// 推送给已绑定该租户的连接，返回成功送达的连接数。
    pub fn broadcast_to_tenant(&mut self, tenant_id: &str, event: &ServerEvent) -> usize {
        self.broadcast_where(event, |connection| {
            connection.tenant_id.as_deref() == Some(tenant_id)
        })
    }

    /// 推送给全部连接（包括尚未绑定租户的连接）。
    pub fn broadcast_to_all(&mut self, event: &ServerEvent) -> usize {
        self.broadcast_where(event, |_| true)
    }

    fn broadcast_where<F>(&mut self, event: &ServerEvent, filter: F) -> usize
    where
        F: Fn(&Connection) -> bool,
    {
        let Some(message) = serialize(event) else {
            return 0;
        };
        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, connection) in &self.connections {
            if !filter(connection) {
                continue;
            }
            match connection.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => failed.push(id.clone()),
            }
        }
        self.prune(failed);
        record_broadcast_sent();
        debug!(
            target: "sentinel.realtime",
            event = event.kind(),
            delivered = delivered,
            "broadcast_sent"
        );
        delivered
    }

    fn prune(&mut self, ids: Vec<ConnectionId>) {
        for id in ids {
            if self.connections.remove(&id).is_some() {
                record_connection_pruned();
                warn!(
                    target: "sentinel.realtime",
                    connection_id = %id,
                    "connection_pruned"
                );
            }
        }
    }
}

fn serialize(event: &ServerEvent) -> Option<OutboundMessage> {
    match event.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(err) => {
            warn!(
                target: "sentinel.realtime",
                event = event.kind(),
                error = %err,
                "broadcast_serialize_failed"
            );
            None
        }
    }
}
