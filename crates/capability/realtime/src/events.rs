use crate::RealtimeError;
use domain::{DeviceState, Feature, RelayStates};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 服务端 → 看板推送，线上格式 `{"type": "...", "data": {...}}`。
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// 连接问候（`connected`）或 broker 状态变化（`mqtt_connected`）。
    ConnectionStatus {
        #[serde(skip_serializing_if = "Option::is_none")]
        connected: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mqtt_connected: Option<bool>,
        timestamp: i64,
    },
    DeviceCreated {
        device_id: String,
        device: DeviceState,
        tenant_id: String,
        timestamp: i64,
    },
    DeviceDeleted {
        device_id: String,
        tenant_id: String,
        timestamp: i64,
    },
    DeviceStatusUpdate {
        device_id: String,
        device: DeviceState,
        tenant_id: String,
        timestamp: i64,
        source: String,
    },
    CommandSent {
        device_id: String,
        tenant_id: String,
        command: String,
        relays: RelayStates,
        timestamp: i64,
    },
    ScenarioExecuted {
        tenant_id: String,
        scenario: String,
        device_ids: Vec<String>,
        features: BTreeMap<Feature, bool>,
        timestamp: i64,
    },
    AckTimeout {
        device_id: String,
        tenant_id: String,
        feature: Feature,
        message: String,
        timestamp: i64,
    },
    GroupCreated {
        tenant_id: String,
        group: serde_json::Value,
        timestamp: i64,
    },
    GroupUpdated {
        tenant_id: String,
        group: serde_json::Value,
        timestamp: i64,
    },
    GroupDeleted {
        tenant_id: String,
        group_id: String,
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
}

impl ServerEvent {
    /// 事件类型名（日志用）。
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ConnectionStatus { .. } => "connection_status",
            ServerEvent::DeviceCreated { .. } => "device_created",
            ServerEvent::DeviceDeleted { .. } => "device_deleted",
            ServerEvent::DeviceStatusUpdate { .. } => "device_status_update",
            ServerEvent::CommandSent { .. } => "command_sent",
            ServerEvent::ScenarioExecuted { .. } => "scenario_executed",
            ServerEvent::AckTimeout { .. } => "ack_timeout",
            ServerEvent::GroupCreated { .. } => "group_created",
            ServerEvent::GroupUpdated { .. } => "group_updated",
            ServerEvent::GroupDeleted { .. } => "group_deleted",
            ServerEvent::Pong { .. } => "pong",
        }
    }

    pub fn to_json(&self) -> Result<String, RealtimeError> {
        serde_json::to_string(self).map_err(|err| RealtimeError::Serialize(err.to_string()))
    }
}

/// 看板 → 服务端上行消息。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// 声明租户上下文，之后才会收到设备推送。
    SetTenant { tenant_id: String },
    Ping,
}

pub fn parse_client_message(text: &str) -> Result<ClientMessage, RealtimeError> {
    serde_json::from_str(text).map_err(|err| RealtimeError::InvalidMessage(err.to_string()))
}
