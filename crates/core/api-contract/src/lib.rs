//! 稳定的 DTO 与 API 响应契约。
//!
//! 所有请求/响应体字段均为 camelCase，与看板前端约定一致。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub status: String,
    pub mqtt_connected: bool,
    pub timestamp: i64,
}

/// 四路继电器真值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatesDto {
    #[serde(default)]
    pub relay1: bool,
    #[serde(default)]
    pub relay2: bool,
    #[serde(default)]
    pub relay3: bool,
    #[serde(default)]
    pub relay4: bool,
}

/// 继电器 → 功能映射（功能名小写）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfigDto {
    pub relay1: String,
    pub relay2: String,
    pub relay3: String,
    pub relay4: String,
}

/// 功能开关。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeatureFlagsDto {
    pub siren: bool,
    pub beacon: bool,
    pub announcement: bool,
    pub dispenser: bool,
}

/// 设备注册请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceRequest {
    #[serde(alias = "deviceId")]
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub group: Option<String>,
    pub relay_config: Option<RelayConfigDto>,
}

/// 设备更新请求体（缺省字段保持不变）。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub relay_config: Option<RelayConfigDto>,
}

/// 设备快照返回结构。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub location: String,
    pub lat: f64,
    pub lng: f64,
    pub group: Option<String>,
    pub status: String,
    pub features: FeatureFlagsDto,
    pub relay_states: RelayStatesDto,
    pub relay_config: RelayConfigDto,
    pub last_seen: Option<i64>,
    pub last_update_time: i64,
    pub last_status_change: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
}

/// 单设备命令请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub command: String,
}

/// 命令受理结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultDto {
    pub device_id: String,
    pub command: String,
    pub feature: String,
    pub desired: bool,
    pub relays: RelayStatesDto,
    pub channel: String,
    pub timestamp: i64,
}

/// 场景执行请求体：`features` 优先于 `scenario`。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    pub device_ids: Vec<String>,
    pub scenario: Option<String>,
    pub features: Option<BTreeMap<String, bool>>,
}

/// 场景中单台设备的下发结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDeviceResultDto {
    pub device_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relays: Option<RelayStatesDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 场景执行结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResultDto {
    pub scenario: String,
    pub features: BTreeMap<String, bool>,
    pub results: Vec<ScenarioDeviceResultDto>,
    pub timestamp: i64,
}

/// 模拟设备信号请求体（`kind` 取 connection / relay_status / relay_ack / control）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub kind: String,
    pub payload: Option<serde_json::Value>,
}

/// 分组创建请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

/// 分组更新请求体。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub device_ids: Option<Vec<String>>,
}

/// 分组返回结构。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDto {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub device_ids: Vec<String>,
    pub created_at: i64,
}

/// 活动记录。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDto {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub message: String,
    pub timestamp: i64,
}

/// 活动查询参数。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// 指标快照返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub signals_received: u64,
    pub signals_invalid: u64,
    pub status_transitions: u64,
    pub broadcasts_sent: u64,
    pub broadcasts_suppressed: u64,
    pub connections_pruned: u64,
    pub commands_issued: u64,
    pub command_dispatch_success: u64,
    pub command_dispatch_failure: u64,
    pub commands_rejected: u64,
    pub command_issue_latency_ms_avg: u64,
    pub scenarios_executed: u64,
    pub acks_confirmed: u64,
    pub ack_timeouts: u64,
    pub shadow_failures: u64,
}
