//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：统一的 `ApiResponse` 错误体 + 对应 HTTP 状态码
//! - 领域错误映射：`MonitorError` / `StorageError` → 错误码
//! - DTO 转换：设备快照、分组、活动记录、命令与场景结果

use api_contract::{
    ActivityDto, ApiResponse, CommandResultDto, DeviceDto, FeatureFlagsDto, GroupDto,
    RelayConfigDto, RelayStatesDto, ScenarioDeviceResultDto, ScenarioResultDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{DeviceState, FeatureFlags, RelayConfig, RelayStates};
use sentinel_auth::AuthError;
use sentinel_monitor::{ActivityEntry, CommandOutcome, MonitorError, ScenarioOutcome};
use sentinel_storage::{GroupRecord, StorageError, StorageErrorKind};
use serde::Serialize;
use tracing::warn;

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(code, message.into()))).into_response()
}

/// 成功响应
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 创建成功响应
pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// 认证错误响应
pub fn auth_error(status: StatusCode) -> Response {
    error_response(status, "AUTH.UNAUTHORIZED", "unauthorized")
}

/// 禁止访问错误响应
pub fn forbidden_error() -> Response {
    error_response(StatusCode::FORBIDDEN, "AUTH.FORBIDDEN", "forbidden")
}

/// 缺少租户上下文
pub fn tenant_required_error() -> Response {
    error_response(StatusCode::BAD_REQUEST, "TENANT.REQUIRED", "tenant id required")
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "INVALID.REQUEST", message)
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    error_response(StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND", "not found")
}

pub fn conflict_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::CONFLICT, "RESOURCE.CONFLICT", message)
}

pub fn internal_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL.ERROR", message)
}

/// 认证内部错误响应
pub fn internal_auth_error(err: AuthError) -> Response {
    internal_error(err.to_string())
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    match err.kind() {
        StorageErrorKind::Conflict => conflict_error(err.to_string()),
        StorageErrorKind::Invalid => bad_request_error(err.to_string()),
        StorageErrorKind::Backend => {
            warn!(target: "sentinel.api", error = %err, "storage_failed");
            internal_error(err.to_string())
        }
    }
}

/// 状态引擎错误响应
pub fn monitor_error(err: MonitorError) -> Response {
    let message = err.to_string();
    match err {
        MonitorError::DeviceNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND", message)
        }
        MonitorError::DeviceExists(_) => conflict_error(message),
        MonitorError::DeviceOffline { .. } | MonitorError::ScenarioRejected { .. } => {
            error_response(StatusCode::CONFLICT, "DEVICE.OFFLINE", message)
        }
        MonitorError::InvalidRequest(_) => bad_request_error(message),
        MonitorError::Control(_) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "COMMAND.REJECTED", message)
        }
        MonitorError::Dispatch(_) | MonitorError::Stopped => {
            warn!(target: "sentinel.api", error = %message, "monitor_request_failed");
            internal_error(message)
        }
    }
}

pub fn relay_states_to_dto(relays: RelayStates) -> RelayStatesDto {
    RelayStatesDto {
        relay1: relays.relay1,
        relay2: relays.relay2,
        relay3: relays.relay3,
        relay4: relays.relay4,
    }
}

pub fn relay_config_to_dto(config: &RelayConfig) -> RelayConfigDto {
    RelayConfigDto {
        relay1: config.relay1.as_str().to_string(),
        relay2: config.relay2.as_str().to_string(),
        relay3: config.relay3.as_str().to_string(),
        relay4: config.relay4.as_str().to_string(),
    }
}

fn features_to_dto(features: FeatureFlags) -> FeatureFlagsDto {
    FeatureFlagsDto {
        siren: features.siren,
        beacon: features.beacon,
        announcement: features.announcement,
        dispenser: features.dispenser,
    }
}

/// DeviceState 转 DeviceDto
pub fn device_to_dto(state: DeviceState) -> DeviceDto {
    DeviceDto {
        relay_config: relay_config_to_dto(&state.relay_config),
        id: state.id,
        tenant_id: state.tenant_id,
        name: state.name,
        location: state.location,
        lat: state.lat,
        lng: state.lng,
        group: state.group,
        status: state.status.as_str().to_string(),
        features: features_to_dto(state.features),
        relay_states: relay_states_to_dto(state.relay_states),
        last_seen: state.last_seen,
        last_update_time: state.last_update_time,
        last_status_change: state.last_status_change,
        signal_strength: state.signal_strength,
        battery_level: state.battery_level,
    }
}

/// GroupRecord 转 GroupDto
pub fn group_to_dto(record: GroupRecord) -> GroupDto {
    GroupDto {
        id: record.group_id,
        tenant_id: record.tenant_id,
        name: record.name,
        description: record.description,
        color: record.color,
        device_ids: record.device_ids,
        created_at: record.created_at_ms,
    }
}

pub fn activity_to_dto(entry: ActivityEntry) -> ActivityDto {
    ActivityDto {
        id: entry.id,
        kind: entry.kind.as_str().to_string(),
        device_id: entry.device_id,
        message: entry.message,
        timestamp: entry.timestamp,
    }
}

pub fn command_outcome_to_dto(outcome: CommandOutcome) -> CommandResultDto {
    CommandResultDto {
        device_id: outcome.device_id,
        command: outcome.command,
        feature: outcome.change.feature.as_str().to_string(),
        desired: outcome.change.desired,
        relays: relay_states_to_dto(outcome.payload),
        channel: outcome.channel.to_string(),
        timestamp: outcome.timestamp,
    }
}

pub fn scenario_outcome_to_dto(outcome: ScenarioOutcome) -> ScenarioResultDto {
    ScenarioResultDto {
        scenario: outcome.scenario,
        features: outcome
            .features
            .into_iter()
            .map(|(feature, value)| (feature.as_str().to_string(), value))
            .collect(),
        results: outcome
            .results
            .into_iter()
            .map(|item| match item.result {
                Ok(relays) => ScenarioDeviceResultDto {
                    device_id: item.device_id,
                    success: true,
                    relays: Some(relay_states_to_dto(relays)),
                    error: None,
                },
                Err(error) => ScenarioDeviceResultDto {
                    device_id: item.device_id,
                    success: false,
                    relays: None,
                    error: Some(error),
                },
            })
            .collect(),
        timestamp: outcome.timestamp,
    }
}
