//! 控制命令 handlers
//!
//! - POST /api/devices/:device_id/commands - 单设备命令（`siren_on` / `beacon_off` / ...）
//! - POST /api/scenarios - 多设备场景
//!
//! 受理成功只代表报文已发出：设备状态要等硬件回执才会改变，
//! 超时未回执会收到 `ack_timeout` 推送。

use crate::AppState;
use crate::middleware::{require_role, require_tenant_context};
use crate::utils::normalize_required;
use crate::utils::response::{
    bad_request_error, command_outcome_to_dto, monitor_error, ok, scenario_outcome_to_dto,
};
use api_contract::{CommandRequest, ScenarioRequest as ScenarioRequestDto};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use domain::roles;
use sentinel_control::ScenarioRequest;
use sentinel_telemetry::record_command_rejected;

/// 下发单设备命令
pub async fn send_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::OPERATOR) {
        return response;
    }
    let command = match normalize_required(req.command, "command") {
        Ok(value) => value,
        Err(response) => return response,
    };
    match state
        .monitor
        .send_command(&ctx.tenant_id, &device_id, &command)
        .await
    {
        Ok(outcome) => ok(command_outcome_to_dto(outcome)),
        Err(err) => monitor_error(err),
    }
}

/// 执行场景
///
/// `features` 优先于 `scenario`；任一目标设备不存在或 offline 时整批拒绝，不发出任何报文。
pub async fn execute_scenario(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScenarioRequestDto>,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::OPERATOR) {
        return response;
    }
    let request = match ScenarioRequest::from_parts(req.scenario.as_deref(), req.features.as_ref())
    {
        Ok(request) => request,
        Err(err) => {
            record_command_rejected();
            return bad_request_error(err.to_string());
        }
    };
    match state
        .monitor
        .execute_scenario(&ctx.tenant_id, req.device_ids, request)
        .await
    {
        Ok(outcome) => ok(scenario_outcome_to_dto(outcome)),
        Err(err) => monitor_error(err),
    }
}
