//! 设备 handlers
//!
//! - GET /api/devices - 列出设备快照
//! - POST /api/devices - 注册设备
//! - GET /api/devices/:device_id - 获取设备快照
//! - PUT /api/devices/:device_id - 更新资料与继电器映射
//! - DELETE /api/devices/:device_id - 注销设备
//! - POST /api/devices/:device_id/sync - 同步单台设备状态
//! - POST /api/devices/refresh - 同步租户全部设备
//! - POST /api/devices/:device_id/simulate - 注入模拟信号
//!
//! 权限：读取需要 viewer，同步与模拟需要 operator，注册/更新/注销需要 admin。
//!
//! 存储只保存静态资料；快照（状态、功能、继电器）全部来自状态引擎。

use crate::AppState;
use crate::middleware::{require_role, require_tenant_context};
use crate::utils::response::{
    bad_request_error, created, device_to_dto, monitor_error, ok, storage_error,
};
use crate::utils::{normalize_optional, normalize_required, relay_config_from_dto};
use api_contract::{CreateDeviceRequest, DeviceDto, SimulateRequest, UpdateDeviceRequest};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use domain::{RelayConfig, SignalKind, TenantContext, roles};
use sentinel_ingest::parse_signal;
use sentinel_monitor::DeviceChanges;
use sentinel_storage::{DeviceRecord, DeviceUpdate, GroupUpdate};
use tracing::{info, warn};

/// 列出设备
pub async fn list_devices(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::VIEWER) {
        return response;
    }
    match state.monitor.list_devices(&ctx.tenant_id).await {
        Ok(items) => {
            let data: Vec<DeviceDto> = items.into_iter().map(device_to_dto).collect();
            ok(data)
        }
        Err(err) => monitor_error(err),
    }
}

/// 获取设备快照
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::VIEWER) {
        return response;
    }
    match state.monitor.get_device(&ctx.tenant_id, &device_id).await {
        Ok(snapshot) => ok(device_to_dto(snapshot)),
        Err(err) => monitor_error(err),
    }
}

/// 注册设备
///
/// # 流程
///
/// 1. 校验字段与继电器映射（映射必须一一对应四个功能）
/// 2. 若指定分组，分组必须已存在
/// 3. 写入存储（同租户重复 ID 返回 409）
/// 4. 注册到状态引擎：初始 offline，启动状态巡检并订阅设备 topic，推送 `device_created`
/// 5. 引擎注册失败时回滚存储记录
pub async fn create_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateDeviceRequest>,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::ADMIN) {
        return response;
    }
    let device_id = match normalize_required(req.id, "id") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let name = match normalize_required(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let location = match normalize_optional(req.location, "location") {
        Ok(value) => value.unwrap_or_default(),
        Err(response) => return response,
    };
    let group_id = match normalize_optional(req.group, "group") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let relay_config = match req.relay_config.as_ref().map(relay_config_from_dto) {
        Some(Ok(config)) => config,
        Some(Err(response)) => return response,
        None => RelayConfig::default(),
    };
    if let Some(group_id) = &group_id {
        match state.group_store.find_group(&ctx, group_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return bad_request_error(format!("group not found: {group_id}")),
            Err(err) => return storage_error(err),
        }
    }

    let record = DeviceRecord {
        device_id: device_id.clone(),
        tenant_id: ctx.tenant_id.clone(),
        name,
        location,
        lat: req.lat.unwrap_or(0.0),
        lng: req.lng.unwrap_or(0.0),
        group_id: group_id.clone(),
        relay_config,
        created_at_ms: state.monitor.now_ms(),
    };
    let record = match state.device_store.create_device(&ctx, record).await {
        Ok(record) => record,
        Err(err) => return storage_error(err),
    };
    let snapshot = match state.monitor.register_device(record.to_profile()).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            if let Err(rollback) = state.device_store.delete_device(&ctx, &device_id).await {
                warn!(
                    target: "sentinel.api",
                    device_id = %device_id,
                    error = %rollback,
                    "device_rollback_failed"
                );
            }
            return monitor_error(err);
        }
    };
    if let Some(group_id) = &group_id {
        add_to_group(&state, &ctx, group_id, &device_id).await;
    }
    info!(
        target: "sentinel.api",
        tenant_id = %ctx.tenant_id,
        device_id = %device_id,
        "device_created"
    );
    created(device_to_dto(snapshot))
}

async fn add_to_group(state: &AppState, ctx: &TenantContext, group_id: &str, device_id: &str) {
    let group = match state.group_store.find_group(ctx, group_id).await {
        Ok(Some(group)) => group,
        Ok(None) => return,
        Err(err) => {
            warn!(target: "sentinel.api", group_id = %group_id, error = %err, "group_lookup_failed");
            return;
        }
    };
    if group.device_ids.iter().any(|id| id == device_id) {
        return;
    }
    let mut device_ids = group.device_ids;
    device_ids.push(device_id.to_string());
    let update = GroupUpdate {
        device_ids: Some(device_ids),
        ..GroupUpdate::default()
    };
    if let Err(err) = state.group_store.update_group(ctx, group_id, update).await {
        warn!(target: "sentinel.api", group_id = %group_id, error = %err, "group_membership_update_failed");
    }
}

/// 更新设备资料
///
/// 继电器映射变化时功能开关按新映射从当前继电器真值重新推导。
pub async fn update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateDeviceRequest>,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::ADMIN) {
        return response;
    }
    let name = match normalize_optional(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let location = match req.location {
        Some(location) => Some(location.trim().to_string()),
        None => None,
    };
    let relay_config = match req.relay_config.as_ref().map(relay_config_from_dto) {
        Some(Ok(config)) => Some(config),
        Some(Err(response)) => return response,
        None => None,
    };
    let changes = DeviceChanges {
        name: name.clone(),
        location: location.clone(),
        lat: req.lat,
        lng: req.lng,
        relay_config,
    };
    let snapshot = match state
        .monitor
        .update_device(&ctx.tenant_id, &device_id, changes)
        .await
    {
        Ok(snapshot) => snapshot,
        Err(err) => return monitor_error(err),
    };
    let update = DeviceUpdate {
        name,
        location,
        lat: req.lat,
        lng: req.lng,
        group_id: None,
        relay_config,
    };
    match state.device_store.update_device(&ctx, &device_id, update).await {
        Ok(Some(_)) => {}
        Ok(None) => warn!(
            target: "sentinel.api",
            tenant_id = %ctx.tenant_id,
            device_id = %device_id,
            "device_missing_from_storage"
        ),
        Err(err) => return storage_error(err),
    }
    ok(device_to_dto(snapshot))
}

/// 注销设备
///
/// 停止状态巡检与 ACK 计时、取消订阅（无其他租户持有同 ID 时），删除存储记录并移出分组。
pub async fn delete_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::ADMIN) {
        return response;
    }
    let removed = match state
        .monitor
        .deregister_device(&ctx.tenant_id, &device_id)
        .await
    {
        Ok(removed) => removed,
        Err(err) => return monitor_error(err),
    };
    if let Err(err) = state.device_store.delete_device(&ctx, &device_id).await {
        return storage_error(err);
    }
    if let Err(err) = state
        .group_store
        .remove_device_from_groups(&ctx, &device_id)
        .await
    {
        return storage_error(err);
    }
    info!(
        target: "sentinel.api",
        tenant_id = %ctx.tenant_id,
        device_id = %device_id,
        "device_deleted"
    );
    ok(device_to_dto(removed))
}

/// 同步单台设备状态（读取 Shadow 后重新推导）
pub async fn sync_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::OPERATOR) {
        return response;
    }
    match state.monitor.sync_device(&ctx.tenant_id, &device_id).await {
        Ok(snapshot) => ok(device_to_dto(snapshot)),
        Err(err) => monitor_error(err),
    }
}

/// 同步租户全部设备
pub async fn refresh_devices(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::OPERATOR) {
        return response;
    }
    match state.monitor.refresh_devices(&ctx.tenant_id).await {
        Ok(items) => {
            let data: Vec<DeviceDto> = items.into_iter().map(device_to_dto).collect();
            ok(data)
        }
        Err(err) => monitor_error(err),
    }
}

/// 注入模拟信号
///
/// `kind` 取 MQTT topic 后缀对应的信号类别，`payload` 与设备上报的报文格式一致，
/// 解析后走与真实信号相同的处理路径。
pub async fn simulate_signal(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SimulateRequest>,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::OPERATOR) {
        return response;
    }
    let Some(kind) = SignalKind::parse(&req.kind) else {
        return bad_request_error(format!("unknown signal kind: {}", req.kind));
    };
    let payload = match req.payload {
        Some(serde_json::Value::String(text)) => text.into_bytes(),
        Some(value) => value.to_string().into_bytes(),
        None => b"{}".to_vec(),
    };
    let signal = match parse_signal(kind, &payload) {
        Ok(signal) => signal,
        Err(err) => return bad_request_error(err.to_string()),
    };
    if let Err(err) = state
        .monitor
        .record_signal(Some(&ctx.tenant_id), &device_id, signal)
        .await
    {
        return monitor_error(err);
    }
    match state.monitor.get_device(&ctx.tenant_id, &device_id).await {
        Ok(snapshot) => ok(device_to_dto(snapshot)),
        Err(err) => monitor_error(err),
    }
}
