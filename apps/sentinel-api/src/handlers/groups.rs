//! 设备分组 handlers
//!
//! - GET /api/groups - 列出分组
//! - POST /api/groups - 创建分组
//! - PUT /api/groups/:group_id - 更新分组
//! - DELETE /api/groups/:group_id - 删除分组（成员设备的 group 字段被清除）
//!
//! 一台设备最多属于一个分组：加入新分组时会先从其他分组移除。
//! 成员变化同时写回状态引擎与设备存储，并向租户推送分组事件。

use crate::AppState;
use crate::middleware::{require_role, require_tenant_context};
use crate::utils::normalize_optional;
use crate::utils::normalize_required;
use crate::utils::response::{
    bad_request_error, created, group_to_dto, monitor_error, not_found_error, ok, storage_error,
};
use api_contract::{CreateGroupRequest, GroupDto, UpdateGroupRequest};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use domain::{TenantContext, roles};
use sentinel_realtime::ServerEvent;
use sentinel_storage::{DeviceUpdate, GroupRecord, GroupUpdate};
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_GROUP_COLOR: &str = "#3b82f6";

/// 列出分组
pub async fn list_groups(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::VIEWER) {
        return response;
    }
    match state.group_store.list_groups(&ctx).await {
        Ok(items) => {
            let data: Vec<GroupDto> = items.into_iter().map(group_to_dto).collect();
            ok(data)
        }
        Err(err) => storage_error(err),
    }
}

/// 创建分组
pub async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateGroupRequest>,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::ADMIN) {
        return response;
    }
    let name = match normalize_required(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let group_id = match normalize_optional(req.id, "id") {
        Ok(value) => value.unwrap_or_else(|| Uuid::new_v4().to_string()),
        Err(response) => return response,
    };
    let device_ids = match known_devices(&state, &ctx, req.device_ids).await {
        Ok(device_ids) => device_ids,
        Err(response) => return response,
    };
    if let Err(response) = detach_devices(&state, &ctx, &device_ids).await {
        return response;
    }
    let record = GroupRecord {
        group_id: group_id.clone(),
        tenant_id: ctx.tenant_id.clone(),
        name,
        description: req.description.unwrap_or_default(),
        color: req
            .color
            .filter(|color| !color.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GROUP_COLOR.to_string()),
        device_ids: device_ids.clone(),
        created_at_ms: state.monitor.now_ms(),
    };
    let record = match state.group_store.create_group(&ctx, record).await {
        Ok(record) => record,
        Err(err) => return storage_error(err),
    };
    if let Err(response) = apply_membership(&state, &ctx, &group_id, device_ids).await {
        return response;
    }
    let dto = group_to_dto(record);
    broadcast(
        &state,
        &ctx,
        ServerEvent::GroupCreated {
            tenant_id: ctx.tenant_id.clone(),
            group: serde_json::to_value(&dto).unwrap_or_default(),
            timestamp: state.monitor.now_ms(),
        },
    )
    .await;
    created(dto)
}

/// 更新分组
pub async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateGroupRequest>,
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
    match state.group_store.find_group(&ctx, &group_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    }
    let device_ids = match req.device_ids {
        Some(device_ids) => match known_devices(&state, &ctx, device_ids).await {
            Ok(device_ids) => Some(device_ids),
            Err(response) => return response,
        },
        None => None,
    };
    if let Some(device_ids) = &device_ids
        && let Err(response) = detach_devices(&state, &ctx, device_ids).await
    {
        return response;
    }
    let update = GroupUpdate {
        name,
        description: req.description,
        color: req.color,
        device_ids: device_ids.clone(),
    };
    let record = match state.group_store.update_group(&ctx, &group_id, update).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    };
    if let Some(device_ids) = device_ids
        && let Err(response) = apply_membership(&state, &ctx, &group_id, device_ids).await
    {
        return response;
    }
    let dto = group_to_dto(record);
    broadcast(
        &state,
        &ctx,
        ServerEvent::GroupUpdated {
            tenant_id: ctx.tenant_id.clone(),
            group: serde_json::to_value(&dto).unwrap_or_default(),
            timestamp: state.monitor.now_ms(),
        },
    )
    .await;
    ok(dto)
}

/// 删除分组
pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::ADMIN) {
        return response;
    }
    let record = match state.group_store.delete_group(&ctx, &group_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    };
    if let Err(err) = state.monitor.clear_group(&ctx.tenant_id, &group_id).await {
        return monitor_error(err);
    }
    if let Err(err) = state.device_store.clear_group(&ctx, &group_id).await {
        return storage_error(err);
    }
    broadcast(
        &state,
        &ctx,
        ServerEvent::GroupDeleted {
            tenant_id: ctx.tenant_id.clone(),
            group_id: group_id.clone(),
            timestamp: state.monitor.now_ms(),
        },
    )
    .await;
    ok(group_to_dto(record))
}

/// 去重并确认成员都是本租户已注册的设备。
async fn known_devices(
    state: &AppState,
    ctx: &TenantContext,
    device_ids: Vec<String>,
) -> Result<Vec<String>, Response> {
    let registered: BTreeSet<String> = match state.monitor.list_devices(&ctx.tenant_id).await {
        Ok(devices) => devices.into_iter().map(|device| device.id).collect(),
        Err(err) => return Err(monitor_error(err)),
    };
    let mut seen = BTreeSet::new();
    let mut result = Vec::with_capacity(device_ids.len());
    for device_id in device_ids {
        let device_id = device_id.trim().to_string();
        if !registered.contains(&device_id) {
            return Err(bad_request_error(format!("unknown device: {device_id}")));
        }
        if seen.insert(device_id.clone()) {
            result.push(device_id);
        }
    }
    Ok(result)
}

/// 把设备从现有分组中移除（随后写入目标分组）。
async fn detach_devices(
    state: &AppState,
    ctx: &TenantContext,
    device_ids: &[String],
) -> Result<(), Response> {
    for device_id in device_ids {
        state
            .group_store
            .remove_device_from_groups(ctx, device_id)
            .await
            .map_err(storage_error)?;
    }
    Ok(())
}

/// 同步状态引擎与设备存储中的 `group` 字段。
async fn apply_membership(
    state: &AppState,
    ctx: &TenantContext,
    group_id: &str,
    device_ids: Vec<String>,
) -> Result<(), Response> {
    let changed = state
        .monitor
        .assign_group(&ctx.tenant_id, group_id, device_ids)
        .await
        .map_err(monitor_error)?;
    for snapshot in changed {
        let update = DeviceUpdate {
            group_id: Some(snapshot.group.clone()),
            ..DeviceUpdate::default()
        };
        match state.device_store.update_device(ctx, &snapshot.id, update).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                target: "sentinel.api",
                tenant_id = %ctx.tenant_id,
                device_id = %snapshot.id,
                "device_missing_from_storage"
            ),
            Err(err) => return Err(storage_error(err)),
        }
    }
    Ok(())
}

async fn broadcast(state: &AppState, ctx: &TenantContext, event: ServerEvent) {
    if let Err(err) = state.monitor.broadcast(&ctx.tenant_id, event).await {
        warn!(target: "sentinel.api", tenant_id = %ctx.tenant_id, error = %err, "group_broadcast_failed");
    }
}
