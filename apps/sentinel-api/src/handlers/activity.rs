//! 活动记录 handlers
//!
//! - GET /api/activity?limit=N - 租户最近的活动（新的在前）

use crate::AppState;
use crate::middleware::{require_role, require_tenant_context};
use crate::utils::response::{activity_to_dto, monitor_error, ok};
use api_contract::{ActivityDto, ActivityQuery};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use domain::roles;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::VIEWER) {
        return response;
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match state.monitor.activity(&ctx.tenant_id, limit).await {
        Ok(items) => {
            let data: Vec<ActivityDto> = items.into_iter().map(activity_to_dto).collect();
            ok(data)
        }
        Err(err) => monitor_error(err),
    }
}
