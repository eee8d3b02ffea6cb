//! 路由定义
//!
//! - 健康检查：/health
//! - 设备：/api/devices/*（含命令、同步、模拟信号）
//! - 场景：/api/scenarios
//! - 分组：/api/groups/*
//! - 活动与指标：/api/activity, /api/metrics
//! - 看板推送：/ws

use super::AppState;
use super::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// `/api` 下的业务路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices).post(create_device))
        .route("/devices/refresh", post(refresh_devices))
        .route(
            "/devices/:device_id",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/devices/:device_id/commands", post(send_command))
        .route("/devices/:device_id/sync", post(sync_device))
        .route("/devices/:device_id/simulate", post(simulate_signal))
        .route("/scenarios", post(execute_scenario))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/:group_id", axum::routing::put(update_group).delete(delete_group))
        .route("/activity", get(list_activity))
        .route("/metrics", get(get_metrics))
}

/// 完整应用：业务路由 + 健康检查 + WebSocket + 追踪中间件
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .nest("/api", create_api_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}
