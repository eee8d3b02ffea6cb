//! 健康检查（无需认证）。
//!
//! - GET /health

use crate::AppState;
use crate::utils::response::ok;
use api_contract::HealthDto;
use axum::{extract::State, response::Response};

pub async fn health(State(state): State<AppState>) -> Response {
    ok(HealthDto {
        status: "ok".to_string(),
        mqtt_connected: state.monitor.mqtt_connected(),
        timestamp: state.monitor.now_ms(),
    })
}
