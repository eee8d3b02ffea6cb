//! Telemetry 指标快照（MVP）。
//!
//! - GET /api/metrics

use api_contract::MetricsSnapshotDto;
use axum::{extract::State, http::HeaderMap, response::Response};
use domain::roles;
use sentinel_telemetry::metrics;

use crate::utils::response::ok;
use crate::{
    AppState,
    middleware::{require_role, require_tenant_context},
};

pub async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_tenant_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_role(&ctx, roles::VIEWER) {
        return response;
    }

    let snapshot = metrics().snapshot();
    let latency_avg = snapshot
        .command_issue_latency_ms_total
        .checked_div(snapshot.command_issue_latency_ms_count)
        .unwrap_or(0);
    ok(MetricsSnapshotDto {
        signals_received: snapshot.signals_received,
        signals_invalid: snapshot.signals_invalid,
        status_transitions: snapshot.status_transitions,
        broadcasts_sent: snapshot.broadcasts_sent,
        broadcasts_suppressed: snapshot.broadcasts_suppressed,
        connections_pruned: snapshot.connections_pruned,
        commands_issued: snapshot.commands_issued,
        command_dispatch_success: snapshot.command_dispatch_success,
        command_dispatch_failure: snapshot.command_dispatch_failure,
        commands_rejected: snapshot.commands_rejected,
        command_issue_latency_ms_avg: latency_avg,
        scenarios_executed: snapshot.scenarios_executed,
        acks_confirmed: snapshot.acks_confirmed,
        ack_timeouts: snapshot.ack_timeouts,
        shadow_failures: snapshot.shadow_failures,
    })
}
