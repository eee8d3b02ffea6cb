//! 看板 WebSocket
//!
//! - GET /ws - 升级为 WebSocket（JWT 模式下通过 `?token=` 或 Bearer 头认证）
//!
//! 连接注册后先收到 `connection_status{connected: true}`；声明租户（`set_tenant`）
//! 后由连接任务直接写出该租户全部设备快照，之后只收到本租户的推送。JWT 模式下连接直接绑定到
//! token 中的租户，声明其他租户会被忽略。

use crate::AppState;
use crate::middleware::{bearer_token, context_from_headers, context_from_token};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use sentinel_realtime::{
    ClientMessage, OutboundMessage, ServerEvent, new_connection_id, parse_client_message,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let tenant_id = if state.auth.is_some() {
        let token = query.token.as_deref().or_else(|| bearer_token(&headers));
        match context_from_token(&state, token) {
            Ok(ctx) => Some(ctx.tenant_id),
            Err(response) => return response,
        }
    } else {
        context_from_headers(&headers).ok().map(|ctx| ctx.tenant_id)
    };
    ws.on_upgrade(move |socket| serve_socket(state, socket, tenant_id))
}

async fn serve_socket(state: AppState, mut socket: WebSocket, tenant_id: Option<String>) {
    let connection_id = new_connection_id();
    let (sender, mut outbound) = mpsc::channel(state.connection_buffer.max(1));
    if let Err(err) = state
        .monitor
        .register_connection(connection_id.clone(), sender)
        .await
    {
        warn!(target: "sentinel.api", error = %err, "ws_register_failed");
        return;
    }
    // JWT 模式下租户由 token 决定
    let locked_tenant = tenant_id.clone().filter(|_| state.auth.is_some());
    let mut open = match &tenant_id {
        Some(tenant_id) => bind(&state, &mut socket, &mut outbound, &connection_id, tenant_id).await,
        None => true,
    };

    while open {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(text) => open = send_text(&mut socket, text).await,
                // 注册表已移除该连接（发送缓冲写满或引擎停止）
                None => open = false,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    open = handle_client_message(
                        &state,
                        &mut socket,
                        &mut outbound,
                        &connection_id,
                        locked_tenant.as_deref(),
                        &text,
                    )
                    .await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => open = false,
                Some(Ok(_)) => {}
            },
        }
    }

    if let Err(err) = state.monitor.unregister_connection(&connection_id).await {
        debug!(target: "sentinel.api", error = %err, "ws_unregister_failed");
    }
    info!(target: "sentinel.api", connection_id = %connection_id, "ws_closed");
}

async fn send_text(socket: &mut WebSocket, text: OutboundMessage) -> bool {
    socket.send(Message::Text(text.to_string())).await.is_ok()
}

/// 绑定租户后直接写出设备快照。
///
/// 先写出通道里已排队的推送（问候等），保证顺序；快照本身不进有界通道。
/// 返回 `false` 表示 socket 已不可写。
async fn bind(
    state: &AppState,
    socket: &mut WebSocket,
    outbound: &mut mpsc::Receiver<OutboundMessage>,
    connection_id: &str,
    tenant_id: &str,
) -> bool {
    let snapshot = match state.monitor.bind_connection(connection_id, tenant_id).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            debug!(target: "sentinel.api", connection_id = %connection_id, "ws_bind_skipped");
            return true;
        }
        Err(err) => {
            warn!(target: "sentinel.api", error = %err, "ws_bind_failed");
            return true;
        }
    };
    while let Ok(text) = outbound.try_recv() {
        if !send_text(socket, text).await {
            return false;
        }
    }
    for event in snapshot {
        match event.to_json() {
            Ok(json) => {
                if socket.send(Message::Text(json)).await.is_err() {
                    return false;
                }
            }
            Err(err) => warn!(target: "sentinel.api", error = %err, "ws_snapshot_serialize_failed"),
        }
    }
    true
}

async fn handle_client_message(
    state: &AppState,
    socket: &mut WebSocket,
    outbound: &mut mpsc::Receiver<OutboundMessage>,
    connection_id: &str,
    locked_tenant: Option<&str>,
    text: &str,
) -> bool {
    let message = match parse_client_message(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(target: "sentinel.api", connection_id = %connection_id, error = %err, "ws_message_ignored");
            return true;
        }
    };
    match message {
        ClientMessage::SetTenant { tenant_id } => {
            let tenant_id = tenant_id.trim();
            if tenant_id.is_empty() {
                return true;
            }
            if let Some(locked) = locked_tenant
                && locked != tenant_id
            {
                warn!(
                    target: "sentinel.api",
                    connection_id = %connection_id,
                    requested = %tenant_id,
                    "ws_tenant_mismatch"
                );
                return true;
            }
            bind(state, socket, outbound, connection_id, tenant_id).await
        }
        ClientMessage::Ping => {
            let pong = ServerEvent::Pong {
                timestamp: state.monitor.now_ms(),
            };
            if let Err(err) = state.monitor.send_to_connection(connection_id, pong).await {
                debug!(target: "sentinel.api", error = %err, "ws_pong_failed");
            }
            true
        }
    }
}
