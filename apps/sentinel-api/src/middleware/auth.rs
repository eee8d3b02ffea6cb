//! 认证和授权中间件
//!
//! - request_context：请求上下文中间件，注入 request_id/trace_id
//! - bearer_token：从 Authorization 头提取 Bearer token
//! - require_tenant_context：解析调用方身份并提取租户上下文
//! - require_role：按角色等级校验权限
//!
//! 身份来源：
//! 1. 配置了 JWT 密钥：校验 Bearer token（签名 + 过期），token 内的租户即调用方租户
//! 2. 未配置：信任上游网关注入的 `x-tenant-id` / `x-user-id` / `x-user-role`，
//!    缺省角色为 viewer

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use domain::{TenantContext, roles};
use sentinel_auth::AuthError;
use sentinel_telemetry::new_request_ids;
use tracing::{Instrument, info_span};

use crate::AppState;
use crate::utils::response::{
    auth_error, forbidden_error, internal_auth_error, tenant_required_error,
};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// 请求上下文中间件：注入 request_id/trace_id
pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response: Response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

/// 从请求头中提取 Bearer token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header_value = headers.get(header::AUTHORIZATION)?;
    let auth_str = header_value.to_str().ok()?;
    auth_str.strip_prefix("Bearer ")
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// 由网关身份头构造上下文。
pub fn context_from_headers(headers: &HeaderMap) -> Result<TenantContext, Response> {
    let tenant_id = header_value(headers, TENANT_HEADER).ok_or_else(tenant_required_error)?;
    let user_id = header_value(headers, USER_HEADER).unwrap_or("anonymous");
    let roles: Vec<String> = header_value(headers, ROLE_HEADER)
        .unwrap_or(roles::VIEWER)
        .split(',')
        .map(|role| role.trim().to_ascii_lowercase())
        .filter(|role| !role.is_empty())
        .collect();
    Ok(TenantContext::new(tenant_id, user_id, roles))
}

/// 校验 access token 并提取上下文。
pub fn context_from_token(state: &AppState, token: Option<&str>) -> Result<TenantContext, Response> {
    let Some(auth) = state.auth.as_ref() else {
        return Err(auth_error(StatusCode::UNAUTHORIZED));
    };
    let Some(token) = token else {
        return Err(auth_error(StatusCode::UNAUTHORIZED));
    };
    match auth.verify_access_token(token) {
        Ok(ctx) if ctx.tenant_id.trim().is_empty() => Err(tenant_required_error()),
        Ok(ctx) => Ok(ctx),
        Err(AuthError::TokenInvalid | AuthError::TokenExpired) => {
            Err(auth_error(StatusCode::UNAUTHORIZED))
        }
        Err(err) => Err(internal_auth_error(err)),
    }
}

/// 验证并提取租户上下文
pub fn require_tenant_context(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<TenantContext, Response> {
    if state.auth.is_some() {
        context_from_token(state, bearer_token(headers))
    } else {
        context_from_headers(headers)
    }
}

/// 校验角色等级（viewer < operator < admin）
pub fn require_role(ctx: &TenantContext, role: &str) -> Result<(), Response> {
    if ctx.has_role(role) {
        Ok(())
    } else {
        Err(forbidden_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_extracts() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token-1"),
        );
        assert_eq!(bearer_token(&headers), Some("token-1"));
    }

    #[test]
    fn gateway_headers_default_to_viewer() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("tenant-a"));
        let ctx = context_from_headers(&headers).expect("ctx");
        assert_eq!(ctx.tenant_id, "tenant-a");
        assert_eq!(ctx.user_id, "anonymous");
        assert!(ctx.has_role(roles::VIEWER));
        assert!(!ctx.has_role(roles::OPERATOR));
    }

    #[test]
    fn blank_tenant_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("   "));
        let response = context_from_headers(&headers).expect_err("tenant required");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn admin_role_covers_operator() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("tenant-a"));
        headers.insert(ROLE_HEADER, HeaderValue::from_static("Admin"));
        let ctx = context_from_headers(&headers).expect("ctx");
        assert!(require_role(&ctx, roles::OPERATOR).is_ok());
    }
}
