//! 认证能力：JWT access token 签发与校验。
//!
//! 平台本身不做登录；token 由上游身份服务签发，这里只校验并提取 [`TenantContext`]。

mod jwt;

use domain::TenantContext;

pub use jwt::JwtManager;

/// 认证相关错误。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("internal error: {0}")]
    Internal(String),
}

/// 访问令牌校验 trait，便于替换实现与测试。
pub trait Authenticator: Send + Sync {
    fn verify_access_token(&self, token: &str) -> Result<TenantContext, AuthError>;
}

impl Authenticator for JwtManager {
    fn verify_access_token(&self, token: &str) -> Result<TenantContext, AuthError> {
        self.decode_access(token)
    }
}
