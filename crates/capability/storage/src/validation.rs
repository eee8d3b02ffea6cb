//! 验证辅助函数
//!
//! - ensure_tenant：验证租户 ID 非空
//! - ensure_same_tenant：验证写入记录与上下文属于同一租户

use crate::error::StorageError;
use domain::TenantContext;

/// 验证租户 ID 非空
///
/// 确保所有数据访问都有有效的租户上下文。
pub fn ensure_tenant(ctx: &TenantContext) -> Result<(), StorageError> {
    if ctx.tenant_id.is_empty() {
        return Err(StorageError::invalid("tenant_id required"));
    }
    Ok(())
}

/// 验证记录归属当前租户
pub fn ensure_same_tenant(ctx: &TenantContext, record_tenant_id: &str) -> Result<(), StorageError> {
    ensure_tenant(ctx)?;
    if record_tenant_id != ctx.tenant_id {
        return Err(StorageError::invalid("tenant mismatch"));
    }
    Ok(())
}
