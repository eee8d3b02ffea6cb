pub mod device;
pub mod roles;
pub mod signal;

pub use device::{
    DeviceProfile, DeviceState, DeviceStatus, Feature, FeatureFlags, Relay, RelayConfig,
    RelayConfigError, RelayStates,
};
pub use signal::{DeviceSignal, RelayAck, SignalEnvelope, SignalKind};

/// 租户上下文：所有模块共享的执行上下文。
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
}

impl TenantContext {
    /// 构造显式身份与角色的租户上下文。
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            roles,
        }
    }

    /// 系统内部动作（MQTT 回调、定时器）使用的上下文。
    pub fn system(tenant_id: impl Into<String>) -> Self {
        Self::new(tenant_id, "system", vec![roles::ADMIN.to_string()])
    }

    /// 当前身份是否达到指定角色等级。
    pub fn has_role(&self, required: &str) -> bool {
        let required = roles::rank(required);
        self.roles
            .iter()
            .any(|role| roles::rank(role) >= required && roles::rank(role) > 0)
    }
}

impl Default for TenantContext {
    /// 空上下文（仅用于测试或占位）。
    fn default() -> Self {
        Self {
            tenant_id: "".to_string(),
            user_id: "".to_string(),
            roles: Vec::new(),
        }
    }
}
