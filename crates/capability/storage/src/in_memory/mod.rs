//! 内存存储实现模块
//!
//! 用于测试和未配置数据库时运行。
//!
//! 包含以下实现：
//! - DeviceStore: InMemoryDeviceStore
//! - GroupStore: InMemoryGroupStore

pub mod device;
pub mod group;

pub use device::*;
pub use group::*;

pub(crate) fn device_key(tenant_id: &str, device_id: &str) -> String {
    format!("tenant:{}:device:{}", tenant_id, device_id)
}

pub(crate) fn group_key(tenant_id: &str, group_id: &str) -> String {
    format!("tenant:{}:group:{}", tenant_id, group_id)
}
