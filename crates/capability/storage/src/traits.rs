//! 存储接口 Trait 定义
//!
//! - DeviceStore：设备存储
//! - GroupStore：分组存储
//!
//! 设计原则：
//! - 所有接口显式接收 TenantContext（启动加载用的 `scan_devices` 除外）
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{DeviceRecord, DeviceUpdate, GroupRecord, GroupUpdate};
use async_trait::async_trait;
use domain::TenantContext;

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 列出当前租户的所有设备
    async fn list_devices(&self, ctx: &TenantContext) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 查找指定设备
    async fn find_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 创建设备（同租户下 ID 已存在返回冲突错误）
    async fn create_device(
        &self,
        ctx: &TenantContext,
        record: DeviceRecord,
    ) -> Result<DeviceRecord, StorageError>;

    /// 更新设备
    async fn update_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 删除设备
    async fn delete_device(&self, ctx: &TenantContext, device_id: &str)
    -> Result<bool, StorageError>;

    /// 清除指定分组下所有设备的分组字段，返回受影响的设备数
    async fn clear_group(&self, ctx: &TenantContext, group_id: &str) -> Result<u64, StorageError>;

    /// 扫描全部租户的设备（进程启动时加载到状态引擎）
    async fn scan_devices(&self) -> Result<Vec<DeviceRecord>, StorageError>;
}

/// 分组存储接口
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn list_groups(&self, ctx: &TenantContext) -> Result<Vec<GroupRecord>, StorageError>;

    async fn find_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
    ) -> Result<Option<GroupRecord>, StorageError>;

    async fn create_group(
        &self,
        ctx: &TenantContext,
        record: GroupRecord,
    ) -> Result<GroupRecord, StorageError>;

    async fn update_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
        update: GroupUpdate,
    ) -> Result<Option<GroupRecord>, StorageError>;

    /// 删除分组并返回被删除的记录（调用方据此清理成员设备）
    async fn delete_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
    ) -> Result<Option<GroupRecord>, StorageError>;

    /// 从所有分组中移除设备，返回受影响的分组数
    async fn remove_device_from_groups(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<u64, StorageError>;
}
