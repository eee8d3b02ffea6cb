//! 设备内存存储实现
//!
//! 功能：
//! - 设备 CRUD 操作
//! - 租户隔离（键内含租户 ID）

use super::device_key;
use crate::error::StorageError;
use crate::models::{DeviceRecord, DeviceUpdate};
use crate::traits::DeviceStore;
use crate::validation::{ensure_same_tenant, ensure_tenant};
use domain::TenantContext;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceStore {
    /// 创建新的设备存储
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn list_devices(&self, ctx: &TenantContext) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut items: Vec<DeviceRecord> = self
            .devices
            .read()
            .map(|map| {
                map.values()
                    .filter(|item| item.tenant_id == ctx.tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(items)
    }

    async fn find_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let item = self
            .devices
            .read()
            .ok()
            .and_then(|map| map.get(&device_key(&ctx.tenant_id, device_id)).cloned());
        Ok(item)
    }

    async fn create_device(
        &self,
        ctx: &TenantContext,
        record: DeviceRecord,
    ) -> Result<DeviceRecord, StorageError> {
        ensure_same_tenant(ctx, &record.tenant_id)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let key = device_key(&record.tenant_id, &record.device_id);
        if map.contains_key(&key) {
            return Err(StorageError::conflict("device exists"));
        }
        map.insert(key, record.clone());
        Ok(record)
    }

    async fn update_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = map.get_mut(&device_key(&ctx.tenant_id, device_id)) else {
            return Ok(None);
        };
        update.apply(device);
        Ok(Some(device.clone()))
    }

    async fn delete_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(&device_key(&ctx.tenant_id, device_id)).is_some())
    }

    async fn clear_group(&self, ctx: &TenantContext, group_id: &str) -> Result<u64, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut cleared = 0;
        for device in map.values_mut() {
            if device.tenant_id == ctx.tenant_id && device.group_id.as_deref() == Some(group_id) {
                device.group_id = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn scan_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let mut items: Vec<DeviceRecord> = self
            .devices
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| {
            a.tenant_id
                .cmp(&b.tenant_id)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        Ok(items)
    }
}
