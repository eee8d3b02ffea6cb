use super::group_key;
use crate::error::StorageError;
use crate::models::{GroupRecord, GroupUpdate};
use crate::traits::GroupStore;
use crate::validation::{ensure_same_tenant, ensure_tenant};
use domain::TenantContext;
use std::collections::HashMap;
use std::sync::RwLock;

/// 分组内存存储
pub struct InMemoryGroupStore {
    groups: RwLock<HashMap<String, GroupRecord>>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryGroupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn list_groups(&self, ctx: &TenantContext) -> Result<Vec<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut items: Vec<GroupRecord> = self
            .groups
            .read()
            .map(|map| {
                map.values()
                    .filter(|item| item.tenant_id == ctx.tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by_key(|item| item.created_at_ms);
        Ok(items)
    }

    async fn find_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
    ) -> Result<Option<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let item = self
            .groups
            .read()
            .ok()
            .and_then(|map| map.get(&group_key(&ctx.tenant_id, group_id)).cloned());
        Ok(item)
    }

    async fn create_group(
        &self,
        ctx: &TenantContext,
        record: GroupRecord,
    ) -> Result<GroupRecord, StorageError> {
        ensure_same_tenant(ctx, &record.tenant_id)?;
        let mut map = self
            .groups
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let key = group_key(&record.tenant_id, &record.group_id);
        if map.contains_key(&key) {
            return Err(StorageError::conflict("group exists"));
        }
        map.insert(key, record.clone());
        Ok(record)
    }

    async fn update_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
        update: GroupUpdate,
    ) -> Result<Option<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .groups
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(group) = map.get_mut(&group_key(&ctx.tenant_id, group_id)) else {
            return Ok(None);
        };
        update.apply(group);
        Ok(Some(group.clone()))
    }

    async fn delete_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
    ) -> Result<Option<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .groups
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(&group_key(&ctx.tenant_id, group_id)))
    }

    async fn remove_device_from_groups(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<u64, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .groups
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut affected = 0;
        for group in map.values_mut() {
            if group.tenant_id != ctx.tenant_id {
                continue;
            }
            let before = group.device_ids.len();
            group.device_ids.retain(|id| id != device_id);
            if group.device_ids.len() != before {
                affected += 1;
            }
        }
        Ok(affected)
    }
}
