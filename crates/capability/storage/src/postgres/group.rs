//! Postgres 分组存储实现

use crate::error::StorageError;
use crate::models::{GroupRecord, GroupUpdate};
use crate::traits::GroupStore;
use crate::validation::{ensure_same_tenant, ensure_tenant};
use domain::TenantContext;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const GROUP_COLUMNS: &str =
    "group_id, tenant_id, name, description, color, device_ids, created_at_ms";

pub struct PgGroupStore {
    pub pool: PgPool,
}

impl PgGroupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn group_from_row(row: &PgRow) -> Result<GroupRecord, StorageError> {
    Ok(GroupRecord {
        group_id: row.try_get("group_id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        color: row.try_get("color")?,
        device_ids: row.try_get("device_ids")?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl GroupStore for PgGroupStore {
    async fn list_groups(&self, ctx: &TenantContext) -> Result<Vec<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(&format!(
            "select {GROUP_COLUMNS} from device_groups where tenant_id = $1 order by created_at_ms"
        ))
        .bind(&ctx.tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(group_from_row).collect()
    }

    async fn find_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
    ) -> Result<Option<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "select {GROUP_COLUMNS} from device_groups where tenant_id = $1 and group_id = $2"
        ))
        .bind(&ctx.tenant_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn create_group(
        &self,
        ctx: &TenantContext,
        record: GroupRecord,
    ) -> Result<GroupRecord, StorageError> {
        ensure_same_tenant(ctx, &record.tenant_id)?;
        sqlx::query(
            "insert into device_groups \
             (group_id, tenant_id, name, description, color, device_ids, created_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.group_id)
        .bind(&record.tenant_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.color)
        .bind(&record.device_ids)
        .bind(record.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
        update: GroupUpdate,
    ) -> Result<Option<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "update device_groups set \
             name = coalesce($1, name), \
             description = coalesce($2, description), \
             color = coalesce($3, color), \
             device_ids = coalesce($4, device_ids) \
             where tenant_id = $5 and group_id = $6 \
             returning {GROUP_COLUMNS}"
        ))
        .bind(update.name)
        .bind(update.description)
        .bind(update.color)
        .bind(update.device_ids)
        .bind(&ctx.tenant_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn delete_group(
        &self,
        ctx: &TenantContext,
        group_id: &str,
    ) -> Result<Option<GroupRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "delete from device_groups where tenant_id = $1 and group_id = $2 \
             returning {GROUP_COLUMNS}"
        ))
        .bind(&ctx.tenant_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn remove_device_from_groups(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<u64, StorageError> {
        ensure_tenant(ctx)?;
        let result = sqlx::query(
            "update device_groups set device_ids = array_remove(device_ids, $2) \
             where tenant_id = $1 and $2 = any(device_ids)",
        )
        .bind(&ctx.tenant_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
