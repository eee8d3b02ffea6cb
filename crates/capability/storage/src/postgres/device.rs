//! Postgres 设备存储实现

use crate::error::StorageError;
use crate::models::{DeviceRecord, DeviceUpdate};
use crate::traits::DeviceStore;
use crate::validation::{ensure_same_tenant, ensure_tenant};
use domain::{RelayConfig, TenantContext};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str =
    "device_id, tenant_id, name, location, lat, lng, group_id, relay_config, created_at_ms";

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn device_from_row(row: &PgRow) -> Result<DeviceRecord, StorageError> {
    let relay_config: String = row.try_get("relay_config")?;
    let relay_config: RelayConfig = serde_json::from_str(&relay_config)?;
    Ok(DeviceRecord {
        device_id: row.try_get("device_id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        group_id: row.try_get("group_id")?,
        relay_config,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn list_devices(&self, ctx: &TenantContext) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(&format!(
            "select {DEVICE_COLUMNS} from devices where tenant_id = $1 order by device_id"
        ))
        .bind(&ctx.tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn find_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "select {DEVICE_COLUMNS} from devices where tenant_id = $1 and device_id = $2"
        ))
        .bind(&ctx.tenant_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn create_device(
        &self,
        ctx: &TenantContext,
        record: DeviceRecord,
    ) -> Result<DeviceRecord, StorageError> {
        ensure_same_tenant(ctx, &record.tenant_id)?;
        let relay_config = serde_json::to_string(&record.relay_config)?;
        sqlx::query(
            "insert into devices \
             (device_id, tenant_id, name, location, lat, lng, group_id, relay_config, created_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&record.device_id)
        .bind(&record.tenant_id)
        .bind(&record.name)
        .bind(&record.location)
        .bind(record.lat)
        .bind(record.lng)
        .bind(&record.group_id)
        .bind(relay_config)
        .bind(record.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let relay_config = update
            .relay_config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let (group_set, group_id) = match update.group_id {
            Some(group_id) => (true, group_id),
            None => (false, None),
        };
        let row = sqlx::query(&format!(
            "update devices set \
             name = coalesce($1, name), \
             location = coalesce($2, location), \
             lat = coalesce($3, lat), \
             lng = coalesce($4, lng), \
             group_id = case when $5 then $6 else group_id end, \
             relay_config = coalesce($7, relay_config) \
             where tenant_id = $8 and device_id = $9 \
             returning {DEVICE_COLUMNS}"
        ))
        .bind(update.name)
        .bind(update.location)
        .bind(update.lat)
        .bind(update.lng)
        .bind(group_set)
        .bind(group_id)
        .bind(relay_config)
        .bind(&ctx.tenant_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn delete_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let result = sqlx::query("delete from devices where tenant_id = $1 and device_id = $2")
            .bind(&ctx.tenant_id)
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_group(&self, ctx: &TenantContext, group_id: &str) -> Result<u64, StorageError> {
        ensure_tenant(ctx)?;
        let result = sqlx::query(
            "update devices set group_id = null where tenant_id = $1 and group_id = $2",
        )
        .bind(&ctx.tenant_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn scan_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {DEVICE_COLUMNS} from devices order by tenant_id, device_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(device_from_row).collect()
    }
}
