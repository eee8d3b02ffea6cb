//! 租户注册表：tenant → (device → 条目, 活动记录) 的两级所有权结构。
//!
//! 只由事件循环持有；设备条目同时拥有状态快照、信号时钟、巡检定时器与待确认意图，
//! 移除条目即释放它的全部定时器。

use crate::activity::{ActivityEntry, ActivityLog};
use crate::task::TaskHandle;
use domain::{DeviceState, DeviceStatus, Feature};
use sentinel_status::{SignalClock, StatusThresholds, derive_status};
use std::collections::HashMap;

/// 已下发但尚未被回执确认的功能目标值。
#[derive(Debug)]
pub(crate) struct PendingIntent {
    pub id: u64,
    pub previous: bool,
    pub desired: bool,
    pub timer: TaskHandle,
}

#[derive(Debug)]
pub(crate) struct DeviceEntry {
    pub state: DeviceState,
    pub signals: SignalClock,
    pub monitor: Option<TaskHandle>,
    pub intents: HashMap<Feature, PendingIntent>,
}

impl DeviceEntry {
    pub fn new(state: DeviceState) -> Self {
        Self {
            state,
            signals: SignalClock::default(),
            monitor: None,
            intents: HashMap::new(),
        }
    }

    /// 重新推导状态，迁移时返回 `(旧, 新)`。
    pub fn recompute_status(
        &mut self,
        now_ms: i64,
        thresholds: StatusThresholds,
    ) -> Option<(DeviceStatus, DeviceStatus)> {
        let previous = self.state.status;
        let next = derive_status(&self.signals, Some(&self.state.features), now_ms, thresholds);
        if self.state.set_status(next, now_ms) {
            Some((previous, next))
        } else {
            None
        }
    }

    /// 取出功能已达到目标值的意图（定时器随返回值一起丢弃）。
    pub fn take_resolved_intents(&mut self) -> Vec<(Feature, PendingIntent)> {
        let features = self.state.features;
        let resolved: Vec<Feature> = self
            .intents
            .iter()
            .filter(|(feature, intent)| features.get(**feature) == intent.desired)
            .map(|(feature, _)| *feature)
            .collect();
        resolved
            .into_iter()
            .filter_map(|feature| self.intents.remove(&feature).map(|intent| (feature, intent)))
            .collect()
    }

    pub fn cancel_timers(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel();
        }
        for (_, intent) in self.intents.drain() {
            intent.timer.cancel();
        }
    }
}

#[derive(Debug)]
pub(crate) struct TenantState {
    pub devices: HashMap<String, DeviceEntry>,
    pub activity: ActivityLog,
}

#[derive(Debug)]
pub(crate) struct TenantRegistry {
    tenants: HashMap<String, TenantState>,
    activity_capacity: usize,
}

impl TenantRegistry {
    pub fn new(activity_capacity: usize) -> Self {
        Self {
            tenants: HashMap::new(),
            activity_capacity,
        }
    }

    pub fn tenant(&self, tenant_id: &str) -> Option<&TenantState> {
        self.tenants.get(tenant_id)
    }

    pub fn tenant_mut(&mut self, tenant_id: &str) -> Option<&mut TenantState> {
        self.tenants.get_mut(tenant_id)
    }

    pub fn device(&self, tenant_id: &str, device_id: &str) -> Option<&DeviceEntry> {
        self.tenants.get(tenant_id)?.devices.get(device_id)
    }

    pub fn device_mut(&mut self, tenant_id: &str, device_id: &str) -> Option<&mut DeviceEntry> {
        self.tenants.get_mut(tenant_id)?.devices.get_mut(device_id)
    }

    pub fn contains(&self, tenant_id: &str, device_id: &str) -> bool {
        self.device(tenant_id, device_id).is_some()
    }

    pub fn insert_device(&mut self, entry: DeviceEntry) {
        let capacity = self.activity_capacity;
        let tenant = self
            .tenants
            .entry(entry.state.tenant_id.clone())
            .or_insert_with(|| TenantState {
                devices: HashMap::new(),
                activity: ActivityLog::new(capacity),
            });
        tenant.devices.insert(entry.state.id.clone(), entry);
    }

    pub fn remove_device(&mut self, tenant_id: &str, device_id: &str) -> Option<DeviceEntry> {
        let mut entry = self.tenants.get_mut(tenant_id)?.devices.remove(device_id)?;
        entry.cancel_timers();
        Some(entry)
    }

    /// 整租户下线：一次移除释放其全部设备与定时器。
    pub fn remove_tenant(&mut self, tenant_id: &str) -> Option<TenantState> {
        let mut tenant = self.tenants.remove(tenant_id)?;
        for entry in tenant.devices.values_mut() {
            entry.cancel_timers();
        }
        Some(tenant)
    }

    /// 拥有该设备 ID 的全部租户（MQTT topic 不含租户时反查）。
    pub fn owners_of(&self, device_id: &str) -> Vec<String> {
        let mut owners: Vec<String> = self
            .tenants
            .iter()
            .filter(|(_, tenant)| tenant.devices.contains_key(device_id))
            .map(|(tenant_id, _)| tenant_id.clone())
            .collect();
        owners.sort();
        owners
    }

    pub fn device_ids(&self, tenant_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tenants
            .get(tenant_id)
            .map(|tenant| tenant.devices.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn snapshots(&self, tenant_id: &str) -> Vec<DeviceState> {
        self.device_ids(tenant_id)
            .iter()
            .filter_map(|device_id| self.device(tenant_id, device_id))
            .map(|entry| entry.state.clone())
            .collect()
    }

    pub fn all_devices(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .tenants
            .iter()
            .flat_map(|(tenant_id, tenant)| {
                tenant
                    .devices
                    .keys()
                    .map(move |device_id| (tenant_id.clone(), device_id.clone()))
            })
            .collect();
        pairs.sort();
        pairs
    }

    pub fn record_activity(&mut self, tenant_id: &str, entry: ActivityEntry) {
        if let Some(tenant) = self.tenants.get_mut(tenant_id) {
            tenant.activity.push(entry);
        }
    }

    pub fn recent_activity(&self, tenant_id: &str, limit: usize) -> Vec<ActivityEntry> {
        self.tenants
            .get(tenant_id)
            .map(|tenant| tenant.activity.recent(limit))
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        for tenant in self.tenants.values_mut() {
            for entry in tenant.devices.values_mut() {
                entry.cancel_timers();
            }
        }
        self.tenants.clear();
    }
}
