//! 存储数据模型
//!
//! - 设备模型：DeviceRecord, DeviceUpdate（静态资料 + 继电器映射）
//! - 分组模型：GroupRecord, GroupUpdate
//!
//! 派生状态（status、features、relayStates、信号时钟）只存在于内存，不落库。

use domain::{DeviceProfile, RelayConfig};

/// 设备记录。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub tenant_id: String,
    pub name: String,
    pub location: String,
    pub lat: f64,
    pub lng: f64,
    /// 所属分组 ID（可选）
    pub group_id: Option<String>,
    pub relay_config: RelayConfig,
    pub created_at_ms: i64,
}

impl DeviceRecord {
    /// 转换为状态引擎使用的设备资料。
    pub fn to_profile(&self) -> DeviceProfile {
        DeviceProfile {
            id: self.device_id.clone(),
            tenant_id: self.tenant_id.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
            lat: self.lat,
            lng: self.lng,
            group: self.group_id.clone(),
            relay_config: self.relay_config,
        }
    }
}

/// 设备更新输入。
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// `Some(None)` 表示移出分组
    pub group_id: Option<Option<String>>,
    pub relay_config: Option<RelayConfig>,
}

impl DeviceUpdate {
    pub fn apply(self, record: &mut DeviceRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(location) = self.location {
            record.location = location;
        }
        if let Some(lat) = self.lat {
            record.lat = lat;
        }
        if let Some(lng) = self.lng {
            record.lng = lng;
        }
        if let Some(group_id) = self.group_id {
            record.group_id = group_id;
        }
        if let Some(relay_config) = self.relay_config {
            record.relay_config = relay_config;
        }
    }
}

/// 设备分组记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub group_id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub device_ids: Vec<String>,
    pub created_at_ms: i64,
}

/// 分组更新输入。
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub device_ids: Option<Vec<String>>,
}

impl GroupUpdate {
    pub fn apply(self, record: &mut GroupRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(description) = self.description {
            record.description = description;
        }
        if let Some(color) = self.color {
            record.color = color;
        }
        if let Some(device_ids) = self.device_ids {
            record.device_ids = device_ids;
        }
    }
}
