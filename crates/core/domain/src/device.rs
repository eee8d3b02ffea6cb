//! 设备模型：继电器、功能、继电器↔功能映射与设备规范记录。
//!
//! 不变量：`features[f] == relay_states[relay_config⁻¹(f)]`。
//! 所有修改继电器或映射的路径都必须经过 [`DeviceState::apply_relays`]
//! 或 [`DeviceState::set_relay_config`]，以保持功能标志与继电器真值一致。

use serde::{Deserialize, Serialize};

/// 逻辑功能（每个功能恰好对应一个继电器）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Siren,
    Beacon,
    Announcement,
    Dispenser,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Siren,
        Feature::Beacon,
        Feature::Announcement,
        Feature::Dispenser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Siren => "siren",
            Feature::Beacon => "beacon",
            Feature::Announcement => "announcement",
            Feature::Dispenser => "dispenser",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "siren" => Some(Feature::Siren),
            "beacon" => Some(Feature::Beacon),
            "announcement" => Some(Feature::Announcement),
            "dispenser" => Some(Feature::Dispenser),
            _ => None,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 物理继电器通道。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relay {
    Relay1,
    Relay2,
    Relay3,
    Relay4,
}

impl Relay {
    pub const ALL: [Relay; 4] = [Relay::Relay1, Relay::Relay2, Relay::Relay3, Relay::Relay4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relay::Relay1 => "relay1",
            Relay::Relay2 => "relay2",
            Relay::Relay3 => "relay3",
            Relay::Relay4 => "relay4",
        }
    }
}

impl std::fmt::Display for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 四路继电器开关状态（同时也是下发/回执报文的 JSON 形状）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStates {
    #[serde(default)]
    pub relay1: bool,
    #[serde(default)]
    pub relay2: bool,
    #[serde(default)]
    pub relay3: bool,
    #[serde(default)]
    pub relay4: bool,
}

impl RelayStates {
    pub fn get(&self, relay: Relay) -> bool {
        match relay {
            Relay::Relay1 => self.relay1,
            Relay::Relay2 => self.relay2,
            Relay::Relay3 => self.relay3,
            Relay::Relay4 => self.relay4,
        }
    }

    pub fn set(&mut self, relay: Relay, value: bool) {
        match relay {
            Relay::Relay1 => self.relay1 = value,
            Relay::Relay2 => self.relay2 = value,
            Relay::Relay3 => self.relay3 = value,
            Relay::Relay4 => self.relay4 = value,
        }
    }
}

/// 四个功能的开关标志。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub siren: bool,
    #[serde(default)]
    pub beacon: bool,
    #[serde(default)]
    pub announcement: bool,
    #[serde(default)]
    pub dispenser: bool,
}

impl FeatureFlags {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::Siren => self.siren,
            Feature::Beacon => self.beacon,
            Feature::Announcement => self.announcement,
            Feature::Dispenser => self.dispenser,
        }
    }

    pub fn set(&mut self, feature: Feature, value: bool) {
        match feature {
            Feature::Siren => self.siren = value,
            Feature::Beacon => self.beacon = value,
            Feature::Announcement => self.announcement = value,
            Feature::Dispenser => self.dispenser = value,
        }
    }

    pub fn any_active(&self) -> bool {
        self.siren || self.beacon || self.announcement || self.dispenser
    }
}

/// 继电器映射错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayConfigError {
    /// 同一功能被映射到多个继电器。
    DuplicateFeature(Feature),
}

impl std::fmt::Display for RelayConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayConfigError::DuplicateFeature(feature) => {
                write!(f, "feature {} mapped to more than one relay", feature)
            }
        }
    }
}

impl std::error::Error for RelayConfigError {}

/// 继电器 → 功能映射。
///
/// 缺省字段取默认映射（relay1→siren, relay2→beacon, relay3→announcement, relay4→dispenser）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub relay1: Feature,
    pub relay2: Feature,
    pub relay3: Feature,
    pub relay4: Feature,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay1: Feature::Siren,
            relay2: Feature::Beacon,
            relay3: Feature::Announcement,
            relay4: Feature::Dispenser,
        }
    }
}

impl RelayConfig {
    pub fn feature_for(&self, relay: Relay) -> Feature {
        match relay {
            Relay::Relay1 => self.relay1,
            Relay::Relay2 => self.relay2,
            Relay::Relay3 => self.relay3,
            Relay::Relay4 => self.relay4,
        }
    }

    /// 反查功能所在的继电器。
    pub fn relay_for(&self, feature: Feature) -> Option<Relay> {
        Relay::ALL
            .into_iter()
            .find(|relay| self.feature_for(*relay) == feature)
    }

    /// 校验映射为一一对应。
    pub fn validate(&self) -> Result<(), RelayConfigError> {
        let mut seen: Vec<Feature> = Vec::with_capacity(4);
        for relay in Relay::ALL {
            let feature = self.feature_for(relay);
            if seen.contains(&feature) {
                return Err(RelayConfigError::DuplicateFeature(feature));
            }
            seen.push(feature);
        }
        Ok(())
    }

    /// 由继电器真值推导功能标志。
    pub fn features_from(&self, relays: &RelayStates) -> FeatureFlags {
        let mut flags = FeatureFlags::default();
        for relay in Relay::ALL {
            if relays.get(relay) {
                flags.set(self.feature_for(relay), true);
            }
        }
        flags
    }
}

/// 设备状态（三态，由信号推导，从不由外部直接写入）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    #[serde(rename = "offline")]
    Offline,
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "active+online")]
    ActiveOnline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Offline => "offline",
            DeviceStatus::Online => "online",
            DeviceStatus::ActiveOnline => "active+online",
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, DeviceStatus::Offline)
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 设备静态资料（注册或从存储加载时使用）。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub location: String,
    pub lat: f64,
    pub lng: f64,
    pub group: Option<String>,
    pub relay_config: RelayConfig,
}

/// 设备规范记录（内存中的唯一真值，推送给看板的快照）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub location: String,
    pub lat: f64,
    pub lng: f64,
    pub group: Option<String>,
    pub status: DeviceStatus,
    pub features: FeatureFlags,
    pub relay_states: RelayStates,
    pub relay_config: RelayConfig,
    pub last_seen: Option<i64>,
    pub last_update_time: i64,
    pub last_status_change: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
}

impl DeviceState {
    /// 新注册/新加载的设备：全部继电器关闭，状态 offline。
    pub fn new(profile: DeviceProfile, now_ms: i64) -> Self {
        Self {
            id: profile.id,
            tenant_id: profile.tenant_id,
            name: profile.name,
            location: profile.location,
            lat: profile.lat,
            lng: profile.lng,
            group: profile.group,
            status: DeviceStatus::Offline,
            features: FeatureFlags::default(),
            relay_states: RelayStates::default(),
            relay_config: profile.relay_config,
            last_seen: None,
            last_update_time: now_ms,
            last_status_change: now_ms,
            signal_strength: None,
            battery_level: None,
        }
    }

    /// 写入硬件确认的继电器真值并重算功能标志，返回功能是否变化。
    pub fn apply_relays(&mut self, relays: RelayStates, now_ms: i64) -> bool {
        let features = self.relay_config.features_from(&relays);
        let changed = features != self.features || relays != self.relay_states;
        self.relay_states = relays;
        self.features = features;
        self.last_update_time = now_ms;
        changed
    }

    /// 替换继电器映射（调用方需先校验），功能标志随之重算。
    pub fn set_relay_config(&mut self, config: RelayConfig, now_ms: i64) {
        self.relay_config = config;
        self.features = config.features_from(&self.relay_states);
        self.last_update_time = now_ms;
    }

    /// 写入新状态，返回是否发生状态迁移。
    pub fn set_status(&mut self, status: DeviceStatus, now_ms: i64) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.last_status_change = now_ms;
        self.last_update_time = now_ms;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_every_feature() {
        let config = RelayConfig::default();
        for feature in Feature::ALL {
            let relay = config.relay_for(feature).expect("mapped");
            assert_eq!(config.feature_for(relay), feature);
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_feature_is_rejected() {
        let config = RelayConfig {
            relay1: Feature::Siren,
            relay2: Feature::Siren,
            relay3: Feature::Announcement,
            relay4: Feature::Dispenser,
        };
        assert_eq!(
            config.validate(),
            Err(RelayConfigError::DuplicateFeature(Feature::Siren))
        );
    }

    #[test]
    fn features_follow_custom_mapping() {
        let config = RelayConfig {
            relay1: Feature::Dispenser,
            relay2: Feature::Announcement,
            relay3: Feature::Beacon,
            relay4: Feature::Siren,
        };
        let relays = RelayStates {
            relay1: true,
            relay4: true,
            ..RelayStates::default()
        };
        let flags = config.features_from(&relays);
        assert!(flags.dispenser);
        assert!(flags.siren);
        assert!(!flags.beacon);
        assert!(!flags.announcement);
    }

    #[test]
    fn relay_config_change_recomputes_features() {
        let profile = DeviceProfile {
            id: "pole-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            name: "Pole 1".to_string(),
            location: "Gate".to_string(),
            lat: 0.0,
            lng: 0.0,
            group: None,
            relay_config: RelayConfig::default(),
        };
        let mut state = DeviceState::new(profile, 1);
        state.apply_relays(
            RelayStates {
                relay1: true,
                ..RelayStates::default()
            },
            2,
        );
        assert!(state.features.siren);

        let swapped = RelayConfig {
            relay1: Feature::Beacon,
            relay2: Feature::Siren,
            ..RelayConfig::default()
        };
        state.set_relay_config(swapped, 3);
        assert!(state.features.beacon);
        assert!(!state.features.siren);
    }
}
