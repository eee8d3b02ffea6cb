use crate::signals::SignalClock;
use domain::{DeviceStatus, FeatureFlags};
use std::time::Duration;
use tracing::debug;

/// 状态推导阈值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusThresholds {
    /// 连接心跳超过该时长未更新即判定 offline。
    pub offline_timeout: Duration,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            offline_timeout: Duration::from_secs(20 * 60),
        }
    }
}

/// 连接心跳是否过期（严格大于阈值才算过期）。
pub fn is_connection_stale(signals: &SignalClock, now_ms: i64, thresholds: StatusThresholds) -> bool {
    let timeout_ms = thresholds.offline_timeout.as_millis() as i64;
    now_ms.saturating_sub(signals.last_connection_ms) > timeout_ms
}

/// 推导设备状态（按顺序匹配，先命中者生效）。
///
/// 1. 连接心跳过期 → offline（即使回执很新也一样）
/// 2. 最近一次连接信号未报告 connected → offline
/// 3. 设备不在注册表（`features` 为 `None`）→ offline
/// 4. 任一功能开启 → active+online
/// 5. 其余 → online
pub fn derive_status(
    signals: &SignalClock,
    features: Option<&FeatureFlags>,
    now_ms: i64,
    thresholds: StatusThresholds,
) -> DeviceStatus {
    if is_connection_stale(signals, now_ms, thresholds) {
        debug!(
            target: "sentinel.status",
            last_connection_ms = signals.last_connection_ms,
            now_ms = now_ms,
            "connection_heartbeat_stale"
        );
        return DeviceStatus::Offline;
    }
    if !signals.connected_to_aws {
        return DeviceStatus::Offline;
    }
    let Some(features) = features else {
        return DeviceStatus::Offline;
    };
    if features.any_active() {
        DeviceStatus::ActiveOnline
    } else {
        DeviceStatus::Online
    }
}
