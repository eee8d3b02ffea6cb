//! 设备状态引擎。
//!
//! 所有设备状态只在一个事件循环里读写：传输层回调、HTTP 处理器与定时器都只向
//! 有界队列投递 [`MonitorEvent`]，由循环逐个处理到底。外部 I/O（MQTT 发布、
//! Shadow 读写）在循环外的任务里执行，结果再作为事件送回循环。
//!
//! 对外入口是可克隆的 [`MonitorHandle`]，同时实现了采集侧的
//! [`sentinel_ingest::SignalHandler`] 与 [`sentinel_ingest::DeviceDirectory`]。

mod activity;
mod engine;
mod event;
mod handle;
mod registry;
mod task;

use domain::{DeviceStatus, Feature, RelayConfig, RelayStates};
use sentinel_control::{ControlError, PlannedChange};
use std::collections::BTreeMap;
use std::time::Duration;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use engine::spawn_monitor;
pub use handle::MonitorHandle;
pub use task::TaskHandle;

/// 状态引擎错误。
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device already registered: {0}")]
    DeviceExists(String),
    #[error("device {device_id} is {status}; commands require online or active+online")]
    DeviceOffline {
        device_id: String,
        status: DeviceStatus,
    },
    #[error("scenario rejected: offline {offline:?}, unknown {missing:?}")]
    ScenarioRejected {
        offline: Vec<String>,
        missing: Vec<String>,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("monitor stopped")]
    Stopped,
}

/// 引擎参数（超时均可配置）。
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub offline_timeout: Duration,
    pub status_check_interval: Duration,
    pub ack_timeout: Duration,
    pub queue_capacity: usize,
    pub activity_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            offline_timeout: Duration::from_secs(20 * 60),
            status_check_interval: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(15),
            queue_capacity: 1024,
            activity_capacity: 200,
        }
    }
}

/// 设备资料修改（缺省字段保持不变）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceChanges {
    pub name: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub relay_config: Option<RelayConfig>,
}

/// 单设备命令受理结果（设备状态此时尚未改变，等待回执）。
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub device_id: String,
    pub command: String,
    pub change: PlannedChange,
    pub payload: RelayStates,
    pub channel: &'static str,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDeviceResult {
    pub device_id: String,
    /// 成功时为下发的完整继电器报文。
    pub result: Result<RelayStates, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub features: BTreeMap<Feature, bool>,
    pub results: Vec<ScenarioDeviceResult>,
    pub timestamp: i64,
}
