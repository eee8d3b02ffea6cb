//! 设备入站信号（已在边界解析完成的强类型报文）。

use crate::device::RelayStates;

/// 继电器回执：硬件确认的继电器真值与可选遥测。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayAck {
    pub relays: RelayStates,
    pub signal_strength: Option<i64>,
    pub battery_level: Option<f64>,
}

/// 按 topic 后缀区分的入站信号。
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSignal {
    /// `<deviceId>/connection`：连接心跳，`status == "connected"` 表示在线。
    Connection { status: String },
    /// `<deviceId>/relay/status`：周期性存活 ping，不改变继电器真值。
    RelayStatus,
    /// `<deviceId>/relay/ack`：硬件回执。
    RelayAck(RelayAck),
    /// `<deviceId>/relay/control`：下发命令的回显，仅记录活动。
    Control(RelayStates),
    /// Shadow reported 状态，等同回执走对账路径。
    ShadowReported(RelayStates),
    /// Shadow 服务访问失败，视为该设备的云连接断开。
    ShadowUnavailable { reason: String },
}

impl DeviceSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            DeviceSignal::Connection { .. } => SignalKind::Connection,
            DeviceSignal::RelayStatus => SignalKind::RelayStatus,
            DeviceSignal::RelayAck(_) => SignalKind::RelayAck,
            DeviceSignal::Control(_) => SignalKind::Control,
            DeviceSignal::ShadowReported(_) | DeviceSignal::ShadowUnavailable { .. } => {
                SignalKind::Shadow
            }
        }
    }

    /// 连接信号是否明确报告 connected。
    pub fn reports_connected(&self) -> bool {
        matches!(self, DeviceSignal::Connection { status } if status == "connected")
    }
}

/// 信号类别（日志、指标与推送 `source` 字段使用）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Connection,
    RelayStatus,
    RelayAck,
    Control,
    Shadow,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Connection => "connection",
            SignalKind::RelayStatus => "relay_status",
            SignalKind::RelayAck => "relay_ack",
            SignalKind::Control => "control",
            SignalKind::Shadow => "shadow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "connection" => Some(SignalKind::Connection),
            "relay_status" => Some(SignalKind::RelayStatus),
            "relay_ack" => Some(SignalKind::RelayAck),
            "control" => Some(SignalKind::Control),
            "shadow" => Some(SignalKind::Shadow),
            _ => None,
        }
    }
}

/// 进入状态引擎的信号信封。
///
/// `tenant_id` 为空表示来自 MQTT（topic 不含租户），由引擎按设备 ID 反查归属租户。
/// `received_at_ms` 为到达时间，引擎只按到达顺序处理，不参考报文内的时间戳。
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    pub tenant_id: Option<String>,
    pub device_id: String,
    pub signal: DeviceSignal,
    pub received_at_ms: i64,
}
