/// 单台设备的信号时钟。
///
/// 时间戳只前进：早于当前记录的信号被忽略（返回 `false`），
/// 因此重放或乱序到达的旧信号不会把时钟拨回，也不会翻转 `connected_to_aws`。
/// 从不持久化，进程重启后全部归零。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalClock {
    pub last_connection_ms: i64,
    pub last_relay_status_ms: i64,
    pub last_relay_ack_ms: i64,
    pub connected_to_aws: bool,
}

impl SignalClock {
    /// 记录连接心跳。
    pub fn record_connection(&mut self, ts_ms: i64, connected: bool) -> bool {
        if ts_ms < self.last_connection_ms {
            return false;
        }
        self.last_connection_ms = ts_ms;
        self.connected_to_aws = connected;
        true
    }

    /// 记录继电器存活 ping。
    pub fn record_relay_status(&mut self, ts_ms: i64) -> bool {
        if ts_ms < self.last_relay_status_ms {
            return false;
        }
        self.last_relay_status_ms = ts_ms;
        true
    }

    /// 记录继电器回执。
    pub fn record_relay_ack(&mut self, ts_ms: i64) -> bool {
        if ts_ms < self.last_relay_ack_ms {
            return false;
        }
        self.last_relay_ack_ms = ts_ms;
        true
    }

    /// 与云服务交互失败：仅清除云连接标志，不动时间戳。
    pub fn mark_disconnected(&mut self) -> bool {
        let changed = self.connected_to_aws;
        self.connected_to_aws = false;
        changed
    }
}
