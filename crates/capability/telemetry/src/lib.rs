//! 追踪、请求 ID 与进程级计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 基础指标快照（MVP）。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub signals_received: u64,
    pub signals_invalid: u64,
    pub status_transitions: u64,
    pub broadcasts_sent: u64,
    pub broadcasts_suppressed: u64,
    pub connections_pruned: u64,
    pub commands_issued: u64,
    pub command_dispatch_success: u64,
    pub command_dispatch_failure: u64,
    pub commands_rejected: u64,
    pub command_issue_latency_ms_total: u64,
    pub command_issue_latency_ms_count: u64,
    pub scenarios_executed: u64,
    pub acks_confirmed: u64,
    pub ack_timeouts: u64,
    pub shadow_failures: u64,
}

/// 基础指标（MVP）。
pub struct TelemetryMetrics {
    signals_received: AtomicU64,
    signals_invalid: AtomicU64,
    status_transitions: AtomicU64,
    broadcasts_sent: AtomicU64,
    broadcasts_suppressed: AtomicU64,
    connections_pruned: AtomicU64,
    commands_issued: AtomicU64,
    command_dispatch_success: AtomicU64,
    command_dispatch_failure: AtomicU64,
    commands_rejected: AtomicU64,
    command_issue_latency_ms_total: AtomicU64,
    command_issue_latency_ms_count: AtomicU64,
    scenarios_executed: AtomicU64,
    acks_confirmed: AtomicU64,
    ack_timeouts: AtomicU64,
    shadow_failures: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            signals_received: AtomicU64::new(0),
            signals_invalid: AtomicU64::new(0),
            status_transitions: AtomicU64::new(0),
            broadcasts_sent: AtomicU64::new(0),
            broadcasts_suppressed: AtomicU64::new(0),
            connections_pruned: AtomicU64::new(0),
            commands_issued: AtomicU64::new(0),
            command_dispatch_success: AtomicU64::new(0),
            command_dispatch_failure: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            command_issue_latency_ms_total: AtomicU64::new(0),
            command_issue_latency_ms_count: AtomicU64::new(0),
            scenarios_executed: AtomicU64::new(0),
            acks_confirmed: AtomicU64::new(0),
            ack_timeouts: AtomicU64::new(0),
            shadow_failures: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            signals_received: self.signals_received.load(Ordering::Relaxed),
            signals_invalid: self.signals_invalid.load(Ordering::Relaxed),
            status_transitions: self.status_transitions.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            broadcasts_suppressed: self.broadcasts_suppressed.load(Ordering::Relaxed),
            connections_pruned: self.connections_pruned.load(Ordering::Relaxed),
            commands_issued: self.commands_issued.load(Ordering::Relaxed),
            command_dispatch_success: self.command_dispatch_success.load(Ordering::Relaxed),
            command_dispatch_failure: self.command_dispatch_failure.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            command_issue_latency_ms_total: self
                .command_issue_latency_ms_total
                .load(Ordering::Relaxed),
            command_issue_latency_ms_count: self
                .command_issue_latency_ms_count
                .load(Ordering::Relaxed),
            scenarios_executed: self.scenarios_executed.load(Ordering::Relaxed),
            acks_confirmed: self.acks_confirmed.load(Ordering::Relaxed),
            ack_timeouts: self.ack_timeouts.load(Ordering::Relaxed),
            shadow_failures: self.shadow_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例（MVP）。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录设备信号接收次数。
pub fn record_signal_received() {
    metrics().signals_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录非法报文丢弃次数（topic 或 payload 无法解析）。
pub fn record_signal_invalid() {
    metrics().signals_invalid.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备状态迁移次数。
pub fn record_status_transition() {
    metrics().status_transitions.fetch_add(1, Ordering::Relaxed);
}

/// 记录看板推送次数（每次广播计一次，与连接数无关）。
pub fn record_broadcast_sent() {
    metrics().broadcasts_sent.fetch_add(1, Ordering::Relaxed);
}

/// 记录被抑制的推送次数（无变化的 relay_status）。
pub fn record_broadcast_suppressed() {
    metrics()
        .broadcasts_suppressed
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录因发送失败被移除的看板连接数。
pub fn record_connection_pruned() {
    metrics().connections_pruned.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令下发请求次数。
pub fn record_command_issued() {
    metrics().commands_issued.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令下发成功次数（MQTT 或数据面发布成功）。
pub fn record_command_dispatch_success() {
    metrics()
        .command_dispatch_success
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录命令下发失败次数（所有通道均发布失败）。
pub fn record_command_dispatch_failure() {
    metrics()
        .command_dispatch_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录命令被拒绝次数（设备不存在、离线或命令无法解析）。
pub fn record_command_rejected() {
    metrics().commands_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令下发处理耗时（毫秒，包含校验+发布+Shadow 更新）。
pub fn record_command_issue_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .command_issue_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .command_issue_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录场景执行次数。
pub fn record_scenario_executed() {
    metrics().scenarios_executed.fetch_add(1, Ordering::Relaxed);
}

/// 记录回执确认的命令意图数。
pub fn record_ack_confirmed() {
    metrics().acks_confirmed.fetch_add(1, Ordering::Relaxed);
}

/// 记录回执超时次数。
pub fn record_ack_timeout() {
    metrics().ack_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录 Shadow 读写失败次数。
pub fn record_shadow_failure() {
    metrics().shadow_failures.fetch_add(1, Ordering::Relaxed);
}
