use sentinel_telemetry::{
    TelemetryMetrics, metrics, record_ack_timeout, record_broadcast_suppressed,
    record_command_issue_latency_ms,
};

#[test]
fn fresh_metrics_start_at_zero() {
    let snapshot = TelemetryMetrics::new().snapshot();
    assert_eq!(snapshot.signals_received, 0);
    assert_eq!(snapshot.ack_timeouts, 0);
}

#[test]
fn global_counters_only_grow() {
    let before = metrics().snapshot();
    record_ack_timeout();
    record_broadcast_suppressed();
    record_command_issue_latency_ms(12);
    let after = metrics().snapshot();
    assert!(after.ack_timeouts >= before.ack_timeouts + 1);
    assert!(after.broadcasts_suppressed >= before.broadcasts_suppressed + 1);
    assert!(after.command_issue_latency_ms_total >= before.command_issue_latency_ms_total + 12);
    assert!(after.command_issue_latency_ms_count >= before.command_issue_latency_ms_count + 1);
}
