use domain::{DeviceStatus, FeatureFlags};
use sentinel_status::{SignalClock, StatusThresholds, derive_status};

const NOW_MS: i64 = 1_700_000_000_000;
const MINUTE_MS: i64 = 60_000;

fn connected_at(ts_ms: i64) -> SignalClock {
    let mut clock = SignalClock::default();
    clock.record_connection(ts_ms, true);
    clock
}

#[test]
fn no_signals_is_offline() {
    let flags = FeatureFlags::default();
    let status = derive_status(
        &SignalClock::default(),
        Some(&flags),
        NOW_MS,
        StatusThresholds::default(),
    );
    assert_eq!(status, DeviceStatus::Offline);
}

#[test]
fn fresh_connection_is_online() {
    let flags = FeatureFlags::default();
    let clock = connected_at(NOW_MS - MINUTE_MS);
    let status = derive_status(&clock, Some(&flags), NOW_MS, StatusThresholds::default());
    assert_eq!(status, DeviceStatus::Online);
}

#[test]
fn active_feature_escalates_to_active_online() {
    let flags = FeatureFlags {
        beacon: true,
        ..FeatureFlags::default()
    };
    let clock = connected_at(NOW_MS);
    let status = derive_status(&clock, Some(&flags), NOW_MS, StatusThresholds::default());
    assert_eq!(status, DeviceStatus::ActiveOnline);
}

#[test]
fn stale_heartbeat_dominates_recent_ack_and_active_features() {
    let flags = FeatureFlags {
        siren: true,
        beacon: true,
        announcement: true,
        dispenser: true,
    };
    let mut clock = connected_at(NOW_MS - 21 * MINUTE_MS);
    clock.record_relay_ack(NOW_MS);
    clock.record_relay_status(NOW_MS);
    assert!(clock.connected_to_aws);
    let status = derive_status(&clock, Some(&flags), NOW_MS, StatusThresholds::default());
    assert_eq!(status, DeviceStatus::Offline);
}

#[test]
fn disconnected_report_is_offline_even_when_fresh() {
    let flags = FeatureFlags::default();
    let mut clock = SignalClock::default();
    clock.record_connection(NOW_MS, false);
    let status = derive_status(&clock, Some(&flags), NOW_MS, StatusThresholds::default());
    assert_eq!(status, DeviceStatus::Offline);
}

#[test]
fn unknown_device_is_offline() {
    let clock = connected_at(NOW_MS);
    let status = derive_status(&clock, None, NOW_MS, StatusThresholds::default());
    assert_eq!(status, DeviceStatus::Offline);
}

#[test]
fn twenty_minute_boundary() {
    let flags = FeatureFlags::default();
    let thresholds = StatusThresholds::default();

    let just_inside = connected_at(NOW_MS - (19 * MINUTE_MS + 59_000));
    assert_eq!(
        derive_status(&just_inside, Some(&flags), NOW_MS, thresholds),
        DeviceStatus::Online
    );

    let just_outside = connected_at(NOW_MS - (20 * MINUTE_MS + 1_000));
    assert_eq!(
        derive_status(&just_outside, Some(&flags), NOW_MS, thresholds),
        DeviceStatus::Offline
    );
}

#[test]
fn threshold_is_configurable() {
    let flags = FeatureFlags::default();
    let thresholds = StatusThresholds {
        offline_timeout: std::time::Duration::from_secs(30),
    };
    let clock = connected_at(NOW_MS - 31_000);
    assert_eq!(
        derive_status(&clock, Some(&flags), NOW_MS, thresholds),
        DeviceStatus::Offline
    );
}
