use domain::{DeviceSignal, RelayStates, SignalKind};
use sentinel_ingest::{IngestError, parse_message, parse_signal};

#[test]
fn ack_payload_with_telemetry() {
    let (device_id, signal) = parse_message(
        "zonex_3/relay/ack",
        br#"{"relay1":true,"relay2":false,"relay3":true,"relay4":false,"signal_strength":-67,"battery_level":88.5}"#,
    )
    .expect("parsed");
    assert_eq!(device_id, "zonex_3");
    let DeviceSignal::RelayAck(ack) = signal else {
        panic!("expected ack");
    };
    assert_eq!(
        ack.relays,
        RelayStates {
            relay1: true,
            relay3: true,
            ..RelayStates::default()
        }
    );
    assert_eq!(ack.signal_strength, Some(-67));
    assert_eq!(ack.battery_level, Some(88.5));
}

#[test]
fn ack_missing_relays_default_to_off() {
    let signal = parse_signal(SignalKind::RelayAck, br#"{"relay2":true}"#).expect("signal");
    let DeviceSignal::RelayAck(ack) = signal else {
        panic!("expected ack");
    };
    assert!(ack.relays.relay2);
    assert!(!ack.relays.relay1);
    assert!(ack.signal_strength.is_none());
}

#[test]
fn malformed_ack_is_rejected() {
    let result = parse_signal(SignalKind::RelayAck, br#"{"relay1":"maybe"}"#);
    assert!(matches!(result, Err(IngestError::InvalidPayload(_))));
    assert!(parse_signal(SignalKind::RelayAck, b"not json").is_err());
}

#[test]
fn connection_json_status() {
    let (_, signal) =
        parse_message("pole-7/connection", br#"{"status":"disconnected"}"#).expect("parsed");
    assert!(!signal.reports_connected());
    let (_, signal) =
        parse_message("pole-7/connection", br#"{"status":"connected"}"#).expect("parsed");
    assert!(signal.reports_connected());
}

#[test]
fn unknown_topic_is_rejected() {
    assert!(matches!(
        parse_message("pole-7/telemetry", b"{}"),
        Err(IngestError::InvalidTopic(_))
    ));
}

#[test]
fn control_echo_parses_relays() {
    let (_, signal) = parse_message(
        "pole-7/relay/control",
        br#"{"relay1":false,"relay2":true,"relay3":false,"relay4":false}"#,
    )
    .expect("parsed");
    assert_eq!(
        signal,
        DeviceSignal::Control(RelayStates {
            relay2: true,
            ..RelayStates::default()
        })
    );
}

#[test]
fn shadow_payload_requires_reported() {
    let signal = parse_signal(
        SignalKind::Shadow,
        br#"{"state":{"reported":{"relay4":true}}}"#,
    )
    .expect("signal");
    assert_eq!(
        signal,
        DeviceSignal::ShadowReported(RelayStates {
            relay4: true,
            ..RelayStates::default()
        })
    );
    assert!(parse_signal(SignalKind::Shadow, br#"{"state":{"desired":{}}}"#).is_err());
}
