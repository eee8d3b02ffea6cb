use api_contract::{
    CreateDeviceRequest, CreateGroupRequest, DeviceDto, FeatureFlagsDto, RelayConfigDto,
    RelayStatesDto, ScenarioRequest,
};

fn sample_device() -> DeviceDto {
    DeviceDto {
        id: "zonex_3".to_string(),
        tenant_id: "tenant-1".to_string(),
        name: "Zone X 3".to_string(),
        location: "North gate".to_string(),
        lat: 1.5,
        lng: 2.5,
        group: None,
        status: "active+online".to_string(),
        features: FeatureFlagsDto {
            siren: true,
            ..FeatureFlagsDto::default()
        },
        relay_states: RelayStatesDto {
            relay1: true,
            ..RelayStatesDto::default()
        },
        relay_config: RelayConfigDto {
            relay1: "siren".to_string(),
            relay2: "beacon".to_string(),
            relay3: "announcement".to_string(),
            relay4: "dispenser".to_string(),
        },
        last_seen: Some(1_700_000_000_000),
        last_update_time: 1_700_000_000_000,
        last_status_change: 1_700_000_000_000,
        signal_strength: None,
        battery_level: None,
    }
}

#[test]
fn device_dto_is_camel_case() {
    let value = serde_json::to_value(sample_device()).expect("serialize");
    assert_eq!(value["tenantId"], "tenant-1");
    assert_eq!(value["relayStates"]["relay1"], true);
    assert_eq!(value["relayConfig"]["relay1"], "siren");
    assert_eq!(value["status"], "active+online");
    assert!(value.get("lastStatusChange").is_some());
    assert!(value.get("relay_states").is_none());
    assert!(value.get("signalStrength").is_none());
}

#[test]
fn create_device_accepts_device_id_alias() {
    let payload = r#"{"deviceId":"pole-9","name":"Pole 9"}"#;
    let req: CreateDeviceRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.id, "pole-9");
    assert!(req.relay_config.is_none());
}

#[test]
fn scenario_request_keeps_only_present_features() {
    let payload = r#"{"deviceIds":["a","b"],"features":{"siren":true,"beacon":false}}"#;
    let req: ScenarioRequest = serde_json::from_str(payload).expect("parse");
    let features = req.features.expect("features");
    assert_eq!(features.len(), 2);
    assert_eq!(features.get("siren"), Some(&true));
    assert!(req.scenario.is_none());
}

#[test]
fn create_group_defaults_device_ids() {
    let payload = r#"{"name":"Perimeter"}"#;
    let req: CreateGroupRequest = serde_json::from_str(payload).expect("parse");
    assert!(req.device_ids.is_empty());
    assert!(req.id.is_none());
}
