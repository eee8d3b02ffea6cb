use sentinel_config::{AppConfig, ConfigError};
use std::collections::HashMap;
use std::time::Duration;

fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    AppConfig::from_source(|key| map.get(key).cloned())
}

#[test]
fn defaults_without_env() {
    let config = load(&[]).expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8080");
    assert!(config.database_url.is_none());
    assert!(config.mqtt_enabled);
    assert_eq!(config.mqtt_port, 1883);
    assert_eq!(config.offline_timeout(), Duration::from_secs(1200));
    assert_eq!(config.status_check_interval(), Duration::from_secs(30));
    assert_eq!(config.ack_timeout(), Duration::from_secs(15));
    assert_eq!(config.activity_capacity, 200);
    assert!(config.jwt_secret.is_none());
}

#[test]
fn overrides_are_parsed() {
    let config = load(&[
        ("SENTINEL_HTTP_ADDR", "0.0.0.0:9000"),
        ("SENTINEL_MQTT", "off"),
        ("SENTINEL_ACK_TIMEOUT_SECONDS", "5"),
        ("SENTINEL_DATA_PLANE_URL", "https://iot.example.com"),
        ("SENTINEL_JWT_SECRET", "secret"),
        ("SENTINEL_MQTT_USERNAME", "  "),
    ])
    .expect("config");
    assert_eq!(config.http_addr, "0.0.0.0:9000");
    assert!(!config.mqtt_enabled);
    assert_eq!(config.ack_timeout(), Duration::from_secs(5));
    assert_eq!(config.data_plane_url.as_deref(), Some("https://iot.example.com"));
    assert_eq!(config.jwt_secret.as_deref(), Some("secret"));
    assert!(config.mqtt_username.is_none());
}

#[test]
fn invalid_numbers_are_rejected() {
    let err = load(&[("SENTINEL_MQTT_PORT", "not-a-port")]).expect_err("invalid");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "SENTINEL_MQTT_PORT"));
    assert!(load(&[("SENTINEL_ACK_TIMEOUT_SECONDS", "0")]).is_err());
    assert!(load(&[("SENTINEL_MQTT_QOS", "3")]).is_err());
}

#[test]
fn load_config_from_process_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("SENTINEL_HTTP_ADDR", "127.0.0.1:8081");
    }
    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
}
