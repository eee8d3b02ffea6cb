//! 应用运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未配置时使用内存存储
    pub database_url: Option<String>,
    pub mqtt_enabled: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_qos: u8,
    /// HTTP 数据面（备用发布通道 + Shadow 读写）
    pub data_plane_url: Option<String>,
    pub data_plane_token: Option<String>,
    pub offline_timeout_seconds: u64,
    pub status_check_interval_seconds: u64,
    pub ack_timeout_seconds: u64,
    pub shadow_poll_interval_seconds: u64,
    pub monitor_queue_capacity: usize,
    pub connection_buffer: usize,
    pub activity_capacity: usize,
    /// 未配置时信任网关注入的 `x-tenant-id` 等请求头
    pub jwt_secret: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（测试中用 HashMap 代替进程环境）。
    pub fn from_source<F>(source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = Reader { source };
        let config = Self {
            http_addr: reader
                .string("SENTINEL_HTTP_ADDR")
                .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            database_url: reader.string("SENTINEL_DATABASE_URL"),
            mqtt_enabled: reader.bool_with_default("SENTINEL_MQTT", true),
            mqtt_host: reader
                .string("SENTINEL_MQTT_HOST")
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            mqtt_port: reader.parse_with_default("SENTINEL_MQTT_PORT", 1883)?,
            mqtt_username: reader.string("SENTINEL_MQTT_USERNAME"),
            mqtt_password: reader.string("SENTINEL_MQTT_PASSWORD"),
            mqtt_qos: reader.parse_with_default("SENTINEL_MQTT_QOS", 1)?,
            data_plane_url: reader.string("SENTINEL_DATA_PLANE_URL"),
            data_plane_token: reader.string("SENTINEL_DATA_PLANE_TOKEN"),
            offline_timeout_seconds: reader
                .parse_with_default("SENTINEL_OFFLINE_TIMEOUT_SECONDS", 20 * 60)?,
            status_check_interval_seconds: reader
                .parse_with_default("SENTINEL_STATUS_CHECK_INTERVAL_SECONDS", 30)?,
            ack_timeout_seconds: reader.parse_with_default("SENTINEL_ACK_TIMEOUT_SECONDS", 15)?,
            shadow_poll_interval_seconds: reader
                .parse_with_default("SENTINEL_SHADOW_POLL_INTERVAL_SECONDS", 60)?,
            monitor_queue_capacity: reader
                .parse_with_default("SENTINEL_MONITOR_QUEUE_CAPACITY", 1024)?,
            connection_buffer: reader.parse_with_default("SENTINEL_CONNECTION_BUFFER", 256)?,
            activity_capacity: reader.parse_with_default("SENTINEL_ACTIVITY_CAPACITY", 200)?,
            jwt_secret: reader.string("SENTINEL_JWT_SECRET"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("SENTINEL_OFFLINE_TIMEOUT_SECONDS", self.offline_timeout_seconds),
            (
                "SENTINEL_STATUS_CHECK_INTERVAL_SECONDS",
                self.status_check_interval_seconds,
            ),
            ("SENTINEL_ACK_TIMEOUT_SECONDS", self.ack_timeout_seconds),
            (
                "SENTINEL_SHADOW_POLL_INTERVAL_SECONDS",
                self.shadow_poll_interval_seconds,
            ),
            ("SENTINEL_MONITOR_QUEUE_CAPACITY", self.monitor_queue_capacity as u64),
            ("SENTINEL_CONNECTION_BUFFER", self.connection_buffer as u64),
            ("SENTINEL_ACTIVITY_CAPACITY", self.activity_capacity as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
            }
        }
        if self.mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "SENTINEL_MQTT_QOS".to_string(),
                self.mqtt_qos.to_string(),
            ));
        }
        Ok(())
    }

    pub fn offline_timeout(&self) -> Duration {
        Duration::from_secs(self.offline_timeout_seconds)
    }

    pub fn status_check_interval(&self) -> Duration {
        Duration::from_secs(self.status_check_interval_seconds)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_seconds)
    }

    pub fn shadow_poll_interval(&self) -> Duration {
        Duration::from_secs(self.shadow_poll_interval_seconds)
    }
}

struct Reader<F> {
    source: F,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// 读取非空字符串。
    fn string(&self, key: &str) -> Option<String> {
        match (self.source)(key) {
            Some(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            _ => None,
        }
    }

    fn parse_with_default<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        let Some(value) = self.string(key) else {
            return Ok(default);
        };
        value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }

    fn bool_with_default(&self, key: &str, default: bool) -> bool {
        match self.string(key) {
            Some(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
            None => default,
        }
    }
}
