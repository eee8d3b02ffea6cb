//! 设备信号接入：MQTT 订阅、Shadow 轮询与报文解析。
//!
//! 传输层只负责解析并把 [`SignalEnvelope`] 交给 [`SignalHandler`]，
//! 状态的读写全部发生在处理器背后的事件循环里。

use async_trait::async_trait;
use domain::SignalEnvelope;
use std::sync::Arc;

mod mqtt;
mod parse;
mod shadow_poll;

pub use mqtt::{MqttDeviceSubscriber, MqttSource, MqttSourceConfig, WILDCARD_TOPICS};
pub use parse::{device_topics, parse_message, parse_signal, parse_topic};
pub use shadow_poll::{DeviceDirectory, ShadowPollSource, signal_from_shadow};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(String),
}

/// 信号处理器（由状态引擎实现）。
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle_signal(&self, envelope: SignalEnvelope) -> Result<(), IngestError>;

    /// broker 连接状态变化。
    async fn broker_status(&self, connected: bool);
}

/// 按设备订阅/退订（设备注册与注销时调用）。
#[async_trait]
pub trait DeviceSubscriber: Send + Sync {
    async fn subscribe_device(&self, device_id: &str) -> Result<(), IngestError>;

    async fn unsubscribe_device(&self, device_id: &str) -> Result<(), IngestError>;
}

/// 空订阅器（MQTT 关闭时使用）。
#[derive(Debug, Default)]
pub struct NoopSubscriber;

#[async_trait]
impl DeviceSubscriber for NoopSubscriber {
    async fn subscribe_device(&self, _device_id: &str) -> Result<(), IngestError> {
        Ok(())
    }

    async fn unsubscribe_device(&self, _device_id: &str) -> Result<(), IngestError> {
        Ok(())
    }
}

/// 采集源抽象。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(&self, handler: Arc<dyn SignalHandler>) -> Result<(), IngestError>;
}

/// 占位源（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl Source for NoopSource {
    async fn run(&self, _handler: Arc<dyn SignalHandler>) -> Result<(), IngestError> {
        Ok(())
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
