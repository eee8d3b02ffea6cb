//! 继电器报文发布通道：MQTT 主通道、HTTP 数据面备用通道。

use crate::ControlError;
use async_trait::async_trait;
use domain::RelayStates;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// 命令下发 topic：`<deviceId>/relay/control`。
pub fn control_topic(device_id: &str) -> String {
    format!("{}/relay/control", device_id)
}

/// 继电器报文发布器抽象。
#[async_trait]
pub trait RelayPublisher: Send + Sync {
    /// 发布完整四路继电器报文，返回实际送达的通道名。
    async fn publish(
        &self,
        device_id: &str,
        relays: &RelayStates,
    ) -> Result<&'static str, ControlError>;

    /// 通道名（日志用）。
    fn channel(&self) -> &'static str;
}

/// 空发布器（MQTT 与数据面都未配置时占位）。
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl RelayPublisher for NoopPublisher {
    async fn publish(
        &self,
        _device_id: &str,
        _relays: &RelayStates,
    ) -> Result<&'static str, ControlError> {
        Ok(self.channel())
    }

    fn channel(&self) -> &'static str {
        "noop"
    }
}

/// MQTT 发布器配置。
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
}

/// MQTT 发布器（在 broker 断开时立即失败，交由备用通道处理）。
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    pub fn connect(
        config: MqttPublisherConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), ControlError> {
        let client_id = format!("sentinel-control-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let flag = connected.clone();
        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        flag.store(true, Ordering::SeqCst);
                        info!(target: "sentinel.control", "mqtt_publisher_connected");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if flag.swap(false, Ordering::SeqCst) {
                            warn!(target: "sentinel.control", "mqtt publisher disconnected: {}", err);
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        Ok((
            Self {
                client,
                qos: qos_from_u8(config.qos),
                connected,
            },
            handle,
        ))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayPublisher for MqttPublisher {
    async fn publish(
        &self,
        device_id: &str,
        relays: &RelayStates,
    ) -> Result<&'static str, ControlError> {
        if !self.is_connected() {
            return Err(ControlError::Publish("mqtt broker not connected".to_string()));
        }
        let topic = control_topic(device_id);
        let payload =
            serde_json::to_vec(relays).map_err(|err| ControlError::Payload(err.to_string()))?;
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|err| ControlError::Publish(err.to_string()))?;
        Ok(self.channel())
    }

    fn channel(&self) -> &'static str {
        "mqtt"
    }
}

/// HTTP 数据面发布器：`POST {base}/topics/{topic}?qos={qos}`。
#[derive(Clone)]
pub struct HttpDataPlanePublisher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    qos: u8,
}

impl HttpDataPlanePublisher {
    pub fn new(base_url: &str, token: Option<String>, qos: u8) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            qos,
        }
    }

    fn publish_url(&self, device_id: &str) -> String {
        format!(
            "{}/topics/{}?qos={}",
            self.base_url,
            urlencoding::encode(&control_topic(device_id)),
            self.qos
        )
    }
}

#[async_trait]
impl RelayPublisher for HttpDataPlanePublisher {
    async fn publish(
        &self,
        device_id: &str,
        relays: &RelayStates,
    ) -> Result<&'static str, ControlError> {
        let mut request = self.client.post(self.publish_url(device_id)).json(relays);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ControlError::Publish(format!("data plane request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ControlError::Publish(format!(
                "data plane HTTP {}",
                response.status()
            )));
        }
        Ok(self.channel())
    }

    fn channel(&self) -> &'static str {
        "data_plane"
    }
}

/// 主通道失败后尝试备用通道。
pub struct FallbackPublisher {
    primary: Arc<dyn RelayPublisher>,
    fallback: Option<Arc<dyn RelayPublisher>>,
}

impl FallbackPublisher {
    pub fn new(primary: Arc<dyn RelayPublisher>, fallback: Option<Arc<dyn RelayPublisher>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl RelayPublisher for FallbackPublisher {
    async fn publish(
        &self,
        device_id: &str,
        relays: &RelayStates,
    ) -> Result<&'static str, ControlError> {
        let err = match self.primary.publish(device_id, relays).await {
            Ok(channel) => return Ok(channel),
            Err(err) => err,
        };
        let Some(fallback) = &self.fallback else {
            return Err(err);
        };
        warn!(
            target: "sentinel.control",
            device_id = %device_id,
            primary = self.primary.channel(),
            fallback = fallback.channel(),
            error = %err,
            "publish_primary_failed"
        );
        fallback.publish(device_id, relays).await
    }

    fn channel(&self) -> &'static str {
        self.primary.channel()
    }
}

/// 内存发布器：记录已发布报文，可切换为失败模式（测试与本地联调用）。
#[derive(Debug)]
pub struct InMemoryPublisher {
    channel: &'static str,
    published: Mutex<Vec<(String, RelayStates)>>,
    failing: AtomicBool,
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self::named("memory")
    }
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定通道名，便于区分主备通道。
    pub fn named(channel: &'static str) -> Self {
        Self {
            channel,
            published: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, RelayStates)> {
        self.published
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelayPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        device_id: &str,
        relays: &RelayStates,
    ) -> Result<&'static str, ControlError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ControlError::Publish("publisher unavailable".to_string()));
        }
        let mut items = self
            .published
            .lock()
            .map_err(|_| ControlError::Publish("lock poisoned".to_string()))?;
        items.push((control_topic(device_id), *relays));
        Ok(self.channel)
    }

    fn channel(&self) -> &'static str {
        self.channel
    }
}

pub fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_plane_url_encodes_topic() {
        let publisher = HttpDataPlanePublisher::new("https://iot.example.com/", None, 1);
        assert_eq!(
            publisher.publish_url("zonex_3"),
            "https://iot.example.com/topics/zonex_3%2Frelay%2Fcontrol?qos=1"
        );
    }

    #[test]
    fn qos_defaults_to_at_least_once() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(9), QoS::AtLeastOnce);
    }
}
