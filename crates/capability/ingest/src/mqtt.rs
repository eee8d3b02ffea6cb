use crate::parse::{device_topics, parse_message};
use crate::{DeviceSubscriber, IngestError, SignalHandler, Source, now_epoch_ms};
use async_trait::async_trait;
use domain::SignalEnvelope;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use sentinel_control::qos_from_u8;
use sentinel_telemetry::{record_signal_invalid, record_signal_received};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 通配订阅：所有设备的四类 topic。
pub const WILDCARD_TOPICS: [&str; 4] = [
    "+/connection",
    "+/relay/status",
    "+/relay/ack",
    "+/relay/control",
];

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
}

/// MQTT 采集源。
///
/// 首次连上 broker 之前出错视为启动失败，`run` 返回错误（调用方改用 Shadow 轮询）；
/// 连上之后的错误只记录日志并重连，每次 ConnAck 都会重新订阅。
pub struct MqttSource {
    client: AsyncClient,
    eventloop: tokio::sync::Mutex<EventLoop>,
    qos: QoS,
    devices: Arc<Mutex<BTreeSet<String>>>,
}

impl MqttSource {
    pub fn connect(config: MqttSourceConfig) -> (Self, MqttDeviceSubscriber) {
        let client_id = format!("sentinel-ingest-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, eventloop) = AsyncClient::new(options, 64);
        let qos = qos_from_u8(config.qos);
        let devices = Arc::new(Mutex::new(BTreeSet::new()));
        let subscriber = MqttDeviceSubscriber {
            client: client.clone(),
            qos,
            devices: devices.clone(),
        };
        (
            Self {
                client,
                eventloop: tokio::sync::Mutex::new(eventloop),
                qos,
                devices,
            },
            subscriber,
        )
    }

    /// 当前应订阅的全部 topic：通配在前，随后是已登记设备的 topic。
    fn subscription_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = WILDCARD_TOPICS.iter().map(|topic| topic.to_string()).collect();
        if let Ok(devices) = self.devices.lock() {
            for device_id in devices.iter() {
                topics.extend(device_topics(device_id));
            }
        }
        topics
    }

    /// 重新订阅。
    ///
    /// 请求通道容量有限且此时事件循环未被轮询，因此在独立任务中逐个 `subscribe().await`，
    /// 由事件循环边轮询边消费。
    fn resubscribe(&self) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let qos = self.qos;
        let topics = self.subscription_topics();
        tokio::spawn(async move {
            let total = topics.len();
            for topic in topics {
                if let Err(err) = client.subscribe(topic.clone(), qos).await {
                    warn!(target: "sentinel.ingest", topic = %topic, "mqtt subscribe error: {}", err);
                    return;
                }
            }
            debug!(target: "sentinel.ingest", topics = total, "mqtt_resubscribed");
        })
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(&self, handler: Arc<dyn SignalHandler>) -> Result<(), IngestError> {
        let mut eventloop = self.eventloop.lock().await;
        let mut connected_once = false;
        let mut connected = false;
        let mut resubscribing: Option<tokio::task::JoinHandle<()>> = None;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected_once = true;
                    connected = true;
                    info!(target: "sentinel.ingest", "mqtt_source_connected");
                    if let Some(previous) = resubscribing.replace(self.resubscribe()) {
                        previous.abort();
                    }
                    handler.broker_status(true).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    record_signal_received();
                    let (device_id, signal) = match parse_message(&publish.topic, &publish.payload) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            record_signal_invalid();
                            warn!(
                                target: "sentinel.ingest",
                                topic = %publish.topic,
                                error = %err,
                                "mqtt_message_dropped"
                            );
                            continue;
                        }
                    };
                    debug!(
                        target: "sentinel.ingest",
                        device_id = %device_id,
                        kind = signal.kind().as_str(),
                        "mqtt_signal_received"
                    );
                    let envelope = SignalEnvelope {
                        tenant_id: None,
                        device_id,
                        signal,
                        received_at_ms: now_epoch_ms(),
                    };
                    if let Err(err) = handler.handle_signal(envelope).await {
                        warn!(target: "sentinel.ingest", "signal handler failed: {}", err);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if !connected_once {
                        return Err(IngestError::Source(err.to_string()));
                    }
                    if connected {
                        connected = false;
                        warn!(target: "sentinel.ingest", "mqtt source disconnected: {}", err);
                        handler.broker_status(false).await;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// 按设备订阅（与 [`MqttSource`] 共享同一客户端）。
#[derive(Clone)]
pub struct MqttDeviceSubscriber {
    client: AsyncClient,
    qos: QoS,
    devices: Arc<Mutex<BTreeSet<String>>>,
}

#[async_trait]
impl DeviceSubscriber for MqttDeviceSubscriber {
    async fn subscribe_device(&self, device_id: &str) -> Result<(), IngestError> {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(device_id.to_string());
        }
        for topic in device_topics(device_id) {
            self.client
                .subscribe(topic, self.qos)
                .await
                .map_err(|err| IngestError::Source(err.to_string()))?;
        }
        Ok(())
    }

    async fn unsubscribe_device(&self, device_id: &str) -> Result<(), IngestError> {
        if let Ok(mut devices) = self.devices.lock() {
            devices.remove(device_id);
        }
        for topic in device_topics(device_id) {
            self.client
                .unsubscribe(topic)
                .await
                .map_err(|err| IngestError::Source(err.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with_devices(count: usize) -> MqttSource {
        let (source, _subscriber) = MqttSource::connect(MqttSourceConfig {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            qos: 1,
        });
        if let Ok(mut devices) = source.devices.lock() {
            for index in 0..count {
                devices.insert(format!("pole-{index:03}"));
            }
        }
        source
    }

    #[tokio::test]
    async fn subscription_topics_cover_every_device() {
        let source = source_with_devices(20);
        let topics = source.subscription_topics();
        assert_eq!(topics.len(), 4 + 4 * 20);
        assert_eq!(&topics[..4], &WILDCARD_TOPICS.map(String::from)[..]);
        assert!(topics.contains(&"pole-019/relay/ack".to_string()));
    }

    #[tokio::test]
    async fn resubscribe_waits_for_capacity_instead_of_dropping() {
        // 通道容量 64，远小于 4 + 4 * 40 个 topic
        let source = source_with_devices(40);
        let task = source.resubscribe();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());
        task.abort();
    }
}
