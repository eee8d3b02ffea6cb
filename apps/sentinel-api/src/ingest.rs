//! 采集链路装配。
//!
//! 优先使用 MQTT 实时订阅；MQTT 关闭或首次连接失败时改为 Shadow 轮询，
//! 两者都不可用时只记录告警（设备保持 offline，直到 HTTP 同步或模拟信号）。

use sentinel_control::ShadowClient;
use sentinel_ingest::{MqttSource, ShadowPollSource, SignalHandler, Source};
use sentinel_monitor::MonitorHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn spawn_ingest(
    source: Option<MqttSource>,
    shadow: Option<Arc<dyn ShadowClient>>,
    monitor: MonitorHandle,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let handler: Arc<dyn SignalHandler> = Arc::new(monitor.clone());
        if let Some(source) = source {
            match source.run(handler.clone()).await {
                Ok(()) => {
                    info!(target: "sentinel.api", "mqtt_source_stopped");
                    return;
                }
                Err(err) => {
                    warn!(
                        target: "sentinel.api",
                        error = %err,
                        "mqtt_source_failed_falling_back_to_shadow_polling"
                    );
                }
            }
        }
        let Some(shadow) = shadow else {
            warn!(target: "sentinel.api", "no_ingest_source_available");
            return;
        };
        let poller = ShadowPollSource::new(shadow, Arc::new(monitor), poll_interval);
        if let Err(err) = poller.run(handler).await {
            warn!(target: "sentinel.api", error = %err, "shadow_polling_stopped");
        }
    })
}
