use crate::{IngestError, SignalHandler, Source, now_epoch_ms};
use async_trait::async_trait;
use domain::{DeviceSignal, SignalEnvelope};
use sentinel_control::{ShadowClient, ShadowDocument};
use sentinel_telemetry::record_shadow_failure;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 已注册设备目录（轮询时按租户逐台读取 Shadow）。
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn registered_devices(&self) -> Vec<(String, String)>;
}

/// Shadow 文档 → 信号：有 reported 即视同回执；仅有 desired 不产生信号。
pub fn signal_from_shadow(document: &ShadowDocument) -> Option<DeviceSignal> {
    document.state.reported.map(DeviceSignal::ShadowReported)
}

/// Shadow 轮询源（MQTT 关闭或启动失败时使用）。
pub struct ShadowPollSource {
    shadow: Arc<dyn ShadowClient>,
    directory: Arc<dyn DeviceDirectory>,
    interval: Duration,
}

impl ShadowPollSource {
    pub fn new(
        shadow: Arc<dyn ShadowClient>,
        directory: Arc<dyn DeviceDirectory>,
        interval: Duration,
    ) -> Self {
        Self {
            shadow,
            directory,
            interval,
        }
    }

    /// 轮询一轮，返回送入处理器的信号数。
    pub async fn poll_once(&self, handler: &dyn SignalHandler) -> usize {
        let devices = self.directory.registered_devices().await;
        let mut delivered = 0;
        for (tenant_id, device_id) in devices {
            let signal = match self.shadow.get_shadow(&device_id).await {
                Ok(document) => match signal_from_shadow(&document) {
                    Some(signal) => signal,
                    None => {
                        debug!(
                            target: "sentinel.ingest",
                            tenant_id = %tenant_id,
                            device_id = %device_id,
                            "shadow_without_reported"
                        );
                        continue;
                    }
                },
                Err(err) => {
                    record_shadow_failure();
                    warn!(
                        target: "sentinel.ingest",
                        tenant_id = %tenant_id,
                        device_id = %device_id,
                        error = %err,
                        "shadow_poll_failed"
                    );
                    DeviceSignal::ShadowUnavailable {
                        reason: err.to_string(),
                    }
                }
            };
            let envelope = SignalEnvelope {
                tenant_id: Some(tenant_id),
                device_id,
                signal,
                received_at_ms: now_epoch_ms(),
            };
            match handler.handle_signal(envelope).await {
                Ok(()) => delivered += 1,
                Err(err) => warn!(target: "sentinel.ingest", "signal handler failed: {}", err),
            }
        }
        delivered
    }
}

#[async_trait]
impl Source for ShadowPollSource {
    async fn run(&self, handler: Arc<dyn SignalHandler>) -> Result<(), IngestError> {
        info!(
            target: "sentinel.ingest",
            interval_secs = self.interval.as_secs(),
            "shadow_polling_started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.poll_once(handler.as_ref()).await;
        }
    }
}
