use crate::ControlError;
use crate::publisher::RelayPublisher;
use crate::shadow::ShadowClient;
use domain::RelayStates;
use sentinel_telemetry::{
    record_command_dispatch_failure, record_command_dispatch_success,
    record_command_issue_latency_ms, record_shadow_failure,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// 下发结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub channel: &'static str,
    /// Shadow desired 是否同步成功（失败不影响下发结果）。
    pub shadow_updated: bool,
}

/// 继电器下发器：发布报文，再尽力更新 Shadow desired。
#[derive(Clone)]
pub struct RelayDispatcher {
    publisher: Arc<dyn RelayPublisher>,
    shadow: Option<Arc<dyn ShadowClient>>,
}

impl RelayDispatcher {
    pub fn new(publisher: Arc<dyn RelayPublisher>, shadow: Option<Arc<dyn ShadowClient>>) -> Self {
        Self { publisher, shadow }
    }

    pub fn shadow(&self) -> Option<Arc<dyn ShadowClient>> {
        self.shadow.clone()
    }

    pub async fn dispatch(
        &self,
        tenant_id: &str,
        device_id: &str,
        relays: &RelayStates,
    ) -> Result<DispatchReceipt, ControlError> {
        let started_at = Instant::now();
        let channel = match self.publisher.publish(device_id, relays).await {
            Ok(channel) => channel,
            Err(err) => {
                record_command_dispatch_failure();
                warn!(
                    target: "sentinel.control",
                    tenant_id = %tenant_id,
                    device_id = %device_id,
                    channel = self.publisher.channel(),
                    error = %err,
                    "command_publish_failed"
                );
                return Err(err);
            }
        };
        record_command_dispatch_success();

        let shadow_updated = match &self.shadow {
            Some(shadow) => match shadow.update_desired(device_id, relays).await {
                Ok(()) => true,
                Err(err) => {
                    record_shadow_failure();
                    warn!(
                        target: "sentinel.control",
                        tenant_id = %tenant_id,
                        device_id = %device_id,
                        error = %err,
                        "shadow_desired_update_failed"
                    );
                    false
                }
            },
            None => false,
        };
        record_command_issue_latency_ms(started_at.elapsed().as_millis() as u64);
        info!(
            target: "sentinel.control",
            tenant_id = %tenant_id,
            device_id = %device_id,
            channel = channel,
            shadow_updated = shadow_updated,
            relay1 = relays.relay1,
            relay2 = relays.relay2,
            relay3 = relays.relay3,
            relay4 = relays.relay4,
            "command_dispatched"
        );
        Ok(DispatchReceipt {
            channel,
            shadow_updated,
        })
    }
}
