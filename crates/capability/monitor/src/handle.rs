use crate::activity::ActivityEntry;
use crate::event::MonitorEvent;
use crate::{CommandOutcome, DeviceChanges, MonitorError, ScenarioOutcome};
use async_trait::async_trait;
use domain::{DeviceProfile, DeviceSignal, DeviceState, SignalEnvelope};
use sentinel_control::{RelayCommand, ScenarioRequest, ShadowClient};
use sentinel_ingest::{DeviceDirectory, IngestError, SignalHandler, signal_from_shadow};
use sentinel_realtime::{ConnectionId, OutboundMessage, ServerEvent};
use sentinel_status::Clock;
use sentinel_telemetry::{record_command_rejected, record_shadow_failure};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// 状态引擎句柄：把调用转换为事件并等待循环回复。
#[derive(Clone)]
pub struct MonitorHandle {
    events: mpsc::Sender<MonitorEvent>,
    clock: Arc<dyn Clock>,
    shadow: Option<Arc<dyn ShadowClient>>,
    mqtt_connected: Arc<AtomicBool>,
}

impl MonitorHandle {
    pub(crate) fn new(
        events: mpsc::Sender<MonitorEvent>,
        clock: Arc<dyn Clock>,
        shadow: Option<Arc<dyn ShadowClient>>,
        mqtt_connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            events,
            clock,
            shadow,
            mqtt_connected,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MonitorEvent,
    ) -> Result<T, MonitorError> {
        let (respond_to, response) = oneshot::channel();
        self.events
            .send(build(respond_to))
            .await
            .map_err(|_| MonitorError::Stopped)?;
        response.await.map_err(|_| MonitorError::Stopped)
    }

    async fn post(&self, event: MonitorEvent) -> Result<(), MonitorError> {
        self.events
            .send(event)
            .await
            .map_err(|_| MonitorError::Stopped)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// broker 当前是否在线。
    pub fn mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::SeqCst)
    }

    // ---- 设备 ----

    /// 注册新设备并推送 `device_created`。
    pub async fn register_device(&self, profile: DeviceProfile) -> Result<DeviceState, MonitorError> {
        self.request(|respond_to| MonitorEvent::RegisterDevice {
            profile,
            announce: true,
            respond_to,
        })
        .await?
    }

    /// 启动时从存储加载设备（不推送）。
    pub async fn load_device(&self, profile: DeviceProfile) -> Result<DeviceState, MonitorError> {
        self.request(|respond_to| MonitorEvent::RegisterDevice {
            profile,
            announce: false,
            respond_to,
        })
        .await?
    }

    pub async fn update_device(
        &self,
        tenant_id: &str,
        device_id: &str,
        changes: DeviceChanges,
    ) -> Result<DeviceState, MonitorError> {
        self.request(|respond_to| MonitorEvent::UpdateDevice {
            tenant_id: tenant_id.to_string(),
            device_id: device_id.to_string(),
            changes,
            respond_to,
        })
        .await?
    }

    /// 注销设备：停止巡检、丢弃待确认意图并推送 `device_deleted`。
    pub async fn deregister_device(
        &self,
        tenant_id: &str,
        device_id: &str,
    ) -> Result<DeviceState, MonitorError> {
        self.request(|respond_to| MonitorEvent::DeregisterDevice {
            tenant_id: tenant_id.to_string(),
            device_id: device_id.to_string(),
            respond_to,
        })
        .await?
    }

    pub async fn list_devices(&self, tenant_id: &str) -> Result<Vec<DeviceState>, MonitorError> {
        self.request(|respond_to| MonitorEvent::ListDevices {
            tenant_id: tenant_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn get_device(
        &self,
        tenant_id: &str,
        device_id: &str,
    ) -> Result<DeviceState, MonitorError> {
        self.request(|respond_to| MonitorEvent::GetDevice {
            tenant_id: tenant_id.to_string(),
            device_id: device_id.to_string(),
            respond_to,
        })
        .await?
    }

    /// 全部租户的已注册设备 `(tenant_id, device_id)`。
    pub async fn all_devices(&self) -> Result<Vec<(String, String)>, MonitorError> {
        self.request(|respond_to| MonitorEvent::RegisteredDevices { respond_to })
            .await
    }

    // ---- 信号 ----

    /// 以当前时间记录一条信号并等待处理完成。
    pub async fn record_signal(
        &self,
        tenant_id: Option<&str>,
        device_id: &str,
        signal: DeviceSignal,
    ) -> Result<(), MonitorError> {
        let envelope = SignalEnvelope {
            tenant_id: tenant_id.map(str::to_string),
            device_id: device_id.to_string(),
            signal,
            received_at_ms: self.now_ms(),
        };
        self.request(|respond_to| MonitorEvent::Signal {
            envelope,
            respond_to: Some(respond_to),
        })
        .await?
    }

    /// 投递信号，不等待处理结果。
    pub async fn submit_signal(&self, envelope: SignalEnvelope) -> Result<(), MonitorError> {
        self.post(MonitorEvent::Signal {
            envelope,
            respond_to: None,
        })
        .await
    }

    /// 同步单台设备：有 Shadow 时读取 reported 走对账路径，然后重新推导状态。
    pub async fn sync_device(
        &self,
        tenant_id: &str,
        device_id: &str,
    ) -> Result<DeviceState, MonitorError> {
        self.get_device(tenant_id, device_id).await?;
        if let Some(shadow) = &self.shadow {
            let signal = match shadow.get_shadow(device_id).await {
                Ok(document) => signal_from_shadow(&document),
                Err(err) => {
                    record_shadow_failure();
                    Some(DeviceSignal::ShadowUnavailable {
                        reason: err.to_string(),
                    })
                }
            };
            if let Some(signal) = signal {
                self.record_signal(Some(tenant_id), device_id, signal).await?;
            }
        }
        self.request(|respond_to| MonitorEvent::RecheckDevice {
            tenant_id: tenant_id.to_string(),
            device_id: device_id.to_string(),
            source: "sync",
            respond_to,
        })
        .await?
    }

    /// 逐台同步租户的全部设备，返回刷新后的列表。
    pub async fn refresh_devices(&self, tenant_id: &str) -> Result<Vec<DeviceState>, MonitorError> {
        for device in self.list_devices(tenant_id).await? {
            match self.sync_device(tenant_id, &device.id).await {
                Ok(_) | Err(MonitorError::DeviceNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.list_devices(tenant_id).await
    }

    // ---- 命令 ----

    pub async fn send_command(
        &self,
        tenant_id: &str,
        device_id: &str,
        command: &str,
    ) -> Result<CommandOutcome, MonitorError> {
        let command = RelayCommand::parse(command).inspect_err(|_| record_command_rejected())?;
        self.request(|respond_to| MonitorEvent::SendCommand {
            tenant_id: tenant_id.to_string(),
            device_id: device_id.to_string(),
            command,
            respond_to,
        })
        .await?
    }

    /// 场景下发：任一设备缺失或 offline 时整批拒绝。
    pub async fn execute_scenario(
        &self,
        tenant_id: &str,
        device_ids: Vec<String>,
        request: ScenarioRequest,
    ) -> Result<ScenarioOutcome, MonitorError> {
        self.request(|respond_to| MonitorEvent::ExecuteScenario {
            tenant_id: tenant_id.to_string(),
            device_ids,
            request,
            respond_to,
        })
        .await?
    }

    // ---- 分组与活动 ----

    /// 使分组成员恰为 `device_ids`，返回 `group` 字段发生变化的设备。
    pub async fn assign_group(
        &self,
        tenant_id: &str,
        group_id: &str,
        device_ids: Vec<String>,
    ) -> Result<Vec<DeviceState>, MonitorError> {
        self.request(|respond_to| MonitorEvent::AssignGroup {
            tenant_id: tenant_id.to_string(),
            group_id: group_id.to_string(),
            device_ids,
            respond_to,
        })
        .await
    }

    /// 分组删除后清除成员设备的 `group`。
    pub async fn clear_group(
        &self,
        tenant_id: &str,
        group_id: &str,
    ) -> Result<Vec<DeviceState>, MonitorError> {
        self.assign_group(tenant_id, group_id, Vec::new()).await
    }

    pub async fn activity(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, MonitorError> {
        self.request(|respond_to| MonitorEvent::Activity {
            tenant_id: tenant_id.to_string(),
            limit,
            respond_to,
        })
        .await
    }

    /// 向租户推送任意事件（分组变更等）。
    pub async fn broadcast(&self, tenant_id: &str, event: ServerEvent) -> Result<(), MonitorError> {
        self.post(MonitorEvent::Broadcast {
            tenant_id: tenant_id.to_string(),
            event,
        })
        .await
    }

    // ---- 看板连接 ----

    pub async fn register_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<(), MonitorError> {
        self.post(MonitorEvent::RegisterConnection {
            connection_id,
            sender,
        })
        .await
    }

    /// 绑定租户，返回该租户全部设备快照（`device_status_update`，source 为 `snapshot`）。
    /// 连接未注册时返回 `None`。
    pub async fn bind_connection(
        &self,
        connection_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Vec<ServerEvent>>, MonitorError> {
        self.request(|respond_to| MonitorEvent::BindConnection {
            connection_id: connection_id.to_string(),
            tenant_id: tenant_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn unregister_connection(&self, connection_id: &str) -> Result<(), MonitorError> {
        self.post(MonitorEvent::UnregisterConnection {
            connection_id: connection_id.to_string(),
        })
        .await
    }

    pub async fn send_to_connection(
        &self,
        connection_id: &str,
        event: ServerEvent,
    ) -> Result<(), MonitorError> {
        self.post(MonitorEvent::SendToConnection {
            connection_id: connection_id.to_string(),
            event,
        })
        .await
    }

    /// 停止事件循环并取消全部定时器。
    pub async fn shutdown(&self) -> Result<(), MonitorError> {
        self.request(|respond_to| MonitorEvent::Shutdown { respond_to })
            .await
    }
}

#[async_trait]
impl SignalHandler for MonitorHandle {
    async fn handle_signal(&self, envelope: SignalEnvelope) -> Result<(), IngestError> {
        self.submit_signal(envelope)
            .await
            .map_err(|err| IngestError::Handler(err.to_string()))
    }

    async fn broker_status(&self, connected: bool) {
        if let Err(err) = self.post(MonitorEvent::BrokerStatus { connected }).await {
            warn!(target: "sentinel.monitor", error = %err, "broker_status_dropped");
        }
    }
}

#[async_trait]
impl DeviceDirectory for MonitorHandle {
    async fn registered_devices(&self) -> Vec<(String, String)> {
        match self.all_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                warn!(target: "sentinel.monitor", error = %err, "device_directory_unavailable");
                Vec::new()
            }
        }
    }
}
