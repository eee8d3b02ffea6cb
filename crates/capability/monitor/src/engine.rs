use crate::activity::{ActivityEntry, ActivityKind};
use crate::event::{MonitorEvent, Reply, ScenarioDispatch};
use crate::handle::MonitorHandle;
use crate::registry::{DeviceEntry, PendingIntent, TenantRegistry};
use crate::task::TaskHandle;
use crate::{
    CommandOutcome, DeviceChanges, MonitorConfig, MonitorError, ScenarioDeviceResult,
    ScenarioOutcome,
};
use domain::{DeviceProfile, DeviceSignal, DeviceState, DeviceStatus, Feature, SignalEnvelope};
use sentinel_control::{
    ControlError, DispatchReceipt, PlannedChange, PlannedCommand, RelayCommand, RelayDispatcher,
    ScenarioRequest, plan_command, plan_scenario,
};
use sentinel_ingest::DeviceSubscriber;
use sentinel_realtime::{ConnectionRegistry, ServerEvent};
use sentinel_status::{Clock, StatusThresholds};
use sentinel_telemetry::{
    record_ack_confirmed, record_ack_timeout, record_broadcast_suppressed, record_command_issued,
    record_command_rejected, record_scenario_executed, record_status_transition,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 启动事件循环，返回句柄与循环任务。
///
/// 循环只持有队列的弱引用：全部 [`MonitorHandle`] 被丢弃或调用
/// [`MonitorHandle::shutdown`] 后循环退出，并取消所有巡检与 ACK 定时器。
pub fn spawn_monitor(
    config: MonitorConfig,
    dispatcher: RelayDispatcher,
    subscriber: Arc<dyn DeviceSubscriber>,
    clock: Arc<dyn Clock>,
) -> (MonitorHandle, JoinHandle<()>) {
    let (events, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let mqtt_connected = Arc::new(AtomicBool::new(false));
    let handle = MonitorHandle::new(
        events.clone(),
        clock.clone(),
        dispatcher.shadow(),
        mqtt_connected.clone(),
    );
    let engine = MonitorEngine {
        config,
        clock,
        dispatcher,
        subscriber,
        events: events.downgrade(),
        tenants: TenantRegistry::new(config.activity_capacity),
        connections: ConnectionRegistry::new(),
        mqtt_connected,
        next_intent_id: 0,
    };
    drop(events);
    let join = tokio::spawn(engine.run(receiver));
    (handle, join)
}

struct MonitorEngine {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    dispatcher: RelayDispatcher,
    subscriber: Arc<dyn DeviceSubscriber>,
    events: mpsc::WeakSender<MonitorEvent>,
    tenants: TenantRegistry,
    connections: ConnectionRegistry,
    mqtt_connected: Arc<AtomicBool>,
    next_intent_id: u64,
}

/// 单次信号处理的结果。
struct SignalEffect {
    snapshot: DeviceState,
    transition: Option<DeviceStatus>,
    broadcast: bool,
    confirmed: Vec<(Feature, bool)>,
}

impl MonitorEngine {
    async fn run(mut self, mut receiver: mpsc::Receiver<MonitorEvent>) {
        info!(target: "sentinel.monitor", "monitor_started");
        while let Some(event) = receiver.recv().await {
            if let MonitorEvent::Shutdown { respond_to } = event {
                self.shutdown();
                let _ = respond_to.send(());
                return;
            }
            self.handle_event(event);
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let devices = self.tenants.all_devices().len();
        self.tenants.clear();
        info!(target: "sentinel.monitor", devices = devices, "monitor_stopped");
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    fn thresholds(&self) -> StatusThresholds {
        StatusThresholds {
            offline_timeout: self.config.offline_timeout,
        }
    }

    fn handle_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Signal {
                envelope,
                respond_to,
            } => {
                let result = self.on_signal(envelope);
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(result);
                } else if let Err(err) = result {
                    debug!(target: "sentinel.monitor", error = %err, "signal_dropped");
                }
            }
            MonitorEvent::BrokerStatus { connected } => self.on_broker_status(connected),
            MonitorEvent::RegisterDevice {
                profile,
                announce,
                respond_to,
            } => {
                let _ = respond_to.send(self.on_register(profile, announce));
            }
            MonitorEvent::UpdateDevice {
                tenant_id,
                device_id,
                changes,
                respond_to,
            } => {
                let _ = respond_to.send(self.on_update(&tenant_id, &device_id, changes));
            }
            MonitorEvent::DeregisterDevice {
                tenant_id,
                device_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.on_deregister(&tenant_id, &device_id));
            }
            MonitorEvent::ListDevices {
                tenant_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.tenants.snapshots(&tenant_id));
            }
            MonitorEvent::GetDevice {
                tenant_id,
                device_id,
                respond_to,
            } => {
                let result = self
                    .tenants
                    .device(&tenant_id, &device_id)
                    .map(|entry| entry.state.clone())
                    .ok_or(MonitorError::DeviceNotFound(device_id));
                let _ = respond_to.send(result);
            }
            MonitorEvent::RecheckDevice {
                tenant_id,
                device_id,
                source,
                respond_to,
            } => {
                let result = self
                    .recheck(&tenant_id, &device_id, source)
                    .ok_or(MonitorError::DeviceNotFound(device_id));
                let _ = respond_to.send(result);
            }
            MonitorEvent::SendCommand {
                tenant_id,
                device_id,
                command,
                respond_to,
            } => self.on_send_command(tenant_id, device_id, command, respond_to),
            MonitorEvent::CommandDispatched {
                tenant_id,
                device_id,
                command,
                planned,
                result,
                respond_to,
            } => {
                let outcome =
                    self.on_command_dispatched(&tenant_id, &device_id, command, planned, result);
                let _ = respond_to.send(outcome);
            }
            MonitorEvent::ExecuteScenario {
                tenant_id,
                device_ids,
                request,
                respond_to,
            } => self.on_execute_scenario(tenant_id, device_ids, request, respond_to),
            MonitorEvent::ScenarioDispatched {
                tenant_id,
                label,
                targets,
                dispatched,
                respond_to,
            } => {
                let outcome = self.on_scenario_dispatched(&tenant_id, label, targets, dispatched);
                let _ = respond_to.send(Ok(outcome));
            }
            MonitorEvent::AckDeadline {
                tenant_id,
                device_id,
                feature,
                intent_id,
            } => self.on_ack_deadline(&tenant_id, &device_id, feature, intent_id),
            MonitorEvent::StatusTick {
                tenant_id,
                device_id,
            } => {
                self.recheck(&tenant_id, &device_id, "status_check");
            }
            MonitorEvent::AssignGroup {
                tenant_id,
                group_id,
                device_ids,
                respond_to,
            } => {
                let _ = respond_to.send(self.on_assign_group(&tenant_id, &group_id, &device_ids));
            }
            MonitorEvent::Broadcast { tenant_id, event } => {
                self.connections.broadcast_to_tenant(&tenant_id, &event);
            }
            MonitorEvent::Activity {
                tenant_id,
                limit,
                respond_to,
            } => {
                let _ = respond_to.send(self.tenants.recent_activity(&tenant_id, limit));
            }
            MonitorEvent::RegisteredDevices { respond_to } => {
                let _ = respond_to.send(self.tenants.all_devices());
            }
            MonitorEvent::RegisterConnection {
                connection_id,
                sender,
            } => {
                let now_ms = self.now_ms();
                self.connections.register(connection_id, sender, now_ms);
            }
            MonitorEvent::BindConnection {
                connection_id,
                tenant_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.on_bind_connection(&connection_id, &tenant_id));
            }
            MonitorEvent::UnregisterConnection { connection_id } => {
                self.connections.unregister(&connection_id);
            }
            MonitorEvent::SendToConnection {
                connection_id,
                event,
            } => {
                self.connections.send_to(&connection_id, &event);
            }
            MonitorEvent::Shutdown { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    // ---- 信号 ----

    fn on_signal(&mut self, envelope: SignalEnvelope) -> Result<(), MonitorError> {
        let SignalEnvelope {
            tenant_id,
            device_id,
            signal,
            received_at_ms,
        } = envelope;
        let tenants = match tenant_id {
            Some(tenant_id) => {
                if !self.tenants.contains(&tenant_id, &device_id) {
                    return Err(MonitorError::DeviceNotFound(device_id));
                }
                vec![tenant_id]
            }
            None => {
                let owners = self.tenants.owners_of(&device_id);
                if owners.is_empty() {
                    debug!(
                        target: "sentinel.monitor",
                        device_id = %device_id,
                        kind = signal.kind().as_str(),
                        "signal_for_unknown_device"
                    );
                    return Ok(());
                }
                if owners.len() > 1 {
                    warn!(
                        target: "sentinel.monitor",
                        device_id = %device_id,
                        tenants = owners.len(),
                        "device_id_collision"
                    );
                }
                owners
            }
        };
        for tenant_id in tenants {
            self.apply_signal(&tenant_id, &device_id, &signal, received_at_ms);
        }
        Ok(())
    }

    fn apply_signal(
        &mut self,
        tenant_id: &str,
        device_id: &str,
        signal: &DeviceSignal,
        ts_ms: i64,
    ) {
        let now_ms = self.now_ms();
        let thresholds = self.thresholds();
        let kind = signal.kind();
        let Some(entry) = self.tenants.device_mut(tenant_id, device_id) else {
            return;
        };
        let Some(effect) = record_into(entry, signal, ts_ms, now_ms, thresholds) else {
            debug!(
                target: "sentinel.monitor",
                tenant_id = %tenant_id,
                device_id = %device_id,
                kind = kind.as_str(),
                ts_ms = ts_ms,
                "signal_out_of_order"
            );
            return;
        };
        debug!(
            target: "sentinel.monitor",
            tenant_id = %tenant_id,
            device_id = %device_id,
            kind = kind.as_str(),
            status = effect.snapshot.status.as_str(),
            "signal_recorded"
        );

        if let DeviceSignal::Control(relays) = signal {
            info!(
                target: "sentinel.monitor",
                tenant_id = %tenant_id,
                device_id = %device_id,
                relay1 = relays.relay1,
                relay2 = relays.relay2,
                relay3 = relays.relay3,
                relay4 = relays.relay4,
                "control_echo_observed"
            );
            self.tenants.record_activity(
                tenant_id,
                ActivityEntry::new(
                    ActivityKind::ControlObserved,
                    Some(device_id),
                    format!(
                        "control echo relay1={} relay2={} relay3={} relay4={}",
                        relays.relay1, relays.relay2, relays.relay3, relays.relay4
                    ),
                    ts_ms,
                ),
            );
            return;
        }
        if let DeviceSignal::ShadowUnavailable { reason } = signal {
            warn!(
                target: "sentinel.monitor",
                tenant_id = %tenant_id,
                device_id = %device_id,
                reason = %reason,
                "shadow_unavailable"
            );
        }

        for (feature, desired) in &effect.confirmed {
            record_ack_confirmed();
            info!(
                target: "sentinel.monitor",
                tenant_id = %tenant_id,
                device_id = %device_id,
                feature = feature.as_str(),
                desired = *desired,
                "ack_confirmed"
            );
            self.tenants.record_activity(
                tenant_id,
                ActivityEntry::new(
                    ActivityKind::AckConfirmed,
                    Some(device_id),
                    format!("{} confirmed {}", feature, if *desired { "on" } else { "off" }),
                    now_ms,
                ),
            );
        }
        if let Some(from) = effect.transition {
            self.note_transition(tenant_id, &effect.snapshot, from, kind.as_str());
        }
        if effect.broadcast {
            self.broadcast_device(tenant_id, effect.snapshot, kind.as_str());
        } else {
            record_broadcast_suppressed();
            if matches!(signal, DeviceSignal::RelayStatus) {
                debug!(
                    target: "sentinel.monitor",
                    tenant_id = %tenant_id,
                    device_id = %device_id,
                    "relay_status_suppressed"
                );
            } else {
                debug!(
                    target: "sentinel.monitor",
                    tenant_id = %tenant_id,
                    device_id = %device_id,
                    kind = kind.as_str(),
                    "broadcast_suppressed"
                );
            }
        }
    }

    fn on_broker_status(&mut self, connected: bool) {
        let previous = self.mqtt_connected.swap(connected, Ordering::SeqCst);
        if previous == connected {
            return;
        }
        info!(target: "sentinel.monitor", connected = connected, "broker_status_changed");
        let event = ServerEvent::ConnectionStatus {
            connected: None,
            mqtt_connected: Some(connected),
            timestamp: self.now_ms(),
        };
        self.connections.broadcast_to_all(&event);
    }

    /// 重新推导单台设备状态，迁移时推送。
    fn recheck(&mut self, tenant_id: &str, device_id: &str, source: &str) -> Option<DeviceState> {
        let now_ms = self.now_ms();
        let thresholds = self.thresholds();
        let entry = self.tenants.device_mut(tenant_id, device_id)?;
        let transition = entry.recompute_status(now_ms, thresholds);
        let snapshot = entry.state.clone();
        if let Some((from, _)) = transition {
            self.note_transition(tenant_id, &snapshot, from, source);
            self.broadcast_device(tenant_id, snapshot.clone(), source);
        }
        Some(snapshot)
    }

    /// 与云服务交互失败：清除云连接标志并重新推导。
    fn mark_unreachable(&mut self, tenant_id: &str, device_id: &str, source: &str) {
        if let Some(entry) = self.tenants.device_mut(tenant_id, device_id) {
            entry.signals.mark_disconnected();
        }
        self.recheck(tenant_id, device_id, source);
    }

    fn note_transition(
        &mut self,
        tenant_id: &str,
        snapshot: &DeviceState,
        from: DeviceStatus,
        source: &str,
    ) {
        record_status_transition();
        info!(
            target: "sentinel.monitor",
            tenant_id = %tenant_id,
            device_id = %snapshot.id,
            from = from.as_str(),
            to = snapshot.status.as_str(),
            source = source,
            "status_changed"
        );
        self.tenants.record_activity(
            tenant_id,
            ActivityEntry::new(
                ActivityKind::StatusChanged,
                Some(&snapshot.id),
                format!("{} -> {} ({})", from, snapshot.status, source),
                snapshot.last_status_change,
            ),
        );
    }

    fn broadcast_device(&mut self, tenant_id: &str, snapshot: DeviceState, source: &str) {
        let event = ServerEvent::DeviceStatusUpdate {
            device_id: snapshot.id.clone(),
            device: snapshot,
            tenant_id: tenant_id.to_string(),
            timestamp: self.now_ms(),
            source: source.to_string(),
        };
        self.connections.broadcast_to_tenant(tenant_id, &event);
    }

    // ---- 设备生命周期 ----

    fn on_register(
        &mut self,
        profile: DeviceProfile,
        announce: bool,
    ) -> Result<DeviceState, MonitorError> {
        profile
            .relay_config
            .validate()
            .map_err(ControlError::from)?;
        if self.tenants.contains(&profile.tenant_id, &profile.id) {
            return Err(MonitorError::DeviceExists(profile.id));
        }
        let now_ms = self.now_ms();
        let tenant_id = profile.tenant_id.clone();
        let device_id = profile.id.clone();
        let first_owner = self.tenants.owners_of(&device_id).is_empty();

        let mut entry = DeviceEntry::new(DeviceState::new(profile, now_ms));
        entry.monitor = Some(self.spawn_status_monitor(&tenant_id, &device_id));
        let snapshot = entry.state.clone();
        self.tenants.insert_device(entry);

        if first_owner {
            self.spawn_subscription(device_id.clone(), true);
        }
        self.tenants.record_activity(
            &tenant_id,
            ActivityEntry::new(
                ActivityKind::DeviceRegistered,
                Some(&device_id),
                format!("{} registered", snapshot.name),
                now_ms,
            ),
        );
        if announce {
            let event = ServerEvent::DeviceCreated {
                device_id: device_id.clone(),
                device: snapshot.clone(),
                tenant_id: tenant_id.clone(),
                timestamp: now_ms,
            };
            self.connections.broadcast_to_tenant(&tenant_id, &event);
        }
        info!(
            target: "sentinel.monitor",
            tenant_id = %tenant_id,
            device_id = %device_id,
            announce = announce,
            "device_registered"
        );
        Ok(snapshot)
    }

    fn on_update(
        &mut self,
        tenant_id: &str,
        device_id: &str,
        changes: DeviceChanges,
    ) -> Result<DeviceState, MonitorError> {
        if let Some(config) = &changes.relay_config {
            config.validate().map_err(ControlError::from)?;
        }
        let now_ms = self.now_ms();
        let thresholds = self.thresholds();
        let entry = self
            .tenants
            .device_mut(tenant_id, device_id)
            .ok_or_else(|| MonitorError::DeviceNotFound(device_id.to_string()))?;
        let state = &mut entry.state;
        if let Some(name) = changes.name {
            state.name = name;
        }
        if let Some(location) = changes.location {
            state.location = location;
        }
        if let Some(lat) = changes.lat {
            state.lat = lat;
        }
        if let Some(lng) = changes.lng {
            state.lng = lng;
        }
        if let Some(config) = changes.relay_config {
            state.set_relay_config(config, now_ms);
        }
        state.last_update_time = now_ms;
        let transition = entry.recompute_status(now_ms, thresholds);
        let snapshot = entry.state.clone();

        self.tenants.record_activity(
            tenant_id,
            ActivityEntry::new(
                ActivityKind::DeviceUpdated,
                Some(device_id),
                format!("{} updated", snapshot.name),
                now_ms,
            ),
        );
        if let Some((from, _)) = transition {
            self.note_transition(tenant_id, &snapshot, from, "update");
        }
        self.broadcast_device(tenant_id, snapshot.clone(), "update");
        Ok(snapshot)
    }

    fn on_deregister(
        &mut self,
        tenant_id: &str,
        device_id: &str,
    ) -> Result<DeviceState, MonitorError> {
        let entry = self
            .tenants
            .remove_device(tenant_id, device_id)
            .ok_or_else(|| MonitorError::DeviceNotFound(device_id.to_string()))?;
        let now_ms = self.now_ms();
        if self.tenants.owners_of(device_id).is_empty() {
            self.spawn_subscription(device_id.to_string(), false);
        }
        self.tenants.record_activity(
            tenant_id,
            ActivityEntry::new(
                ActivityKind::DeviceRemoved,
                Some(device_id),
                format!("{} removed", entry.state.name),
                now_ms,
            ),
        );
        let event = ServerEvent::DeviceDeleted {
            device_id: device_id.to_string(),
            tenant_id: tenant_id.to_string(),
            timestamp: now_ms,
        };
        self.connections.broadcast_to_tenant(tenant_id, &event);
        info!(
            target: "sentinel.monitor",
            tenant_id = %tenant_id,
            device_id = %device_id,
            "device_deregistered"
        );
        Ok(entry.state)
    }

    fn on_assign_group(
        &mut self,
        tenant_id: &str,
        group_id: &str,
        device_ids: &[String],
    ) -> Vec<DeviceState> {
        let now_ms = self.now_ms();
        let mut changed = Vec::new();
        if let Some(tenant) = self.tenants.tenant_mut(tenant_id) {
            for (device_id, entry) in tenant.devices.iter_mut() {
                let member = device_ids.iter().any(|id| id == device_id);
                let current = entry.state.group.as_deref() == Some(group_id);
                let next = match (member, current) {
                    (true, false) => Some(Some(group_id.to_string())),
                    (false, true) => Some(None),
                    _ => None,
                };
                if let Some(group) = next {
                    entry.state.group = group;
                    entry.state.last_update_time = now_ms;
                    changed.push(entry.state.clone());
                }
            }
        }
        changed.sort_by(|a, b| a.id.cmp(&b.id));
        for snapshot in &changed {
            self.broadcast_device(tenant_id, snapshot.clone(), "group");
        }
        changed
    }

    /// 绑定租户并返回该租户全部设备快照，由连接任务直接写出。
    /// 快照不经过有界推送通道，设备数超过通道容量也不会被判定为慢连接。
    fn on_bind_connection(
        &mut self,
        connection_id: &str,
        tenant_id: &str,
    ) -> Option<Vec<ServerEvent>> {
        if !self.connections.bind(connection_id, tenant_id) {
            return None;
        }
        let now_ms = self.now_ms();
        let snapshot = self
            .tenants
            .snapshots(tenant_id)
            .into_iter()
            .map(|device| ServerEvent::DeviceStatusUpdate {
                device_id: device.id.clone(),
                device,
                tenant_id: tenant_id.to_string(),
                timestamp: now_ms,
                source: "snapshot".to_string(),
            })
            .collect();
        Some(snapshot)
    }

    // ---- 命令 ----

    fn on_send_command(
        &mut self,
        tenant_id: String,
        device_id: String,
        command: RelayCommand,
        respond_to: Reply<CommandOutcome>,
    ) {
        let planned = match self.plan_single(&tenant_id, &device_id, &command) {
            Ok(planned) => planned,
            Err(err) => {
                reject(&tenant_id, &device_id, respond_to, err);
                return;
            }
        };
        let Some(events) = self.events.upgrade() else {
            let _ = respond_to.send(Err(MonitorError::Stopped));
            return;
        };
        record_command_issued();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let result = dispatcher
                .dispatch(&tenant_id, &device_id, &planned.payload)
                .await;
            let _ = events
                .send(MonitorEvent::CommandDispatched {
                    tenant_id,
                    device_id,
                    command: command.name(),
                    planned,
                    result,
                    respond_to,
                })
                .await;
        });
    }

    fn plan_single(
        &self,
        tenant_id: &str,
        device_id: &str,
        command: &RelayCommand,
    ) -> Result<PlannedCommand, MonitorError> {
        let entry = self
            .tenants
            .device(tenant_id, device_id)
            .ok_or_else(|| MonitorError::DeviceNotFound(device_id.to_string()))?;
        if entry.state.status.is_offline() {
            return Err(MonitorError::DeviceOffline {
                device_id: device_id.to_string(),
                status: entry.state.status,
            });
        }
        Ok(plan_command(
            command,
            &entry.state.relay_config,
            &entry.state.relay_states,
        )?)
    }

    fn on_command_dispatched(
        &mut self,
        tenant_id: &str,
        device_id: &str,
        command: String,
        planned: PlannedCommand,
        result: Result<DispatchReceipt, ControlError>,
    ) -> Result<CommandOutcome, MonitorError> {
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => {
                self.mark_unreachable(tenant_id, device_id, "command_failure");
                return Err(MonitorError::Dispatch(err.to_string()));
            }
        };
        let now_ms = self.now_ms();
        self.arm_intent(tenant_id, device_id, planned.change);
        let event = ServerEvent::CommandSent {
            device_id: device_id.to_string(),
            tenant_id: tenant_id.to_string(),
            command: command.clone(),
            relays: planned.payload,
            timestamp: now_ms,
        };
        self.connections.broadcast_to_tenant(tenant_id, &event);
        self.tenants.record_activity(
            tenant_id,
            ActivityEntry::new(
                ActivityKind::CommandSent,
                Some(device_id),
                format!("{} sent via {}", command, receipt.channel),
                now_ms,
            ),
        );
        info!(
            target: "sentinel.monitor",
            tenant_id = %tenant_id,
            device_id = %device_id,
            command = %command,
            channel = receipt.channel,
            "command_sent"
        );
        Ok(CommandOutcome {
            device_id: device_id.to_string(),
            command,
            change: planned.change,
            payload: planned.payload,
            channel: receipt.channel,
            timestamp: now_ms,
        })
    }

    fn on_execute_scenario(
        &mut self,
        tenant_id: String,
        device_ids: Vec<String>,
        request: ScenarioRequest,
        respond_to: Reply<ScenarioOutcome>,
    ) {
        let mut unique: Vec<String> = Vec::with_capacity(device_ids.len());
        for device_id in device_ids {
            if !unique.contains(&device_id) {
                unique.push(device_id);
            }
        }
        if unique.is_empty() {
            let _ = respond_to.send(Err(MonitorError::InvalidRequest(
                "deviceIds must not be empty".to_string(),
            )));
            return;
        }
        let targets = request.targets();
        let label = request.label();

        let mut missing = Vec::new();
        let mut offline = Vec::new();
        let mut plans = Vec::with_capacity(unique.len());
        for device_id in &unique {
            let Some(entry) = self.tenants.device(&tenant_id, device_id) else {
                missing.push(device_id.clone());
                continue;
            };
            if entry.state.status.is_offline() {
                offline.push(device_id.clone());
                continue;
            }
            match plan_scenario(
                &targets,
                &entry.state.relay_config,
                &entry.state.relay_states,
            ) {
                Ok(plan) => plans.push((device_id.clone(), plan)),
                Err(err) => {
                    record_command_rejected();
                    let _ = respond_to.send(Err(err.into()));
                    return;
                }
            }
        }
        if !missing.is_empty() || !offline.is_empty() {
            record_command_rejected();
            warn!(
                target: "sentinel.monitor",
                tenant_id = %tenant_id,
                scenario = %label,
                offline = ?offline,
                missing = ?missing,
                "scenario_rejected"
            );
            let _ = respond_to.send(Err(MonitorError::ScenarioRejected { offline, missing }));
            return;
        }
        let Some(events) = self.events.upgrade() else {
            let _ = respond_to.send(Err(MonitorError::Stopped));
            return;
        };
        record_scenario_executed();
        for _ in &plans {
            record_command_issued();
        }
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let mut dispatched = Vec::with_capacity(plans.len());
            for (device_id, plan) in plans {
                let result = dispatcher
                    .dispatch(&tenant_id, &device_id, &plan.payload)
                    .await;
                dispatched.push(ScenarioDispatch {
                    device_id,
                    plan,
                    result,
                });
            }
            let _ = events
                .send(MonitorEvent::ScenarioDispatched {
                    tenant_id,
                    label,
                    targets,
                    dispatched,
                    respond_to,
                })
                .await;
        });
    }

    fn on_scenario_dispatched(
        &mut self,
        tenant_id: &str,
        label: String,
        targets: Vec<(Feature, bool)>,
        dispatched: Vec<ScenarioDispatch>,
    ) -> ScenarioOutcome {
        let now_ms = self.now_ms();
        let features: BTreeMap<Feature, bool> = targets.into_iter().collect();
        let command = format!("scenario:{}", label);
        let mut device_ids = Vec::with_capacity(dispatched.len());
        let mut results = Vec::with_capacity(dispatched.len());
        for ScenarioDispatch {
            device_id,
            plan,
            result,
        } in dispatched
        {
            device_ids.push(device_id.clone());
            match result {
                Ok(_) => {
                    for change in &plan.changes {
                        self.arm_intent(tenant_id, &device_id, *change);
                    }
                    let event = ServerEvent::CommandSent {
                        device_id: device_id.clone(),
                        tenant_id: tenant_id.to_string(),
                        command: command.clone(),
                        relays: plan.payload,
                        timestamp: now_ms,
                    };
                    self.connections.broadcast_to_tenant(tenant_id, &event);
                    results.push(ScenarioDeviceResult {
                        device_id,
                        result: Ok(plan.payload),
                    });
                }
                Err(err) => {
                    self.mark_unreachable(tenant_id, &device_id, "command_failure");
                    results.push(ScenarioDeviceResult {
                        device_id,
                        result: Err(err.to_string()),
                    });
                }
            }
        }
        let failed = results.iter().filter(|item| item.result.is_err()).count();
        let event = ServerEvent::ScenarioExecuted {
            tenant_id: tenant_id.to_string(),
            scenario: label.clone(),
            device_ids: device_ids.clone(),
            features: features.clone(),
            timestamp: now_ms,
        };
        self.connections.broadcast_to_tenant(tenant_id, &event);
        self.tenants.record_activity(
            tenant_id,
            ActivityEntry::new(
                ActivityKind::ScenarioExecuted,
                None,
                format!(
                    "{} executed on {} device(s), {} failed",
                    label,
                    device_ids.len(),
                    failed
                ),
                now_ms,
            ),
        );
        info!(
            target: "sentinel.monitor",
            tenant_id = %tenant_id,
            scenario = %label,
            devices = device_ids.len(),
            failed = failed,
            "scenario_executed"
        );
        ScenarioOutcome {
            scenario: label,
            features,
            results,
            timestamp: now_ms,
        }
    }

    // ---- 定时器 ----

    fn spawn_status_monitor(&self, tenant_id: &str, device_id: &str) -> TaskHandle {
        let events = self.events.clone();
        let period = self.config.status_check_interval;
        let tenant_id = tenant_id.to_string();
        let device_id = device_id.to_string();
        TaskHandle::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(events) = events.upgrade() else {
                    break;
                };
                let tick = MonitorEvent::StatusTick {
                    tenant_id: tenant_id.clone(),
                    device_id: device_id.clone(),
                };
                if events.send(tick).await.is_err() {
                    break;
                }
            }
        })
    }

    /// 为一个功能挂起意图并启动 ACK 超时；同一功能的旧意图被替换。
    fn arm_intent(&mut self, tenant_id: &str, device_id: &str, change: PlannedChange) {
        if !self.tenants.contains(tenant_id, device_id) {
            return;
        }
        self.next_intent_id += 1;
        let intent_id = self.next_intent_id;
        let events = self.events.clone();
        let timeout = self.config.ack_timeout;
        let deadline = MonitorEvent::AckDeadline {
            tenant_id: tenant_id.to_string(),
            device_id: device_id.to_string(),
            feature: change.feature,
            intent_id,
        };
        let timer = TaskHandle::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(deadline).await;
            }
        });
        let intent = PendingIntent {
            id: intent_id,
            previous: change.previous,
            desired: change.desired,
            timer,
        };
        if let Some(entry) = self.tenants.device_mut(tenant_id, device_id) {
            if let Some(replaced) = entry.intents.insert(change.feature, intent) {
                replaced.timer.cancel();
            }
        }
    }

    fn on_ack_deadline(&mut self, tenant_id: &str, device_id: &str, feature: Feature, intent_id: u64) {
        let Some(entry) = self.tenants.device_mut(tenant_id, device_id) else {
            return;
        };
        if entry.intents.get(&feature).map(|intent| intent.id) != Some(intent_id) {
            return;
        }
        let Some(intent) = entry.intents.remove(&feature) else {
            return;
        };
        if entry.state.features.get(feature) != intent.previous {
            return;
        }
        let now_ms = self.now_ms();
        let seconds = self.config.ack_timeout.as_secs();
        let message = format!(
            "No acknowledgment from {} for {} within {}s; the device may not have applied the command",
            device_id, feature, seconds
        );
        record_ack_timeout();
        warn!(
            target: "sentinel.monitor",
            tenant_id = %tenant_id,
            device_id = %device_id,
            feature = feature.as_str(),
            desired = intent.desired,
            timeout_seconds = seconds,
            "ack_timeout"
        );
        self.tenants.record_activity(
            tenant_id,
            ActivityEntry::new(ActivityKind::AckTimeout, Some(device_id), message.clone(), now_ms),
        );
        let event = ServerEvent::AckTimeout {
            device_id: device_id.to_string(),
            tenant_id: tenant_id.to_string(),
            feature,
            message,
            timestamp: now_ms,
        };
        self.connections.broadcast_to_tenant(tenant_id, &event);
    }

    /// 设备主题订阅变化放到循环外执行。
    fn spawn_subscription(&self, device_id: String, subscribe: bool) {
        let subscriber = self.subscriber.clone();
        tokio::spawn(async move {
            let result = if subscribe {
                subscriber.subscribe_device(&device_id).await
            } else {
                subscriber.unsubscribe_device(&device_id).await
            };
            if let Err(err) = result {
                warn!(
                    target: "sentinel.monitor",
                    device_id = %device_id,
                    subscribe = subscribe,
                    error = %err,
                    "device_subscription_failed"
                );
            }
        });
    }
}

/// 把一条信号写入设备条目；时间戳早于已记录值时返回 `None`。
fn record_into(
    entry: &mut DeviceEntry,
    signal: &DeviceSignal,
    ts_ms: i64,
    now_ms: i64,
    thresholds: StatusThresholds,
) -> Option<SignalEffect> {
    let mut broadcast = true;
    let mut reconciled = false;
    match signal {
        DeviceSignal::Connection { .. } => {
            let connected = signal.reports_connected();
            let was_connected = entry.signals.connected_to_aws;
            if !entry.signals.record_connection(ts_ms, connected) {
                return None;
            }
            if connected {
                entry.state.last_seen = Some(ts_ms);
            }
            broadcast = was_connected != connected;
        }
        DeviceSignal::RelayStatus => {
            if !entry.signals.record_relay_status(ts_ms) {
                return None;
            }
            entry.state.last_seen = Some(ts_ms);
            broadcast = false;
        }
        DeviceSignal::RelayAck(ack) => {
            if !entry.signals.record_relay_ack(ts_ms) {
                return None;
            }
            entry.state.last_seen = Some(ts_ms);
            entry.state.apply_relays(ack.relays, now_ms);
            if ack.signal_strength.is_some() {
                entry.state.signal_strength = ack.signal_strength;
            }
            if ack.battery_level.is_some() {
                entry.state.battery_level = ack.battery_level;
            }
            reconciled = true;
        }
        DeviceSignal::ShadowReported(relays) => {
            entry.state.apply_relays(*relays, now_ms);
            reconciled = true;
        }
        DeviceSignal::ShadowUnavailable { .. } => {
            entry.signals.mark_disconnected();
            broadcast = false;
        }
        DeviceSignal::Control(_) => {
            return Some(SignalEffect {
                snapshot: entry.state.clone(),
                transition: None,
                broadcast: false,
                confirmed: Vec::new(),
            });
        }
    }
    let transition = entry.recompute_status(now_ms, thresholds);
    let confirmed = if reconciled {
        entry
            .take_resolved_intents()
            .into_iter()
            .map(|(feature, intent)| (feature, intent.desired))
            .collect()
    } else {
        Vec::new()
    };
    Some(SignalEffect {
        snapshot: entry.state.clone(),
        transition: transition.map(|(from, _)| from),
        broadcast: broadcast || transition.is_some(),
        confirmed,
    })
}

fn reject<T>(tenant_id: &str, device_id: &str, respond_to: Reply<T>, err: MonitorError) {
    record_command_rejected();
    warn!(
        target: "sentinel.monitor",
        tenant_id = %tenant_id,
        device_id = %device_id,
        error = %err,
        "command_rejected"
    );
    let _ = respond_to.send(Err(err));
}
