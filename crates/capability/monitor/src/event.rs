use crate::activity::ActivityEntry;
use crate::{CommandOutcome, DeviceChanges, MonitorError, ScenarioOutcome};
use domain::{DeviceProfile, DeviceState, Feature, SignalEnvelope};
use sentinel_control::{
    ControlError, DispatchReceipt, PlannedCommand, RelayCommand, ScenarioPlan, ScenarioRequest,
};
use sentinel_realtime::{ConnectionId, OutboundMessage, ServerEvent};
use tokio::sync::{mpsc, oneshot};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, MonitorError>>;

/// 单台设备的场景下发结果（循环外任务送回）。
pub(crate) struct ScenarioDispatch {
    pub device_id: String,
    pub plan: ScenarioPlan,
    pub result: Result<DispatchReceipt, ControlError>,
}

/// 事件循环的全部输入。
pub(crate) enum MonitorEvent {
    Signal {
        envelope: SignalEnvelope,
        respond_to: Option<Reply<()>>,
    },
    BrokerStatus {
        connected: bool,
    },
    RegisterDevice {
        profile: DeviceProfile,
        announce: bool,
        respond_to: Reply<DeviceState>,
    },
    UpdateDevice {
        tenant_id: String,
        device_id: String,
        changes: DeviceChanges,
        respond_to: Reply<DeviceState>,
    },
    DeregisterDevice {
        tenant_id: String,
        device_id: String,
        respond_to: Reply<DeviceState>,
    },
    ListDevices {
        tenant_id: String,
        respond_to: oneshot::Sender<Vec<DeviceState>>,
    },
    GetDevice {
        tenant_id: String,
        device_id: String,
        respond_to: Reply<DeviceState>,
    },
    RecheckDevice {
        tenant_id: String,
        device_id: String,
        source: &'static str,
        respond_to: Reply<DeviceState>,
    },
    SendCommand {
        tenant_id: String,
        device_id: String,
        command: RelayCommand,
        respond_to: Reply<CommandOutcome>,
    },
    CommandDispatched {
        tenant_id: String,
        device_id: String,
        command: String,
        planned: PlannedCommand,
        result: Result<DispatchReceipt, ControlError>,
        respond_to: Reply<CommandOutcome>,
    },
    ExecuteScenario {
        tenant_id: String,
        device_ids: Vec<String>,
        request: ScenarioRequest,
        respond_to: Reply<ScenarioOutcome>,
    },
    ScenarioDispatched {
        tenant_id: String,
        label: String,
        targets: Vec<(Feature, bool)>,
        dispatched: Vec<ScenarioDispatch>,
        respond_to: Reply<ScenarioOutcome>,
    },
    AckDeadline {
        tenant_id: String,
        device_id: String,
        feature: Feature,
        intent_id: u64,
    },
    StatusTick {
        tenant_id: String,
        device_id: String,
    },
    AssignGroup {
        tenant_id: String,
        group_id: String,
        device_ids: Vec<String>,
        respond_to: oneshot::Sender<Vec<DeviceState>>,
    },
    Broadcast {
        tenant_id: String,
        event: ServerEvent,
    },
    Activity {
        tenant_id: String,
        limit: usize,
        respond_to: oneshot::Sender<Vec<ActivityEntry>>,
    },
    RegisteredDevices {
        respond_to: oneshot::Sender<Vec<(String, String)>>,
    },
    RegisterConnection {
        connection_id: ConnectionId,
        sender: mpsc::Sender<OutboundMessage>,
    },
    BindConnection {
        connection_id: ConnectionId,
        tenant_id: String,
        respond_to: oneshot::Sender<Option<Vec<ServerEvent>>>,
    },
    UnregisterConnection {
        connection_id: ConnectionId,
    },
    SendToConnection {
        connection_id: ConnectionId,
        event: ServerEvent,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}
