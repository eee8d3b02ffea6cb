//! 继电器控制能力。
//!
//! - [`RelayCommand`] / [`plan_command`]：单设备命令解析与部分更新报文
//! - [`ScenarioRequest`] / [`plan_scenario`]：多设备场景
//! - [`RelayPublisher`]：MQTT 主通道 + HTTP 数据面备用通道
//! - [`ShadowClient`]：Shadow 读取（轮询、同步）与 desired 写入
//! - [`RelayDispatcher`]：发布 + Shadow 更新的组合

mod command;
mod dispatch;
mod error;
mod publisher;
mod scenario;
mod shadow;

pub use command::{CommandAction, PlannedChange, PlannedCommand, RelayCommand, plan_command};
pub use dispatch::{DispatchReceipt, RelayDispatcher};
pub use error::ControlError;
pub use publisher::{
    FallbackPublisher, HttpDataPlanePublisher, InMemoryPublisher, MqttPublisher,
    MqttPublisherConfig, NoopPublisher, RelayPublisher, control_topic, qos_from_u8,
};
pub use scenario::{NamedScenario, ScenarioPlan, ScenarioRequest, plan_scenario};
pub use shadow::{HttpShadowClient, InMemoryShadowClient, ShadowClient, ShadowDocument, ShadowState};
