//! 单设备继电器命令：`<feature>_on` / `<feature>_off` / `toggle_<feature>`。

use crate::ControlError;
use domain::{Feature, Relay, RelayConfig, RelayStates};

/// 命令动作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    On,
    Off,
    Toggle,
}

/// 解析后的命令（仍与具体设备无关）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCommand {
    pub feature: Feature,
    pub action: CommandAction,
}

impl RelayCommand {
    pub fn parse(name: &str) -> Result<Self, ControlError> {
        let normalized = name.trim().to_ascii_lowercase();
        let (feature, action) = if let Some(feature) = normalized.strip_prefix("toggle_") {
            (feature, CommandAction::Toggle)
        } else if let Some(feature) = normalized.strip_suffix("_on") {
            (feature, CommandAction::On)
        } else if let Some(feature) = normalized.strip_suffix("_off") {
            (feature, CommandAction::Off)
        } else {
            return Err(ControlError::UnknownCommand(name.to_string()));
        };
        let feature =
            Feature::parse(feature).ok_or_else(|| ControlError::UnknownCommand(name.to_string()))?;
        Ok(Self { feature, action })
    }

    pub fn name(&self) -> String {
        match self.action {
            CommandAction::On => format!("{}_on", self.feature),
            CommandAction::Off => format!("{}_off", self.feature),
            CommandAction::Toggle => format!("toggle_{}", self.feature),
        }
    }
}

/// 针对某台设备展开后的单个继电器变更。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedChange {
    pub relay: Relay,
    pub feature: Feature,
    /// 下发前的功能值。
    pub previous: bool,
    pub desired: bool,
}

/// 展开后的命令：变更项 + 完整四路下发报文。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    pub change: PlannedChange,
    pub payload: RelayStates,
}

/// 以当前继电器真值为基准，只改写目标功能所在的继电器。
pub fn plan_command(
    command: &RelayCommand,
    config: &RelayConfig,
    current: &RelayStates,
) -> Result<PlannedCommand, ControlError> {
    config.validate()?;
    let relay = config
        .relay_for(command.feature)
        .ok_or(ControlError::FeatureNotMapped(command.feature))?;
    let previous = current.get(relay);
    let desired = match command.action {
        CommandAction::On => true,
        CommandAction::Off => false,
        CommandAction::Toggle => !previous,
    };
    let mut payload = *current;
    payload.set(relay, desired);
    Ok(PlannedCommand {
        change: PlannedChange {
            relay,
            feature: command.feature,
            previous,
            desired,
        },
        payload,
    })
}
