use domain::{Feature, RelayConfigError};

/// 控制链路错误。
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("feature {0} is not mapped to any relay")]
    FeatureNotMapped(Feature),
    #[error("invalid relay config: {0}")]
    RelayConfig(#[from] RelayConfigError),
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
    #[error("unknown feature: {0}")]
    UnknownFeature(String),
    #[error("scenario targets no feature")]
    EmptyScenario,
    #[error("publish error: {0}")]
    Publish(String),
    #[error("shadow error: {0}")]
    Shadow(String),
    #[error("payload error: {0}")]
    Payload(String),
}
