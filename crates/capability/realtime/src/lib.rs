//! 看板实时推送：连接注册表与推送/上行消息定义。

mod events;
mod registry;

pub use events::{ClientMessage, ServerEvent, parse_client_message};
pub use registry::{ConnectionId, ConnectionRegistry, OutboundMessage, new_connection_id};

/// 实时推送错误。
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid client message: {0}")]
    InvalidMessage(String),
    #[error("serialize error: {0}")]
    Serialize(String),
}
