//! 工具模块：响应构造与输入验证

pub mod response;
pub mod validation;

pub use validation::{normalize_optional, normalize_required, relay_config_from_dto};
