//! 输入验证辅助函数
//!
//! - normalize_required：必填字段，去除首尾空格后必须非空
//! - normalize_optional：可选字段，如提供则同样要求非空
//! - relay_config_from_dto：继电器映射必须一一对应四个功能
//!
//! 失败统一返回 bad_request_error 响应。

use crate::utils::response::bad_request_error;
use api_contract::RelayConfigDto;
use axum::response::Response;
use domain::{Feature, RelayConfig};

/// 验证必填字段，去除空格并检查非空
pub fn normalize_required(value: String, field: &str) -> Result<String, Response> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request_error(format!("{field} required")));
    }
    Ok(trimmed.to_string())
}

/// 验证可选字段，如果提供则去除空格并检查非空
pub fn normalize_optional(value: Option<String>, field: &str) -> Result<Option<String>, Response> {
    match value {
        Some(value) => normalize_required(value, field).map(Some),
        None => Ok(None),
    }
}

fn parse_feature(value: &str, field: &str) -> Result<Feature, Response> {
    Feature::parse(value)
        .ok_or_else(|| bad_request_error(format!("relayConfig.{field}: unknown feature {value}")))
}

/// 解析并校验继电器映射
pub fn relay_config_from_dto(dto: &RelayConfigDto) -> Result<RelayConfig, Response> {
    let config = RelayConfig {
        relay1: parse_feature(&dto.relay1, "relay1")?,
        relay2: parse_feature(&dto.relay2, "relay2")?,
        relay3: parse_feature(&dto.relay3, "relay3")?,
        relay4: parse_feature(&dto.relay4, "relay4")?,
    };
    config
        .validate()
        .map_err(|err| bad_request_error(format!("relayConfig: {err}")))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(values: [&str; 4]) -> RelayConfigDto {
        RelayConfigDto {
            relay1: values[0].to_string(),
            relay2: values[1].to_string(),
            relay3: values[2].to_string(),
            relay4: values[3].to_string(),
        }
    }

    #[test]
    fn accepts_permutation() {
        let config = relay_config_from_dto(&dto(["beacon", "siren", "dispenser", "announcement"]))
            .expect("config");
        assert_eq!(config.relay1, Feature::Beacon);
        assert_eq!(config.relay4, Feature::Announcement);
    }

    #[test]
    fn rejects_duplicates_and_unknown_names() {
        assert!(relay_config_from_dto(&dto(["siren", "siren", "announcement", "dispenser"])).is_err());
        assert!(relay_config_from_dto(&dto(["siren", "strobe", "announcement", "dispenser"])).is_err());
    }

    #[test]
    fn blank_required_field_is_rejected() {
        assert!(normalize_required("  ".to_string(), "name").is_err());
        assert_eq!(
            normalize_optional(Some(" Gate ".to_string()), "location").expect("location"),
            Some("Gate".to_string())
        );
    }
}
