//! 多设备场景：命名场景或显式的部分功能表。

use crate::ControlError;
use crate::command::PlannedChange;
use domain::{Feature, RelayConfig, RelayStates};
use std::collections::BTreeMap;

/// 预置场景。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedScenario {
    All,
    War,
    Fire,
    Natural,
}

impl NamedScenario {
    pub fn parse(value: &str) -> Result<Self, ControlError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(NamedScenario::All),
            "WAR" => Ok(NamedScenario::War),
            "FIRE" => Ok(NamedScenario::Fire),
            "NATURAL" => Ok(NamedScenario::Natural),
            _ => Err(ControlError::UnknownScenario(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NamedScenario::All => "ALL",
            NamedScenario::War => "WAR",
            NamedScenario::Fire => "FIRE",
            NamedScenario::Natural => "NATURAL",
        }
    }

    /// 命名场景覆盖全部四个功能（未列入的功能关闭）。
    pub fn targets(&self) -> Vec<(Feature, bool)> {
        let active: &[Feature] = match self {
            NamedScenario::All => &Feature::ALL,
            NamedScenario::War => &[Feature::Siren, Feature::Announcement, Feature::Dispenser],
            NamedScenario::Fire | NamedScenario::Natural => {
                &[Feature::Siren, Feature::Beacon, Feature::Announcement]
            }
        };
        Feature::ALL
            .into_iter()
            .map(|feature| (feature, active.contains(&feature)))
            .collect()
    }
}

/// 场景请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioRequest {
    Named(NamedScenario),
    /// 显式功能表：只有出现的键参与下发。
    Features(Vec<(Feature, bool)>),
}

impl ScenarioRequest {
    /// 由 HTTP 请求体构造（`features` 优先于 `scenario`）。
    pub fn from_parts(
        scenario: Option<&str>,
        features: Option<&BTreeMap<String, bool>>,
    ) -> Result<Self, ControlError> {
        if let Some(features) = features {
            let mut targets = Vec::with_capacity(features.len());
            for (key, value) in features {
                let feature = Feature::parse(key)
                    .ok_or_else(|| ControlError::UnknownFeature(key.clone()))?;
                targets.push((feature, *value));
            }
            if targets.is_empty() {
                return Err(ControlError::EmptyScenario);
            }
            return Ok(ScenarioRequest::Features(targets));
        }
        match scenario {
            Some(name) => Ok(ScenarioRequest::Named(NamedScenario::parse(name)?)),
            None => Err(ControlError::EmptyScenario),
        }
    }

    pub fn targets(&self) -> Vec<(Feature, bool)> {
        match self {
            ScenarioRequest::Named(named) => named.targets(),
            ScenarioRequest::Features(targets) => targets.clone(),
        }
    }

    /// 活动记录与推送使用的名称。
    pub fn label(&self) -> String {
        match self {
            ScenarioRequest::Named(named) => named.as_str().to_string(),
            ScenarioRequest::Features(_) => "CUSTOM".to_string(),
        }
    }
}

/// 单台设备的场景下发计划。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioPlan {
    pub changes: Vec<PlannedChange>,
    pub payload: RelayStates,
}

/// 以设备当前继电器为基准，按映射改写每个目标功能的继电器。
pub fn plan_scenario(
    targets: &[(Feature, bool)],
    config: &RelayConfig,
    current: &RelayStates,
) -> Result<ScenarioPlan, ControlError> {
    config.validate()?;
    let mut payload = *current;
    let mut changes = Vec::with_capacity(targets.len());
    for (feature, desired) in targets {
        let relay = config
            .relay_for(*feature)
            .ok_or(ControlError::FeatureNotMapped(*feature))?;
        changes.push(PlannedChange {
            relay,
            feature: *feature,
            previous: current.get(relay),
            desired: *desired,
        });
        payload.set(relay, *desired);
    }
    Ok(ScenarioPlan { changes, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn war_leaves_beacon_off() {
        let targets = NamedScenario::War.targets();
        assert_eq!(targets.len(), 4);
        assert!(targets.contains(&(Feature::Beacon, false)));
        assert!(targets.contains(&(Feature::Dispenser, true)));
    }

    #[test]
    fn fire_and_natural_match() {
        assert_eq!(NamedScenario::Fire.targets(), NamedScenario::Natural.targets());
        assert!(
            NamedScenario::Fire
                .targets()
                .contains(&(Feature::Dispenser, false))
        );
    }

    #[test]
    fn features_take_precedence_over_name() {
        let mut features = BTreeMap::new();
        features.insert("beacon".to_string(), true);
        let request = ScenarioRequest::from_parts(Some("ALL"), Some(&features)).expect("request");
        assert_eq!(request.targets(), vec![(Feature::Beacon, true)]);
        assert_eq!(request.label(), "CUSTOM");
    }

    #[test]
    fn empty_request_is_rejected() {
        assert!(matches!(
            ScenarioRequest::from_parts(None, None),
            Err(ControlError::EmptyScenario)
        ));
        assert!(matches!(
            ScenarioRequest::from_parts(None, Some(&BTreeMap::new())),
            Err(ControlError::EmptyScenario)
        ));
    }
}
