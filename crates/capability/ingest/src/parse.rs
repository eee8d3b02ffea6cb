//! topic 与报文解析：边界处把字节转成强类型信号，非法报文在此丢弃。

use crate::IngestError;
use domain::{DeviceSignal, RelayAck, RelayStates, SignalKind};
use serde::Deserialize;

/// 解析 `<deviceId>/connection`、`<deviceId>/relay/{status,ack,control}`。
pub fn parse_topic(topic: &str) -> Option<(String, SignalKind)> {
    let topic = topic.trim_matches('/');
    let (device_id, kind) = if let Some(device_id) = topic.strip_suffix("/connection") {
        (device_id, SignalKind::Connection)
    } else if let Some(device_id) = topic.strip_suffix("/relay/status") {
        (device_id, SignalKind::RelayStatus)
    } else if let Some(device_id) = topic.strip_suffix("/relay/ack") {
        (device_id, SignalKind::RelayAck)
    } else if let Some(device_id) = topic.strip_suffix("/relay/control") {
        (device_id, SignalKind::Control)
    } else {
        return None;
    };
    if device_id.is_empty() || device_id.contains('/') {
        return None;
    }
    Some((device_id.to_string(), kind))
}

/// 单台设备的四个订阅 topic。
pub fn device_topics(device_id: &str) -> [String; 4] {
    [
        format!("{}/connection", device_id),
        format!("{}/relay/status", device_id),
        format!("{}/relay/ack", device_id),
        format!("{}/relay/control", device_id),
    ]
}

#[derive(Debug, Deserialize)]
struct ConnectionPayload {
    #[serde(alias = "state")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct AckPayload {
    #[serde(flatten)]
    relays: RelayStates,
    #[serde(default, alias = "signalStrength")]
    signal_strength: Option<i64>,
    #[serde(default, alias = "batteryLevel")]
    battery_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ShadowPayload {
    state: ShadowStatePayload,
}

#[derive(Debug, Deserialize)]
struct ShadowStatePayload {
    reported: Option<RelayStates>,
}

/// 按信号类别解析报文。
pub fn parse_signal(kind: SignalKind, payload: &[u8]) -> Result<DeviceSignal, IngestError> {
    match kind {
        SignalKind::Connection => {
            let text = std::str::from_utf8(payload)
                .map_err(|err| IngestError::InvalidPayload(err.to_string()))?
                .trim();
            // 兼容纯文本状态，例如 `connected`
            let status = if text.starts_with('{') {
                serde_json::from_str::<ConnectionPayload>(text)
                    .map_err(|err| IngestError::InvalidPayload(err.to_string()))?
                    .status
            } else {
                text.trim_matches('"').to_string()
            };
            if status.is_empty() {
                return Err(IngestError::InvalidPayload("missing status".to_string()));
            }
            Ok(DeviceSignal::Connection { status })
        }
        SignalKind::RelayStatus => Ok(DeviceSignal::RelayStatus),
        SignalKind::RelayAck => {
            let ack: AckPayload = serde_json::from_slice(payload)
                .map_err(|err| IngestError::InvalidPayload(err.to_string()))?;
            Ok(DeviceSignal::RelayAck(RelayAck {
                relays: ack.relays,
                signal_strength: ack.signal_strength,
                battery_level: ack.battery_level,
            }))
        }
        SignalKind::Control => {
            let relays: RelayStates = serde_json::from_slice(payload)
                .map_err(|err| IngestError::InvalidPayload(err.to_string()))?;
            Ok(DeviceSignal::Control(relays))
        }
        SignalKind::Shadow => {
            let shadow: ShadowPayload = serde_json::from_slice(payload)
                .map_err(|err| IngestError::InvalidPayload(err.to_string()))?;
            let reported = shadow
                .state
                .reported
                .ok_or_else(|| IngestError::InvalidPayload("missing state.reported".to_string()))?;
            Ok(DeviceSignal::ShadowReported(reported))
        }
    }
}

/// 解析一条 MQTT 消息。
pub fn parse_message(topic: &str, payload: &[u8]) -> Result<(String, DeviceSignal), IngestError> {
    let (device_id, kind) =
        parse_topic(topic).ok_or_else(|| IngestError::InvalidTopic(topic.to_string()))?;
    let signal = parse_signal(kind, payload)?;
    Ok((device_id, signal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_suffixes() {
        assert_eq!(
            parse_topic("zonex_3/connection"),
            Some(("zonex_3".to_string(), SignalKind::Connection))
        );
        assert_eq!(
            parse_topic("zonex_3/relay/ack"),
            Some(("zonex_3".to_string(), SignalKind::RelayAck))
        );
        assert_eq!(parse_topic("zonex_3/relay/unknown"), None);
        assert_eq!(parse_topic("/connection"), None);
        assert_eq!(parse_topic("a/b/connection"), None);
    }

    #[test]
    fn connection_accepts_plain_text() {
        assert_eq!(
            parse_signal(SignalKind::Connection, b"connected").expect("signal"),
            DeviceSignal::Connection {
                status: "connected".to_string()
            }
        );
    }

    #[test]
    fn relay_status_ignores_content() {
        assert_eq!(
            parse_signal(SignalKind::RelayStatus, b"\x00garbage").expect("signal"),
            DeviceSignal::RelayStatus
        );
    }
}
