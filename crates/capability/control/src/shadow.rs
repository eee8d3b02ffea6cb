//! 设备 Shadow 读写。
//!
//! 文档形状：`{"state": {"reported": {relay1..4}, "desired": {relay1..4}}}`。
//! `reported` 等同硬件回执，`desired` 只说明设备曾被下发过命令。

use crate::ControlError;
use async_trait::async_trait;
use domain::RelayStates;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowDocument {
    #[serde(default)]
    pub state: ShadowState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<RelayStates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<RelayStates>,
}

/// Shadow 服务抽象。
#[async_trait]
pub trait ShadowClient: Send + Sync {
    async fn get_shadow(&self, device_id: &str) -> Result<ShadowDocument, ControlError>;

    async fn update_desired(&self, device_id: &str, desired: &RelayStates) -> Result<(), ControlError>;
}

/// HTTP Shadow 客户端：`GET/POST {base}/things/{id}/shadow`。
#[derive(Clone)]
pub struct HttpShadowClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpShadowClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn shadow_url(&self, device_id: &str) -> String {
        format!(
            "{}/things/{}/shadow",
            self.base_url,
            urlencoding::encode(device_id)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ShadowClient for HttpShadowClient {
    async fn get_shadow(&self, device_id: &str) -> Result<ShadowDocument, ControlError> {
        let response = self
            .authorize(self.client.get(self.shadow_url(device_id)))
            .send()
            .await
            .map_err(|err| ControlError::Shadow(format!("request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ControlError::Shadow(format!("HTTP {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|err| ControlError::Shadow(format!("invalid shadow document: {err}")))
    }

    async fn update_desired(&self, device_id: &str, desired: &RelayStates) -> Result<(), ControlError> {
        let document = ShadowDocument {
            state: ShadowState {
                reported: None,
                desired: Some(*desired),
            },
        };
        let response = self
            .authorize(self.client.post(self.shadow_url(device_id)).json(&document))
            .send()
            .await
            .map_err(|err| ControlError::Shadow(format!("request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ControlError::Shadow(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

/// 内存 Shadow（测试与本地联调用），可模拟单台设备的服务失败。
#[derive(Debug, Default)]
pub struct InMemoryShadowClient {
    documents: Mutex<HashMap<String, ShadowDocument>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryShadowClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reported(&self, device_id: &str, reported: RelayStates) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.entry(device_id.to_string()).or_default().state.reported = Some(reported);
        }
    }

    pub fn desired(&self, device_id: &str) -> Option<RelayStates> {
        self.documents
            .lock()
            .ok()?
            .get(device_id)
            .and_then(|document| document.state.desired)
    }

    pub fn set_failing(&self, device_id: &str, failing: bool) {
        if let Ok(mut set) = self.failing.lock() {
            if failing {
                set.insert(device_id.to_string());
            } else {
                set.remove(device_id);
            }
        }
    }

    fn check(&self, device_id: &str) -> Result<(), ControlError> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| ControlError::Shadow("lock poisoned".to_string()))?;
        if failing.contains(device_id) {
            return Err(ControlError::Shadow(format!("shadow unavailable for {device_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ShadowClient for InMemoryShadowClient {
    async fn get_shadow(&self, device_id: &str) -> Result<ShadowDocument, ControlError> {
        self.check(device_id)?;
        let documents = self
            .documents
            .lock()
            .map_err(|_| ControlError::Shadow("lock poisoned".to_string()))?;
        documents
            .get(device_id)
            .cloned()
            .ok_or_else(|| ControlError::Shadow(format!("no shadow for {device_id}")))
    }

    async fn update_desired(&self, device_id: &str, desired: &RelayStates) -> Result<(), ControlError> {
        self.check(device_id)?;
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| ControlError::Shadow("lock poisoned".to_string()))?;
        documents.entry(device_id.to_string()).or_default().state.desired = Some(*desired);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_document_tolerates_missing_sections() {
        let document: ShadowDocument =
            serde_json::from_str(r#"{"state":{"desired":{"relay1":true}}}"#).expect("document");
        assert!(document.state.reported.is_none());
        assert_eq!(
            document.state.desired,
            Some(RelayStates {
                relay1: true,
                ..RelayStates::default()
            })
        );
    }

    #[test]
    fn shadow_url_encodes_device_id() {
        let client = HttpShadowClient::new("http://shadow.local/", None);
        assert_eq!(client.shadow_url("pole 1"), "http://shadow.local/things/pole%201/shadow");
    }
}
