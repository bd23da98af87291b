//! Request and response types for the management API.

use crate::error::ManagerError;
use crate::providers::{ProbeResult, ProviderConfig};
use axum::extract::FromRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON body extractor whose rejections render as `ManagerError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ManagerError))]
pub struct ApiJson<T>(pub T);

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub struct LifecycleResponse {
    pub success: bool,
    pub pid: u32,
    pub message: String,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub success: bool,
    pub models: Vec<String>,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub content: String,
}

#[derive(Deserialize)]
pub struct ConfigUpdate {
    pub content: String,
}

#[derive(Serialize)]
pub struct ConfigSaved {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub lines: Option<String>,
}

#[derive(Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub lines: Vec<String>,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct ProvidersUpdate {
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub merge: bool,
}

#[derive(Serialize)]
pub struct ProvidersSaved {
    pub success: bool,
    pub count: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTestRequest {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct ProviderTestResponse {
    pub success: bool,
    #[serde(flatten)]
    pub probe: ProbeResult,
}

#[derive(Deserialize)]
pub struct ProxyRequest {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplyRequest {
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Deserialize)]
pub struct FactoryModelsRequest {
    pub models: Vec<String>,
}

#[derive(Serialize)]
pub struct FactoryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    pub config: serde_json::Value,
}
