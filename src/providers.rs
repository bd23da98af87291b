//! Custom provider registry (`providers.json`).
//!
//! Providers are OpenAI-compatible endpoints keyed by unique name. The
//! registry is validated on load and on every write; unknown fields are
//! rejected rather than carried along.

use crate::error::ManagerError;
use crate::http::{create_client_with_timeout, PROBE_TIMEOUT};
use crate::persist::{read_json, write_json};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

pub const REGISTRY_SCHEMA: &str = "proxyctl/providers/v1";

/// A custom OpenAI-compatible provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderConfig {
    /// Filled from the registry key when omitted.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_package_name: Option<String>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supports_reasoning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_limit_tokens: Option<u64>,
    #[serde(default)]
    pub input_modalities: BTreeSet<String>,
    #[serde(default)]
    pub output_modalities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<BTreeMap<String, VariantConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VariantConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_verbosity: Option<String>,
}

/// On-disk registry document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryDocument {
    #[serde(rename = "$schema", default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn default_schema() -> String {
    REGISTRY_SCHEMA.to_string()
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            providers: BTreeMap::new(),
        }
    }
}

/// Fill names from keys and check required fields.
pub fn normalize(
    providers: BTreeMap<String, ProviderConfig>,
) -> Result<BTreeMap<String, ProviderConfig>, ManagerError> {
    providers
        .into_iter()
        .map(|(key, mut provider)| {
            if provider.name.trim().is_empty() {
                provider.name = key.clone();
            }
            if key.trim().is_empty() {
                return Err(ManagerError::InvalidInput("provider name is empty".to_string()));
            }
            if provider.name != key {
                return Err(ManagerError::InvalidInput(format!(
                    "provider key '{}' does not match name '{}'",
                    key, provider.name
                )));
            }
            let url = provider.base_url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ManagerError::InvalidInput(format!(
                    "provider '{}' has invalid baseURL '{}'",
                    key, provider.base_url
                )));
            }
            Ok((key, provider))
        })
        .collect()
}

/// File-backed provider registry.
pub struct ProviderRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProviderRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry. A missing file is an empty registry.
    pub fn load(&self) -> Result<RegistryDocument, ManagerError> {
        let doc: RegistryDocument = read_json(&self.path)
            .map_err(|e| ManagerError::Io(format!("{}: {}", self.path.display(), e)))?
            .unwrap_or_default();
        let providers = normalize(doc.providers)?;
        Ok(RegistryDocument { providers, ..doc })
    }

    /// Replace or merge `incoming` into the registry. Returns the resulting provider count.
    pub fn set(
        &self,
        incoming: BTreeMap<String, ProviderConfig>,
        merge: bool,
    ) -> Result<usize, ManagerError> {
        let incoming = normalize(incoming)?;
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut doc = if merge { self.load()? } else { RegistryDocument::default() };
        doc.providers.extend(incoming);
        write_json(&self.path, &doc)?;

        tracing::info!(count = doc.providers.len(), merge, "provider registry saved");
        Ok(doc.providers.len())
    }

    /// Name of the registered provider that serves `model`, if any.
    pub fn provider_for_model(&self, model: &str) -> Option<String> {
        let doc = self.load().ok()?;
        doc.providers
            .values()
            .find(|p| p.models.contains_key(model))
            .map(|p| p.name.clone())
    }
}

/// Result of probing a provider endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProbeResult {
    pub latency_ms: u64,
    pub model_count: usize,
}

/// Call `{base_url}/models` and report latency and model count.
pub async fn probe_provider(
    base_url: &str,
    api_key: Option<&str>,
) -> Result<ProbeResult, ManagerError> {
    let client = create_client_with_timeout(PROBE_TIMEOUT);
    let url = format!("{}/models", base_url.trim_end_matches('/'));

    let mut req = client.get(&url);
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        req = req.header("Authorization", format!("Bearer {}", key));
    }

    let started = Instant::now();
    let response = req
        .send()
        .await
        .map_err(|e| ManagerError::UpstreamUnavailable(format!("{}: {}", url, e)))?;
    let latency_ms = started.elapsed().as_millis() as u64;

    let status = response.status();
    if !status.is_success() {
        return Err(ManagerError::UpstreamUnavailable(format!(
            "{} returned {}",
            url, status
        )));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ManagerError::UpstreamUnavailable(format!("invalid models response: {}", e)))?;
    let model_count = body["data"].as_array().map(|a| a.len()).unwrap_or(0);

    Ok(ProbeResult { latency_ms, model_count })
}
