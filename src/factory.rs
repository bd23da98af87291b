//! Factory CLI `custom_models` configuration.
//!
//! The document is kept as untyped JSON so keys this server does not manage
//! survive a round trip; only entries under `custom_models` are touched.

use crate::error::ManagerError;
use crate::persist::{read_json, write_json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CUSTOM_MODELS: &str = "custom_models";

/// One `custom_models` entry routed through the local proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactoryModel {
    pub model_display_name: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub provider: String,
}

impl FactoryModel {
    pub fn via_proxy(model: &str, base_url: &str, api_key: &str) -> Self {
        Self {
            model_display_name: format!("{} [proxy]", model),
            model: model.to_string(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            provider: "openai".to_string(),
        }
    }
}

pub struct FactoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FactoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Value, ManagerError> {
        let doc = read_json::<Value>(&self.path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => {
                    ManagerError::InvalidInput(format!("{}: {}", self.path.display(), e))
                }
                _ => e.into(),
            })?
            .unwrap_or_else(|| json!({ CUSTOM_MODELS: [] }));
        ensure_shape(doc)
    }

    pub fn get(&self) -> Result<Value, ManagerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load()
    }

    /// Overwrite the whole document.
    pub fn replace(&self, doc: Value) -> Result<Value, ManagerError> {
        let doc = ensure_shape(doc)?;
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        write_json(&self.path, &doc)?;
        Ok(doc)
    }

    /// Append proxy-routed entries, skipping models already present.
    pub fn add(
        &self,
        models: &[String],
        base_url: &str,
        api_key: &str,
    ) -> Result<(Value, usize), ManagerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        let entries = custom_models(&mut doc)?;

        let mut added = 0;
        for model in models.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
            let exists = entries
                .iter()
                .any(|e| e.get("model").and_then(Value::as_str) == Some(model));
            if exists {
                continue;
            }
            entries.push(serde_json::to_value(FactoryModel::via_proxy(model, base_url, api_key))?);
            added += 1;
        }

        write_json(&self.path, &doc)?;
        tracing::info!(added, path = %self.path.display(), "factory models added");
        Ok((doc, added))
    }

    pub fn remove(&self, models: &[String]) -> Result<(Value, usize), ManagerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        let entries = custom_models(&mut doc)?;

        let before = entries.len();
        entries.retain(|e| {
            !e.get("model")
                .and_then(Value::as_str)
                .is_some_and(|m| models.iter().any(|r| r == m))
        });
        let removed = before - entries.len();

        write_json(&self.path, &doc)?;
        tracing::info!(removed, path = %self.path.display(), "factory models removed");
        Ok((doc, removed))
    }
}

fn ensure_shape(mut doc: Value) -> Result<Value, ManagerError> {
    let Some(obj) = doc.as_object_mut() else {
        return Err(ManagerError::InvalidInput(
            "factory config must be a JSON object".to_string(),
        ));
    };
    let slot = obj.entry(CUSTOM_MODELS).or_insert_with(|| json!([]));
    if slot.is_null() {
        *slot = json!([]);
    }
    if !slot.is_array() {
        return Err(ManagerError::InvalidInput(format!("{} must be an array", CUSTOM_MODELS)));
    }
    Ok(doc)
}

fn custom_models(doc: &mut Value) -> Result<&mut Vec<Value>, ManagerError> {
    doc.get_mut(CUSTOM_MODELS)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ManagerError::InvalidInput(format!("{} must be an array", CUSTOM_MODELS)))
}
