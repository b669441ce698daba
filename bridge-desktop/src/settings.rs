//! Settings Storage using a JSON file

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// File name used under the platform config directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// JSON-file settings store implementation
///
/// Keeps the whole document in memory and rewrites the file after every
/// mutation (write to a sibling temp file, then rename). Values keep their
/// JSON type, so `get_f64` on a string entry is a type mismatch.
pub struct JsonSettingsStore {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl JsonSettingsStore {
    /// Open (or create) the settings file at `path`.
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let values = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes).map_err(|e| {
                BridgeError::OperationFailed(format!(
                    "Failed to parse settings file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        debug!(path = ?path, keys = values.len(), "Initialized settings store");

        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// Open the settings file in the platform config directory
    /// (`<config_dir>/<app_name>/settings.json`).
    pub async fn in_config_dir(app_name: &str) -> Result<Self> {
        let base = dirs::config_dir().ok_or_else(|| {
            BridgeError::NotAvailable("platform config directory".to_string())
        })?;
        Self::new(base.join(app_name).join(SETTINGS_FILE_NAME)).await
    }

    /// Create an in-memory settings store (for testing)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(values).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to serialize settings: {}", e))
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            error!(path = ?tmp, error = %e, "Failed to write settings");
            BridgeError::Io(e)
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(BridgeError::Io)?;

        Ok(())
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        self.persist(&values).await?;

        debug!(key = key, "Stored setting");
        Ok(())
    }

    fn type_mismatch(key: &str, expected: &str, actual: &Value) -> BridgeError {
        error!(key = key, expected = expected, actual = %actual, "Type mismatch");
        BridgeError::OperationFailed(format!(
            "Type mismatch for '{}': expected {}, got {}",
            key, expected, actual
        ))
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, Value::String(value.to_string())).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().await;
        match values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Self::type_mismatch(key, "string", other)),
        }
    }

    async fn set_f64(&self, key: &str, value: f64) -> Result<()> {
        let number = serde_json::Number::from_f64(value).ok_or_else(|| {
            BridgeError::OperationFailed(format!("Cannot store non-finite value for '{}'", key))
        })?;
        self.set_value(key, Value::Number(number)).await
    }

    async fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        let values = self.values.lock().await;
        match values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(Self::type_mismatch(key, "number", other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        if values.remove(key).is_some() {
            self.persist(&values).await?;
            debug!(key = key, "Deleted setting");
        }
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().await.contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.values.lock().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
