//! # Core Configuration Module
//!
//! Provides configuration management for the radio engine.
//!
//! ## Overview
//!
//! Two kinds of configuration live here:
//!
//! - [`CoreConfig`]: the host bridges the engine runs on, assembled with a
//!   builder that fails fast when a required capability is missing.
//! - [`Configuration`]: the persisted user preferences (volume, default
//!   stream link, station database link) loaded from and saved to a
//!   [`SettingsStore`].
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Opens the radio stream (desktop default: reqwest)
//! - `AudioOutput` - Opens the PCM sink (desktop default: cpal)
//! - `SettingsStore` - Persists preferences (desktop default: JSON file)
//!
//! ## Optional Dependencies
//!
//! - `DeviceEnumerator` - Enables following the OS default output device
//!   (desktop default: cpal host)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected automatically for every bridge that is not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .http_client(Arc::new(MyHttpClient))
//!     .audio_output(Arc::new(MyAudioOutput))
//!     .settings_store(Arc::new(MySettingsStore))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{AudioOutput, DeviceEnumerator, HttpClient, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Application name used for the settings directory.
pub const DEFAULT_APP_NAME: &str = "radio";

/// Settings key of the persisted gain.
pub const VOLUME_KEY: &str = "volume";
/// Settings key of the default stream link.
pub const LINK_KEY: &str = "link";
/// Settings key of the station database link.
pub const DATABASE_LINK_KEY: &str = "databaseLink";

/// Gain used when nothing is persisted yet.
pub const DEFAULT_VOLUME: f64 = 0.2;
/// Stream played by `--play` without an argument on a fresh install.
pub const DEFAULT_STREAM_LINK: &str = "http://ice1.somafm.com/groovesalad-128-mp3";
/// Station database link stored on a fresh install.
pub const DEFAULT_DATABASE_LINK: &str =
    "https://raw.githubusercontent.com/eapyl/radio-stations/master/db.json";

// ============================================================================
// Persisted preferences
// ============================================================================

/// User preferences persisted between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Linear gain in `0.0..=1.0`.
    pub volume: f64,
    /// Stream played when no link is given.
    pub default_uri: String,
    /// Station database link; stored for compatibility, unused by the engine.
    pub database_link: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            default_uri: DEFAULT_STREAM_LINK.to_string(),
            database_link: Some(DEFAULT_DATABASE_LINK.to_string()),
        }
    }
}

impl Configuration {
    /// Load preferences, falling back to defaults for missing keys.
    ///
    /// A stored volume outside `0..=1` is clamped.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let defaults = Self::default();

        let volume = match store.get_f64(VOLUME_KEY).await {
            Ok(Some(volume)) if volume.is_finite() => volume.clamp(0.0, 1.0),
            Ok(_) => defaults.volume,
            Err(e) => {
                // Older files stored the volume as a string.
                match store.get_string(VOLUME_KEY).await {
                    Ok(Some(text)) => text
                        .trim()
                        .parse::<f64>()
                        .map(|v| v.clamp(0.0, 1.0))
                        .unwrap_or_else(|_| {
                            warn!(error = %e, value = %text, "Ignoring unreadable volume");
                            defaults.volume
                        }),
                    _ => return Err(Error::Config(format!("Failed to read volume: {}", e))),
                }
            }
        };

        let default_uri = store
            .get_string(LINK_KEY)
            .await
            .map_err(|e| Error::Config(format!("Failed to read link: {}", e)))?
            .filter(|link| !link.trim().is_empty())
            .unwrap_or(defaults.default_uri);

        let database_link = store
            .get_string(DATABASE_LINK_KEY)
            .await
            .map_err(|e| Error::Config(format!("Failed to read databaseLink: {}", e)))?
            .or(defaults.database_link);

        debug!(volume, "Loaded configuration");

        Ok(Self {
            volume,
            default_uri,
            database_link,
        })
    }

    /// Persist every field.
    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        Self::save_volume(store, self.volume).await?;
        Self::save_link(store, &self.default_uri).await?;
        if let Some(link) = &self.database_link {
            Self::save_database_link(store, link).await?;
        }
        Ok(())
    }

    /// Persist only the gain.
    pub async fn save_volume(store: &dyn SettingsStore, volume: f64) -> Result<()> {
        store
            .set_f64(VOLUME_KEY, volume.clamp(0.0, 1.0))
            .await
            .map_err(|e| Error::Config(format!("Failed to save volume: {}", e)))
    }

    /// Persist only the default stream link.
    pub async fn save_link(store: &dyn SettingsStore, link: &str) -> Result<()> {
        store
            .set_string(LINK_KEY, link)
            .await
            .map_err(|e| Error::Config(format!("Failed to save link: {}", e)))
    }

    /// Persist only the station database link.
    pub async fn save_database_link(store: &dyn SettingsStore, link: &str) -> Result<()> {
        store
            .set_string(DATABASE_LINK_KEY, link)
            .await
            .map_err(|e| Error::Config(format!("Failed to save databaseLink: {}", e)))
    }
}

// ============================================================================
// Core configuration
// ============================================================================

/// Host bridges and shared runtime services for the engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Application name; names the settings directory on desktop.
    pub app_name: String,

    /// HTTP client used to open radio streams (required)
    pub http_client: Arc<dyn HttpClient>,

    /// Audio output used to open PCM sinks (required)
    pub audio_output: Arc<dyn AudioOutput>,

    /// Output device enumeration (optional; disables device following when absent)
    pub device_enumerator: Option<Arc<dyn DeviceEnumerator>>,

    /// User preferences storage (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Event bus shared by the session and the device monitor
    pub event_bus: EventBus,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("app_name", &self.app_name)
            .field("http_client", &"HttpClient { ... }")
            .field("audio_output", &"AudioOutput { ... }")
            .field(
                "device_enumerator",
                &self
                    .device_enumerator
                    .as_ref()
                    .map(|_| "DeviceEnumerator { ... }"),
            )
            .field("settings_store", &"SettingsStore { ... }")
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("Application name cannot be empty".to_string()));
        }

        if self
            .app_name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':'))
        {
            return Err(Error::Config(format!(
                "Application name '{}' must not contain path separators",
                self.app_name
            )));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to open radio streams. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Other hosts: inject a streaming HTTP adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn audio_output_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AudioOutput".to_string(),
        message: "AudioOutput implementation is required to render decoded audio. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default CpalAudioOutput. \
                 Other hosts: inject the platform audio sink."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for user preferences. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default JsonSettingsStore. \
                 Other hosts: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_audio_output() -> Result<Arc<dyn AudioOutput>> {
    use bridge_desktop::CpalAudioOutput;

    let output: Arc<dyn AudioOutput> = Arc::new(CpalAudioOutput::new());
    Ok(output)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_audio_output() -> Result<Arc<dyn AudioOutput>> {
    Err(audio_output_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_device_enumerator() -> Option<Arc<dyn DeviceEnumerator>> {
    use bridge_desktop::CpalDeviceEnumerator;

    let enumerator: Arc<dyn DeviceEnumerator> = Arc::new(CpalDeviceEnumerator::new());
    Some(enumerator)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_device_enumerator() -> Option<Arc<dyn DeviceEnumerator>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(
    app_name: &str,
    settings_path: Option<PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::{JsonSettingsStore, SETTINGS_FILE_NAME};
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let path = match settings_path {
        Some(path) => path,
        None => dirs::config_dir()
            .ok_or_else(|| {
                Error::Config(
                    "No platform config directory; set .settings_path() explicitly".to_string(),
                )
            })?
            .join(app_name)
            .join(SETTINGS_FILE_NAME),
    };

    let init_store = |path: PathBuf| -> Result<JsonSettingsStore> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime.block_on(JsonSettingsStore::new(path)).map_err(|e| {
            Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
        })
    };

    // A runtime cannot be nested inside another one.
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(
    _app_name: &str,
    _settings_path: Option<PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Missing bridges are filled with desktop defaults when the
/// `desktop-shims` feature is enabled; otherwise `build()` reports which
/// capability is missing.
#[derive(Default)]
pub struct CoreConfigBuilder {
    app_name: Option<String>,
    settings_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    audio_output: Option<Arc<dyn AudioOutput>>,
    device_enumerator: Option<Arc<dyn DeviceEnumerator>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    event_bus: Option<EventBus>,
}

impl CoreConfigBuilder {
    /// Sets the application name. Default: `"radio"`.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Overrides the location of the default JSON settings file.
    ///
    /// Ignored when a settings store is injected.
    pub fn settings_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the audio output implementation.
    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    /// Sets the device enumerator used to follow the OS default output.
    pub fn device_enumerator(mut self, enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        self.device_enumerator = Some(enumerator);
        self
    }

    /// Sets the settings store implementation.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Shares an existing event bus instead of creating a new one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required bridge is missing and no desktop default is available
    /// - A desktop default fails to initialise
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let app_name = self
            .app_name
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let audio_output = match self.audio_output {
            Some(output) => output,
            None => provide_default_audio_output()?,
        };

        let device_enumerator = self
            .device_enumerator
            .or_else(provide_default_device_enumerator);

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&app_name, self.settings_path)?,
        };

        let config = CoreConfig {
            app_name,
            http_client,
            audio_output,
            device_enumerator,
            settings_store,
            event_bus: self.event_bus.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
