//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! using desktop-appropriate libraries:
//! - `HttpClient` using `reqwest` (streaming bodies via `tokio-util`)
//! - `AudioOutput` / `OutputSink` using `cpal`
//! - `DeviceEnumerator` using the default `cpal` host
//! - `SettingsStore` using a JSON file in the platform config directory
//!
//! ## Feature Flags
//!
//! - `audio-output`: Enable cpal audio output and device enumeration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{CpalAudioOutput, JsonSettingsStore, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let settings = JsonSettingsStore::in_config_dir("radio").await?;
//!     let output = CpalAudioOutput::new();
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

#[cfg(feature = "audio-output")]
mod audio;
mod http;
mod settings;

#[cfg(feature = "audio-output")]
pub use audio::{CpalAudioOutput, CpalDeviceEnumerator, CpalSink};
pub use http::ReqwestHttpClient;
pub use settings::{JsonSettingsStore, SETTINGS_FILE_NAME};
