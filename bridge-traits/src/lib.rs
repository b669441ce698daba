//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the radio engine and
//! platform-specific implementations. Each trait represents a capability that
//! the engine requires but that must be implemented differently per platform.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Open long-lived streaming HTTP responses
//!
//! ### Audio
//! - [`AudioOutput`](playback::AudioOutput) - Open a PCM sink on the default device
//! - [`OutputSink`](playback::OutputSink) - Control a live sink (play, pause, gain, rebind)
//! - [`DeviceEnumerator`](playback::DeviceEnumerator) - List output devices and find the default
//! - [`PcmSource`](playback::PcmSource) - Pull side the engine hands to the sink
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Embedded hosts | TBD           | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The engine fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let http_client = config.http_client.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "HttpClient".to_string(),
//!     message: "No HTTP client implementation provided. \
//!              Desktop: enable the desktop-shims feature.".to_string(),
//! })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert their native errors into it and include
//! context (URL, device name) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`. Audio traits are additionally
//! synchronous because they are driven from the playback tick and from the
//! realtime audio callback.

pub mod error;
pub mod http;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{BodyReader, HttpClient, HttpMethod, HttpRequest, HttpStreamResponse};
pub use playback::{AudioOutput, DeviceEnumerator, OutputDevice, OutputSink, PcmSource, PcmSpec};
pub use storage::SettingsStore;
pub use time::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
