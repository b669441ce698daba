//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the radio engine:
//! - Logging and tracing infrastructure
//! - Configuration management (host bridges and persisted preferences)
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the playback and service crates
//! depend on. It establishes the logging conventions, the way host bridges
//! are assembled, and the event broadcasting used to report state changes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
