//! # Radio Playback Engine
//!
//! Streams internet radio: connects to Shoutcast/Icecast endpoints, splits
//! inline ICY metadata from the audio bytes, decodes and buffers PCM, and
//! drives the output sink from a buffer-level state machine.
//!
//! ## Overview
//!
//! This module handles:
//! - ICY metadata framing and now-playing extraction
//! - Audio decoding using symphonia (optional, feature-gated)
//! - Jitter buffering with low/high water marks
//! - Following the OS default output device
//!
//! [`StreamSession`] ties the pieces together.

pub mod config;
#[cfg(feature = "core-decoder")]
pub mod decoder;
pub mod device_monitor;
pub mod error;
pub mod icy;
pub mod jitter_buffer;
pub mod metadata;
pub mod pipeline;
pub mod session;
pub mod state_machine;
pub mod traits;

pub use config::StreamingConfig;
#[cfg(feature = "core-decoder")]
pub use decoder::{FormatDetector, SymphoniaDecoder, SymphoniaDecoderFactory};
pub use device_monitor::DeviceMonitor;
pub use error::{PlaybackError, Result};
pub use icy::{parse_meta_interval, FramingState, MetadataFramingReader};
pub use jitter_buffer::JitterBuffer;
pub use metadata::{parse_metadata, MetadataExtractor, NowPlaying, StationInfo};
pub use session::{SessionBridges, StreamSession, DEFAULT_VOLUME_STEP};
pub use state_machine::{BufferSnapshot, PlaybackState, PlaybackStateMachine, SinkCommand};
pub use traits::{AudioCodec, ByteSource, DecodedChunk, DecoderFactory, FrameDecoder};
