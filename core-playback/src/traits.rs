//! # Core Playback Traits
//!
//! The decoder boundary of the streaming pipeline. These traits belong to the
//! core logic layer and differ from the bridge-traits definitions, which expose
//! platform adapters (HTTP, audio output) to the host.
//!
//! ## Architecture
//!
//! The pipeline uses a **producer-consumer model**:
//!
//! - **Producer (FrameDecoder)**: Runs on a blocking worker, pulls compressed
//!   bytes through a [`ByteSource`] and hands interleaved `f32` PCM to the
//!   jitter buffer.
//! - **Consumer (OutputSink)**: Pulls PCM from the jitter buffer on the
//!   platform's audio thread.
//!
//! ## Threading Model
//!
//! Decoding blocks on network input, so both traits are synchronous and are
//! driven from `tokio::task::spawn_blocking`.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use core_playback::{DecoderFactory, FrameDecoder};
//!
//! fn decode_all(factory: &dyn DecoderFactory, source: ByteSource) -> Result<()> {
//!     let mut decoder = factory.open(source, Some("audio/mpeg"))?;
//!     while let Some(chunk) = decoder.next_chunk()? {
//!         println!("{} samples at {} Hz", chunk.samples.len(), chunk.spec.sample_rate);
//!     }
//!     Ok(())
//! }
//! ```

use crate::error::Result;
use bridge_traits::playback::PcmSpec;
use serde::{Deserialize, Serialize};
use std::io::Read;

// ============================================================================
// Audio Format Types
// ============================================================================

/// Audio codecs an internet radio stream may carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// MPEG-1 Audio Layer 3
    Mp3,
    /// Advanced Audio Coding (AAC/HE-AAC)
    Aac,
    /// Free Lossless Audio Codec
    Flac,
    /// Ogg Vorbis
    Vorbis,
    /// Raw PCM
    Pcm,
    /// Codec not recognized
    Unknown,
}

impl AudioCodec {
    /// Map an HTTP `Content-Type` to the codec it usually carries.
    ///
    /// Parameters after `;` are ignored.
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg" => AudioCodec::Mp3,
            "audio/aac" | "audio/aacp" | "audio/x-aac" | "audio/mp4" => AudioCodec::Aac,
            "audio/flac" | "audio/x-flac" => AudioCodec::Flac,
            "audio/ogg" | "application/ogg" | "audio/vorbis" => AudioCodec::Vorbis,
            "audio/wav" | "audio/x-wav" | "audio/l16" => AudioCodec::Pcm,
            _ => AudioCodec::Unknown,
        }
    }

    /// File extension used as a probe hint.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            AudioCodec::Mp3 => Some("mp3"),
            AudioCodec::Aac => Some("aac"),
            AudioCodec::Flac => Some("flac"),
            AudioCodec::Vorbis => Some("ogg"),
            AudioCodec::Pcm => Some("wav"),
            AudioCodec::Unknown => None,
        }
    }
}

/// A run of decoded, interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChunk {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Format of `samples`.
    pub spec: PcmSpec,
}

impl DecodedChunk {
    pub fn new(samples: Vec<f32>, spec: PcmSpec) -> Self {
        Self { samples, spec }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.spec.channels == 0 {
            return 0;
        }
        self.samples.len() / self.spec.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ============================================================================
// Decoder Traits
// ============================================================================

/// Compressed input handed to a decoder.
///
/// Reads block until bytes arrive and return `0` at end of stream.
pub type ByteSource = Box<dyn Read + Send + Sync>;

/// Decodes one compressed stream into PCM chunks.
pub trait FrameDecoder: Send {
    /// Output format of the most recently decoded chunk (or of the probed
    /// track before the first chunk).
    fn spec(&self) -> PcmSpec;

    /// Codec of the selected track.
    fn codec(&self) -> AudioCodec;

    /// Decode the next frame.
    ///
    /// Returns `Ok(None)` at end of stream. An error describes one frame that
    /// could not be decoded; callers may call again to continue with the next
    /// frame.
    fn next_chunk(&mut self) -> Result<Option<DecodedChunk>>;

    /// In-stream tags read since the last call, as `key=value` lines.
    ///
    /// Containers with embedded comments (Ogg) report titles this way
    /// instead of through ICY blocks.
    fn take_metadata(&mut self) -> Option<String> {
        None
    }
}

/// Creates decoders for a byte source.
pub trait DecoderFactory: Send + Sync {
    /// Probe `source` and prepare a decoder for its first audio track.
    ///
    /// `content_type` is the `Content-Type` response header, used as a hint.
    fn open(&self, source: ByteSource, content_type: Option<&str>)
        -> Result<Box<dyn FrameDecoder>>;
}
