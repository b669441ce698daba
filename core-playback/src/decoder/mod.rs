//! # Audio Decoder Module
//!
//! Stream decoding using the Symphonia library.
//!
//! ## Overview
//!
//! [`SymphoniaDecoderFactory`] implements [`DecoderFactory`](crate::traits::DecoderFactory)
//! for live radio streams: the input is a forward-only byte source with no
//! known length, so decoders never seek and treat end of input as end of
//! stream.
//!
//! ## Supported Formats
//!
//! | Format | Feature Flag | License |
//! |--------|--------------|---------|
//! | MP3 | `decoder-mp3` | Patents expired |
//! | AAC (ADTS) | `decoder-aac` | Patent-encumbered |
//! | Ogg Vorbis | `decoder-vorbis` | BSD-3 |
//! | FLAC | `decoder-flac` | BSD-3 |
//! | WAV/PCM | `decoder-wav` | Public domain |
//!
//! ## Architecture
//!
//! ```text
//! ByteSource → ReadOnlySource → MediaSourceStream → FormatReader → Decoder → DecodedChunk
//! ```
//!
//! In-stream tags (Vorbis comments on Icecast Ogg mounts) are surfaced through
//! [`FrameDecoder::take_metadata`](crate::traits::FrameDecoder::take_metadata)
//! as `key=value` lines.

mod format_detector;
mod symphonia;

pub use self::symphonia::{SymphoniaDecoder, SymphoniaDecoderFactory};
pub use format_detector::FormatDetector;
