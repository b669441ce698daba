//! # Format Detection Module
//!
//! Probe hints and codec identification for Symphonia.

use crate::error::{PlaybackError, Result};
use crate::traits::AudioCodec;
use symphonia::core::codecs::CodecType;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Format detector for radio streams.
///
/// Stream URLs rarely carry a file extension, so hints are derived from the
/// `Content-Type` response header.
pub struct FormatDetector;

impl FormatDetector {
    /// Create a probe hint from the response `Content-Type`.
    ///
    /// Sets both the MIME type and, when the codec is known, the matching
    /// extension.
    pub fn hint_from_content_type(content_type: Option<&str>) -> Hint {
        let mut hint = Hint::new();

        let Some(content_type) = content_type else {
            debug!("No content type, probe will auto-detect");
            return hint;
        };

        let mime = content_type.split(';').next().unwrap_or_default().trim();
        if !mime.is_empty() {
            hint.mime_type(mime);
        }

        if let Some(extension) = AudioCodec::from_content_type(content_type).extension() {
            debug!(mime, extension, "Setting probe hint");
            hint.with_extension(extension);
        }

        hint
    }

    /// Detect audio codec from Symphonia codec type.
    pub fn detect_codec(codec_type: CodecType) -> AudioCodec {
        use symphonia::core::codecs::*;

        if codec_type == CODEC_TYPE_MP3
            || codec_type == CODEC_TYPE_MP2
            || codec_type == CODEC_TYPE_MP1
        {
            AudioCodec::Mp3
        } else if codec_type == CODEC_TYPE_AAC {
            AudioCodec::Aac
        } else if codec_type == CODEC_TYPE_FLAC {
            AudioCodec::Flac
        } else if codec_type == CODEC_TYPE_VORBIS {
            AudioCodec::Vorbis
        } else if codec_type == CODEC_TYPE_PCM_S16LE
            || codec_type == CODEC_TYPE_PCM_S16BE
            || codec_type == CODEC_TYPE_PCM_S24LE
            || codec_type == CODEC_TYPE_PCM_S32LE
            || codec_type == CODEC_TYPE_PCM_F32LE
        {
            AudioCodec::Pcm
        } else {
            warn!("Unknown codec type: {:?}", codec_type);
            AudioCodec::Unknown
        }
    }

    /// Validate if a codec is supported by current feature flags.
    pub fn validate_codec_support(codec: &AudioCodec) -> Result<()> {
        let enabled = match codec {
            AudioCodec::Mp3 => cfg!(feature = "decoder-mp3"),
            AudioCodec::Aac => cfg!(feature = "decoder-aac"),
            AudioCodec::Flac => cfg!(feature = "decoder-flac"),
            AudioCodec::Vorbis => cfg!(feature = "decoder-vorbis"),
            AudioCodec::Pcm => cfg!(feature = "decoder-wav"),
            AudioCodec::Unknown => {
                return Err(PlaybackError::UnsupportedCodec(
                    "Unknown audio codec".to_string(),
                ))
            }
        };

        if enabled {
            Ok(())
        } else {
            Err(PlaybackError::UnsupportedCodec(format!(
                "{:?} decoder not enabled in this build",
                codec
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::{CODEC_TYPE_MP3, CODEC_TYPE_NULL};

    #[test]
    fn test_hint_from_content_type() {
        // Hint is opaque; building it must not panic on odd headers.
        let _ = FormatDetector::hint_from_content_type(Some("audio/mpeg"));
        let _ = FormatDetector::hint_from_content_type(Some(";"));
        let _ = FormatDetector::hint_from_content_type(None);
    }

    #[test]
    fn test_detect_codec() {
        assert_eq!(FormatDetector::detect_codec(CODEC_TYPE_MP3), AudioCodec::Mp3);
        assert_eq!(
            FormatDetector::detect_codec(CODEC_TYPE_NULL),
            AudioCodec::Unknown
        );
    }

    #[test]
    fn test_codec_validation() {
        assert!(FormatDetector::validate_codec_support(&AudioCodec::Unknown).is_err());

        #[cfg(feature = "decoder-mp3")]
        assert!(FormatDetector::validate_codec_support(&AudioCodec::Mp3).is_ok());
    }
}
