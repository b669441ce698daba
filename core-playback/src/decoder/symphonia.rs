//! # Symphonia Decoder Implementation
//!
//! Live-stream decoder using the Symphonia library.

use crate::decoder::format_detector::FormatDetector;
use crate::error::{PlaybackError, Result};
use crate::traits::{AudioCodec, ByteSource, DecodedChunk, DecoderFactory, FrameDecoder};
use bridge_traits::playback::PcmSpec;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use tracing::{debug, info, instrument};

/// Symphonia decoder over a forward-only byte source.
///
/// The decoder owns the demuxer and codec for the first audio track. When a
/// chained Ogg stream starts a new logical bitstream the track is re-selected
/// and the codec rebuilt.
pub struct SymphoniaDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    codec: AudioCodec,
    spec: PcmSpec,
    sample_buf: Option<SampleBuffer<f32>>,
    pending_metadata: Option<String>,
}

impl SymphoniaDecoder {
    /// Probe `source` and prepare the codec for its first audio track.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The container cannot be recognised
    /// - No audio track is present
    /// - The codec is not enabled in this build
    #[instrument(skip(source))]
    pub fn new(source: ByteSource, content_type: Option<&str>) -> Result<Self> {
        let hint = FormatDetector::hint_from_content_type(content_type);
        let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(source)), Default::default());

        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| PlaybackError::InvalidFormat(format!("Failed to probe stream: {}", e)))?;

        let pending_metadata = probed
            .metadata
            .get()
            .and_then(|mut metadata| metadata.skip_to_latest().and_then(revision_text));

        let mut format_reader = probed.format;
        let (track_id, codec, spec, decoder) = Self::open_track(format_reader.as_ref())?;

        let pending_metadata = {
            let mut metadata = format_reader.metadata();
            metadata
                .skip_to_latest()
                .and_then(revision_text)
                .or(pending_metadata)
        };

        info!(
            codec = ?codec,
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            "Decoder initialized"
        );

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            codec,
            spec,
            sample_buf: None,
            pending_metadata,
        })
    }

    fn open_track(
        format_reader: &dyn FormatReader,
    ) -> Result<(u32, AudioCodec, PcmSpec, Box<dyn Decoder>)> {
        let track: &Track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                PlaybackError::FormatNotDecodable("No supported audio tracks".to_string())
            })?;

        let codec = FormatDetector::detect_codec(track.codec_params.codec);
        FormatDetector::validate_codec_support(&codec)?;

        // Channel layout of MP3/AAC streams is often only known after the first frame.
        let spec = PcmSpec::new(
            track.codec_params.sample_rate.unwrap_or(44_100),
            track
                .codec_params
                .channels
                .map(|channels| channels.count() as u16)
                .unwrap_or(2),
        );

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                PlaybackError::DecoderError(format!("Failed to create codec decoder: {}", e))
            })?;

        Ok((track.id, codec, spec, decoder))
    }

    fn collect_metadata(&mut self) {
        let mut metadata = self.format_reader.metadata();
        if metadata.is_latest() {
            return;
        }
        if let Some(text) = metadata.skip_to_latest().and_then(revision_text) {
            self.pending_metadata = Some(text);
        }
    }

    fn reset_track(&mut self) -> Result<()> {
        let (track_id, codec, spec, decoder) = Self::open_track(self.format_reader.as_ref())?;
        debug!(track_id, codec = ?codec, "Track list changed, decoder rebuilt");
        self.track_id = track_id;
        self.codec = codec;
        self.spec = spec;
        self.decoder = decoder;
        self.sample_buf = None;
        Ok(())
    }
}

/// Render a tag revision as `key=value` lines.
fn revision_text(revision: &MetadataRevision) -> Option<String> {
    let lines: Vec<String> = revision
        .tags()
        .iter()
        .map(|tag| format!("{}={}", tag.key, tag.value))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

impl FrameDecoder for SymphoniaDecoder {
    fn spec(&self) -> PcmSpec {
        self.spec
    }

    fn codec(&self) -> AudioCodec {
        self.codec.clone()
    }

    fn next_chunk(&mut self) -> Result<Option<DecodedChunk>> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.reset_track()?;
                    continue;
                }
                Err(e) => {
                    return Err(PlaybackError::DecodingError(format!(
                        "Failed to read packet: {}",
                        e
                    )))
                }
            };

            self.collect_metadata();

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let signal = SignalSpec::new(decoded.spec().rate, decoded.spec().channels);
                    let spec = PcmSpec::new(signal.rate, signal.channels.count() as u16);
                    if spec != self.spec {
                        debug!(
                            sample_rate = spec.sample_rate,
                            channels = spec.channels,
                            "Output format updated from decoded audio"
                        );
                        self.spec = spec;
                        self.sample_buf = None;
                    }

                    let needs_realloc = self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < decoded.capacity());
                    if needs_realloc {
                        self.sample_buf =
                            Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, signal));
                    }

                    let Some(sample_buf) = self.sample_buf.as_mut() else {
                        return Err(PlaybackError::Internal(
                            "Decoder sample buffer unavailable".to_string(),
                        ));
                    };
                    sample_buf.copy_interleaved_ref(decoded);

                    return Ok(Some(DecodedChunk::new(
                        sample_buf.samples().to_vec(),
                        self.spec,
                    )));
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    debug!(error = err, "Undecodable frame");
                    return Err(PlaybackError::DecodingError(err.to_string()));
                }
                Err(SymphoniaError::IoError(e)) => {
                    return Err(PlaybackError::DecodingError(format!(
                        "Corrupted frame: {}",
                        e
                    )))
                }
                Err(e) => {
                    return Err(PlaybackError::DecoderError(format!(
                        "Failed to decode packet: {}",
                        e
                    )))
                }
            }
        }
    }

    fn take_metadata(&mut self) -> Option<String> {
        self.pending_metadata.take()
    }
}

/// [`DecoderFactory`] backed by Symphonia's default registries.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoderFactory;

impl SymphoniaDecoderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderFactory for SymphoniaDecoderFactory {
    fn open(
        &self,
        source: ByteSource,
        content_type: Option<&str>,
    ) -> Result<Box<dyn FrameDecoder>> {
        let decoder = SymphoniaDecoder::new(source, content_type)?;
        Ok(Box::new(decoder))
    }
}
