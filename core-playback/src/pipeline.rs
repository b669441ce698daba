//! # Streaming Pipeline Workers
//!
//! Per-connection producer side of the engine.
//!
//! ```text
//! ┌──────────────────────────────┐   Bytes (bounded mpsc)   ┌──────────────────────────┐
//! │ network worker (tokio task)  │ ───────────────────────▶ │ decode worker (blocking) │
//! │ HttpClient + framing reader  │                          │ FrameDecoder             │
//! └──────────────┬───────────────┘                          └────────────┬─────────────┘
//!                │ Message { generation, kind }                         │ push PCM
//!                ▼                                                       ▼
//!        session tick (unbounded mpsc)                              JitterBuffer ──▶ OutputSink
//! ```
//!
//! Workers never touch session state. They report through [`Message`]s tagged
//! with the generation they were started for; the session discards anything
//! from an older generation.

use crate::config::StreamingConfig;
use crate::error::PlaybackError;
use crate::icy::{parse_meta_interval, MetadataFramingReader, ICY_METAINT_HEADER};
use crate::jitter_buffer::JitterBuffer;
use crate::metadata::StationInfo;
use crate::traits::{DecoderFactory, FrameDecoder};
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::playback::{AudioOutput, OutputSink, PcmSource, PcmSpec};
use bytes::{Buf, Bytes};
use core_runtime::logging::redact_url;
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// `User-Agent` sent with stream requests.
pub const USER_AGENT: &str = concat!("radio-core/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Messages
// ============================================================================

/// A worker report for the session tick.
#[derive(Debug)]
pub struct Message {
    pub generation: u64,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(generation: u64, kind: MessageKind) -> Self {
        Self { generation, kind }
    }
}

pub enum MessageKind {
    /// Response head received.
    Connected {
        meta_interval: u32,
        station: StationInfo,
    },
    /// No response could be obtained.
    ConnectFailed { error: String },
    /// Text of an in-band metadata block.
    Metadata { text: String },
    /// The decoder knows the PCM format and opened a paused sink.
    SinkReady {
        sink: Arc<dyn OutputSink>,
        buffer: Arc<JitterBuffer>,
    },
    /// The HTTP body ended normally.
    SourceExhausted,
    /// The HTTP body failed after the connection was established.
    ConnectionLost { error: String },
    /// The decoder consumed all input; no more PCM will be pushed.
    DecoderDrained,
    /// The stream could not be decoded.
    DecodeFailed { error: String },
    /// The decoder knows the PCM format but the output device could not be
    /// opened. Decoding continues into `buffer`; the session retries the open.
    SinkFailed {
        buffer: Arc<JitterBuffer>,
        error: String,
    },
}

impl fmt::Debug for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Connected {
                meta_interval,
                station,
            } => f
                .debug_struct("Connected")
                .field("meta_interval", meta_interval)
                .field("station", station)
                .finish(),
            MessageKind::ConnectFailed { error } => {
                f.debug_struct("ConnectFailed").field("error", error).finish()
            }
            MessageKind::Metadata { text } => {
                f.debug_struct("Metadata").field("text", text).finish()
            }
            MessageKind::SinkReady { buffer, .. } => f
                .debug_struct("SinkReady")
                .field("sink", &"OutputSink { ... }")
                .field("buffer", buffer)
                .finish(),
            MessageKind::SourceExhausted => f.write_str("SourceExhausted"),
            MessageKind::ConnectionLost { error } => {
                f.debug_struct("ConnectionLost").field("error", error).finish()
            }
            MessageKind::DecoderDrained => f.write_str("DecoderDrained"),
            MessageKind::DecodeFailed { error } => {
                f.debug_struct("DecodeFailed").field("error", error).finish()
            }
            MessageKind::SinkFailed { buffer, error } => f
                .debug_struct("SinkFailed")
                .field("buffer", buffer)
                .field("error", error)
                .finish(),
        }
    }
}

pub type MessageSender = mpsc::UnboundedSender<Message>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Message>;

// ============================================================================
// Shared worker context
// ============================================================================

/// Collaborators and settings shared by every connection of a session.
pub struct PipelineContext {
    pub http_client: Arc<dyn HttpClient>,
    pub audio_output: Arc<dyn AudioOutput>,
    pub decoder_factory: Arc<dyn DecoderFactory>,
    pub config: StreamingConfig,
    pub messages: MessageSender,
    /// Generation the session currently accepts.
    pub current_generation: Arc<AtomicU64>,
}

impl PipelineContext {
    fn is_current(&self, generation: u64) -> bool {
        self.current_generation.load(Ordering::Acquire) == generation
    }

    fn send(&self, generation: u64, kind: MessageKind) -> bool {
        self.messages.send(Message::new(generation, kind)).is_ok()
    }
}

/// Identity of one connection attempt.
#[derive(Debug, Clone)]
pub struct Connection {
    pub generation: u64,
    pub url: String,
    pub cancel: CancellationToken,
}

// ============================================================================
// Byte channel adapter
// ============================================================================

/// Blocking [`Read`] over the network worker's byte channel.
///
/// Returns end of stream once the sender is dropped or the connection is
/// cancelled. Must only be used from a blocking thread.
pub struct ChannelReader {
    receiver: mpsc::Receiver<Bytes>,
    current: Bytes,
    cancel: CancellationToken,
}

impl ChannelReader {
    pub fn new(receiver: mpsc::Receiver<Bytes>, cancel: CancellationToken) -> Self {
        Self {
            receiver,
            current: Bytes::new(),
            cancel,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while !self.current.has_remaining() {
            if self.cancel.is_cancelled() {
                return Ok(0);
            }
            match self.receiver.blocking_recv() {
                Some(chunk) => self.current = chunk,
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.remaining());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

// ============================================================================
// Network worker
// ============================================================================

/// Open the stream and forward audio bytes until the body ends or the
/// connection is cancelled.
#[instrument(skip_all, fields(generation = connection.generation))]
pub async fn run_network_worker(context: Arc<PipelineContext>, connection: Connection) {
    let Connection {
        generation,
        url,
        cancel,
    } = connection;
    let timeout = context.config.connect_timeout;

    let request = HttpRequest::get(url.as_str())
        .with_icy_metadata()
        .header("User-Agent", USER_AGENT)
        .timeout(timeout);

    debug!(url = %redact_url(&url), "Opening stream");
    let opened = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Connection cancelled before response");
            return;
        }
        result = tokio::time::timeout(timeout, context.http_client.open_stream(request)) => result,
    };

    let response = match opened {
        Ok(Ok(response)) if response.is_success() => response,
        Ok(Ok(response)) => {
            let error = PlaybackError::ConnectionFailed(format!("HTTP status {}", response.status));
            context.send(generation, MessageKind::ConnectFailed { error: error.to_string() });
            return;
        }
        Ok(Err(e)) => {
            let error = PlaybackError::ConnectionFailed(e.to_string());
            context.send(generation, MessageKind::ConnectFailed { error: error.to_string() });
            return;
        }
        Err(_) => {
            let error = PlaybackError::ConnectTimeout(timeout);
            context.send(generation, MessageKind::ConnectFailed { error: error.to_string() });
            return;
        }
    };

    let meta_interval = parse_meta_interval(response.header(ICY_METAINT_HEADER));
    let station = StationInfo::from_response(&response);
    let content_type = station.content_type.clone();
    info!(
        meta_interval,
        station = station.name.as_deref().unwrap_or("unknown"),
        content_type = content_type.as_deref().unwrap_or("unknown"),
        "Stream connected"
    );
    if !context.send(
        generation,
        MessageKind::Connected {
            meta_interval,
            station,
        },
    ) {
        return;
    }

    let (bytes_tx, bytes_rx) = mpsc::channel::<Bytes>(context.config.byte_channel_capacity);
    {
        let context = Arc::clone(&context);
        let reader = ChannelReader::new(bytes_rx, cancel.clone());
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            run_decode_worker(&context, generation, reader, content_type, cancel)
        });
    }

    let metadata_tx = context.messages.clone();
    let mut reader = MetadataFramingReader::new(response.body, meta_interval).on_metadata(
        move |text| {
            let _ = metadata_tx.send(Message::new(
                generation,
                MessageKind::Metadata {
                    text: text.to_string(),
                },
            ));
        },
    );

    let mut buf = vec![0u8; context.config.read_chunk_bytes];
    let mut total: u64 = 0;
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(total, "Connection cancelled");
                return;
            }
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!(total, "Stream ended");
                context.send(generation, MessageKind::SourceExhausted);
                break;
            }
            Ok(n) => {
                total += n as u64;
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                let sent = tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = bytes_tx.send(chunk) => sent,
                };
                if sent.is_err() {
                    debug!(total, "Decoder stopped, closing connection");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, total, "Stream read failed");
                let error = PlaybackError::ConnectionLost(e.to_string());
                context.send(
                    generation,
                    MessageKind::ConnectionLost {
                        error: error.to_string(),
                    },
                );
                break;
            }
        }
    }
    // Dropping the sender lets the decoder reach end of stream.
}

// ============================================================================
// Decode worker
// ============================================================================

/// Decode until the byte channel ends, pushing PCM into the jitter buffer.
pub fn run_decode_worker(
    context: &PipelineContext,
    generation: u64,
    reader: ChannelReader,
    content_type: Option<String>,
    cancel: CancellationToken,
) {
    let mut decoder = match context
        .decoder_factory
        .open(Box::new(reader), content_type.as_deref())
    {
        Ok(decoder) => decoder,
        Err(e) => {
            if !cancel.is_cancelled() {
                warn!(generation, error = %e, "Stream could not be decoded");
                context.send(
                    generation,
                    MessageKind::DecodeFailed {
                        error: e.to_string(),
                    },
                );
            }
            return;
        }
    };

    let max_errors = context.config.max_consecutive_decode_errors;
    let mut consecutive_errors = 0usize;
    let mut buffer: Option<Arc<JitterBuffer>> = None;

    loop {
        if cancel.is_cancelled() || !context.is_current(generation) {
            debug!(generation, "Decode worker superseded");
            break;
        }

        if let Some(text) = decoder.take_metadata() {
            context.send(generation, MessageKind::Metadata { text });
        }

        let chunk = match decoder.next_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                debug!(generation, "Decoder drained");
                context.send(generation, MessageKind::DecoderDrained);
                return;
            }
            Err(e) => {
                consecutive_errors += 1;
                debug!(generation, consecutive_errors, error = %e, "Frame skipped");
                if consecutive_errors >= max_errors {
                    warn!(
                        generation,
                        consecutive_errors,
                        last_error = %e,
                        "Too many consecutive decode errors"
                    );
                    let error = PlaybackError::TooManyDecodeErrors(consecutive_errors);
                    context.send(
                        generation,
                        MessageKind::DecodeFailed {
                            error: error.to_string(),
                        },
                    );
                    break;
                }
                continue;
            }
        };
        consecutive_errors = 0;

        if chunk.is_empty() {
            continue;
        }

        let current = match buffer.as_ref() {
            Some(current) if current.spec() == chunk.spec => Arc::clone(current),
            previous => {
                if previous.is_some() {
                    info!(
                        generation,
                        sample_rate = chunk.spec.sample_rate,
                        channels = chunk.spec.channels,
                        "Stream format changed, reopening output"
                    );
                }
                let (opened, report) =
                    open_output(context, generation, decoder.as_ref(), &chunk.spec);
                if cancel.is_cancelled() || !context.send(generation, report) {
                    opened.close();
                    break;
                }
                buffer = Some(Arc::clone(&opened));
                opened
            }
        };

        let pushed = current.push(&chunk.samples);
        if pushed < chunk.samples.len() {
            debug!(generation, "Jitter buffer closed");
            break;
        }
    }
}

/// Create the jitter buffer for `spec` and try to open a paused sink on it.
///
/// The buffer is handed to the session either way; a failed open is retried
/// from the session tick.
fn open_output(
    context: &PipelineContext,
    generation: u64,
    decoder: &dyn FrameDecoder,
    spec: &PcmSpec,
) -> (Arc<JitterBuffer>, MessageKind) {
    let buffer = Arc::new(JitterBuffer::new(
        generation,
        *spec,
        context.config.buffer_duration,
    ));
    let source: Arc<dyn PcmSource> = buffer.clone();

    let report = match context.audio_output.open(*spec, source) {
        Ok(sink) => {
            info!(
                generation,
                codec = ?decoder.codec(),
                sample_rate = spec.sample_rate,
                channels = spec.channels,
                device = sink.device_name().as_deref().unwrap_or("unknown"),
                "Output opened"
            );
            MessageKind::SinkReady {
                sink,
                buffer: Arc::clone(&buffer),
            }
        }
        Err(e) => {
            warn!(generation, error = %e, "Failed to open output device, will retry");
            MessageKind::SinkFailed {
                buffer: Arc::clone(&buffer),
                error: PlaybackError::OutputUnavailable(e.to_string()).to_string(),
            }
        }
    };
    (buffer, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_channel_reader_reassembles_chunks() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let reader = tokio::task::spawn_blocking(move || {
            let mut reader = ChannelReader::new(rx, cancel);
            let mut out = Vec::new();
            reader.read_to_end(&mut out).map(|_| out)
        });

        tx.send(Bytes::from_static(b"abc")).await.unwrap();
        tx.send(Bytes::from_static(b"")).await.unwrap();
        tx.send(Bytes::from_static(b"defg")).await.unwrap();
        drop(tx);

        assert_eq!(reader.await.unwrap().unwrap(), b"abcdefg".to_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_channel_reader_stops_on_cancel() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tx.send(Bytes::from_static(b"ignored")).await.unwrap();
        let n = tokio::task::spawn_blocking(move || {
            let mut reader = ChannelReader::new(rx, cancel);
            let mut buf = [0u8; 8];
            reader.read(&mut buf)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(n, 0);
    }

    #[test]
    fn test_message_debug_hides_sink() {
        let message = Message::new(3, MessageKind::ConnectFailed {
            error: "refused".to_string(),
        });
        let debug = format!("{:?}", message);
        assert!(debug.contains("generation: 3"));
        assert!(debug.contains("refused"));
    }
}
