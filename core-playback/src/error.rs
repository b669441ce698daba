//! # Playback Error Types
//!
//! Error types for the streaming pipeline, the decoder boundary and the
//! output device.

use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The stream URL is empty or not an absolute HTTP(S) URL.
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    /// The HTTP response could not be obtained (DNS, TCP, TLS, status).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No response head arrived within the connect timeout.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// The body stopped with an error after the connection was established.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    // ========================================================================
    // Format/Codec Errors
    // ========================================================================
    /// Audio format is not recognized or cannot be parsed.
    #[error("Unsupported or invalid audio format: {0}")]
    InvalidFormat(String),

    /// Codec is not supported by the decoder.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Audio format was detected but cannot be decoded.
    #[error("Cannot decode audio format: {0}")]
    FormatNotDecodable(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// One frame could not be decoded; the next frame may succeed.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Too many consecutive frames failed to decode.
    #[error("Decoder gave up after {0} consecutive errors")]
    TooManyDecodeErrors(usize),

    /// Decoder encountered an internal error.
    #[error("Decoder internal error: {0}")]
    DecoderError(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Streaming configuration is inconsistent.
    #[error("Invalid streaming config: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Output Errors
    // ========================================================================
    /// The output device could not be opened; the open is retried.
    #[error("Output unavailable: {0}")]
    OutputUnavailable(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error reported by a host bridge.
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::ConnectTimeout(_)
                | PlaybackError::ConnectionLost(_)
                | PlaybackError::DecodingError(_)
                | PlaybackError::OutputUnavailable(_)
        )
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::ConnectionFailed(_)
                | PlaybackError::ConnectTimeout(_)
                | PlaybackError::ConnectionLost(_)
        )
    }

    /// Returns `true` if this error is related to audio format/codec issues.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidFormat(_)
                | PlaybackError::UnsupportedCodec(_)
                | PlaybackError::FormatNotDecodable(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
