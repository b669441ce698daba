//! # Streaming Configuration
//!
//! Configuration types for the radio streaming pipeline.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming pipeline configuration.
///
/// Controls the jitter buffer size and its water marks, worker timings and
/// error tolerance. All buffer values are durations so they do not depend on
/// the sample rate of the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Maximum audio held in the jitter buffer.
    ///
    /// The decoder blocks once the buffer holds this much audio.
    ///
    /// Default: 8 seconds.
    #[serde(default = "default_buffer_duration")]
    pub buffer_duration: Duration,

    /// Buffered audio below which a playing stream pauses to re-buffer.
    ///
    /// Default: 0.5 seconds.
    #[serde(default = "default_low_water")]
    pub low_water: Duration,

    /// Buffered audio required before output starts.
    ///
    /// Default: 4 seconds.
    #[serde(default = "default_high_water")]
    pub high_water: Duration,

    /// Period of the state machine tick.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Period of the output device poll.
    ///
    /// Default: 1 second.
    #[serde(default = "default_device_poll_interval")]
    pub device_poll_interval: Duration,

    /// Maximum duration to wait for the HTTP response head.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Chunks in flight between the network and decode workers.
    ///
    /// Default: 64.
    #[serde(default = "default_byte_channel_capacity")]
    pub byte_channel_capacity: usize,

    /// Size of one network read (in bytes).
    ///
    /// Default: 8 KiB.
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,

    /// Consecutive undecodable frames tolerated before the stream stops.
    ///
    /// Default: 16.
    #[serde(default = "default_max_consecutive_decode_errors")]
    pub max_consecutive_decode_errors: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_duration: default_buffer_duration(),
            low_water: default_low_water(),
            high_water: default_high_water(),
            tick_interval: default_tick_interval(),
            device_poll_interval: default_device_poll_interval(),
            connect_timeout: default_connect_timeout(),
            byte_channel_capacity: default_byte_channel_capacity(),
            read_chunk_bytes: default_read_chunk_bytes(),
            max_consecutive_decode_errors: default_max_consecutive_decode_errors(),
        }
    }
}

impl StreamingConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Smaller buffer (3s)
    /// - Output starts after 1s
    /// - Faster tick
    pub fn low_latency() -> Self {
        Self {
            buffer_duration: Duration::from_secs(3),
            low_water: Duration::from_millis(250),
            high_water: Duration::from_secs(1),
            tick_interval: Duration::from_millis(50),
            read_chunk_bytes: 4 * 1024,
            ..Default::default()
        }
    }

    /// Create a configuration for unreliable networks.
    ///
    /// - Larger buffer (20s)
    /// - Output starts after 8s
    /// - Longer connect timeout
    pub fn high_stability() -> Self {
        Self {
            buffer_duration: Duration::from_secs(20),
            low_water: Duration::from_secs(2),
            high_water: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(20),
            byte_channel_capacity: 256,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_duration.is_zero() {
            return Err(invalid("buffer_duration must be > 0"));
        }

        if self.low_water >= self.high_water {
            return Err(invalid("low_water must be below high_water"));
        }

        if self.high_water > self.buffer_duration {
            return Err(invalid("high_water cannot exceed buffer_duration"));
        }

        if self.tick_interval.is_zero() || self.device_poll_interval.is_zero() {
            return Err(invalid("tick and device poll intervals must be > 0"));
        }

        if self.connect_timeout.is_zero() {
            return Err(invalid("connect_timeout must be > 0"));
        }

        if self.byte_channel_capacity == 0 {
            return Err(invalid("byte_channel_capacity must be > 0"));
        }

        if self.read_chunk_bytes == 0 {
            return Err(invalid("read_chunk_bytes must be > 0"));
        }

        if self.max_consecutive_decode_errors == 0 {
            return Err(invalid("max_consecutive_decode_errors must be > 0"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> PlaybackError {
    PlaybackError::InvalidConfig(message.to_string())
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_buffer_duration() -> Duration {
    Duration::from_secs(8)
}

fn default_low_water() -> Duration {
    Duration::from_millis(500)
}

fn default_high_water() -> Duration {
    Duration::from_secs(4)
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_device_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_byte_channel_capacity() -> usize {
    64
}

fn default_read_chunk_bytes() -> usize {
    8 * 1024
}

fn default_max_consecutive_decode_errors() -> usize {
    16
}
