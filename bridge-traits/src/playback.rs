//! Audio output bridge traits and supporting types.
//!
//! The engine decodes to interleaved `f32` PCM and hands the platform a
//! [`PcmSource`] to pull from. Platform audio libraries implement
//! [`AudioOutput`] (open a sink for a given format), [`OutputSink`] (control a
//! live sink) and [`DeviceEnumerator`] (list output devices and find the OS
//! default).
//!
//! These traits are synchronous: sink control is called from the tick context
//! and must return quickly, and [`PcmSource::fill`] runs inside the realtime
//! audio callback.

use std::sync::Arc;

use crate::error::Result;

/// Decoded PCM format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl PcmSpec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Interleaved samples per second of audio.
    pub fn samples_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize
    }
}

/// An output device as reported by the OS audio subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    /// Position in the host's enumeration order.
    pub index: usize,
    /// Human-readable device name; used as the identity of the device.
    pub name: String,
    /// Whether the OS currently reports this device as the default output.
    pub is_default: bool,
}

/// Pull-side of the PCM pipeline.
///
/// Called from the platform's audio callback. Implementations must not block
/// and must return the number of samples written to `out` (0 when nothing is
/// buffered). The caller fills the remainder with silence.
pub trait PcmSource: Send + Sync {
    fn fill(&self, out: &mut [f32]) -> usize;
}

/// A live audio sink bound to one output device.
pub trait OutputSink: Send + Sync {
    /// Start (or resume) pulling from the source.
    fn play(&self) -> Result<()>;

    /// Stop pulling from the source while keeping the device open.
    fn pause(&self) -> Result<()>;

    /// Release the device. Further calls on the sink are no-ops.
    fn stop(&self);

    /// Apply a linear gain in `0.0..=1.0`.
    fn set_gain(&self, gain: f32);

    /// Currently applied gain.
    fn gain(&self) -> f32;

    /// Name of the device the sink is currently bound to.
    fn device_name(&self) -> Option<String>;

    /// Move the sink to another device, preserving its play/pause state and
    /// gain. Buffered audio in the source is untouched.
    fn rebind(&self, device: &OutputDevice) -> Result<()>;
}

/// Factory for sinks on the current default device.
pub trait AudioOutput: Send + Sync {
    /// Open a paused sink that renders `spec` PCM pulled from `source`.
    fn open(&self, spec: PcmSpec, source: Arc<dyn PcmSource>) -> Result<Arc<dyn OutputSink>>;
}

/// Enumerates output devices.
pub trait DeviceEnumerator: Send + Sync {
    /// List all output devices.
    fn output_devices(&self) -> Result<Vec<OutputDevice>>;

    /// The device the OS currently reports as default, if any.
    fn default_output_device(&self) -> Result<Option<OutputDevice>> {
        Ok(self
            .output_devices()?
            .into_iter()
            .find(|device| device.is_default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDevices(Vec<OutputDevice>);

    impl DeviceEnumerator for FixedDevices {
        fn output_devices(&self) -> Result<Vec<OutputDevice>> {
            Ok(self.0.clone())
        }
    }

    fn device(index: usize, name: &str, is_default: bool) -> OutputDevice {
        OutputDevice {
            index,
            name: name.to_string(),
            is_default,
        }
    }

    #[test]
    fn test_pcm_spec_samples_per_second() {
        assert_eq!(PcmSpec::new(44_100, 2).samples_per_second(), 88_200);
        assert_eq!(PcmSpec::new(48_000, 1).samples_per_second(), 48_000);
    }

    #[test]
    fn test_default_output_device_picks_flagged_device() {
        let devices = FixedDevices(vec![
            device(0, "Speakers", false),
            device(1, "Headphones", true),
        ]);

        let default = devices.default_output_device().unwrap();
        assert_eq!(default.map(|d| d.name), Some("Headphones".to_string()));
    }

    #[test]
    fn test_default_output_device_none_when_unflagged() {
        let devices = FixedDevices(vec![device(0, "Speakers", false)]);
        assert!(devices.default_output_device().unwrap().is_none());
    }
}
