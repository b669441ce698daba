//! Audio output using cpal
//!
//! `cpal::Stream` is not `Send` on every host, so each sink owns a dedicated
//! worker thread that builds, drives and drops the stream. The public
//! [`CpalSink`] only talks to that thread through a command channel and shares
//! the gain with the realtime callback through an atomic.

use bridge_traits::{
    error::{BridgeError, Result},
    playback::{AudioOutput, DeviceEnumerator, OutputDevice, OutputSink, PcmSource, PcmSpec},
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a caller waits for the worker to build a stream.
const WORKER_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Gain shared with the audio callback, stored as `f32` bits.
#[derive(Debug)]
struct SharedGain(AtomicU32);

impl SharedGain {
    fn new(gain: f32) -> Self {
        Self(AtomicU32::new(gain.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, gain: f32) {
        self.0.store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

enum WorkerCommand {
    Play,
    Pause,
    Rebind {
        device_name: String,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| BridgeError::Device("No default output device".to_string())),
        Some(name) => host
            .output_devices()
            .map_err(|e| BridgeError::Device(format!("Failed to list devices: {}", e)))?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| BridgeError::Device(format!("Output device '{}' not found", name))),
    }
}

/// Picks the device config for `spec`.
///
/// An exact rate and channel match is preferred (f32 first). Otherwise the
/// device default is used and [`FormatConverter`] adapts the stream to it.
fn choose_config(device: &cpal::Device, spec: PcmSpec) -> Result<cpal::SupportedStreamConfig> {
    let wanted = cpal::SampleRate(spec.sample_rate);
    if let Ok(configs) = device.supported_output_configs() {
        let exact = configs
            .filter(|c| {
                c.channels() == spec.channels
                    && c.min_sample_rate() <= wanted
                    && wanted <= c.max_sample_rate()
            })
            .max_by_key(|c| c.sample_format() == cpal::SampleFormat::F32);
        if let Some(range) = exact {
            return Ok(range.with_sample_rate(wanted));
        }
    }

    device
        .default_output_config()
        .map_err(|e| BridgeError::Device(format!("No usable output config: {}", e)))
}

/// Renders one PCM spec to the device by pulling from the source.
fn build_stream(
    device: &cpal::Device,
    spec: PcmSpec,
    source: Arc<dyn PcmSource>,
    gain: Arc<SharedGain>,
) -> Result<cpal::Stream> {
    let supported = choose_config(device, spec)?;
    let config = supported.config();
    let output = PcmSpec::new(config.sample_rate.0, config.channels);
    if output != spec {
        info!(
            stream_rate = spec.sample_rate,
            stream_channels = spec.channels,
            device_rate = output.sample_rate,
            device_channels = output.channels,
            "Converting stream to device format"
        );
    }
    let converter = FormatConverter::new(source, spec, output);

    match supported.sample_format() {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, &config, converter, gain),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, &config, converter, gain),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, &config, converter, gain),
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, &config, converter, gain),
        other => Err(BridgeError::Device(format!(
            "Unsupported output sample format {:?}",
            other
        ))),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut converter: FormatConverter,
    gain: Arc<SharedGain>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut mix: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mix.resize(data.len(), 0.0);
                let filled = converter.render(&mut mix).min(mix.len());
                mix[filled..].fill(0.0);

                let gain = gain.load();
                for (out, sample) in data.iter_mut().zip(&mix) {
                    *out = T::from_sample(*sample * gain);
                }
            },
            move |err| {
                error!(error = %err, "Audio stream error");
            },
            None,
        )
        .map_err(|e| {
            BridgeError::Device(format!(
                "Failed to open {} Hz / {} ch output: {}",
                config.sample_rate.0, config.channels, e
            ))
        })
}

// ============================================================================
// Format conversion
// ============================================================================

/// Frames pulled from the source per refill.
const CONVERTER_BATCH_FRAMES: usize = 256;

/// Adapts decoded PCM to the device rate and channel count.
///
/// Rates are converted by linear interpolation. Mono is copied to every
/// output channel, a mono output averages the input, and other layouts map
/// channel by channel (extra outputs are silent).
struct FormatConverter {
    source: Arc<dyn PcmSource>,
    in_channels: usize,
    out_channels: usize,
    passthrough: bool,
    /// Input frames advanced per output frame.
    step: f64,
    /// Position between `prev` and `next`.
    phase: f64,
    prev: Vec<f32>,
    next: Vec<f32>,
    frame: Vec<f32>,
    staged: Vec<f32>,
    staged_pos: usize,
}

impl FormatConverter {
    fn new(source: Arc<dyn PcmSource>, input: PcmSpec, output: PcmSpec) -> Self {
        let in_channels = usize::from(input.channels.max(1));
        let out_channels = usize::from(output.channels.max(1));
        let step = if output.sample_rate == 0 {
            1.0
        } else {
            f64::from(input.sample_rate) / f64::from(output.sample_rate)
        };

        Self {
            source,
            in_channels,
            out_channels,
            passthrough: input == output,
            step,
            // Two frames must be read before the first output frame.
            phase: 2.0,
            prev: vec![0.0; in_channels],
            next: vec![0.0; in_channels],
            frame: vec![0.0; in_channels],
            staged: Vec::with_capacity(in_channels * CONVERTER_BATCH_FRAMES),
            staged_pos: 0,
        }
    }

    /// Fill `out` with interleaved device frames. Returns the number of
    /// samples written; the rest is left for the caller to silence.
    fn render(&mut self, out: &mut [f32]) -> usize {
        if self.passthrough {
            return self.source.fill(out);
        }

        let mut written = 0;
        for out_frame in out.chunks_exact_mut(self.out_channels) {
            while self.phase >= 1.0 {
                if !self.advance() {
                    return written;
                }
                self.phase -= 1.0;
            }

            let t = self.phase as f32;
            for (c, sample) in self.frame.iter_mut().enumerate() {
                *sample = self.prev[c] + (self.next[c] - self.prev[c]) * t;
            }
            map_channels(&self.frame, out_frame);

            self.phase += self.step;
            written += self.out_channels;
        }
        written
    }

    /// Shift `next` into `prev` and read a new `next`. Leaves state untouched
    /// when no full frame is buffered.
    fn advance(&mut self) -> bool {
        if self.staged.len() - self.staged_pos < self.in_channels {
            self.refill();
            if self.staged.len() - self.staged_pos < self.in_channels {
                return false;
            }
        }

        let end = self.staged_pos + self.in_channels;
        std::mem::swap(&mut self.prev, &mut self.next);
        self.next.copy_from_slice(&self.staged[self.staged_pos..end]);
        self.staged_pos = end;
        true
    }

    fn refill(&mut self) {
        self.staged.drain(..self.staged_pos);
        self.staged_pos = 0;

        let have = self.staged.len();
        self.staged.resize(have + self.in_channels * CONVERTER_BATCH_FRAMES, 0.0);
        let read = self.source.fill(&mut self.staged[have..]);
        self.staged.truncate(have + read);
    }
}

fn map_channels(input: &[f32], output: &mut [f32]) {
    match (input.len(), output.len()) {
        (i, o) if i == o => output.copy_from_slice(input),
        (1, _) => output.fill(input[0]),
        (i, 1) => output[0] = input.iter().sum::<f32>() / i as f32,
        (i, _) => {
            for (c, sample) in output.iter_mut().enumerate() {
                *sample = if c < i { input[c] } else { 0.0 };
            }
        }
    }
}

struct SinkWorker {
    spec: PcmSpec,
    source: Arc<dyn PcmSource>,
    gain: Arc<SharedGain>,
    device_name: Arc<Mutex<Option<String>>>,
    stream: cpal::Stream,
    playing: bool,
}

impl SinkWorker {
    fn run(mut self, commands: Receiver<WorkerCommand>) {
        while let Ok(command) = commands.recv() {
            match command {
                WorkerCommand::Play => {
                    if let Err(e) = self.stream.play() {
                        warn!(error = %e, "Failed to start output stream");
                    } else {
                        self.playing = true;
                    }
                }
                WorkerCommand::Pause => {
                    if let Err(e) = self.stream.pause() {
                        warn!(error = %e, "Failed to pause output stream");
                    }
                    self.playing = false;
                }
                WorkerCommand::Rebind { device_name, reply } => {
                    let result = self.rebind(&device_name);
                    let _ = reply.send(result);
                }
                WorkerCommand::Shutdown => break,
            }
        }
        debug!("Audio output worker exiting");
    }

    fn rebind(&mut self, device_name: &str) -> Result<()> {
        let host = cpal::default_host();
        let device = find_device(&host, Some(device_name))?;
        let stream = build_stream(
            &device,
            self.spec,
            Arc::clone(&self.source),
            Arc::clone(&self.gain),
        )?;

        if self.playing {
            stream
                .play()
                .map_err(|e| BridgeError::Device(format!("Failed to start stream: {}", e)))?;
        }

        // Dropping the old stream releases the previous device.
        self.stream = stream;
        *self.device_name.lock() = Some(device_name.to_string());
        info!(device = device_name, "Output rebound");
        Ok(())
    }
}

/// A live cpal output stream controlled from any thread.
pub struct CpalSink {
    commands: Mutex<Sender<WorkerCommand>>,
    gain: Arc<SharedGain>,
    device_name: Arc<Mutex<Option<String>>>,
    stopped: AtomicBool,
}

impl CpalSink {
    fn send(&self, command: WorkerCommand) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        self.commands
            .lock()
            .send(command)
            .map_err(|_| BridgeError::Device("Audio output worker has exited".to_string()))
    }
}

impl OutputSink for CpalSink {
    fn play(&self) -> Result<()> {
        self.send(WorkerCommand::Play)
    }

    fn pause(&self) -> Result<()> {
        self.send(WorkerCommand::Pause)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.commands.lock().send(WorkerCommand::Shutdown);
    }

    fn set_gain(&self, gain: f32) {
        self.gain.store(gain);
    }

    fn gain(&self) -> f32 {
        self.gain.load()
    }

    fn device_name(&self) -> Option<String> {
        self.device_name.lock().clone()
    }

    fn rebind(&self, device: &OutputDevice) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(WorkerCommand::Rebind {
            device_name: device.name.clone(),
            reply: reply_tx,
        })?;
        reply_rx
            .recv_timeout(WORKER_REPLY_TIMEOUT)
            .map_err(|_| BridgeError::Device("Timed out rebinding output".to_string()))?
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens cpal output streams on the current default device.
#[derive(Debug, Clone)]
pub struct CpalAudioOutput {
    initial_gain: f32,
}

impl CpalAudioOutput {
    pub fn new() -> Self {
        Self { initial_gain: 1.0 }
    }

    /// Gain applied to sinks before the first `set_gain` call.
    pub fn with_initial_gain(gain: f32) -> Self {
        Self {
            initial_gain: gain.clamp(0.0, 1.0),
        }
    }
}

impl Default for CpalAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalAudioOutput {
    fn open(&self, spec: PcmSpec, source: Arc<dyn PcmSource>) -> Result<Arc<dyn OutputSink>> {
        let gain = Arc::new(SharedGain::new(self.initial_gain));
        let device_name = Arc::new(Mutex::new(None));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let worker_gain = Arc::clone(&gain);
        let worker_device_name = Arc::clone(&device_name);
        thread::Builder::new()
            .name("radio-audio-out".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let opened = find_device(&host, None).and_then(|device| {
                    let name = device.name().ok();
                    let stream = build_stream(&device, spec, source.clone(), worker_gain.clone())?;
                    // Streams may auto-start on some hosts.
                    let _ = stream.pause();
                    Ok((name, stream))
                });

                match opened {
                    Ok((name, stream)) => {
                        info!(
                            device = name.as_deref().unwrap_or("unknown"),
                            sample_rate = spec.sample_rate,
                            channels = spec.channels,
                            "Output opened"
                        );
                        *worker_device_name.lock() = name;
                        let _ = ready_tx.send(Ok(()));
                        SinkWorker {
                            spec,
                            source,
                            gain: worker_gain,
                            device_name: worker_device_name,
                            stream,
                            playing: false,
                        }
                        .run(command_rx);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(BridgeError::Io)?;

        ready_rx
            .recv_timeout(WORKER_REPLY_TIMEOUT)
            .map_err(|_| BridgeError::Device("Timed out opening output".to_string()))??;

        Ok(Arc::new(CpalSink {
            commands: Mutex::new(command_tx),
            gain,
            device_name,
            stopped: AtomicBool::new(false),
        }))
    }
}

/// Lists output devices of the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct CpalDeviceEnumerator;

impl CpalDeviceEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceEnumerator for CpalDeviceEnumerator {
    fn output_devices(&self) -> Result<Vec<OutputDevice>> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = host
            .output_devices()
            .map_err(|e| BridgeError::Device(format!("Failed to list devices: {}", e)))?
            .enumerate()
            .filter_map(|(index, device)| {
                let name = device.name().ok()?;
                let is_default = default_name.as_deref() == Some(name.as_str());
                Some(OutputDevice {
                    index,
                    name,
                    is_default,
                })
            })
            .collect();

        Ok(devices)
    }
}
