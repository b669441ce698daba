//! # Stream Session
//!
//! Owns one radio connection at a time and exposes the control surface used
//! by the command layer: `play`, `pause`, `start`, `stop`, volume and status.
//!
//! All methods are synchronous. Network and decode work runs in pipeline
//! workers that report through generation-tagged messages; [`StreamSession::tick`]
//! drains them, runs the state machine and drives the output sink.
//!
//! ## Usage
//!
//! ```ignore
//! let session = Arc::new(StreamSession::new(bridges, events, StreamingConfig::default(), &prefs)?);
//! let cancel = CancellationToken::new();
//! Arc::clone(&session).spawn_tick(cancel.clone());
//!
//! session.play("http://radio.example/live")?;
//! println!("{}", session.status());
//! ```

use crate::config::StreamingConfig;
use crate::device_monitor::DeviceMonitor;
use crate::error::{PlaybackError, Result};
use crate::jitter_buffer::JitterBuffer;
use crate::metadata::{MetadataExtractor, NowPlaying, StationInfo};
use crate::pipeline::{
    run_network_worker, Connection, Message, MessageKind, MessageReceiver, PipelineContext,
};
use crate::state_machine::{BufferSnapshot, PlaybackState, PlaybackStateMachine, SinkCommand};
use crate::traits::DecoderFactory;
use bridge_traits::http::HttpClient;
use bridge_traits::playback::{AudioOutput, DeviceEnumerator, OutputSink, PcmSource};
use core_runtime::config::{Configuration, CoreConfig};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::{redact_url, strip_path};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Step used by `volume_up`/`volume_down` when none is given, in percent.
pub const DEFAULT_VOLUME_STEP: f64 = 10.0;

/// Collaborators a session needs from the host.
#[derive(Clone)]
pub struct SessionBridges {
    pub http_client: Arc<dyn HttpClient>,
    pub audio_output: Arc<dyn AudioOutput>,
    /// Enables default-device following when present.
    pub device_enumerator: Option<Arc<dyn DeviceEnumerator>>,
    pub decoder_factory: Arc<dyn DecoderFactory>,
}

impl SessionBridges {
    pub fn from_core(core: &CoreConfig, decoder_factory: Arc<dyn DecoderFactory>) -> Self {
        Self {
            http_client: Arc::clone(&core.http_client),
            audio_output: Arc::clone(&core.audio_output),
            device_enumerator: core.device_enumerator.clone(),
            decoder_factory,
        }
    }
}

struct ActiveConnection {
    generation: u64,
    cancel: CancellationToken,
    sink: Option<Arc<dyn OutputSink>>,
    buffer: Option<Arc<JitterBuffer>>,
    /// Decoder finished; nothing more will be pushed.
    drained: bool,
    /// Why the sink for `buffer` could not be opened; retried every tick.
    output_error: Option<String>,
}

impl ActiveConnection {
    fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            buffered: self
                .buffer
                .as_ref()
                .map_or(Duration::ZERO, |buffer| buffer.buffered_duration()),
            source_exhausted: self.drained,
        }
    }

    fn release_output(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.close();
        }
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

struct SessionState {
    machine: PlaybackStateMachine,
    messages: MessageReceiver,
    connection: Option<ActiveConnection>,
    extractor: MetadataExtractor,
    station: Option<StationInfo>,
    last_error: Option<String>,
    gain: f64,
    default_uri: String,
}

/// One radio playback session.
pub struct StreamSession {
    context: Arc<PipelineContext>,
    runtime: Handle,
    events: EventBus,
    monitor: Option<Arc<DeviceMonitor>>,
    state: Mutex<SessionState>,
}

impl StreamSession {
    /// Create a stopped session.
    ///
    /// Must be called from within a tokio runtime; workers are spawned on it.
    pub fn new(
        bridges: SessionBridges,
        events: EventBus,
        config: StreamingConfig,
        preferences: &Configuration,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            PlaybackError::Internal("StreamSession requires a tokio runtime".to_string())
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let machine = PlaybackStateMachine::new(config.low_water, config.high_water);
        let monitor = bridges
            .device_enumerator
            .map(|enumerator| Arc::new(DeviceMonitor::new(enumerator, events.clone())));

        let context = Arc::new(PipelineContext {
            http_client: bridges.http_client,
            audio_output: bridges.audio_output,
            decoder_factory: bridges.decoder_factory,
            config,
            messages: tx,
            current_generation: Arc::new(AtomicU64::new(0)),
        });

        Ok(Self {
            context,
            runtime,
            events,
            monitor,
            state: Mutex::new(SessionState {
                machine,
                messages: rx,
                connection: None,
                extractor: MetadataExtractor::new(0),
                station: None,
                last_error: None,
                gain: preferences.volume.clamp(0.0, 1.0),
                default_uri: preferences.default_uri.clone(),
            }),
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Connect to `uri`, replacing any current connection.
    #[instrument(skip_all, fields(stream = %strip_path(uri)))]
    pub fn play(&self, uri: &str) -> Result<()> {
        let uri = uri.trim();
        validate_stream_url(uri)?;

        let mut state = self.state.lock();
        let before = state.machine.state();

        let generation = self.teardown(&mut state);
        state.last_error = None;
        state.machine.play();

        let cancel = CancellationToken::new();
        state.connection = Some(ActiveConnection {
            generation,
            cancel: cancel.clone(),
            sink: None,
            buffer: None,
            drained: false,
            output_error: None,
        });

        info!(generation, url = %redact_url(uri), "Starting stream");
        self.runtime.spawn(run_network_worker(
            Arc::clone(&self.context),
            Connection {
                generation,
                url: uri.to_string(),
                cancel,
            },
        ));

        self.report_transition(before, state.machine.state());
        Ok(())
    }

    /// Play the configured default stream.
    pub fn play_default(&self) -> Result<()> {
        let uri = self.state.lock().default_uri.clone();
        self.play(&uri)
    }

    /// Change the default stream used by [`play_default`](Self::play_default).
    pub fn set_default_uri(&self, uri: impl Into<String>) {
        self.state.lock().default_uri = uri.into();
    }

    pub fn pause(&self) {
        let mut state = self.state.lock();
        let before = state.machine.state();
        if let Some(command) = state.machine.pause() {
            self.apply_command(&mut state, command);
        }
        self.report_transition(before, state.machine.state());
    }

    /// Resume after `pause`; output restarts once the buffer refills.
    pub fn start(&self) {
        let mut state = self.state.lock();
        let before = state.machine.state();
        state.machine.start();
        self.report_transition(before, state.machine.state());
    }

    /// Stop playback. Safe to call in any state.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        let before = state.machine.state();
        state.machine.stop();
        self.teardown(&mut state);
        self.report_transition(before, state.machine.state());
    }

    /// Set the volume in percent. Returns the applied gain.
    pub fn volume(&self, percent: f64) -> f64 {
        let mut state = self.state.lock();
        let gain = if percent.is_finite() {
            percent.clamp(0.0, 100.0) / 100.0
        } else {
            state.gain
        };
        state.gain = gain;

        if let Some(sink) = state.connection.as_ref().and_then(|c| c.sink.as_ref()) {
            sink.set_gain(gain as f32);
        }
        debug!(gain, "Volume changed");
        gain
    }

    pub fn volume_up(&self, delta: f64) -> f64 {
        let current = self.gain() * 100.0;
        self.volume(current + delta)
    }

    pub fn volume_down(&self, delta: f64) -> f64 {
        let current = self.gain() * 100.0;
        self.volume(current - delta)
    }

    /// Multi-line status report; absent fields are omitted.
    pub fn status(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();

        let _ = writeln!(out, "State: {}", state.machine.state());
        let _ = writeln!(out, "Volume: {}%", (state.gain * 100.0).round() as i64);
        if let Some(station) = state.station.as_ref().and_then(StationInfo::label) {
            let _ = writeln!(out, "Station: {}", station);
        }
        let now_playing = state.extractor.now_playing();
        if let Some(title) = &now_playing.title {
            let _ = writeln!(out, "Title: {}", title);
        }
        if let Some(tags) = &now_playing.icy_tags {
            let _ = writeln!(out, "Tags: {}", tags);
        }
        if let Some(error) = &state.last_error {
            let _ = writeln!(out, "Error: {}", error);
        }

        out.truncate(out.trim_end().len());
        out
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        self.state.lock().machine.state()
    }

    pub fn now_playing(&self) -> NowPlaying {
        self.state.lock().extractor.now_playing().clone()
    }

    pub fn station(&self) -> Option<StationInfo> {
        self.state.lock().station.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Current connection generation.
    pub fn generation(&self) -> u64 {
        self.context.current_generation.load(Ordering::Acquire)
    }

    /// Current gain in `0.0..=1.0`.
    pub fn gain(&self) -> f64 {
        self.state.lock().gain
    }

    /// Audio held in the current jitter buffer.
    pub fn buffered(&self) -> Duration {
        self.state
            .lock()
            .connection
            .as_ref()
            .map_or(Duration::ZERO, |c| c.snapshot().buffered)
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.context.config
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run one step: apply worker messages, then the buffer thresholds.
    pub fn tick(&self) {
        let mut state = self.state.lock();

        while let Ok(message) = state.messages.try_recv() {
            let before = state.machine.state();
            self.apply_message(&mut state, message);
            self.report_transition(before, state.machine.state());
        }
        self.retry_output(&mut state);

        if let Some(snapshot) = state.connection.as_ref().map(ActiveConnection::snapshot) {
            let before = state.machine.state();
            if let Some(command) = state.machine.tick(snapshot) {
                self.apply_command(&mut state, command);
            }
            self.report_transition(before, state.machine.state());
        }
    }

    /// Call [`tick`](Self::tick) every `tick_interval` until `cancel` fires.
    pub fn spawn_tick(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = self.context.config.tick_interval;
        self.runtime.clone().spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.tick(),
                }
            }
            self.stop();
            debug!("Tick task stopped");
        })
    }

    /// Start following the default output device, if an enumerator exists.
    pub fn spawn_device_monitor(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let monitor = Arc::clone(self.monitor.as_ref()?);
        let interval = self.context.config.device_poll_interval;
        let _guard = self.runtime.enter();
        Some(monitor.spawn(interval, cancel))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Cancel the current connection, forget its station and metadata, and
    /// advance the generation.
    fn teardown(&self, state: &mut SessionState) -> u64 {
        let generation = self.context.current_generation.fetch_add(1, Ordering::AcqRel) + 1;
        state.extractor.reset(generation);
        state.station = None;

        if let Some(mut connection) = state.connection.take() {
            debug!(generation = connection.generation, "Tearing down connection");
            connection.cancel.cancel();
            connection.release_output();
            if let Some(monitor) = &self.monitor {
                monitor.detach();
            }
        }
        generation
    }

    fn apply_message(&self, state: &mut SessionState, message: Message) {
        let current = state.connection.as_ref().map(|c| c.generation);
        if current != Some(message.generation) {
            debug!(
                generation = message.generation,
                current = ?current,
                kind = ?message.kind,
                "Discarding stale message"
            );
            match message.kind {
                MessageKind::SinkReady { sink, buffer } => {
                    buffer.close();
                    sink.stop();
                }
                MessageKind::SinkFailed { buffer, .. } => buffer.close(),
                _ => {}
            }
            return;
        }
        let generation = message.generation;

        match message.kind {
            MessageKind::Connected {
                meta_interval,
                station,
            } => {
                debug!(generation, meta_interval, "Connected");
                state.machine.on_connected();
                self.emit(PlaybackEvent::StationChanged {
                    name: station.name.clone(),
                });
                state.station = Some(station);
            }
            MessageKind::ConnectFailed { error } => {
                warn!(generation, error = %error, "Connection failed");
                self.record_error(state, error, false);
                state.machine.on_connect_failed();
                self.teardown(state);
            }
            MessageKind::Metadata { text } => {
                let previous = state.extractor.now_playing().clone();
                if state.extractor.on_metadata_block(generation, &text) {
                    let now_playing = state.extractor.now_playing();
                    if *now_playing != previous {
                        info!(generation, title = ?now_playing.title, "Now playing");
                        self.emit(PlaybackEvent::NowPlayingChanged {
                            title: now_playing.title.clone(),
                            tags: now_playing.icy_tags.clone(),
                        });
                    }
                }
            }
            MessageKind::SinkReady { sink, buffer } => {
                if let Some(connection) = state.connection.as_mut() {
                    connection.release_output();
                    connection.buffer = Some(buffer);
                    connection.output_error = None;
                }
                self.attach_sink(state, sink);
            }
            MessageKind::SinkFailed { buffer, error } => {
                warn!(generation, error = %error, "Output unavailable, decoding continues");
                self.record_error(state, error.clone(), true);
                if let Some(connection) = state.connection.as_mut() {
                    connection.release_output();
                    connection.buffer = Some(buffer);
                    connection.output_error = Some(error);
                }
            }
            MessageKind::SourceExhausted => {
                debug!(generation, "Source exhausted");
            }
            MessageKind::ConnectionLost { error } => {
                warn!(generation, error = %error, "Connection lost, draining buffer");
                self.record_error(state, error, true);
            }
            MessageKind::DecoderDrained => {
                if let Some(connection) = state.connection.as_mut() {
                    connection.drained = true;
                }
            }
            MessageKind::DecodeFailed { error } => {
                self.record_error(state, error, false);
                if let Some(command) = state.machine.fail() {
                    self.apply_command(state, command);
                }
            }
        }
    }

    /// Install `sink` for the current buffer, resuming it if already playing.
    fn attach_sink(&self, state: &mut SessionState, sink: Arc<dyn OutputSink>) {
        sink.set_gain(state.gain as f32);
        let Some(connection) = state.connection.as_mut() else {
            sink.stop();
            return;
        };
        connection.sink = Some(Arc::clone(&sink));

        if state.machine.state() == PlaybackState::Playing {
            if let Err(e) = sink.play() {
                warn!(error = %e, "Failed to resume output");
            }
        }
        if let Some(monitor) = &self.monitor {
            monitor.attach(sink);
        }
    }

    /// Try again to open the output for a buffer whose sink failed to open.
    fn retry_output(&self, state: &mut SessionState) {
        let Some(connection) = state.connection.as_mut() else {
            return;
        };
        if connection.sink.is_some() || connection.output_error.is_none() {
            return;
        }
        let Some(buffer) = connection.buffer.clone() else {
            return;
        };

        let source: Arc<dyn PcmSource> = buffer.clone();
        match self.context.audio_output.open(buffer.spec(), source) {
            Ok(sink) => {
                info!(generation = connection.generation, "Output opened on retry");
                let failed = connection.output_error.take();
                if state.last_error.is_some() && state.last_error == failed {
                    state.last_error = None;
                }
                self.attach_sink(state, sink);
            }
            Err(e) => {
                debug!(generation = connection.generation, error = %e, "Output still unavailable");
            }
        }
    }

    fn apply_command(&self, state: &mut SessionState, command: SinkCommand) {
        debug!(?command, "Sink command");
        match command {
            SinkCommand::Start => {
                if let Some(sink) = state.connection.as_ref().and_then(|c| c.sink.as_ref()) {
                    if let Err(e) = sink.play() {
                        warn!(error = %e, "Failed to start output");
                    }
                }
            }
            SinkCommand::Pause => {
                if let Some(sink) = state.connection.as_ref().and_then(|c| c.sink.as_ref()) {
                    if let Err(e) = sink.pause() {
                        warn!(error = %e, "Failed to pause output");
                    }
                }
            }
            SinkCommand::Stop => {
                self.teardown(state);
            }
        }
    }

    fn record_error(&self, state: &mut SessionState, error: String, recoverable: bool) {
        self.emit(PlaybackEvent::Error {
            message: error.clone(),
            recoverable,
        });
        // Keep the first error of a connection; later ones are consequences.
        state.last_error.get_or_insert(error);
    }

    fn report_transition(&self, from: PlaybackState, to: PlaybackState) {
        if from == to {
            return;
        }
        info!(%from, %to, "Playback state changed");
        self.emit(PlaybackEvent::StateChanged {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is not an error for the session.
        let _ = self.events.emit(CoreEvent::Playback(event));
    }

    #[cfg(test)]
    fn inject(&self, message: Message) {
        let _ = self.context.messages.send(message);
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(mut connection) = state.connection.take() {
            connection.cancel.cancel();
            connection.release_output();
        }
    }
}

/// Accept absolute `http`/`https` URLs only.
pub fn validate_stream_url(uri: &str) -> Result<()> {
    let uri = uri.trim();
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| PlaybackError::InvalidUrl(uri.to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let supported = scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https");
    if !supported || host.is_empty() || uri.contains(char::is_whitespace) {
        return Err(PlaybackError::InvalidUrl(uri.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ByteSource, FrameDecoder};
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpRequest, HttpStreamResponse};
    use bridge_traits::playback::{OutputDevice, PcmSource, PcmSpec};

    struct PendingHttp;

    #[async_trait]
    impl HttpClient for PendingHttp {
        async fn open_stream(&self, _request: HttpRequest) -> BridgeResult<HttpStreamResponse> {
            std::future::pending().await
        }
    }

    struct NoDecoder;

    impl DecoderFactory for NoDecoder {
        fn open(&self, _source: ByteSource, _ct: Option<&str>) -> Result<Box<dyn FrameDecoder>> {
            Err(PlaybackError::UnsupportedCodec("none".to_string()))
        }
    }

    #[derive(Default)]
    struct GainSink {
        gain: Mutex<f32>,
        stopped: Mutex<bool>,
    }

    impl OutputSink for GainSink {
        fn play(&self) -> BridgeResult<()> {
            Ok(())
        }
        fn pause(&self) -> BridgeResult<()> {
            Ok(())
        }
        fn stop(&self) {
            *self.stopped.lock() = true;
        }
        fn set_gain(&self, gain: f32) {
            *self.gain.lock() = gain;
        }
        fn gain(&self) -> f32 {
            *self.gain.lock()
        }
        fn device_name(&self) -> Option<String> {
            None
        }
        fn rebind(&self, _device: &OutputDevice) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NoOutput;

    impl AudioOutput for NoOutput {
        fn open(
            &self,
            _spec: PcmSpec,
            _source: Arc<dyn PcmSource>,
        ) -> BridgeResult<Arc<dyn OutputSink>> {
            Err(BridgeError::NotAvailable("audio".to_string()))
        }
    }

    fn session() -> StreamSession {
        let bridges = SessionBridges {
            http_client: Arc::new(PendingHttp),
            audio_output: Arc::new(NoOutput),
            device_enumerator: None,
            decoder_factory: Arc::new(NoDecoder),
        };
        let preferences = Configuration {
            volume: 0.5,
            ..Configuration::default()
        };
        StreamSession::new(
            bridges,
            EventBus::default(),
            StreamingConfig::default(),
            &preferences,
        )
        .unwrap()
    }

    fn ready_output(generation: u64) -> (Arc<GainSink>, Arc<JitterBuffer>, Message) {
        let sink = Arc::new(GainSink::default());
        let buffer = Arc::new(JitterBuffer::new(
            generation,
            PcmSpec::new(10, 1),
            Duration::from_secs(8),
        ));
        let message = Message::new(
            generation,
            MessageKind::SinkReady {
                sink: sink.clone(),
                buffer: Arc::clone(&buffer),
            },
        );
        (sink, buffer, message)
    }

    #[test]
    fn test_new_requires_runtime() {
        let bridges = SessionBridges {
            http_client: Arc::new(PendingHttp),
            audio_output: Arc::new(NoOutput),
            device_enumerator: None,
            decoder_factory: Arc::new(NoDecoder),
        };
        let result = StreamSession::new(
            bridges,
            EventBus::default(),
            StreamingConfig::default(),
            &Configuration::default(),
        );
        assert!(matches!(result, Err(PlaybackError::Internal(_))));
    }

    #[tokio::test]
    async fn test_initial_status() {
        let session = session();
        assert_eq!(session.state(), PlaybackState::Stopped);
        assert_eq!(session.status(), "State: Stopped\nVolume: 50%");
        assert_eq!(session.generation(), 0);
    }

    #[tokio::test]
    async fn test_play_rejects_invalid_url() {
        let session = session();
        assert!(matches!(
            session.play("not a url"),
            Err(PlaybackError::InvalidUrl(_))
        ));
        assert_eq!(session.state(), PlaybackState::Stopped);
        assert_eq!(session.generation(), 0);
    }

    #[tokio::test]
    async fn test_play_and_stop_bump_generation() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        assert_eq!(session.generation(), 1);
        assert_eq!(session.state(), PlaybackState::Connecting);

        session.stop();
        assert_eq!(session.generation(), 2);
        assert_eq!(session.state(), PlaybackState::Stopped);

        // Idempotent.
        session.stop();
        assert_eq!(session.state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn test_stale_messages_are_discarded() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        let stale = session.generation();
        session.play("http://radio.example/b").unwrap();
        let current = session.generation();

        session.inject(Message::new(
            stale,
            MessageKind::Metadata {
                text: "StreamTitle='A';".to_string(),
            },
        ));
        let (stale_sink, stale_buffer, ready) = ready_output(stale);
        session.inject(ready);
        session.inject(Message::new(
            current,
            MessageKind::Metadata {
                text: "StreamTitle='B';".to_string(),
            },
        ));
        session.tick();

        assert_eq!(session.now_playing().title.as_deref(), Some("B"));
        assert!(stale_buffer.is_closed());
        assert!(*stale_sink.stopped.lock());
    }

    #[tokio::test]
    async fn test_connect_flow_and_station() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        let generation = session.generation();

        session.inject(Message::new(
            generation,
            MessageKind::Connected {
                meta_interval: 16_000,
                station: StationInfo {
                    name: Some("Radio X".to_string()),
                    bitrate: Some(128),
                    ..StationInfo::default()
                },
            },
        ));
        session.tick();

        assert_eq!(session.state(), PlaybackState::Buffering);
        assert_eq!(
            session.status(),
            "State: Buffering\nVolume: 50%\nStation: Radio X (128 kbps)"
        );
    }

    #[tokio::test]
    async fn test_status_omits_unnamed_station() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        session.inject(Message::new(
            session.generation(),
            MessageKind::Connected {
                meta_interval: 0,
                station: StationInfo {
                    bitrate: Some(64),
                    ..StationInfo::default()
                },
            },
        ));
        session.tick();

        assert_eq!(session.status(), "State: Buffering\nVolume: 50%");
    }

    #[tokio::test]
    async fn test_stop_forgets_station_and_title() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        let generation = session.generation();
        session.inject(Message::new(
            generation,
            MessageKind::Connected {
                meta_interval: 16_000,
                station: StationInfo {
                    name: Some("Radio X".to_string()),
                    ..StationInfo::default()
                },
            },
        ));
        session.inject(Message::new(
            generation,
            MessageKind::Metadata {
                text: "StreamTitle='Song';".to_string(),
            },
        ));
        session.tick();
        assert!(session.status().contains("Title: Song"));

        session.stop();
        assert_eq!(session.station(), None);
        assert!(session.now_playing().is_empty());
        assert_eq!(session.status(), "State: Stopped\nVolume: 50%");
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_connection() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        let generation = session.generation();
        let buffer = Arc::new(JitterBuffer::new(
            generation,
            PcmSpec::new(10, 1),
            Duration::from_secs(8),
        ));
        session.inject(Message::new(
            generation,
            MessageKind::Connected {
                meta_interval: 0,
                station: StationInfo::default(),
            },
        ));
        session.inject(Message::new(
            generation,
            MessageKind::SinkFailed {
                buffer: Arc::clone(&buffer),
                error: "Output unavailable: busy".to_string(),
            },
        ));
        session.tick();
        // NoOutput keeps failing; every tick retries without tearing down.
        session.tick();

        assert_eq!(session.state(), PlaybackState::Buffering);
        assert!(!buffer.is_closed());
        assert_eq!(session.generation(), generation);
        assert_eq!(
            session.last_error().as_deref(),
            Some("Output unavailable: busy")
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        let generation = session.generation();

        session.inject(Message::new(
            generation,
            MessageKind::ConnectFailed {
                error: "connection refused".to_string(),
            },
        ));
        session.tick();

        assert_eq!(session.state(), PlaybackState::Stopped);
        assert_eq!(session.last_error().as_deref(), Some("connection refused"));
        assert!(session.status().ends_with("Error: connection refused"));

        // A new play clears the error.
        session.play("http://radio.example/b").unwrap();
        assert_eq!(session.last_error(), None);
    }

    #[tokio::test]
    async fn test_volume_clamps_and_reaches_sink() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        let (sink, _buffer, ready) = ready_output(session.generation());
        session.inject(ready);
        session.tick();
        assert!((sink.gain() - 0.5).abs() < f32::EPSILON);

        assert_eq!(session.volume(150.0), 1.0);
        assert_eq!(session.volume(-10.0), 0.0);
        assert_eq!(session.volume(f64::NAN), 0.0);
        assert_eq!(session.volume(40.0), 0.4);
        assert!((sink.gain() - 0.4).abs() < f32::EPSILON);

        assert!((session.volume_up(DEFAULT_VOLUME_STEP) - 0.5).abs() < 1e-9);
        assert!((session.volume_down(25.0) - 0.25).abs() < 1e-9);
        assert_eq!(session.volume_down(100.0), 0.0);
    }

    #[tokio::test]
    async fn test_decode_failure_stops() {
        let session = session();
        session.play("http://radio.example/a").unwrap();
        let generation = session.generation();
        let (sink, buffer, ready) = ready_output(generation);
        session.inject(ready);
        session.inject(Message::new(
            generation,
            MessageKind::DecodeFailed {
                error: "bad frames".to_string(),
            },
        ));
        session.tick();

        assert_eq!(session.state(), PlaybackState::Stopped);
        assert!(*sink.stopped.lock());
        assert!(buffer.is_closed());
    }

    #[test]
    fn test_validate_stream_url() {
        assert!(validate_stream_url("http://radio.example/live").is_ok());
        assert!(validate_stream_url("HTTPS://radio.example:8443").is_ok());
        assert!(validate_stream_url("ftp://radio.example/live").is_err());
        assert!(validate_stream_url("http:///live").is_err());
        assert!(validate_stream_url("radio.example/live").is_err());
        assert!(validate_stream_url("").is_err());
    }
}
