//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, audio output,
//! device enumeration, settings) into the playback engine and exposes the
//! line-oriented command front end. Desktop apps typically enable the
//! `desktop-shims` feature, which lets [`CoreConfig`] fill in reqwest, cpal
//! and JSON-file implementations.

pub mod commands;
pub mod error;

pub use commands::{Command, CommandError};
pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::storage::SettingsStore;
use core_playback::{
    DecoderFactory, SessionBridges, StreamSession, StreamingConfig, DEFAULT_VOLUME_STEP,
};
use core_runtime::config::{Configuration, CoreConfig};
use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Lines to show to the user.
    pub lines: Vec<String>,
    /// The front end should exit.
    pub exit: bool,
}

impl CommandOutcome {
    fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            exit: false,
        }
    }

    fn exit() -> Self {
        Self {
            lines: Vec::new(),
            exit: true,
        }
    }
}

/// Line to print for an unsolicited event, if the front end shows it.
///
/// Device switches and new stream titles are announced; everything else
/// is reachable through `--status`.
pub fn event_notice(event: &CoreEvent) -> Option<String> {
    match event {
        CoreEvent::Playback(PlaybackEvent::DeviceChanged { name }) => {
            Some(format!("Changed device for playing to {}", name))
        }
        CoreEvent::Playback(PlaybackEvent::NowPlayingChanged {
            title: Some(title), ..
        }) => Some(format!("Now playing: {}", title)),
        _ => None,
    }
}

/// Primary façade exposed to host applications.
pub struct RadioService {
    session: Arc<StreamSession>,
    settings: Arc<dyn SettingsStore>,
    events: EventBus,
    background: CancellationToken,
}

impl RadioService {
    /// Create a service decoding with Symphonia.
    pub async fn new(core: CoreConfig, streaming: StreamingConfig) -> Result<Self> {
        Self::with_decoder(
            core,
            streaming,
            Arc::new(core_playback::SymphoniaDecoderFactory::new()),
        )
        .await
    }

    /// Create a service with a custom decoder factory.
    pub async fn with_decoder(
        core: CoreConfig,
        streaming: StreamingConfig,
        decoder_factory: Arc<dyn DecoderFactory>,
    ) -> Result<Self> {
        core.validate()?;
        let preferences = Configuration::load(core.settings_store.as_ref()).await?;
        info!(
            volume = preferences.volume,
            device_following = core.device_enumerator.is_some(),
            "Radio service starting"
        );

        let bridges = SessionBridges::from_core(&core, decoder_factory);
        let session = StreamSession::new(bridges, core.event_bus.clone(), streaming, &preferences)?;

        Ok(Self {
            session: Arc::new(session),
            settings: core.settings_store,
            events: core.event_bus,
            background: CancellationToken::new(),
        })
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// Subscribe to playback events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Start the tick task and, when available, the device monitor.
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut handles = vec![Arc::clone(&self.session).spawn_tick(self.background.child_token())];
        if let Some(monitor) = self
            .session
            .spawn_device_monitor(self.background.child_token())
        {
            handles.push(monitor);
        }
        debug!(tasks = handles.len(), "Background tasks started");
        handles
    }

    /// Stop playback and background tasks.
    pub fn shutdown(&self) {
        self.background.cancel();
        self.session.stop();
    }

    /// Parse and run one input line.
    pub async fn handle_line(&self, line: &str) -> CommandOutcome {
        match Command::parse(line) {
            Ok(Some(command)) => match self.execute(command).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Command failed");
                    CommandOutcome::line(e.to_string())
                }
            },
            Ok(None) => CommandOutcome::default(),
            Err(e) => CommandOutcome::line(e.to_string()),
        }
    }

    /// Run a command. Settings changes are persisted before returning.
    #[instrument(skip(self))]
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome> {
        let outcome = match command {
            Command::Help => CommandOutcome {
                lines: commands::HELP.lines().map(str::to_string).collect(),
                exit: false,
            },
            Command::Status => CommandOutcome::line(self.session.status()),
            Command::Play(Some(uri)) => {
                if self.session.play(&uri).is_err() {
                    return Ok(CommandOutcome::line(CommandError::InvalidUrl.to_string()));
                }
                Configuration::save_link(self.settings.as_ref(), &uri).await?;
                self.session.set_default_uri(uri);
                CommandOutcome::default()
            }
            Command::Play(None) => {
                self.session.play_default()?;
                CommandOutcome::default()
            }
            Command::Pause => {
                self.session.pause();
                CommandOutcome::default()
            }
            Command::Start => {
                self.session.start();
                CommandOutcome::default()
            }
            Command::Stop => {
                self.shutdown();
                CommandOutcome::exit()
            }
            Command::Volume(percent) => self.persist_volume(self.session.volume(percent)).await?,
            Command::VolumeUp(delta) => {
                let gain = self
                    .session
                    .volume_up(delta.unwrap_or(DEFAULT_VOLUME_STEP));
                self.persist_volume(gain).await?
            }
            Command::VolumeDown(delta) => {
                let gain = self
                    .session
                    .volume_down(delta.unwrap_or(DEFAULT_VOLUME_STEP));
                self.persist_volume(gain).await?
            }
            Command::Database(uri) => {
                Configuration::save_database_link(self.settings.as_ref(), &uri).await?;
                CommandOutcome::default()
            }
        };
        Ok(outcome)
    }

    async fn persist_volume(&self, gain: f64) -> Result<CommandOutcome> {
        Configuration::save_volume(self.settings.as_ref(), gain).await?;
        Ok(CommandOutcome::line(format!(
            "Volume: {}%",
            (gain * 100.0).round() as i64
        )))
    }
}

impl Drop for RadioService {
    fn drop(&mut self) {
        self.background.cancel();
    }
}
