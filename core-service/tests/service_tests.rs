//! Command front end tests for RadioService
//!
//! All bridges are fakes: no network, no audio hardware.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpStreamResponse};
use bridge_traits::playback::{
    AudioOutput, DeviceEnumerator, OutputDevice, OutputSink, PcmSource, PcmSpec,
};
use bridge_traits::storage::SettingsStore;
use core_playback::{
    ByteSource, DecoderFactory, FrameDecoder, PlaybackError, PlaybackState, StreamingConfig,
};
use core_runtime::config::{CoreConfig, DATABASE_LINK_KEY, LINK_KEY, VOLUME_KEY};
use core_runtime::events::{CoreEvent, PlaybackEvent};
use core_service::{event_notice, CommandOutcome, RadioService};
use mockall::mock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Fakes
// ============================================================================

struct OfflineHttp;

#[async_trait]
impl HttpClient for OfflineHttp {
    async fn open_stream(&self, request: HttpRequest) -> BridgeResult<HttpStreamResponse> {
        Err(BridgeError::HttpStatus {
            status: 503,
            url: request.url,
        })
    }
}

struct NoAudio;

impl AudioOutput for NoAudio {
    fn open(
        &self,
        _spec: PcmSpec,
        _source: Arc<dyn PcmSource>,
    ) -> BridgeResult<Arc<dyn OutputSink>> {
        Err(BridgeError::NotAvailable("audio".to_string()))
    }
}

struct NoDevices;

impl DeviceEnumerator for NoDevices {
    fn output_devices(&self) -> BridgeResult<Vec<OutputDevice>> {
        Ok(Vec::new())
    }
}

struct NoDecoder;

impl DecoderFactory for NoDecoder {
    fn open(
        &self,
        _source: ByteSource,
        _content_type: Option<&str>,
    ) -> core_playback::Result<Box<dyn FrameDecoder>> {
        Err(PlaybackError::UnsupportedCodec("test".to_string()))
    }
}

#[derive(Default)]
struct MemorySettings {
    strings: Mutex<HashMap<String, String>>,
    numbers: Mutex<HashMap<String, f64>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.strings.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.strings.lock().get(key).cloned())
    }

    async fn set_f64(&self, key: &str, value: f64) -> BridgeResult<()> {
        self.numbers.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_f64(&self, key: &str) -> BridgeResult<Option<f64>> {
        Ok(self.numbers.lock().get(key).copied())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.strings.lock().remove(key);
        self.numbers.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        let mut keys: Vec<String> = self.strings.lock().keys().cloned().collect();
        keys.extend(self.numbers.lock().keys().cloned());
        Ok(keys)
    }
}

mock! {
    Settings {}

    #[async_trait]
    impl SettingsStore for Settings {
        async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()>;
        async fn get_string(&self, key: &str) -> BridgeResult<Option<String>>;
        async fn set_f64(&self, key: &str, value: f64) -> BridgeResult<()>;
        async fn get_f64(&self, key: &str) -> BridgeResult<Option<f64>>;
        async fn delete(&self, key: &str) -> BridgeResult<()>;
        async fn list_keys(&self) -> BridgeResult<Vec<String>>;
    }
}

fn core_config(settings: Arc<dyn SettingsStore>) -> CoreConfig {
    CoreConfig::builder()
        .http_client(Arc::new(OfflineHttp))
        .audio_output(Arc::new(NoAudio))
        .device_enumerator(Arc::new(NoDevices))
        .settings_store(settings)
        .build()
        .expect("core config")
}

async fn service(settings: Arc<MemorySettings>) -> RadioService {
    RadioService::with_decoder(
        core_config(settings),
        StreamingConfig::default(),
        Arc::new(NoDecoder),
    )
    .await
    .expect("service")
}

fn text(outcome: &CommandOutcome) -> String {
    outcome.lines.join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_initial_volume_comes_from_settings() {
    let settings = Arc::new(MemorySettings::default());
    settings.set_f64(VOLUME_KEY, 0.5).await.unwrap();

    let service = service(settings).await;
    let outcome = service.handle_line("").await;

    assert_eq!(text(&outcome), "State: Stopped\nVolume: 50%");
    assert!(!outcome.exit);
}

#[tokio::test]
async fn test_volume_commands_persist_gain() {
    let settings = Arc::new(MemorySettings::default());
    let service = service(Arc::clone(&settings)).await;

    assert_eq!(text(&service.handle_line("-v 150").await), "Volume: 100%");
    assert_eq!(settings.get_f64(VOLUME_KEY).await.unwrap(), Some(1.0));

    assert_eq!(text(&service.handle_line("--volume -10").await), "Volume: 0%");
    assert_eq!(settings.get_f64(VOLUME_KEY).await.unwrap(), Some(0.0));

    assert_eq!(text(&service.handle_line("-vu").await), "Volume: 10%");
    assert_eq!(text(&service.handle_line("-vu 25").await), "Volume: 35%");
    assert_eq!(text(&service.handle_line("--volumeDown 5").await), "Volume: 30%");
    let saved = settings.get_f64(VOLUME_KEY).await.unwrap().unwrap();
    assert!((saved - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_unparseable_volume() {
    let settings = Arc::new(MemorySettings::default());
    let service = service(Arc::clone(&settings)).await;

    assert_eq!(
        text(&service.handle_line("-v loud").await),
        "Can't parse volume value"
    );
    assert_eq!(settings.get_f64(VOLUME_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_play_saves_link() {
    let settings = Arc::new(MemorySettings::default());
    let service = service(Arc::clone(&settings)).await;

    let outcome = service.handle_line("-p http://radio.example/jazz").await;
    assert!(outcome.lines.is_empty());
    assert_eq!(service.session().state(), PlaybackState::Connecting);
    assert_eq!(
        settings.get_string(LINK_KEY).await.unwrap().as_deref(),
        Some("http://radio.example/jazz")
    );

    assert_eq!(
        text(&service.handle_line("--play jazz").await),
        "Can't parse provided url"
    );
    service.shutdown();
}

#[tokio::test]
async fn test_play_without_argument_uses_saved_link() {
    let settings = Arc::new(MemorySettings::default());
    settings
        .set_string(LINK_KEY, "http://radio.example/saved")
        .await
        .unwrap();
    let service = service(Arc::clone(&settings)).await;

    service.handle_line("-p").await;
    assert_eq!(service.session().state(), PlaybackState::Connecting);
    assert_eq!(service.session().generation(), 1);
    service.shutdown();
}

#[tokio::test]
async fn test_pause_and_start_outside_playback_are_ignored() {
    let service = service(Arc::new(MemorySettings::default())).await;

    assert!(service.handle_line("-pa").await.lines.is_empty());
    assert!(service.handle_line("--start").await.lines.is_empty());
    assert_eq!(service.session().state(), PlaybackState::Stopped);
}

#[tokio::test]
async fn test_database_link_is_stored() {
    let settings = Arc::new(MemorySettings::default());
    let service = service(Arc::clone(&settings)).await;

    service
        .handle_line("-db https://example.com/stations.json")
        .await;
    assert_eq!(
        settings
            .get_string(DATABASE_LINK_KEY)
            .await
            .unwrap()
            .as_deref(),
        Some("https://example.com/stations.json")
    );

    assert_eq!(
        text(&service.handle_line("--database nowhere").await),
        "Can't parse provided url"
    );
}

#[tokio::test]
async fn test_database_link_leaves_playback_alone() {
    let settings = Arc::new(MemorySettings::default());
    let service = service(Arc::clone(&settings)).await;

    service.handle_line("-p http://radio.example/jazz").await;
    let generation = service.session().generation();

    let outcome = service
        .handle_line("-db https://example.com/stations.json")
        .await;
    assert!(outcome.lines.is_empty());
    assert_eq!(service.session().generation(), generation);
    assert_eq!(service.session().state(), PlaybackState::Connecting);
    assert_eq!(
        settings.get_string(LINK_KEY).await.unwrap().as_deref(),
        Some("http://radio.example/jazz")
    );
    service.shutdown();
}

#[tokio::test]
async fn test_stop_exits() {
    let service = service(Arc::new(MemorySettings::default())).await;
    service.handle_line("-p http://radio.example/jazz").await;

    let outcome = service.handle_line("--stop").await;
    assert!(outcome.exit);
    assert_eq!(service.session().state(), PlaybackState::Stopped);
}

#[tokio::test]
async fn test_help_and_unknown_input() {
    let service = service(Arc::new(MemorySettings::default())).await;

    let help = service.handle_line("-h").await;
    assert_eq!(help.lines[0], "List of supported commands:");
    assert!(help.lines.iter().any(|l| l.contains("--volumeUp")));

    assert_eq!(service.handle_line("what").await, CommandOutcome::default());
}

#[tokio::test]
async fn test_settings_failure_is_reported() {
    let mut settings = MockSettings::new();
    settings.expect_get_f64().returning(|_| Ok(None));
    settings.expect_get_string().returning(|_| Ok(None));
    settings
        .expect_set_f64()
        .withf(|key, value| key == VOLUME_KEY && *value == 0.4)
        .times(1)
        .returning(|_, _| Err(BridgeError::OperationFailed("disk full".to_string())));

    let service = RadioService::with_decoder(
        core_config(Arc::new(settings)),
        StreamingConfig::default(),
        Arc::new(NoDecoder),
    )
    .await
    .unwrap();

    let outcome = service.handle_line("-v 40").await;
    assert!(text(&outcome).contains("disk full"));
    // The live gain changed even though saving failed.
    assert!((service.session().gain() - 0.4).abs() < 1e-9);
}

#[test]
fn test_event_notices() {
    let device = CoreEvent::Playback(PlaybackEvent::DeviceChanged {
        name: "USB Headset".to_string(),
    });
    assert_eq!(
        event_notice(&device).as_deref(),
        Some("Changed device for playing to USB Headset")
    );

    let title = CoreEvent::Playback(PlaybackEvent::NowPlayingChanged {
        title: Some("Artist - Song".to_string()),
        tags: None,
    });
    assert_eq!(
        event_notice(&title).as_deref(),
        Some("Now playing: Artist - Song")
    );

    let cleared = CoreEvent::Playback(PlaybackEvent::NowPlayingChanged {
        title: None,
        tags: None,
    });
    assert_eq!(event_notice(&cleared), None);

    let state = CoreEvent::Playback(PlaybackEvent::StateChanged {
        from: "Stopped".to_string(),
        to: "Connecting".to_string(),
    });
    assert_eq!(event_notice(&state), None);
}
