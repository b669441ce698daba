//! # Playback State Machine
//!
//! Pure, synchronous transition logic. The session feeds it lifecycle calls
//! and periodic [`BufferSnapshot`]s and applies the returned [`SinkCommand`]s
//! to the output device.
//!
//! ```text
//!            play            on_connected         buffered >= high
//! Stopped ─────────▶ Connecting ─────────▶ Buffering ─────────────▶ Playing
//!    ▲                    │                  ▲    │ ◀─────────────────┘
//!    │  on_connect_failed │                  │    │   buffered < low
//!    └────────────────────┘           start  │    │ pause
//!                                            │    ▼
//!                                           Paused
//! ```
//!
//! `stop`, `fail` and a drained, exhausted source lead to `Stopped` from any
//! active state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Connecting,
    Buffering,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Returns `true` while a connection is held.
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackState::Stopped)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Connecting => "Connecting",
            PlaybackState::Buffering => "Buffering",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        };
        f.write_str(name)
    }
}

/// Action the session must apply to the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCommand {
    Start,
    Pause,
    Stop,
}

/// Buffer observations for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferSnapshot {
    pub buffered: Duration,
    /// No more audio will be pushed for this connection.
    pub source_exhausted: bool,
}

/// The transition table of a streaming session.
#[derive(Debug, Clone)]
pub struct PlaybackStateMachine {
    state: PlaybackState,
    low_water: Duration,
    high_water: Duration,
}

impl PlaybackStateMachine {
    pub fn new(low_water: Duration, high_water: Duration) -> Self {
        Self {
            state: PlaybackState::Stopped,
            low_water,
            high_water,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn low_water(&self) -> Duration {
        self.low_water
    }

    pub fn high_water(&self) -> Duration {
        self.high_water
    }

    /// A new connection is being opened. Valid from any state.
    pub fn play(&mut self) {
        self.state = PlaybackState::Connecting;
    }

    /// The response head arrived.
    pub fn on_connected(&mut self) {
        if self.state == PlaybackState::Connecting {
            self.state = PlaybackState::Buffering;
        }
    }

    /// The connection could not be established.
    pub fn on_connect_failed(&mut self) {
        if self.state == PlaybackState::Connecting {
            self.state = PlaybackState::Stopped;
        }
    }

    /// Suspend output. Ignored unless buffering or playing.
    pub fn pause(&mut self) -> Option<SinkCommand> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Buffering => {
                self.state = PlaybackState::Paused;
                Some(SinkCommand::Pause)
            }
            _ => None,
        }
    }

    /// Resume after `pause`. Output restarts once the buffer refills.
    pub fn start(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Buffering;
        }
    }

    /// Stop from any state; a no-op when already stopped.
    pub fn stop(&mut self) -> Option<SinkCommand> {
        if self.state == PlaybackState::Stopped {
            return None;
        }
        self.state = PlaybackState::Stopped;
        Some(SinkCommand::Stop)
    }

    /// A fatal decode or sink error occurred.
    pub fn fail(&mut self) -> Option<SinkCommand> {
        self.stop()
    }

    /// Evaluate the buffer thresholds.
    pub fn tick(&mut self, snapshot: BufferSnapshot) -> Option<SinkCommand> {
        let empty = snapshot.buffered.is_zero();

        match self.state {
            PlaybackState::Buffering | PlaybackState::Playing
                if snapshot.source_exhausted && empty =>
            {
                self.state = PlaybackState::Stopped;
                Some(SinkCommand::Stop)
            }
            PlaybackState::Buffering
                if snapshot.buffered >= self.high_water
                    || (snapshot.source_exhausted && !empty) =>
            {
                self.state = PlaybackState::Playing;
                Some(SinkCommand::Start)
            }
            PlaybackState::Playing
                if snapshot.buffered < self.low_water && !snapshot.source_exhausted =>
            {
                self.state = PlaybackState::Buffering;
                Some(SinkCommand::Pause)
            }
            _ => None,
        }
    }
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(buffered_ms: u64, source_exhausted: bool) -> BufferSnapshot {
        BufferSnapshot {
            buffered: Duration::from_millis(buffered_ms),
            source_exhausted,
        }
    }

    fn buffering() -> PlaybackStateMachine {
        let mut machine = PlaybackStateMachine::default();
        machine.play();
        machine.on_connected();
        machine
    }

    #[test]
    fn test_fill_reaches_playing() {
        let mut machine = buffering();
        assert_eq!(machine.state(), PlaybackState::Buffering);

        assert_eq!(machine.tick(snapshot(3_999, false)), None);
        assert_eq!(machine.tick(snapshot(4_000, false)), Some(SinkCommand::Start));
        assert_eq!(machine.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_drain_returns_to_buffering() {
        let mut machine = buffering();
        machine.tick(snapshot(5_000, false));

        assert_eq!(machine.tick(snapshot(500, false)), None);
        assert_eq!(machine.tick(snapshot(499, false)), Some(SinkCommand::Pause));
        assert_eq!(machine.state(), PlaybackState::Buffering);
    }

    #[test]
    fn test_exhausted_source_plays_out_then_stops() {
        let mut machine = buffering();

        // Short stream that never reaches high water.
        assert_eq!(machine.tick(snapshot(200, true)), Some(SinkCommand::Start));
        assert_eq!(machine.tick(snapshot(100, true)), None);
        assert_eq!(machine.state(), PlaybackState::Playing);

        assert_eq!(machine.tick(snapshot(0, true)), Some(SinkCommand::Stop));
        assert_eq!(machine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_drain_check_wins_over_thresholds() {
        let mut machine = buffering();
        assert_eq!(machine.tick(snapshot(0, true)), Some(SinkCommand::Stop));
        assert_eq!(machine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_connect_failure() {
        let mut machine = PlaybackStateMachine::default();
        machine.play();
        machine.on_connect_failed();
        assert_eq!(machine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_pause_and_start() {
        let mut machine = buffering();
        machine.tick(snapshot(4_000, false));

        assert_eq!(machine.pause(), Some(SinkCommand::Pause));
        assert_eq!(machine.state(), PlaybackState::Paused);
        assert_eq!(machine.tick(snapshot(8_000, false)), None);
        assert_eq!(machine.pause(), None);

        machine.start();
        assert_eq!(machine.state(), PlaybackState::Buffering);
        assert_eq!(machine.tick(snapshot(8_000, false)), Some(SinkCommand::Start));
    }

    #[test]
    fn test_pause_and_start_ignored_when_invalid() {
        let mut machine = PlaybackStateMachine::default();
        assert_eq!(machine.pause(), None);
        machine.start();
        assert_eq!(machine.state(), PlaybackState::Stopped);

        machine.play();
        assert_eq!(machine.pause(), None);
        assert_eq!(machine.state(), PlaybackState::Connecting);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut machine = buffering();
        assert_eq!(machine.stop(), Some(SinkCommand::Stop));
        assert_eq!(machine.stop(), None);
        assert_eq!(machine.fail(), None);
        assert_eq!(machine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_fail_from_paused() {
        let mut machine = buffering();
        machine.pause();
        assert_eq!(machine.fail(), Some(SinkCommand::Stop));
        assert_eq!(machine.state(), PlaybackState::Stopped);
    }
}
