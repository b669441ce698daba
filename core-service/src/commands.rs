//! Line-oriented command parsing.
//!
//! One input line is split on whitespace; the first word selects the command
//! and the rest are its arguments. An empty line asks for the status and
//! unknown words are ignored.

use core_playback::session::validate_stream_url;
use thiserror::Error;

/// A parsed user command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    /// Play a stream; `None` plays the configured link.
    Play(Option<String>),
    Pause,
    Start,
    /// Stop playback and exit.
    Stop,
    /// Set the volume in percent.
    Volume(f64),
    /// Raise the volume by a percentage, or the default step.
    VolumeUp(Option<f64>),
    /// Lower the volume by a percentage, or the default step.
    VolumeDown(Option<f64>),
    /// Store a new station database link. Only persisted; playback never
    /// reads it.
    Database(String),
    Status,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Can't parse volume value")]
    InvalidVolume,

    #[error("Can't parse provided url")]
    InvalidUrl,
}

impl Command {
    /// Parse one input line.
    ///
    /// Returns `Ok(None)` for input that is not a command.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(Some(Command::Status));
        };
        let argument = parts.next();

        let command = match name {
            "status" => Command::Status,
            "-h" | "--help" => Command::Help,
            "-p" | "--play" => match argument {
                Some(uri) => {
                    validate_stream_url(uri).map_err(|_| CommandError::InvalidUrl)?;
                    Command::Play(Some(uri.to_string()))
                }
                None => Command::Play(None),
            },
            "-pa" | "--pause" => Command::Pause,
            "-st" | "--start" => Command::Start,
            "-s" | "--stop" => Command::Stop,
            "-v" | "--volume" => {
                let value = argument
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .ok_or(CommandError::InvalidVolume)?;
                Command::Volume(value)
            }
            // An unreadable delta falls back to the default step.
            "-vu" | "--volumeUp" => Command::VolumeUp(parse_delta(argument)),
            "-vd" | "--volumeDown" => Command::VolumeDown(parse_delta(argument)),
            "-db" | "--database" => {
                let uri = argument.ok_or(CommandError::InvalidUrl)?;
                validate_stream_url(uri).map_err(|_| CommandError::InvalidUrl)?;
                Command::Database(uri.to_string())
            }
            _ => return Ok(None),
        };

        Ok(Some(command))
    }
}

fn parse_delta(argument: Option<&str>) -> Option<f64> {
    argument
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Text printed by `--help`.
pub const HELP: &str = "\
List of supported commands:
  -h, --help: Show description of all commands;
  -p [uri], --play [uri]: Play the stream at [uri], or the saved link;
  -pa, --pause: Pause playing;
  -st, --start: Start play after pause;
  -v {value}, --volume {value}: Set volume to {value}%;
  -vu [delta], --volumeUp [delta]: Increase volume by 10% or defined by [delta]%;
  -vd [delta], --volumeDown [delta]: Decrease volume by 10% or defined by [delta]%;
  -s, --stop: Stop playing and exit;
  -db {uri}, --database {uri}: Change link to station database;
  status (or empty line): Show playback status.";
