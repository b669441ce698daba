//! # Stream Metadata
//!
//! Parses in-band metadata blocks into [`NowPlaying`] and response headers
//! into [`StationInfo`].
//!
//! Two block dialects are understood:
//!
//! - **Shoutcast**: `StreamTitle='Artist - Song';StreamUrl='http://...';`.
//!   Values are single-quoted and end only at `';`, so apostrophes inside a
//!   title survive. Unquoted values end at `;`.
//! - **Icecast/Ogg comments**: `artist=...` and `title=...` entries separated
//!   by newline, NUL or `;`. Keys are case-insensitive.

use bridge_traits::http::HttpStreamResponse;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the station reports as currently playing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: Option<String>,
    /// Remaining `key=value` pairs joined by `"; "`.
    pub icy_tags: Option<String>,
}

impl NowPlaying {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.icy_tags.is_none()
    }
}

/// Station details announced in the `icy-*` response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationInfo {
    pub name: Option<String>,
    pub genre: Option<String>,
    pub url: Option<String>,
    /// Nominal bitrate in kbps.
    pub bitrate: Option<u32>,
    pub content_type: Option<String>,
}

impl StationInfo {
    pub fn from_response(response: &HttpStreamResponse) -> Self {
        let text = |name: &str| {
            response
                .header(name)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Self {
            name: text("icy-name"),
            genre: text("icy-genre"),
            url: text("icy-url"),
            bitrate: text("icy-br").and_then(|br| {
                // Some servers send "128,128" for multi-rate mounts.
                br.split(',').next().and_then(|v| v.trim().parse().ok())
            }),
            content_type: text("content-type"),
        }
    }

    /// Name and bitrate for display. `None` when the station sent no name.
    pub fn label(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        Some(match self.bitrate {
            Some(bitrate) => format!("{} ({} kbps)", name, bitrate),
            None => name.to_string(),
        })
    }
}


/// Tracks [`NowPlaying`] for the current connection generation.
#[derive(Debug, Default)]
pub struct MetadataExtractor {
    generation: u64,
    now_playing: NowPlaying,
}

impl MetadataExtractor {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            now_playing: NowPlaying::default(),
        }
    }

    /// Forget the previous connection's metadata.
    pub fn reset(&mut self, generation: u64) {
        self.generation = generation;
        self.now_playing = NowPlaying::default();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn now_playing(&self) -> &NowPlaying {
        &self.now_playing
    }

    /// Apply a metadata block.
    ///
    /// Blocks from other generations are dropped and `false` is returned.
    pub fn on_metadata_block(&mut self, generation: u64, raw: &str) -> bool {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Dropping stale metadata block"
            );
            return false;
        }

        self.now_playing = parse_metadata(raw);
        true
    }
}

/// Parse a metadata block in either dialect.
pub fn parse_metadata(raw: &str) -> NowPlaying {
    let pairs = if is_shoutcast(raw) {
        parse_shoutcast_pairs(raw)
    } else {
        parse_comment_pairs(raw)
    };

    let mut stream_title = None;
    let mut artist = None;
    let mut title = None;
    let mut tags = Vec::new();

    for (key, value) in pairs {
        if value.is_empty() {
            continue;
        }
        match key.to_ascii_lowercase().as_str() {
            "streamtitle" => stream_title = Some(value),
            "artist" => artist = Some(value),
            "title" => title = Some(value),
            _ => tags.push(format!("{}={}", key, value)),
        }
    }

    let title = stream_title.or(match (title, artist) {
        (Some(title), Some(artist)) => Some(format!("{} - {}", title, artist)),
        (title, artist) => title.or(artist),
    });

    NowPlaying {
        title,
        icy_tags: if tags.is_empty() {
            None
        } else {
            Some(tags.join("; "))
        },
    }
}

fn is_shoutcast(raw: &str) -> bool {
    raw.contains("='") || raw.to_ascii_lowercase().contains("streamtitle=")
}

fn parse_shoutcast_pairs(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = raw;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_whitespace() || c == '\0');
        if rest.is_empty() {
            break;
        }

        let Some((key, after_key)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().to_string();

        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('\'') {
            match quoted.find("';") {
                Some(end) => (&quoted[..end], &quoted[end + 2..]),
                None => (quoted.strip_suffix('\'').unwrap_or(quoted), ""),
            }
        } else {
            match after_key.find(';') {
                Some(end) => (&after_key[..end], &after_key[end + 1..]),
                None => (after_key, ""),
            }
        };

        if !key.is_empty() {
            pairs.push((key, value.trim().to_string()));
        }
        rest = remainder;
    }

    pairs
}

fn parse_comment_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(['\n', '\0', ';'])
        .filter_map(|entry| {
            let (key, value) = entry.trim().split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
