//! Canonical playback state and its conversions

use std::collections::BTreeSet;

use rspotify::model::{CurrentPlaybackContext, PlayableItem};
use rspotify::prelude::Id;
use tokio::time::Instant;

use super::types::{Capability, DeviceRef, RepeatMode, Track};

/// Which source produced the current canonical state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Local,
    Remote,
}

/// Single shared description of "what is playing right now".
///
/// Readers receive it behind an `Arc` and must treat each revision as
/// immutable; the reconciler replaces the whole value on every update.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Last known authoritative position.
    pub progress_ms: u64,
    /// Wall-clock time (unix ms) at which `progress_ms` was observed.
    pub timestamp_ms: i64,
    /// Monotonic counterpart of `timestamp_ms`, the interpolation baseline.
    pub observed_at: Instant,
    pub track: Option<Track>,
    pub device: Option<DeviceRef>,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub context_uri: Option<String>,
    pub disallows: BTreeSet<Capability>,
    pub source: Option<Source>,
    pub revision: u64,
    pub optimistic: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            progress_ms: 0,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            observed_at: Instant::now(),
            track: None,
            device: None,
            shuffle: false,
            repeat: RepeatMode::Off,
            context_uri: None,
            disallows: BTreeSet::new(),
            source: None,
            revision: 0,
            optimistic: false,
        }
    }
}

impl PlaybackState {
    pub fn track_id(&self) -> Option<&str> {
        self.track.as_ref().map(|t| t.id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.track.as_ref().map(|t| t.duration_ms).filter(|d| *d > 0)
    }

    pub fn allows(&self, capability: Capability) -> bool {
        !self.disallows.contains(&capability)
    }

    pub fn volume_percent(&self) -> Option<u8> {
        self.device.as_ref().and_then(|d| d.volume_percent)
    }

    /// Position implied by the baseline at `now`, clamped to the track length.
    pub fn position_at(&self, now: Instant) -> u64 {
        let position = if self.is_playing {
            let elapsed = now.saturating_duration_since(self.observed_at).as_millis() as u64;
            self.progress_ms.saturating_add(elapsed)
        } else {
            self.progress_ms
        };

        match self.duration_ms() {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    /// Move the baseline to `now` without changing the implied position.
    pub fn rebase(&mut self, now: Instant) {
        self.progress_ms = self.position_at(now);
        self.observed_at = now;
        self.timestamp_ms = chrono::Utc::now().timestamp_millis();
    }

    pub fn from_playback(playback: &CurrentPlaybackContext) -> Self {
        let track = playback.item.as_ref().and_then(track_from_item);

        let disallows = playback
            .actions
            .disallows
            .iter()
            .filter_map(|key| serde_json::to_value(key).ok())
            .filter_map(|value| value.as_str().and_then(Capability::from_key))
            .collect();

        let device = DeviceRef {
            id: playback.device.id.clone(),
            name: playback.device.name.clone(),
            kind: format!("{:?}", playback.device._type),
            volume_percent: playback.device.volume_percent.map(|v| v.min(100) as u8),
            is_restricted: playback.device.is_restricted,
        };

        Self {
            is_playing: playback.is_playing,
            progress_ms: playback
                .progress
                .map(|d| d.num_milliseconds().max(0) as u64)
                .unwrap_or(0),
            timestamp_ms: playback.timestamp.timestamp_millis(),
            observed_at: Instant::now(),
            track,
            device: Some(device),
            shuffle: playback.shuffle_state,
            repeat: playback.repeat_state.into(),
            context_uri: playback.context.as_ref().map(|c| c.uri.clone()),
            disallows,
            source: None,
            revision: 0,
            optimistic: false,
        }
    }
}

pub(crate) fn track_from_item(item: &PlayableItem) -> Option<Track> {
    match item {
        PlayableItem::Track(track) => {
            let id = track
                .id
                .as_ref()
                .map(|id| id.id().to_string())
                .unwrap_or_default();
            let uri = if id.is_empty() {
                String::new()
            } else {
                format!("spotify:track:{}", id)
            };
            Some(Track {
                id,
                name: track.name.clone(),
                artists: track.artists.iter().map(|a| a.name.clone()).collect(),
                album: track.album.name.clone(),
                duration_ms: track.duration.num_milliseconds().max(0) as u64,
                uri,
            })
        }
        PlayableItem::Episode(episode) => Some(Track {
            id: episode.id.id().to_string(),
            name: episode.name.clone(),
            artists: vec![episode.show.name.clone()],
            album: "Podcast".to_string(),
            duration_ms: episode.duration.num_milliseconds().max(0) as u64,
            uri: format!("spotify:episode:{}", episode.id.id()),
        }),
        PlayableItem::Unknown(_) => None,
    }
}
