//! LRCLIB lyrics provider and a per-track cache in front of any source

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::LyricsSource;
use crate::error::{EngineError, EngineResult};
use crate::model::{parse_lrc, strip_lrc, LyricsStatus, Track, Unavailability};

const LRCLIB_GET_URL: &str = "https://lrclib.net/api/get";

#[derive(Debug, Clone, Deserialize)]
struct LrclibResponse {
    #[serde(default)]
    instrumental: bool,
    #[serde(default, rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
    #[serde(default, rename = "plainLyrics")]
    plain_lyrics: Option<String>,
}

pub struct LrclibSource {
    http: reqwest::Client,
    timeout: Duration,
}

impl LrclibSource {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("spotify-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { http, timeout }
    }
}

fn status_from_response(track_id: &str, response: LrclibResponse) -> LyricsStatus {
    if response.instrumental {
        return LyricsStatus::Unavailable {
            track_id: track_id.to_string(),
            reason: Unavailability::Instrumental,
        };
    }

    let synced = response.synced_lyrics.unwrap_or_default();
    if let Some(lyrics) = parse_lrc(track_id, &synced) {
        return LyricsStatus::Synced(lyrics);
    }

    let plain = response.plain_lyrics.unwrap_or_default().trim().to_string();
    let text = if plain.is_empty() { strip_lrc(&synced) } else { plain };
    if text.is_empty() {
        LyricsStatus::Unavailable {
            track_id: track_id.to_string(),
            reason: Unavailability::NotFound,
        }
    } else {
        LyricsStatus::Unsynced {
            track_id: track_id.to_string(),
            text,
        }
    }
}

#[async_trait]
impl LyricsSource for LrclibSource {
    async fn lyrics(&self, track: &Track) -> EngineResult<LyricsStatus> {
        let mut params = vec![("track_name", track.name.clone())];
        if let Some(artist) = track.artists.first() {
            params.push(("artist_name", artist.clone()));
        }
        if !track.album.trim().is_empty() {
            params.push(("album_name", track.album.clone()));
        }
        if track.duration_ms > 0 {
            params.push(("duration", (track.duration_ms / 1000).to_string()));
        }

        tracing::debug!(track_id = %track.id, track = %track.name, "Fetching lyrics");
        let response = self
            .http
            .get(LRCLIB_GET_URL)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| EngineError::FetchFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(LyricsStatus::Unavailable {
                track_id: track.id.clone(),
                reason: Unavailability::NotFound,
            });
        }
        if !response.status().is_success() {
            return Err(EngineError::FetchFailed(format!(
                "lyrics status {}",
                response.status().as_u16()
            )));
        }

        let body: LrclibResponse = response
            .json()
            .await
            .map_err(|e| EngineError::FetchFailed(e.to_string()))?;
        Ok(status_from_response(&track.id, body))
    }
}

/// Fetch lyrics once per track id. Transport failures are not cached so a
/// later request for the same track can try again.
pub struct CachedLyrics {
    inner: Arc<dyn LyricsSource>,
    entries: RwLock<HashMap<String, LyricsStatus>>,
}

impl CachedLyrics {
    pub fn new(inner: Arc<dyn LyricsSource>) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LyricsSource for CachedLyrics {
    async fn lyrics(&self, track: &Track) -> EngineResult<LyricsStatus> {
        if let Some(cached) = self.entries.read().await.get(&track.id) {
            tracing::trace!(track_id = %track.id, "Lyrics cache hit");
            return Ok(cached.clone());
        }

        let status = self.inner.lyrics(track).await?;
        self.entries
            .write()
            .await
            .insert(track.id.clone(), status.clone());
        Ok(status)
    }
}
