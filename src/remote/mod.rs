//! Remote service boundary
//!
//! The engine only sees the [`RemotePlayback`] and [`LyricsSource`] traits;
//! `spotify_client` and `lrclib` are the production implementations.

mod lrclib;
mod spotify_client;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::{LyricsStatus, PlayTarget, PlaybackState, RepeatMode, Track};

pub use lrclib::{CachedLyrics, LrclibSource};
pub use spotify_client::SpotifyClient;

/// Playback control surface of the remote catalog/playback service.
///
/// `device_id = None` lets the service pick the currently active device.
#[async_trait]
pub trait RemotePlayback: Send + Sync {
    /// `Ok(None)` means nothing is playing anywhere.
    async fn current_playback(&self) -> EngineResult<Option<PlaybackState>>;

    async fn queue(&self) -> EngineResult<Vec<Track>>;

    async fn play(&self, target: &PlayTarget, device_id: Option<&str>) -> EngineResult<()>;

    async fn pause(&self, device_id: Option<&str>) -> EngineResult<()>;

    async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> EngineResult<()>;

    async fn set_volume(&self, percent: u8, device_id: Option<&str>) -> EngineResult<()>;

    async fn set_shuffle(&self, shuffle: bool, device_id: Option<&str>) -> EngineResult<()>;

    async fn set_repeat(&self, mode: RepeatMode, device_id: Option<&str>) -> EngineResult<()>;

    async fn next(&self, device_id: Option<&str>) -> EngineResult<()>;

    async fn previous(&self, device_id: Option<&str>) -> EngineResult<()>;

    async fn transfer(&self, device_id: &str, play: bool) -> EngineResult<()>;

    async fn add_to_queue(&self, uri: &str, device_id: Option<&str>) -> EngineResult<()>;

    async fn is_saved(&self, track_id: &str) -> EngineResult<bool>;

    async fn set_saved(&self, track_id: &str, saved: bool) -> EngineResult<()>;
}

/// Lyrics fetch layer. Absence of lyrics is a successful answer.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    async fn lyrics(&self, track: &Track) -> EngineResult<LyricsStatus>;
}
