//! Spotify Web API client wrapper implementing the remote playback boundary

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rspotify::{
    model::{
        AlbumId, ArtistId, EpisodeId, Offset, PlayContextId, PlayableId, PlaylistId, TrackId,
    },
    prelude::*,
    AuthCodeSpotify, ClientError, Token,
};
use tokio::sync::RwLock;

use super::RemotePlayback;
use crate::error::{EngineError, EngineResult};
use crate::model::{track_from_item, PlayTarget, PlaybackState, RepeatMode, Track};
use crate::{log_api_request, log_api_result};

/// Spotify API client with token refresh support
#[derive(Clone)]
pub struct SpotifyClient {
    client: Arc<AuthCodeSpotify>,
    refresh_token: Arc<RwLock<String>>,
    token_expires_at: Arc<RwLock<Option<chrono::DateTime<chrono::Utc>>>>,
}

impl SpotifyClient {
    pub fn new(
        client: AuthCodeSpotify,
        refresh_token: String,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            refresh_token: Arc::new(RwLock::new(refresh_token)),
            token_expires_at: Arc::new(RwLock::new(expires_at)),
        }
    }

    pub async fn token_needs_refresh(&self) -> bool {
        let expires_at = self.token_expires_at.read().await;
        if let Some(exp) = *expires_at {
            let remaining = exp - chrono::Utc::now();
            // Refresh if less than 5 minutes remaining
            remaining.num_seconds() < 300
        } else {
            false
        }
    }

    /// Exchange the refresh token for a new access token when it is close to
    /// expiry, or unconditionally when `force` is set (after a 401).
    pub async fn refresh_token_if_needed(&self, force: bool) -> Result<bool> {
        if !force && !self.token_needs_refresh().await {
            return Ok(false);
        }

        let refresh_token = self.refresh_token.read().await.clone();
        tracing::info!(force, "Refreshing Web API token");

        let refreshed = crate::auth::refresh_access_token(&refresh_token).await?;

        let new_token = Token {
            access_token: refreshed.access_token,
            expires_in: chrono::Duration::seconds(3600),
            expires_at: Some(refreshed.expires_at),
            scopes: crate::auth::SCOPES
                .split_whitespace()
                .map(|s| s.to_string())
                .collect::<HashSet<String>>(),
            refresh_token: None,
        };

        match self.client.token.lock().await {
            Ok(mut token) => *token = Some(new_token),
            Err(_) => return Err(anyhow::anyhow!("rspotify token lock unavailable")),
        }

        *self.refresh_token.write().await = refreshed.refresh_token;
        *self.token_expires_at.write().await = Some(refreshed.expires_at);

        tracing::info!("Token refreshed successfully");
        Ok(true)
    }

    /// Access token currently installed in the rspotify client.
    pub async fn access_token(&self) -> Option<String> {
        match self.client.token.lock().await {
            Ok(token) => token.as_ref().map(|t| t.access_token.clone()),
            Err(_) => None,
        }
    }
}

fn remote_error(error: ClientError) -> EngineError {
    EngineError::from_remote(&error)
}

fn invalid_uri(uri: &str) -> EngineError {
    EngineError::CommandRejected(format!("invalid uri: {}", uri))
}

fn playable_id(uri: &str) -> EngineResult<PlayableId<'static>> {
    let id = Track::id_from_uri(uri).ok_or_else(|| invalid_uri(uri))?;
    if uri.contains(":episode:") {
        let id = EpisodeId::from_id(id).map_err(|_| invalid_uri(uri))?;
        Ok(PlayableId::Episode(id))
    } else {
        let id = TrackId::from_id(id).map_err(|_| invalid_uri(uri))?;
        Ok(PlayableId::Track(id))
    }
}

fn context_id(uri: &str) -> EngineResult<PlayContextId<'static>> {
    let id = Track::id_from_uri(uri).ok_or_else(|| invalid_uri(uri))?;
    let context = if uri.contains(":album:") {
        PlayContextId::Album(AlbumId::from_id(id).map_err(|_| invalid_uri(uri))?)
    } else if uri.contains(":playlist:") {
        PlayContextId::Playlist(PlaylistId::from_id(id).map_err(|_| invalid_uri(uri))?)
    } else if uri.contains(":artist:") {
        PlayContextId::Artist(ArtistId::from_id(id).map_err(|_| invalid_uri(uri))?)
    } else {
        return Err(invalid_uri(uri));
    };
    Ok(context)
}

#[async_trait]
impl RemotePlayback for SpotifyClient {
    async fn current_playback(&self) -> EngineResult<Option<PlaybackState>> {
        tracing::trace!("Fetching current playback state");
        let result = self
            .client
            .current_playback(None, None::<Vec<_>>)
            .await
            .map_err(remote_error)?;

        if let Some(ref playback) = result {
            tracing::trace!(
                is_playing = playback.is_playing,
                device = ?playback.device.name,
                "Got playback state"
            );
        }
        Ok(result.as_ref().map(PlaybackState::from_playback))
    }

    async fn queue(&self) -> EngineResult<Vec<Track>> {
        log_api_request!("queue");
        let queue = self.client.current_user_queue().await.map_err(remote_error)?;
        Ok(queue.queue.iter().filter_map(track_from_item).collect())
    }

    async fn play(&self, target: &PlayTarget, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("play", target = %target, device_id = ?device_id);
        let result = match target {
            PlayTarget::Resume => self.client.resume_playback(device_id, None).await,
            PlayTarget::Track { uri } => {
                self.client
                    .start_uris_playback([playable_id(uri)?], device_id, None, None)
                    .await
            }
            PlayTarget::Context { uri, offset_uri } => {
                let offset = offset_uri.clone().map(Offset::Uri);
                self.client
                    .start_context_playback(context_id(uri)?, device_id, offset, None)
                    .await
            }
        };
        log_api_result!("play", result);
        result.map_err(remote_error)
    }

    async fn pause(&self, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("pause", device_id = ?device_id);
        let result = self.client.pause_playback(device_id).await;
        log_api_result!("pause", result);
        result.map_err(remote_error)
    }

    async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("seek", position_ms, device_id = ?device_id);
        let position = chrono::Duration::milliseconds(position_ms as i64);
        let result = self.client.seek_track(position, device_id).await;
        log_api_result!("seek", result);
        result.map_err(remote_error)
    }

    async fn set_volume(&self, percent: u8, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("set_volume", percent, device_id = ?device_id);
        let result = self.client.volume(percent, device_id).await;
        log_api_result!("set_volume", result);
        result.map_err(remote_error)
    }

    async fn set_shuffle(&self, shuffle: bool, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("set_shuffle", shuffle, device_id = ?device_id);
        let result = self.client.shuffle(shuffle, device_id).await;
        log_api_result!("set_shuffle", result);
        result.map_err(remote_error)
    }

    async fn set_repeat(&self, mode: RepeatMode, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("set_repeat", mode = ?mode, device_id = ?device_id);
        let result = self.client.repeat(mode.into(), device_id).await;
        log_api_result!("set_repeat", result);
        result.map_err(remote_error)
    }

    async fn next(&self, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("next", device_id = ?device_id);
        let result = self.client.next_track(device_id).await;
        log_api_result!("next", result);
        result.map_err(remote_error)
    }

    async fn previous(&self, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("previous", device_id = ?device_id);
        let result = self.client.previous_track(device_id).await;
        log_api_result!("previous", result);
        result.map_err(remote_error)
    }

    async fn transfer(&self, device_id: &str, play: bool) -> EngineResult<()> {
        log_api_request!("transfer", device_id, play);
        let result = self.client.transfer_playback(device_id, Some(play)).await;
        log_api_result!("transfer", result);
        result.map_err(remote_error)
    }

    async fn add_to_queue(&self, uri: &str, device_id: Option<&str>) -> EngineResult<()> {
        log_api_request!("add_to_queue", uri, device_id = ?device_id);
        let result = self.client.add_item_to_queue(playable_id(uri)?, device_id).await;
        log_api_result!("add_to_queue", result);
        result.map_err(remote_error)
    }

    async fn is_saved(&self, track_id: &str) -> EngineResult<bool> {
        let id = TrackId::from_id(track_id)
            .map_err(|_| EngineError::CommandRejected(format!("invalid track id: {}", track_id)))?;
        let saved = self
            .client
            .current_user_saved_tracks_contains([id])
            .await
            .map_err(remote_error)?;
        Ok(saved.first().copied().unwrap_or(false))
    }

    async fn set_saved(&self, track_id: &str, saved: bool) -> EngineResult<()> {
        log_api_request!("set_saved", track_id, saved);
        let id = TrackId::from_id(track_id)
            .map_err(|_| EngineError::CommandRejected(format!("invalid track id: {}", track_id)))?;
        let result = if saved {
            self.client.current_user_saved_tracks_add([id]).await
        } else {
            self.client.current_user_saved_tracks_delete([id]).await
        };
        log_api_result!("set_saved", result);
        result.map_err(remote_error)
    }
}
