//! Like/unlike with optimistic apply and per-field rollback

use std::sync::Arc;

use super::AuthSignal;
use crate::error::EngineResult;
use crate::model::LikedSongsCache;
use crate::remote::RemotePlayback;

#[derive(Clone)]
pub struct LibraryActions {
    remote: Arc<dyn RemotePlayback>,
    cache: LikedSongsCache,
    auth: AuthSignal,
}

impl LibraryActions {
    pub fn new(remote: Arc<dyn RemotePlayback>, cache: LikedSongsCache, auth: AuthSignal) -> Self {
        Self { remote, cache, auth }
    }

    pub fn cache(&self) -> &LikedSongsCache {
        &self.cache
    }

    pub async fn is_liked(&self, track_id: &str) -> bool {
        self.cache.is_liked(track_id).await
    }

    /// Flip the liked flag now and confirm with the server. Returns the flag
    /// the user asked for.
    pub async fn toggle_like(&self, track_id: &str) -> EngineResult<bool> {
        let toggle = self.cache.begin_toggle(track_id).await;
        tracing::debug!(track_id, liked = toggle.target, "Toggling liked state");

        match self.remote.set_saved(track_id, toggle.target).await {
            Ok(()) => {
                self.cache.confirm(&toggle).await;
                if let Err(e) = self.cache.save_to_disk().await {
                    tracing::warn!(error = %e, "Could not persist liked songs cache");
                }
                Ok(toggle.target)
            }
            Err(e) => {
                if e.is_auth() {
                    self.auth.raise(&e);
                }
                if self.cache.rollback(&toggle).await {
                    tracing::warn!(track_id, error = %e, "Like toggle failed, reverted");
                }
                Err(e)
            }
        }
    }

    /// Refresh one track's flag from the server, e.g. when it starts playing.
    pub async fn sync_liked(&self, track_id: &str) -> EngineResult<bool> {
        let liked = self.remote.is_saved(track_id).await?;
        self.cache.set_confirmed(track_id, liked).await;
        Ok(liked)
    }
}
