//! Cache for liked songs with optimistic toggles

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;

/// An optimistic like/unlike that has been applied locally but not yet
/// confirmed by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikeToggle {
    pub track_id: String,
    pub previous: bool,
    pub target: bool,
    generation: u64,
}

/// Cache for liked song IDs to enable fast lookup without API calls
#[derive(Clone)]
pub struct LikedSongsCache {
    path: Arc<PathBuf>,
    liked_ids: Arc<RwLock<HashSet<String>>>,
    generations: Arc<RwLock<HashMap<String, u64>>>,
}

impl LikedSongsCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            liked_ids: Arc::new(RwLock::new(HashSet::new())),
            generations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn load_from_disk(&self) -> Result<()> {
        let path = self.path.as_path();
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let ids: Vec<String> = serde_json::from_str(&content)?;
            *self.liked_ids.write().await = ids.into_iter().collect();
            tracing::debug!(path = %path.display(), "Loaded liked songs cache");
        }
        Ok(())
    }

    pub async fn save_to_disk(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !Path::new(dir).exists() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let content = {
            let liked_ids = self.liked_ids.read().await;
            let mut ids: Vec<&String> = liked_ids.iter().collect();
            ids.sort();
            serde_json::to_string(&ids)?
        };
        tokio::fs::write(self.path.as_path(), content).await?;
        Ok(())
    }

    pub async fn is_liked(&self, track_id: &str) -> bool {
        self.liked_ids.read().await.contains(track_id)
    }

    /// Record the server's answer for a track, unless a toggle is in flight.
    pub async fn set_confirmed(&self, track_id: &str, liked: bool) {
        if self.generations.read().await.contains_key(track_id) {
            return;
        }
        self.set(track_id, liked).await;
    }

    /// Flip the flag locally and remember how to undo it.
    pub async fn begin_toggle(&self, track_id: &str) -> LikeToggle {
        let previous = self.is_liked(track_id).await;
        let target = !previous;
        self.set(track_id, target).await;

        let mut generations = self.generations.write().await;
        let generation = generations.entry(track_id.to_string()).or_insert(0);
        *generation += 1;

        LikeToggle {
            track_id: track_id.to_string(),
            previous,
            target,
            generation: *generation,
        }
    }

    /// Server accepted the toggle.
    pub async fn confirm(&self, toggle: &LikeToggle) {
        let mut generations = self.generations.write().await;
        if generations.get(&toggle.track_id) == Some(&toggle.generation) {
            generations.remove(&toggle.track_id);
        }
    }

    /// Undo a failed toggle. A toggle superseded by a newer one for the same
    /// track is not reverted: the newer intent owns the flag now.
    pub async fn rollback(&self, toggle: &LikeToggle) -> bool {
        let mut generations = self.generations.write().await;
        if generations.get(&toggle.track_id) != Some(&toggle.generation) {
            tracing::debug!(track_id = %toggle.track_id, "Skipping rollback of superseded like toggle");
            return false;
        }
        generations.remove(&toggle.track_id);
        drop(generations);

        self.set(&toggle.track_id, toggle.previous).await;
        true
    }

    async fn set(&self, track_id: &str, liked: bool) {
        let mut liked_ids = self.liked_ids.write().await;
        if liked {
            liked_ids.insert(track_id.to_string());
        } else {
            liked_ids.remove(track_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_toggle_restores_previous_value() {
        let cache = LikedSongsCache::new("unused.json");
        let toggle = cache.begin_toggle("t1").await;
        assert!(toggle.target);
        assert!(cache.is_liked("t1").await);

        assert!(cache.rollback(&toggle).await);
        assert!(!cache.is_liked("t1").await);
    }

    #[tokio::test]
    async fn superseded_toggle_does_not_roll_back() {
        let cache = LikedSongsCache::new("unused.json");
        let first = cache.begin_toggle("t1").await;
        let second = cache.begin_toggle("t1").await;
        assert!(!cache.is_liked("t1").await);

        assert!(!cache.rollback(&first).await);
        assert!(!cache.is_liked("t1").await);

        assert!(cache.rollback(&second).await);
        assert!(cache.is_liked("t1").await);
    }

    #[tokio::test]
    async fn confirmed_value_waits_for_inflight_toggle() {
        let cache = LikedSongsCache::new("unused.json");
        let toggle = cache.begin_toggle("t1").await;
        cache.set_confirmed("t1", false).await;
        assert!(cache.is_liked("t1").await);

        cache.confirm(&toggle).await;
        cache.set_confirmed("t1", false).await;
        assert!(!cache.is_liked("t1").await);
    }

    #[tokio::test]
    async fn rollback_is_scoped_to_one_track() {
        let cache = LikedSongsCache::new("unused.json");
        let other = cache.begin_toggle("other").await;
        cache.confirm(&other).await;

        let toggle = cache.begin_toggle("t1").await;
        cache.rollback(&toggle).await;
        assert!(cache.is_liked("other").await);
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let path = std::env::temp_dir().join(format!("liked-{}.json", std::process::id()));
        let cache = LikedSongsCache::new(&path);
        let toggle = cache.begin_toggle("abc").await;
        cache.confirm(&toggle).await;
        cache.save_to_disk().await.unwrap();

        let reloaded = LikedSongsCache::new(&path);
        reloaded.load_from_disk().await.unwrap();
        assert!(reloaded.is_liked("abc").await);
        let _ = std::fs::remove_file(path);
    }
}
