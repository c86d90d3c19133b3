//! Cached last browse playlist
//!
//! Advisory per-user cache written by browse. Values are stored
//! serialized under `browse:<user-id>` and expire after the configured TTL.
//! Readers tolerate absence, expiry and corrupt entries alike.

use crate::db::{songs, votes};
use moody_common::db::Song;
use moody_common::{Emotion, Error, Result, VoteContext};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBrowsePlaylist {
    pub emotion: Emotion,
    pub context: VoteContext,
    pub description: String,
    /// Song codes in the order they were returned
    pub playlist: Vec<String>,
}

/// Cached playlist resolved against the catalog and the current vote log
#[derive(Debug, Clone, Serialize)]
pub struct LastPlaylist {
    pub emotion: Emotion,
    pub context: VoteContext,
    pub description: String,
    pub songs: Vec<Song>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct BrowseCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Duration,
}

pub fn cache_key(user_id: Uuid) -> String {
    format!("browse:{}", user_id)
}

impl BrowseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Last writer wins
    pub async fn store(&self, user_id: Uuid, playlist: &CachedBrowsePlaylist) -> Result<()> {
        let value = serde_json::to_string(playlist)
            .map_err(|e| Error::Internal(format!("Serialize cached playlist failed: {}", e)))?;
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(cache_key(user_id), entry);
        Ok(())
    }

    pub async fn load(&self, user_id: Uuid) -> Option<CachedBrowsePlaylist> {
        let key = cache_key(user_id);
        let entries = self.entries.read().await;
        let entry = entries.get(&key)?;
        if entry.expires_at <= Instant::now() {
            debug!(key = %key, "Cached playlist expired");
            return None;
        }

        match serde_json::from_str(&entry.value) {
            Ok(playlist) => Some(playlist),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cached playlist");
                None
            }
        }
    }

    /// Drop expired entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// The cached playlist minus songs voted on for the same emotion since
    pub async fn last_playlist(&self, db: &SqlitePool, user_id: Uuid) -> Result<Option<LastPlaylist>> {
        let Some(cached) = self.load(user_id).await else {
            return Ok(None);
        };

        let voted = votes::voted_song_codes(db, user_id, cached.emotion).await?;
        let remaining: Vec<String> = cached
            .playlist
            .into_iter()
            .filter(|code| !voted.contains(code))
            .collect();
        let songs = songs::load_songs_by_codes(db, &remaining).await?;

        Ok(Some(LastPlaylist {
            emotion: cached.emotion,
            context: cached.context,
            description: cached.description,
            songs,
        }))
    }

    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, user_id: Uuid, value: &str) {
        self.entries.write().await.insert(
            cache_key(user_id),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist() -> CachedBrowsePlaylist {
        CachedBrowsePlaylist {
            emotion: Emotion::Happy,
            context: VoteContext::Party,
            description: "friday".to_string(),
            playlist: vec!["sp:a".to_string(), "sp:b".to_string()],
        }
    }

    #[test]
    fn test_key_format() {
        let id = Uuid::nil();
        assert_eq!(cache_key(id), "browse:00000000-0000-0000-0000-000000000000");
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let cache = BrowseCache::new(Duration::from_secs(600));
        let user = Uuid::new_v4();
        assert!(cache.load(user).await.is_none());

        cache.store(user, &playlist()).await.unwrap();
        assert_eq!(cache.load(user).await, Some(playlist()));
        assert!(cache.load(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent_and_purged() {
        let cache = BrowseCache::new(Duration::ZERO);
        let user = Uuid::new_v4();
        cache.store(user, &playlist()).await.unwrap();

        assert!(cache.load(user).await.is_none());
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_absent() {
        let cache = BrowseCache::new(Duration::from_secs(600));
        let user = Uuid::new_v4();
        cache.insert_raw(user, "{\"emotion\":").await;
        assert!(cache.load(user).await.is_none());
    }
}
