//! Database models

use crate::emotion::{Attributes, Emotion, VoteContext};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider OAuth scope allowing playlist creation and mutation
pub const SCOPE_PLAYLIST_MODIFY: &str = "playlist-modify-public";
/// Provider OAuth scope allowing top-artist reads
pub const SCOPE_TOP_ARTIST_READ: &str = "user-top-read";
/// Provider OAuth scope allowing playlist cover uploads
pub const SCOPE_IMAGE_UPLOAD: &str = "ugc-image-upload";

/// Scopes requested during authorization
pub const REQUESTED_SCOPES: [&str; 3] = [
    SCOPE_PLAYLIST_MODIFY,
    SCOPE_TOP_ARTIST_READ,
    SCOPE_IMAGE_UPLOAD,
];

pub const MAX_SONG_CODE_LEN: usize = 36;
pub const MAX_SONG_TEXT_LEN: usize = 200;
pub const MAX_GENRE_LEN: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Application user (identity is managed by the external session layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Catalog song with acoustic attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub code: String,
    pub name: String,
    pub artist: String,
    pub genre: String,
    pub valence: f64,
    pub energy: f64,
    pub danceability: f64,
}

impl Song {
    pub fn attributes(&self) -> Attributes {
        Attributes::new(self.energy, self.valence, self.danceability)
    }

    /// Field limits and attribute ranges; the table enforces the same
    pub fn validate(&self) -> Result<()> {
        if self.code.is_empty() || self.code.chars().count() > MAX_SONG_CODE_LEN {
            return Err(Error::InvalidInput(format!(
                "Song code must be 1-{} characters",
                MAX_SONG_CODE_LEN
            )));
        }
        if self.name.chars().count() > MAX_SONG_TEXT_LEN
            || self.artist.chars().count() > MAX_SONG_TEXT_LEN
        {
            return Err(Error::InvalidInput(format!(
                "Song name and artist are limited to {} characters",
                MAX_SONG_TEXT_LEN
            )));
        }
        if self.genre.chars().count() > MAX_GENRE_LEN {
            return Err(Error::InvalidInput(format!(
                "Genre is limited to {} characters",
                MAX_GENRE_LEN
            )));
        }
        self.attributes().validate()
    }
}

/// Per-(user, emotion) learned center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEmotion {
    pub user_id: Uuid,
    pub emotion: Emotion,
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
}

impl UserEmotion {
    pub fn attributes(&self) -> Attributes {
        Attributes::new(self.energy, self.valence, self.danceability)
    }
}

/// One row of the vote log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub user_id: Uuid,
    pub song_code: String,
    pub emotion: Emotion,
    pub context: VoteContext,
    pub description: String,
    pub vote: bool,
    pub created_at: DateTime<Utc>,
}

/// Decrypted provider credentials for one user
#[derive(Clone, Serialize)]
pub struct ProviderAuth {
    pub id: i64,
    pub user_id: Uuid,
    pub provider_user_id: String,
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: String,
    pub last_refreshed: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for ProviderAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAuth")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("provider_user_id", &self.provider_user_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("last_refreshed", &self.last_refreshed)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ProviderAuth {
    /// Access token has outlived its TTL
    pub fn should_refresh(&self, ttl_secs: i64, now: DateTime<Utc>) -> bool {
        now - self.last_refreshed >= Duration::seconds(ttl_secs)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Provider-derived personalization data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUserData {
    pub top_artists: Vec<String>,
}
