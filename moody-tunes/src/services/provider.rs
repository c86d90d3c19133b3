//! Music provider abstraction
//!
//! Everything the service needs from the external catalog and playlist
//! host. `SpotifyClient` is the production implementation; tests plug in
//! scripted fakes.

use async_trait::async_trait;
use moody_common::Result;
use serde::{Deserialize, Serialize};

/// Tokens returned by the authorization-code exchange
#[derive(Clone, PartialEq)]
pub struct UserTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for UserTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Track metadata by URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub code: String,
    pub name: String,
    pub artist: String,
}

/// Audio features of one track; missing values come back as `None`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub valence: Option<f64>,
    pub energy: Option<f64>,
    pub danceability: Option<f64>,
}

/// A playlist owned by the provider user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// URL the user visits to grant the application access
    fn authorization_url(&self, state: &str, scopes: &[&str]) -> Result<String>;

    /// Authorization code → user tokens
    async fn exchange_code(&self, code: &str) -> Result<UserTokens>;

    /// Refresh token → new access token
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String>;

    /// Provider id of the token's owner
    async fn current_user_id(&self, access_token: &str) -> Result<String>;

    /// Track metadata (application credentials)
    async fn track(&self, code: &str) -> Result<TrackInfo>;

    /// Audio features in request order, `None` where the provider has none
    async fn audio_features(&self, codes: &[String]) -> Result<Vec<Option<AudioFeatures>>>;

    async fn user_playlists(
        &self,
        access_token: &str,
        provider_user_id: &str,
    ) -> Result<Vec<RemotePlaylist>>;

    /// Create an empty playlist and return its id
    async fn create_playlist(
        &self,
        access_token: &str,
        provider_user_id: &str,
        name: &str,
    ) -> Result<String>;

    /// Every track URI currently in the playlist, in playlist order
    async fn playlist_track_uris(&self, access_token: &str, playlist_id: &str)
        -> Result<Vec<String>>;

    /// Append tracks in order
    async fn add_tracks(&self, access_token: &str, playlist_id: &str, uris: &[String])
        -> Result<()>;

    async fn remove_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()>;

    /// Replace the playlist cover with a JPEG image
    async fn upload_playlist_cover(
        &self,
        access_token: &str,
        playlist_id: &str,
        jpeg: &[u8],
    ) -> Result<()>;

    /// Names of the user's top artists, most listened first
    async fn top_artists(&self, access_token: &str, limit: usize) -> Result<Vec<String>>;
}
