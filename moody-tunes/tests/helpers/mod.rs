//! Shared fixtures for moody-tunes integration tests
//!
//! `FakeProvider` stands in for Spotify: it keeps playlists in memory,
//! records every call and can be told to fail an operation a number of
//! times.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use moody_common::crypto::TokenCipher;
use moody_common::db::{init_memory_database, ProviderAuth, Song, User, REQUESTED_SCOPES};
use moody_common::{Error, Result};
use moody_tunes::config::RuntimeSettings;
use moody_tunes::db::provider_auth::NewProviderAuth;
use moody_tunes::db::songs;
use moody_tunes::services::provider::{
    AudioFeatures, MusicProvider, RemotePlaylist, TrackInfo, UserTokens,
};
use moody_tunes::services::users;
use moody_tunes::{build_router, AppOptions, AppState};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const USER_HEADER: &str = "x-moody-user";

/// One recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    ExchangeCode(String),
    RefreshToken(String),
    CurrentUser,
    Track(String),
    AudioFeatures(Vec<String>),
    UserPlaylists,
    CreatePlaylist(String),
    PlaylistTracks(String),
    AddTracks(String, Vec<String>),
    RemoveTracks(String, Vec<String>),
    UploadCover(String, usize),
    TopArtists(usize),
}

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<ProviderCall>,
    /// Access tokens presented on user-scoped calls, in order
    pub tokens_used: Vec<String>,
    pub playlists: Vec<RemotePlaylist>,
    pub playlist_tracks: HashMap<String, Vec<String>>,
    pub tracks: HashMap<String, TrackInfo>,
    pub features: HashMap<String, AudioFeatures>,
    pub top_artists: Vec<String>,
    /// Operation name to remaining injected failures
    pub failures: HashMap<&'static str, u32>,
    refreshes: u32,
}

#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn count(&self, matches: impl Fn(&ProviderCall) -> bool) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| matches(c)).count())
    }

    pub fn clear_calls(&self) {
        self.with_state(|s| {
            s.calls.clear();
            s.tokens_used.clear();
        });
    }

    /// Make the next `times` calls of `op` fail with a provider 503
    pub fn fail_next(&self, op: &'static str, times: u32) {
        self.with_state(|s| {
            s.failures.insert(op, times);
        });
    }

    /// Seed an existing remote playlist
    pub fn add_playlist(&self, id: &str, name: &str, uris: &[&str]) {
        self.with_state(|s| {
            s.playlists.push(RemotePlaylist {
                id: id.to_string(),
                name: name.to_string(),
            });
            s.playlist_tracks
                .insert(id.to_string(), uris.iter().map(|u| u.to_string()).collect());
        });
    }

    /// Tracks of the remote playlist named `name`
    pub fn playlist_named(&self, name: &str) -> Option<(String, Vec<String>)> {
        self.with_state(|s| {
            s.playlists.iter().find(|p| p.name == name).map(|p| {
                let uris = s.playlist_tracks.get(&p.id).cloned().unwrap_or_default();
                (p.id.clone(), uris)
            })
        })
    }

    pub fn add_track(&self, code: &str, name: &str, artist: &str, features: Option<AudioFeatures>) {
        self.with_state(|s| {
            s.tracks.insert(
                code.to_string(),
                TrackInfo {
                    code: code.to_string(),
                    name: name.to_string(),
                    artist: artist.to_string(),
                },
            );
            if let Some(features) = features {
                s.features.insert(code.to_string(), features);
            }
        });
    }

    fn record(&self, op: &'static str, call: ProviderCall, token: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(token) = token {
            state.tokens_used.push(token.to_string());
        }
        if let Some(remaining) = state.failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Provider {
                    message: format!("Spotify returned HTTP 503 on {}", op),
                    status: Some(503),
                    retry_after: None,
                });
            }
        }
        Ok(())
    }
}

fn not_found(what: &str) -> Error {
    Error::Provider {
        message: format!("Spotify returned HTTP 404 for {}", what),
        status: Some(404),
        retry_after: None,
    }
}

#[async_trait]
impl MusicProvider for FakeProvider {
    fn authorization_url(&self, state: &str, scopes: &[&str]) -> Result<String> {
        Ok(format!(
            "https://accounts.test/authorize?state={}&scope={}",
            state,
            scopes.join("+")
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<UserTokens> {
        self.record("exchange_code", ProviderCall::ExchangeCode(code.to_string()), None)?;
        Ok(UserTokens {
            access_token: "access-initial".to_string(),
            refresh_token: "refresh-initial".to_string(),
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String> {
        self.record(
            "refresh_access_token",
            ProviderCall::RefreshToken(refresh_token.to_string()),
            None,
        )?;
        Ok(self.with_state(|s| {
            s.refreshes += 1;
            format!("access-refreshed-{}", s.refreshes)
        }))
    }

    async fn current_user_id(&self, access_token: &str) -> Result<String> {
        self.record("current_user_id", ProviderCall::CurrentUser, Some(access_token))?;
        Ok("spotify-user".to_string())
    }

    async fn track(&self, code: &str) -> Result<TrackInfo> {
        self.record("track", ProviderCall::Track(code.to_string()), None)?;
        self.with_state(|s| s.tracks.get(code).cloned())
            .ok_or_else(|| not_found(code))
    }

    async fn audio_features(&self, codes: &[String]) -> Result<Vec<Option<AudioFeatures>>> {
        self.record("audio_features", ProviderCall::AudioFeatures(codes.to_vec()), None)?;
        Ok(self.with_state(|s| codes.iter().map(|c| s.features.get(c).copied()).collect()))
    }

    async fn user_playlists(
        &self,
        access_token: &str,
        _provider_user_id: &str,
    ) -> Result<Vec<RemotePlaylist>> {
        self.record("user_playlists", ProviderCall::UserPlaylists, Some(access_token))?;
        Ok(self.with_state(|s| s.playlists.clone()))
    }

    async fn create_playlist(
        &self,
        access_token: &str,
        _provider_user_id: &str,
        name: &str,
    ) -> Result<String> {
        self.record(
            "create_playlist",
            ProviderCall::CreatePlaylist(name.to_string()),
            Some(access_token),
        )?;
        Ok(self.with_state(|s| {
            let id = format!("created-{}", s.playlists.len() + 1);
            s.playlists.push(RemotePlaylist {
                id: id.clone(),
                name: name.to_string(),
            });
            s.playlist_tracks.insert(id.clone(), Vec::new());
            id
        }))
    }

    async fn playlist_track_uris(&self, access_token: &str, playlist_id: &str) -> Result<Vec<String>> {
        self.record(
            "playlist_track_uris",
            ProviderCall::PlaylistTracks(playlist_id.to_string()),
            Some(access_token),
        )?;
        self.with_state(|s| s.playlist_tracks.get(playlist_id).cloned())
            .ok_or_else(|| not_found(playlist_id))
    }

    async fn add_tracks(&self, access_token: &str, playlist_id: &str, uris: &[String]) -> Result<()> {
        self.record(
            "add_tracks",
            ProviderCall::AddTracks(playlist_id.to_string(), uris.to_vec()),
            Some(access_token),
        )?;
        self.with_state(|s| {
            s.playlist_tracks
                .entry(playlist_id.to_string())
                .or_default()
                .extend(uris.iter().cloned());
        });
        Ok(())
    }

    async fn remove_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()> {
        self.record(
            "remove_tracks",
            ProviderCall::RemoveTracks(playlist_id.to_string(), uris.to_vec()),
            Some(access_token),
        )?;
        self.with_state(|s| {
            if let Some(tracks) = s.playlist_tracks.get_mut(playlist_id) {
                tracks.retain(|t| !uris.contains(t));
            }
        });
        Ok(())
    }

    async fn upload_playlist_cover(
        &self,
        access_token: &str,
        playlist_id: &str,
        jpeg: &[u8],
    ) -> Result<()> {
        self.record(
            "upload_playlist_cover",
            ProviderCall::UploadCover(playlist_id.to_string(), jpeg.len()),
            Some(access_token),
        )
    }

    async fn top_artists(&self, access_token: &str, limit: usize) -> Result<Vec<String>> {
        self.record("top_artists", ProviderCall::TopArtists(limit), Some(access_token))?;
        Ok(self.with_state(|s| s.top_artists.clone()))
    }
}

/// Application wired to an in-memory database and a fake provider
pub struct TestApp {
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    pub image_dir: TempDir,
}

pub async fn test_app() -> TestApp {
    test_app_with(RuntimeSettings::default()).await
}

pub async fn test_app_with(settings: RuntimeSettings) -> TestApp {
    let db = init_memory_database()
        .await
        .expect("Failed to create in-memory database");
    let provider = FakeProvider::new();
    let image_dir = TempDir::new().expect("Failed to create temp dir");
    let cipher = TokenCipher::from_base64(&TokenCipher::generate_key()).expect("Invalid key");

    let state = AppState::new(
        db,
        settings,
        provider.clone(),
        cipher,
        AppOptions {
            image_upload_path: image_dir.path().to_path_buf(),
            auth_state_length: 16,
            max_top_artists: 5,
        },
    );

    TestApp {
        state,
        provider,
        image_dir,
    }
}

impl TestApp {
    pub fn db(&self) -> &sqlx::SqlitePool {
        &self.state.db
    }

    pub async fn user(&self, username: &str) -> User {
        users::observe_user(&self.state.db, username)
            .await
            .expect("Failed to create user")
    }

    /// Link a provider account holding `scopes`
    pub async fn link(&self, user: &User, scopes: &[&str]) -> ProviderAuth {
        self.state
            .auth_store
            .link(&NewProviderAuth {
                user_id: user.id,
                provider_user_id: format!("spotify-{}", user.username),
                access_token: "access-initial".to_string(),
                refresh_token: "refresh-initial".to_string(),
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
            })
            .await
            .expect("Failed to link provider account")
    }

    pub async fn link_all_scopes(&self, user: &User) -> ProviderAuth {
        self.link(user, &REQUESTED_SCOPES).await
    }

    /// Backdate the auth's last refresh by `days`
    pub async fn age_auth(&self, auth_id: i64, days: i64) {
        let stale = chrono::Utc::now() - chrono::Duration::days(days);
        sqlx::query("UPDATE provider_auths SET last_refreshed = ? WHERE id = ?")
            .bind(stale.timestamp_millis())
            .bind(auth_id)
            .execute(&self.state.db)
            .await
            .expect("Failed to age auth");
    }

    /// Make every queued task due now
    pub async fn make_tasks_due(&self) {
        sqlx::query("UPDATE tasks SET run_after = 0 WHERE status = 'pending'")
            .execute(&self.state.db)
            .await
            .expect("Failed to reschedule tasks");
    }

    pub async fn run_pending(&self) -> usize {
        moody_tunes::workers::run_pending(&self.state.worker_context())
            .await
            .expect("Worker run failed")
    }

    /// Send one request through the full router
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, username: &str, uri: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .uri(uri)
                .header(USER_HEADER, username)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn send_json(
        &self,
        method: &str,
        username: &str,
        uri: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(USER_HEADER, username)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

/// `spotify:track:` URI with a 22-character id derived from `n`
pub fn track_code(n: usize) -> String {
    format!("spotify:track:{:0>22}", n)
}

pub fn song(code: &str, artist: &str, genre: &str, energy: f64, valence: f64, danceability: f64) -> Song {
    Song {
        code: code.to_string(),
        name: format!("Song {}", code),
        artist: artist.to_string(),
        genre: genre.to_string(),
        valence,
        energy,
        danceability,
    }
}

pub async fn insert_songs(db: &sqlx::SqlitePool, catalog: &[Song]) {
    for song in catalog {
        songs::insert_song(db, song).await.expect("Failed to insert song");
    }
}

/// Stored center for (user, emotion)
pub async fn center_of(
    db: &sqlx::SqlitePool,
    user: &User,
    emotion: moody_common::Emotion,
) -> moody_common::Attributes {
    moody_tunes::db::user_emotions::load(db, user.id, emotion)
        .await
        .expect("Failed to load user emotion")
        .expect("User emotion missing")
        .attributes()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {} got {}",
        expected,
        actual
    );
}
