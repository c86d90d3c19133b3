//! Spotify Web API client
//!
//! Wire-level client for the provider: OAuth token endpoints, track
//! metadata, audio features, playlist CRUD, cover upload and top artists.
//!
//! Every request is logged with secrets masked (see `utils::sanitize`).
//! HTTP error statuses and timeouts become provider faults; other transport
//! or decoding failures become client faults. A `429` with `Retry-After`
//! closes the client's rate-limit gate for that long.

use crate::config::PROVIDER_MAX_BATCH;
use crate::services::provider::{AudioFeatures, MusicProvider, RemotePlaylist, TrackInfo, UserTokens};
use crate::utils::sanitize;
use async_trait::async_trait;
use base64::Engine;
use moody_common::config::ProviderConfig;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Request, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("MoodyTunes/", env!("CARGO_PKG_VERSION"));

/// Longest a request will sleep waiting for the rate-limit gate to reopen
const MAX_GATE_WAIT: Duration = Duration::from_secs(5);

/// Margin subtracted from the provider's stated token validity
const APP_TOKEN_MARGIN_SECS: u64 = 60;

/// Page size for paged playlist reads
const PAGE_LIMIT: usize = 50;

/// Spotify client errors
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Connection failure or other transport error
    #[error("Network error: {0}")]
    Network(String),

    /// Connect or overall deadline expired
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Spotify answered with a 4xx/5xx status
    #[error("Spotify API returned HTTP {status}")]
    Api {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Local gate is closed after a 429
    #[error("Rate limited by Spotify for another {0:?}")]
    Throttled(Duration),

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request could not be constructed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<SpotifyError> for moody_common::Error {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::Api {
                status,
                retry_after,
            } => moody_common::Error::Provider {
                message: format!("Spotify returned HTTP {}", status),
                status: Some(status),
                retry_after,
            },
            SpotifyError::Timeout(msg) => moody_common::Error::Provider {
                message: format!("Spotify request timed out: {}", msg),
                status: None,
                retry_after: None,
            },
            SpotifyError::Throttled(remaining) => moody_common::Error::Provider {
                message: "Spotify rate limit in effect".to_string(),
                status: Some(429),
                retry_after: Some(remaining),
            },
            SpotifyError::Network(msg) | SpotifyError::Parse(msg) | SpotifyError::InvalidRequest(msg) => {
                moody_common::Error::Client(msg)
            }
        }
    }
}

/// Connection settings for `SpotifyClient`
#[derive(Clone)]
pub struct SpotifyClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_url: String,
    pub accounts_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Items per batch call, clamped to `1..=100`
    pub batch_size: usize,
}

impl SpotifyClientConfig {
    pub fn from_provider_config(config: &ProviderConfig, batch_size: usize) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            accounts_url: config.accounts_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            batch_size,
        }
    }
}

/// Gate closed by a provider 429 until its `Retry-After` elapses
struct RateLimitGate {
    blocked_until: Mutex<Option<Instant>>,
    max_wait: Duration,
}

impl RateLimitGate {
    fn new(max_wait: Duration) -> Self {
        Self {
            blocked_until: Mutex::new(None),
            max_wait,
        }
    }

    /// Sleep out a short block; fail fast on a long one
    async fn wait(&self) -> Result<(), SpotifyError> {
        let until = *self.blocked_until.lock().await;
        if let Some(until) = until {
            let now = Instant::now();
            if until > now {
                let remaining = until - now;
                if remaining > self.max_wait {
                    return Err(SpotifyError::Throttled(remaining));
                }
                debug!(wait_ms = remaining.as_millis() as u64, "Spotify rate limiting: waiting");
                tokio::time::sleep(remaining).await;
            }
        }
        Ok(())
    }

    async fn block_for(&self, duration: Duration) {
        let mut blocked = self.blocked_until.lock().await;
        let until = Instant::now() + duration;
        if blocked.map_or(true, |current| until > current) {
            *blocked = Some(until);
        }
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct Profile {
    id: String,
}

#[derive(Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Deserialize)]
struct TrackResponse {
    uri: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<AudioFeatures>>,
}

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistTrackItem {
    track: Option<TrackUri>,
}

#[derive(Deserialize)]
struct TrackUri {
    uri: Option<String>,
}

#[derive(Deserialize)]
struct CreatedPlaylist {
    id: String,
}

/// Spotify API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    config: SpotifyClientConfig,
    batch_size: usize,
    app_token: RwLock<Option<CachedToken>>,
    gate: RateLimitGate,
}

impl SpotifyClient {
    pub fn new(config: SpotifyClientConfig) -> Result<Self, SpotifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        let batch_size = config.batch_size.clamp(1, PROVIDER_MAX_BATCH);

        Ok(Self {
            http_client,
            config,
            batch_size,
            app_token: RwLock::new(None),
            gate: RateLimitGate::new(MAX_GATE_WAIT),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.config.accounts_url)
    }

    /// `Basic base64(client_id:client_secret)`
    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.config.client_id, self.config.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes())
        )
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SpotifyError> {
        let request = self
            .http_client
            .post(self.token_url())
            .header(AUTHORIZATION, self.basic_auth_header())
            .form(form);
        self.send_json(request).await
    }

    /// Client-credentials token, cached until shortly before it expires
    async fn app_access_token(&self) -> Result<String, SpotifyError> {
        {
            let cached = self.app_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.app_token.write().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        info!("Application token cache miss, requesting client-credentials token");
        let response = self
            .token_request(&[("grant_type", "client_credentials")])
            .await?;
        let validity = Duration::from_secs(response.expires_in.saturating_sub(APP_TOKEN_MARGIN_SECS));
        let access_token = response.access_token;
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + validity,
        });

        Ok(access_token)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SpotifyError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SpotifyError::Parse(format!("Failed to parse Spotify response: {}", e)))
    }

    /// Gate, log, execute and classify one request
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, SpotifyError> {
        let request = request
            .build()
            .map_err(|e| SpotifyError::InvalidRequest(e.to_string()))?;

        self.gate.wait().await?;
        log_request(&request);

        let method = request.method().clone();
        let url = display_url(request.url());

        let response = self.http_client.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                warn!(method = %method, url = %url, "Spotify request timed out");
                SpotifyError::Timeout(url.clone())
            } else {
                warn!(method = %method, url = %url, error = %e, "Spotify request failed");
                SpotifyError::Network(format!("Request to {} failed", url))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            info!(method = %method, url = %url, status = status.as_u16(), "Spotify request succeeded");
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
        if status.as_u16() == 429 {
            if let Some(delay) = retry_after {
                self.gate.block_for(delay).await;
            }
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            retry_after_secs = retry_after.map(|d| d.as_secs()),
            response = %sanitize_body(body.as_bytes()),
            "Spotify returned an error response"
        );

        Err(SpotifyError::Api {
            status: status.as_u16(),
            retry_after,
        })
    }

    /// Follow `next` links until the collection is exhausted
    async fn paged<T: DeserializeOwned>(
        &self,
        access_token: &str,
        first_url: String,
    ) -> Result<Vec<T>, SpotifyError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: Page<T> = self
                .send_json(self.http_client.get(&url).bearer_auth(access_token))
                .await?;
            items.extend(page.items);
            next = page.next;
        }

        Ok(items)
    }
}

#[async_trait]
impl MusicProvider for SpotifyClient {
    fn authorization_url(&self, state: &str, scopes: &[&str]) -> moody_common::Result<String> {
        let scope = scopes.join(" ");
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.config.accounts_url),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| moody_common::Error::Config(format!("Invalid accounts URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> moody_common::Result<UserTokens> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .await?;

        let refresh_token = response.refresh_token.ok_or_else(|| {
            moody_common::Error::Client("Token response missing refresh_token".to_string())
        })?;

        Ok(UserTokens {
            access_token: response.access_token,
            refresh_token,
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> moody_common::Result<String> {
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        Ok(response.access_token)
    }

    async fn current_user_id(&self, access_token: &str) -> moody_common::Result<String> {
        let profile: Profile = self
            .send_json(self.http_client.get(self.api_url("/me")).bearer_auth(access_token))
            .await?;
        Ok(profile.id)
    }

    async fn track(&self, code: &str) -> moody_common::Result<TrackInfo> {
        let token = self.app_access_token().await?;
        let url = self.api_url(&format!("/tracks/{}", track_id(code)));
        let track: TrackResponse = self
            .send_json(self.http_client.get(url).bearer_auth(token))
            .await?;

        let artist = track
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_default();

        Ok(TrackInfo {
            code: track.uri.unwrap_or_else(|| code.to_string()),
            name: track.name,
            artist,
        })
    }

    async fn audio_features(&self, codes: &[String]) -> moody_common::Result<Vec<Option<AudioFeatures>>> {
        let mut features = Vec::with_capacity(codes.len());

        for batch in codes.chunks(self.batch_size) {
            let token = self.app_access_token().await?;
            let ids = batch.iter().map(|c| track_id(c)).collect::<Vec<_>>().join(",");
            let response: AudioFeaturesResponse = self
                .send_json(
                    self.http_client
                        .get(self.api_url("/audio-features"))
                        .query(&[("ids", ids.as_str())])
                        .bearer_auth(token),
                )
                .await?;

            if response.audio_features.len() != batch.len() {
                return Err(SpotifyError::Parse(format!(
                    "Expected {} audio features, got {}",
                    batch.len(),
                    response.audio_features.len()
                ))
                .into());
            }
            features.extend(response.audio_features);
        }

        Ok(features)
    }

    async fn user_playlists(
        &self,
        access_token: &str,
        provider_user_id: &str,
    ) -> moody_common::Result<Vec<RemotePlaylist>> {
        let url = format!(
            "{}?limit={}",
            self.api_url(&format!("/users/{}/playlists", provider_user_id)),
            PAGE_LIMIT
        );
        Ok(self.paged(access_token, url).await?)
    }

    async fn create_playlist(
        &self,
        access_token: &str,
        provider_user_id: &str,
        name: &str,
    ) -> moody_common::Result<String> {
        let created: CreatedPlaylist = self
            .send_json(
                self.http_client
                    .post(self.api_url(&format!("/users/{}/playlists", provider_user_id)))
                    .bearer_auth(access_token)
                    .json(&json!({ "name": name, "public": true })),
            )
            .await?;
        Ok(created.id)
    }

    async fn playlist_track_uris(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> moody_common::Result<Vec<String>> {
        let url = format!(
            "{}?fields=items(track(uri)),next&limit={}",
            self.api_url(&format!("/playlists/{}/tracks", playlist_id)),
            PROVIDER_MAX_BATCH
        );
        let items: Vec<PlaylistTrackItem> = self.paged(access_token, url).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| item.track.and_then(|t| t.uri))
            .collect())
    }

    async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> moody_common::Result<()> {
        let url = self.api_url(&format!("/playlists/{}/tracks", playlist_id));
        for batch in uris.chunks(self.batch_size) {
            self.send(
                self.http_client
                    .post(&url)
                    .bearer_auth(access_token)
                    .json(&json!({ "uris": batch })),
            )
            .await?;
        }
        Ok(())
    }

    async fn remove_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> moody_common::Result<()> {
        let url = self.api_url(&format!("/playlists/{}/tracks", playlist_id));
        for batch in uris.chunks(self.batch_size) {
            let tracks: Vec<_> = batch.iter().map(|uri| json!({ "uri": uri })).collect();
            self.send(
                self.http_client
                    .request(Method::DELETE, &url)
                    .bearer_auth(access_token)
                    .json(&json!({ "tracks": tracks })),
            )
            .await?;
        }
        Ok(())
    }

    async fn upload_playlist_cover(
        &self,
        access_token: &str,
        playlist_id: &str,
        jpeg: &[u8],
    ) -> moody_common::Result<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
        self.send(
            self.http_client
                .put(self.api_url(&format!("/playlists/{}/images", playlist_id)))
                .bearer_auth(access_token)
                .header(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"))
                .body(encoded),
        )
        .await?;
        Ok(())
    }

    async fn top_artists(&self, access_token: &str, limit: usize) -> moody_common::Result<Vec<String>> {
        let limit = limit.clamp(1, PAGE_LIMIT).to_string();
        let page: Page<ArtistRef> = self
            .send_json(
                self.http_client
                    .get(self.api_url("/me/top/artists"))
                    .query(&[("limit", limit.as_str()), ("time_range", "medium_term")])
                    .bearer_auth(access_token),
            )
            .await?;
        Ok(page.items.into_iter().map(|a| a.name).collect())
    }
}

/// `spotify:track:<id>` → `<id>`; bare ids pass through
fn track_id(code: &str) -> &str {
    code.rsplit(':').next().unwrap_or(code)
}

/// Seconds form of `Retry-After`
fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn display_url(url: &Url) -> String {
    let mut display = url.clone();
    display.set_query(None);
    display.to_string()
}

fn log_request(request: &Request) {
    let query: Vec<(String, String)> = request
        .url()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let query_refs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let is_image = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("image/"));
    let body = match request.body().and_then(|b| b.as_bytes()) {
        Some(bytes) if is_image => format!("<{} bytes>", bytes.len()),
        Some(bytes) => sanitize_body(bytes),
        None => String::new(),
    };

    info!(
        method = %request.method(),
        url = %display_url(request.url()),
        params = %sanitize::sanitize_pairs(&query_refs),
        headers = %sanitize::sanitize_headers(request.headers()),
        body = %body,
        "Making Spotify request"
    );
}

/// JSON and form bodies are rendered masked; anything else by size only
fn sanitize_body(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
        return sanitize::sanitize_json(&value).to_string();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) if text.contains('=') && !text.contains(' ') => {
            let pairs: Vec<(&str, &str)> = text
                .split('&')
                .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
                .collect();
            sanitize::sanitize_pairs(&pairs)
        }
        _ => format!("<{} bytes>", bytes.len()),
    }
}
