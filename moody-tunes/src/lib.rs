//! moody-tunes library interface
//!
//! Exposes the HTTP router, services and workers for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;
pub mod utils;
pub mod workers;

pub use crate::error::{ApiError, ApiResult};

use crate::config::RuntimeSettings;
use crate::services::{
    BrowseCache, BrowseService, ExportService, MusicProvider, OAuthService, ProviderAuthStore,
    SuggestLimiter, VoteService,
};
use crate::workers::queue::TaskQueue;
use crate::workers::WorkerContext;
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use moody_common::crypto::TokenCipher;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Bootstrap values the services need beyond the runtime settings
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub image_upload_path: PathBuf,
    pub auth_state_length: usize,
    pub max_top_artists: usize,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<RuntimeSettings>,
    pub provider: Arc<dyn MusicProvider>,
    pub auth_store: ProviderAuthStore,
    pub browse_cache: BrowseCache,
    pub browse: BrowseService,
    pub votes: VoteService,
    pub exports: ExportService,
    pub oauth: OAuthService,
    pub suggest_limiter: SuggestLimiter,
    pub queue: TaskQueue,
    pub max_top_artists: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        settings: RuntimeSettings,
        provider: Arc<dyn MusicProvider>,
        cipher: TokenCipher,
        options: AppOptions,
    ) -> Self {
        let settings = Arc::new(settings);
        let queue = TaskQueue::new(db.clone(), settings.clone());
        let auth_store = ProviderAuthStore::new(
            db.clone(),
            Arc::new(cipher),
            provider.clone(),
            settings.provider_token_ttl_secs,
        );
        let browse_cache = BrowseCache::new(Duration::from_secs(settings.browse_cache_ttl_secs));

        Self {
            browse: BrowseService::new(db.clone(), browse_cache.clone(), settings.clone()),
            votes: VoteService::new(db.clone(), queue.clone(), settings.candidate_batch_size),
            exports: ExportService::new(
                db.clone(),
                queue.clone(),
                auth_store.clone(),
                options.image_upload_path,
            ),
            oauth: OAuthService::new(
                db.clone(),
                provider.clone(),
                auth_store.clone(),
                queue.clone(),
                options.auth_state_length,
            ),
            suggest_limiter: SuggestLimiter::per_minute(settings.suggest_rate_limit_per_minute),
            max_top_artists: options.max_top_artists,
            startup_time: Utc::now(),
            db,
            settings,
            provider,
            auth_store,
            browse_cache,
            queue,
        }
    }

    /// Context for background workers sharing this state's services
    pub fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            db: self.db.clone(),
            settings: self.settings.clone(),
            provider: self.provider.clone(),
            auth_store: self.auth_store.clone(),
            queue: self.queue.clone(),
            max_top_artists: self.max_top_artists,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let identified = Router::new()
        .merge(api::tunes_routes())
        .merge(api::spotify_routes())
        .merge(api::account_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), api::auth::identify_user));

    Router::new()
        .merge(identified)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
