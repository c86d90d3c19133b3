//! Spotify account linking

use crate::db::oauth_states;
use crate::db::provider_auth::NewProviderAuth;
use crate::services::provider::MusicProvider;
use crate::services::provider_auth::ProviderAuthStore;
use crate::workers::queue::TaskQueue;
use crate::workers::task::Task;
use moody_common::db::{ProviderAuth, REQUESTED_SCOPES};
use moody_common::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Delay before the first top-artist refresh of a new link
pub const INITIAL_TOP_ARTIST_DELAY: Duration = Duration::from_secs(30);

/// Query string of the provider redirect
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Linked(ProviderAuth),
    AlreadyAuthenticated,
}

#[derive(Clone)]
pub struct OAuthService {
    db: SqlitePool,
    provider: Arc<dyn MusicProvider>,
    auth_store: ProviderAuthStore,
    queue: TaskQueue,
    state_length: usize,
}

impl OAuthService {
    pub fn new(
        db: SqlitePool,
        provider: Arc<dyn MusicProvider>,
        auth_store: ProviderAuthStore,
        queue: TaskQueue,
        state_length: usize,
    ) -> Self {
        Self {
            db,
            provider,
            auth_store,
            queue,
            state_length,
        }
    }

    /// Authorization URL carrying a fresh single-use state
    pub async fn authorize(&self, user_id: Uuid) -> Result<String> {
        let state = generate_state(self.state_length);
        oauth_states::save_state(&self.db, user_id, &state).await?;
        self.provider.authorization_url(&state, &REQUESTED_SCOPES)
    }

    pub async fn callback(&self, user_id: Uuid, params: &CallbackParams) -> Result<CallbackOutcome> {
        if self.auth_store.exists_for_user(user_id).await? {
            return Ok(CallbackOutcome::AlreadyAuthenticated);
        }

        let expected = oauth_states::take_state(&self.db, user_id).await?;

        if let Some(error) = &params.error {
            warn!(user_id = %user_id, error = %error, "Spotify authorization refused");
            return Err(Error::InvalidInput(format!("Spotify authorization failed: {}", error)));
        }

        match (expected.as_deref(), params.state.as_deref()) {
            (Some(expected), Some(received)) if expected == received => {}
            _ => {
                warn!(user_id = %user_id, "OAuth state mismatch");
                return Err(Error::InvalidInput("Authorization state mismatch".to_string()));
            }
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidInput("Missing authorization code".to_string()))?;

        let tokens = self.provider.exchange_code(code).await?;
        let provider_user_id = self.provider.current_user_id(&tokens.access_token).await?;

        let auth = self
            .auth_store
            .link(&NewProviderAuth {
                user_id,
                provider_user_id,
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                scopes: REQUESTED_SCOPES.iter().map(|s| s.to_string()).collect(),
            })
            .await?;

        self.queue
            .enqueue_after(&Task::RefreshTopArtists { auth_id: auth.id }, INITIAL_TOP_ARTIST_DELAY)
            .await?;

        info!(user_id = %user_id, auth_id = auth.id, "Spotify authorization completed");
        Ok(CallbackOutcome::Linked(auth))
    }

    pub async fn revoke(&self, user_id: Uuid) -> Result<()> {
        self.auth_store.revoke(user_id).await
    }
}

fn generate_state(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
