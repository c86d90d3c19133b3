//! Provider credential lifecycle
//!
//! Every outbound call on behalf of a user goes through
//! `get_and_refresh`, which refreshes the access token once its TTL has
//! elapsed. Refreshes for the same auth are serialized so two callers in
//! quick succession trigger a single provider round trip.

use crate::db::provider_auth::{self as store, NewProviderAuth};
use crate::services::provider::MusicProvider;
use chrono::Utc;
use moody_common::crypto::TokenCipher;
use moody_common::db::ProviderAuth;
use moody_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ProviderAuthStore {
    db: SqlitePool,
    cipher: Arc<TokenCipher>,
    provider: Arc<dyn MusicProvider>,
    token_ttl_secs: i64,
    refresh_locks: RefreshLocks,
}

impl ProviderAuthStore {
    pub fn new(
        db: SqlitePool,
        cipher: Arc<TokenCipher>,
        provider: Arc<dyn MusicProvider>,
        token_ttl_secs: i64,
    ) -> Self {
        Self {
            db,
            cipher,
            provider,
            token_ttl_secs,
            refresh_locks: RefreshLocks::default(),
        }
    }

    /// Load the auth and refresh its access token if the TTL elapsed
    ///
    /// A failed refresh propagates the provider error and leaves the
    /// stored credentials untouched.
    pub async fn get_and_refresh(&self, auth_id: i64) -> Result<ProviderAuth> {
        let auth = self.load(auth_id).await?;
        if !auth.should_refresh(self.token_ttl_secs, Utc::now()) {
            return Ok(auth);
        }

        let lock = self.refresh_locks.acquire(auth_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_if_due(auth_id).await
        };
        self.refresh_locks.release(auth_id, lock).await;
        result
    }

    async fn refresh_if_due(&self, auth_id: i64) -> Result<ProviderAuth> {
        // Another caller may have refreshed while we waited
        let mut auth = self.load(auth_id).await?;
        if !auth.should_refresh(self.token_ttl_secs, Utc::now()) {
            return Ok(auth);
        }

        let access_token = match self.provider.refresh_access_token(&auth.refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                warn!(auth_id, error = %e, "Access token refresh failed");
                return Err(e);
            }
        };

        let refreshed_at = Utc::now();
        store::update_access_token(&self.db, &self.cipher, auth_id, &access_token, refreshed_at)
            .await?;
        auth.access_token = access_token;
        auth.last_refreshed = refreshed_at;

        info!(auth_id, user_id = %auth.user_id, "Access token refreshed");
        Ok(auth)
    }

    /// The user's auth, refreshed; `None` when the user never linked an account
    pub async fn for_user(&self, user_id: Uuid) -> Result<Option<ProviderAuth>> {
        match store::load_by_user(&self.db, &self.cipher, user_id).await? {
            Some(auth) => self.get_and_refresh(auth.id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Stored auth without touching the provider
    pub async fn peek_user(&self, user_id: Uuid) -> Result<Option<ProviderAuth>> {
        store::load_by_user(&self.db, &self.cipher, user_id).await
    }

    pub async fn exists_for_user(&self, user_id: Uuid) -> Result<bool> {
        store::exists_for_user(&self.db, user_id).await
    }

    /// Link a provider account; a provider id owned by another user is a conflict
    pub async fn link(&self, new_auth: &NewProviderAuth) -> Result<ProviderAuth> {
        match store::insert_auth(&self.db, &self.cipher, new_auth).await {
            Ok(auth) => {
                info!(
                    auth_id = auth.id,
                    user_id = %auth.user_id,
                    scopes = ?auth.scopes,
                    "Provider account linked"
                );
                Ok(auth)
            }
            Err(e) if e.is_unique_violation() => Err(Error::Conflict(
                "This Spotify account is already linked to another user".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Remove the user's link and everything derived from it
    pub async fn revoke(&self, user_id: Uuid) -> Result<()> {
        let removed = store::delete_by_user(&self.db, user_id).await?;
        if removed == 0 {
            return Err(Error::NotFound("No linked Spotify account".to_string()));
        }
        info!(user_id = %user_id, "Provider account unlinked");
        Ok(())
    }

    async fn load(&self, auth_id: i64) -> Result<ProviderAuth> {
        store::load_by_id(&self.db, &self.cipher, auth_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Provider auth {}", auth_id)))
    }

}

/// Per-auth refresh mutexes, dropped once no caller holds them
#[derive(Clone, Default)]
struct RefreshLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl RefreshLocks {
    async fn acquire(&self, auth_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().await;
        locks.entry(auth_id).or_default().clone()
    }

    async fn release(&self, auth_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.inner.lock().await;
        // Map entry plus ours: nobody else is waiting on it
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&auth_id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Permission fault unless the auth holds `scope`
pub fn require_scope(auth: &ProviderAuth, scope: &str) -> Result<()> {
    if auth.has_scope(scope) {
        Ok(())
    } else {
        Err(Error::Permission(format!("Missing Spotify permission: {}", scope)))
    }
}
