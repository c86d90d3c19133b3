//! Top-artist personalization data

use crate::db::provider_auth as store;
use crate::services::provider::MusicProvider;
use crate::services::provider_auth::{require_scope, ProviderAuthStore};
use crate::workers::queue::TaskQueue;
use crate::workers::task::Task;
use moody_common::db::SCOPE_TOP_ARTIST_READ;
use moody_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;

/// Refresh one user's top artists; returns how many were stored
///
/// A vanished auth (user revoked meanwhile) is not an error.
pub async fn refresh_top_artists(
    db: &SqlitePool,
    provider: &dyn MusicProvider,
    auth_store: &ProviderAuthStore,
    auth_id: i64,
    max_artists: usize,
) -> Result<usize> {
    let auth = match auth_store.get_and_refresh(auth_id).await {
        Ok(auth) => auth,
        Err(Error::NotFound(_)) => {
            info!(auth_id, "Provider auth gone, skipping top-artist refresh");
            return Ok(0);
        }
        Err(e) => return Err(e),
    };
    require_scope(&auth, SCOPE_TOP_ARTIST_READ)?;

    let mut artists = provider.top_artists(&auth.access_token, max_artists).await?;
    artists.truncate(max_artists);
    store::save_top_artists(db, auth_id, &artists).await?;

    info!(auth_id, count = artists.len(), "Top artists refreshed");
    Ok(artists.len())
}

/// Queue a refresh for every auth holding the top-artist scope
pub async fn fan_out(db: &SqlitePool, queue: &TaskQueue) -> Result<usize> {
    let auth_ids = store::ids_with_scope(db, SCOPE_TOP_ARTIST_READ).await?;
    for auth_id in &auth_ids {
        queue.enqueue(&Task::RefreshTopArtists { auth_id: *auth_id }).await?;
    }
    info!(count = auth_ids.len(), "Top-artist refreshes queued");
    Ok(auth_ids.len())
}
