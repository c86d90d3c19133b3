//! User-emotion attribute model
//!
//! The center for (user, emotion) is the mean of the N most recent
//! distinct-song up-votes, or the emotion defaults when there are none.
//! Recompute is the only writer besides bootstrap. Overlapping recomputes
//! are harmless: each writes a value derived from a complete snapshot.

use crate::db::{emotions, user_emotions, votes};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use moody_common::db::UserEmotion;
use moody_common::{Attributes, Emotion, Error, Result};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::debug;
use uuid::Uuid;

/// Load the (user, emotion) row, creating it from the defaults if missing
pub async fn ensure(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    emotion: Emotion,
) -> Result<UserEmotion> {
    if let Some(row) = user_emotions::load(&mut *conn, user_id, emotion).await? {
        return Ok(row);
    }

    let defaults = emotions::load_defaults(&mut *conn, emotion).await?;
    if user_emotions::create_if_missing(&mut *conn, user_id, emotion, &defaults).await? {
        debug!(user_id = %user_id, emotion = %emotion, "Lazily created user emotion");
    }

    user_emotions::load(&mut *conn, user_id, emotion)
        .await?
        .ok_or_else(|| Error::Internal(format!("User emotion {} missing after create", emotion)))
}

/// Center derived from the up-vote log, before persistence
pub async fn compute_center<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    batch_size: usize,
    defaults: &Attributes,
) -> Result<Attributes>
where
    E: SqliteExecutor<'e>,
{
    let recent = votes::recent_upvoted_attributes(executor, user_id, emotion, batch_size).await?;
    let center = Attributes::mean(&recent).unwrap_or(*defaults);
    Ok(center.rounded().or_defaults(defaults))
}

/// Recompute and persist the center for (user, emotion)
pub async fn recompute(
    db: &SqlitePool,
    user_id: Uuid,
    emotion: Emotion,
    batch_size: usize,
) -> Result<Attributes> {
    let defaults = emotions::load_defaults(db, emotion).await?;
    let center = compute_center(db, user_id, emotion, batch_size, &defaults).await?;
    center.validate()?;

    retry_on_lock("user emotion save", DEFAULT_MAX_LOCK_WAIT_MS, || {
        user_emotions::save_attributes(db, user_id, emotion, &center)
    })
    .await?;

    debug!(
        user_id = %user_id,
        emotion = %emotion,
        energy = center.energy,
        valence = center.valence,
        danceability = center.danceability,
        "User emotion recomputed"
    );
    Ok(center)
}
