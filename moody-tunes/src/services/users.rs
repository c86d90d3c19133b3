//! User observation and bootstrap
//!
//! Identity is owned by the external session layer. The first time a
//! username is seen it becomes a user with one UserEmotion per emotion,
//! all written in a single transaction.

use crate::db::{emotions, user_emotions, users};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use moody_common::db::User;
use moody_common::{Emotion, Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Maximum accepted username length
pub const MAX_USERNAME_LEN: usize = 150;

/// Return the user for `username`, creating it on first sight
pub async fn observe_user(db: &SqlitePool, username: &str) -> Result<User> {
    validate_username(username)?;

    if let Some(user) = users::find_by_username(db, username).await? {
        return Ok(user);
    }

    match create_user(db, username, None).await {
        Ok(user) => Ok(user),
        // Another request created the same username first
        Err(e) if e.is_unique_violation() => {
            debug!(username = %username, "User created concurrently, re-reading");
            users::find_by_username(db, username)
                .await?
                .ok_or_else(|| Error::Internal(format!("User '{}' vanished after insert race", username)))
        }
        Err(e) => Err(e),
    }
}

/// Create a user and seed every emotion with its default center
pub async fn create_user(db: &SqlitePool, username: &str, email: Option<String>) -> Result<User> {
    validate_username(username)?;
    let user = users::new_user(username, email);
    let record = &user;

    retry_on_lock("user bootstrap", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
        let mut tx = db.begin().await?;
        users::insert_user(&mut *tx, record).await?;
        for emotion in Emotion::ALL {
            let defaults = emotions::load_defaults(&mut *tx, emotion).await?;
            user_emotions::create_if_missing(&mut *tx, record.id, emotion, &defaults).await?;
        }
        tx.commit().await?;
        Ok::<(), Error>(())
    })
    .await?;

    info!(user_id = %user.id, username = %user.username, "User bootstrapped");
    Ok(user)
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(Error::InvalidInput("Username must not be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(Error::InvalidInput(format!(
            "Username is limited to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}
