//! Song suggestions
//!
//! Users may propose a catalog addition by provider track URI. Requests are
//! limited per user; accepted codes are fetched by a background task.

use crate::db::songs;
use crate::workers::queue::TaskQueue;
use crate::workers::task::Task;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use moody_common::db::User;
use moody_common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqlitePool;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

static TRACK_URI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^spotify:track:[A-Za-z0-9]{22}$").expect("track URI pattern compiles"));

/// Per-user submission limiter
#[derive(Clone)]
pub struct SuggestLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<Uuid>>,
}

impl SuggestLimiter {
    pub fn per_minute(limit: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    pub fn check(&self, user_id: Uuid) -> Result<()> {
        self.limiter.check_key(&user_id).map_err(|_| {
            Error::RateLimited("Too many suggestions, please wait a minute and try again".to_string())
        })
    }
}

pub fn validate_track_uri(code: &str) -> Result<()> {
    if TRACK_URI_PATTERN.is_match(code) {
        Ok(())
    } else {
        Err(Error::InvalidInput(
            "Song code must look like spotify:track:<22 letters or digits>".to_string(),
        ))
    }
}

/// Rate-limit, validate and queue a fetch for `code`
pub async fn suggest_song(
    db: &SqlitePool,
    queue: &TaskQueue,
    limiter: &SuggestLimiter,
    user: &User,
    code: &str,
) -> Result<Uuid> {
    limiter.check(user.id)?;
    let code = code.trim();
    validate_track_uri(code)?;

    if songs::song_exists(db, code).await? {
        return Err(Error::InvalidInput(format!("Song {} is already in the catalog", code)));
    }

    let task_id = queue
        .enqueue(&Task::FetchSong {
            code: code.to_string(),
            username: user.username.clone(),
        })
        .await?;
    info!(user_id = %user.id, code = %code, task_id = %task_id, "Song suggestion queued");
    Ok(task_id)
}
