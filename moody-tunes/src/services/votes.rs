//! Vote intake
//!
//! Casting and retracting votes write the vote log inside a transaction.
//! Recompute of the user-emotion center runs after commit; when it fails
//! the recompute is queued so the center still converges.

use crate::db::{songs, votes};
use crate::services::user_emotion;
use crate::workers::{queue::TaskQueue, task::Task};
use moody_common::{Attributes, Emotion, Error, Result, VoteContext};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MAX_DESCRIPTION_LEN: usize = 100;

static DESCRIPTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.?!, ]*$").expect("description pattern compiles"));

/// A vote as submitted by the user
#[derive(Debug, Clone, Deserialize)]
pub struct CastVote {
    pub song_code: String,
    pub emotion: Emotion,
    pub vote: bool,
    #[serde(default)]
    pub context: VoteContext,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub vote_id: i64,
    /// A retracted up-vote was flipped back instead of inserting a row
    pub restored: bool,
    /// New center, when the vote triggered a recompute that succeeded
    pub center: Option<Attributes>,
}

#[derive(Clone)]
pub struct VoteService {
    db: SqlitePool,
    queue: TaskQueue,
    candidate_batch_size: usize,
}

impl VoteService {
    pub fn new(db: SqlitePool, queue: TaskQueue, candidate_batch_size: usize) -> Self {
        Self {
            db,
            queue,
            candidate_batch_size,
        }
    }

    pub async fn cast_vote(&self, user_id: Uuid, request: &CastVote) -> Result<VoteOutcome> {
        validate_description(&request.description)?;

        let mut tx = self.db.begin().await?;
        let song_id = songs::song_id_by_code(&mut *tx, &request.song_code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Song {}", request.song_code)))?;

        user_emotion::ensure(&mut *tx, user_id, request.emotion).await?;

        let existing =
            votes::find_vote(&mut *tx, user_id, song_id, request.emotion, request.context).await?;
        let (vote_id, restored) = match existing {
            Some(row) if !row.vote && request.vote => {
                votes::restore_upvote(&mut *tx, row.id, &request.description).await?;
                (row.id, true)
            }
            Some(_) => {
                return Err(Error::Conflict(format!(
                    "Already voted on this song for {}",
                    request.emotion.full_name()
                )))
            }
            None => {
                let new_vote = votes::NewVote {
                    user_id,
                    song_id,
                    emotion: request.emotion,
                    context: request.context,
                    description: &request.description,
                    vote: request.vote,
                };
                match votes::insert_vote(&mut *tx, &new_vote).await {
                    Ok(id) => (id, false),
                    Err(e) if e.is_unique_violation() => {
                        return Err(Error::Conflict(format!(
                            "Already voted on this song for {}",
                            request.emotion.full_name()
                        )))
                    }
                    Err(e) => return Err(e),
                }
            }
        };
        tx.commit().await?;

        info!(
            user_id = %user_id,
            song_code = %request.song_code,
            emotion = %request.emotion,
            context = %request.context,
            vote = request.vote,
            restored,
            "Vote recorded"
        );

        // Down-votes leave the center untouched
        let center = if request.vote {
            self.after_change(user_id, request.emotion).await
        } else {
            None
        };

        Ok(VoteOutcome {
            vote_id,
            restored,
            center,
        })
    }

    /// Flip matching up-votes to false; `context = None` retracts every context
    pub async fn retract_vote(
        &self,
        user_id: Uuid,
        song_code: &str,
        emotion: Emotion,
        context: Option<VoteContext>,
    ) -> Result<Option<Attributes>> {
        let song_id = songs::song_id_by_code(&self.db, song_code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Song {}", song_code)))?;

        let retracted = votes::retract_upvotes(&self.db, user_id, song_id, emotion, context).await?;
        if retracted == 0 {
            return Err(Error::NotFound(format!(
                "No up-vote for {} under {}",
                song_code,
                emotion.full_name()
            )));
        }

        info!(
            user_id = %user_id,
            song_code = %song_code,
            emotion = %emotion,
            retracted,
            "Vote retracted"
        );
        Ok(self.after_change(user_id, emotion).await)
    }

    /// Contexts in which the user holds an up-vote for the song
    pub async fn vote_info(
        &self,
        user_id: Uuid,
        song_code: &str,
        emotion: Emotion,
    ) -> Result<Vec<VoteContext>> {
        let song_id = songs::song_id_by_code(&self.db, song_code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Song {}", song_code)))?;
        votes::upvote_contexts(&self.db, user_id, song_id, emotion).await
    }

    async fn after_change(&self, user_id: Uuid, emotion: Emotion) -> Option<Attributes> {
        match user_emotion::recompute(&self.db, user_id, emotion, self.candidate_batch_size).await {
            Ok(center) => Some(center),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    emotion = %emotion,
                    error = %e,
                    "Inline recompute failed, queueing"
                );
                if let Err(e) = self
                    .queue
                    .enqueue(&Task::RecomputeUserEmotion { user_id, emotion })
                    .await
                {
                    error!(user_id = %user_id, emotion = %emotion, error = %e, "Failed to queue recompute");
                }
                None
            }
        }
    }
}

/// Descriptions are short free text over a restricted alphabet
pub fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(Error::InvalidInput(format!(
            "Description is limited to {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    if !DESCRIPTION_PATTERN.is_match(description) {
        return Err(Error::InvalidInput(
            "Description may only contain letters, digits, spaces and _ . ? ! ,".to_string(),
        ));
    }
    Ok(())
}
