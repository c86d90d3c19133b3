//! Playlist view over the current up-vote set

use crate::db::votes::{self, UpvoteFilter, UpvotedSong};
use crate::pagination::{calculate_pagination, Pagination};
use moody_common::{Attributes, Emotion, Result, VoteContext};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistQuery {
    pub emotion: Emotion,
    pub genre: Option<String>,
    pub context: Option<VoteContext>,
    pub artist: Option<String>,
    pub page: Option<i64>,
}

impl PlaylistQuery {
    pub fn filter(&self) -> UpvoteFilter<'_> {
        UpvoteFilter {
            genre: self.genre.as_deref().filter(|g| !g.trim().is_empty()),
            context: self.context.filter(|c| *c != VoteContext::Unspecified),
            artist: self.artist.as_deref().filter(|a| !a.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistPage {
    pub emotion: Emotion,
    /// Distinct up-voted songs across all pages
    pub total: i64,
    /// Mean attributes of the whole set, absent when it is empty
    pub center: Option<Attributes>,
    pub pagination: Pagination,
    pub entries: Vec<UpvotedSong>,
}

/// One page of the user's current up-votes for an emotion
pub async fn playlist_page(
    db: &SqlitePool,
    user_id: Uuid,
    query: &PlaylistQuery,
    page_size: usize,
) -> Result<PlaylistPage> {
    let filter = query.filter();
    let summary = votes::upvote_summary(db, user_id, query.emotion, &filter).await?;
    let pagination = calculate_pagination(summary.total, query.page.unwrap_or(1), page_size as i64);

    let entries = if summary.total == 0 {
        Vec::new()
    } else {
        votes::upvoted_songs_page(
            db,
            user_id,
            query.emotion,
            &filter,
            pagination.page_size,
            pagination.offset,
        )
        .await?
    };

    Ok(PlaylistPage {
        emotion: query.emotion,
        total: summary.total,
        center: summary.center.map(|c| c.rounded()),
        pagination,
        entries,
    })
}
