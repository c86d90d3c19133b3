//! Per-emotion taste summary

use crate::db::votes::{self, UpvoteFilter};
use moody_common::{Emotion, Result, VoteContext};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsQuery {
    pub emotion: Emotion,
    pub genre: Option<String>,
    pub context: Option<VoteContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmotionAnalytics {
    pub emotion: Emotion,
    pub emotion_name: &'static str,
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    pub danceability: Option<f64>,
    pub total_songs: i64,
}

pub async fn emotion_analytics(
    db: &SqlitePool,
    user_id: Uuid,
    query: &AnalyticsQuery,
) -> Result<EmotionAnalytics> {
    let filter = UpvoteFilter {
        genre: query.genre.as_deref().filter(|g| !g.trim().is_empty()),
        context: query.context.filter(|c| *c != VoteContext::Unspecified),
        artist: None,
    };
    let summary = votes::upvote_summary(db, user_id, query.emotion, &filter).await?;
    let center = summary.center.map(|c| c.rounded());

    Ok(EmotionAnalytics {
        emotion: query.emotion,
        emotion_name: query.emotion.full_name(),
        energy: center.map(|c| c.energy),
        valence: center.map(|c| c.valence),
        danceability: center.map(|c| c.danceability),
        total_songs: summary.total,
    })
}
