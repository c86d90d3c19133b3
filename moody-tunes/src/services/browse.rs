//! Recommendation engine
//!
//! A browse samples the catalog around the user's center for an emotion.
//! One axis is drawn at random per call and the jitter window is applied
//! on that axis only. Songs the user already voted on for the emotion (or
//! emotion and context) are never offered again.

use crate::config::RuntimeSettings;
use crate::db::{provider_auth, songs, votes};
use crate::services::browse_cache::{BrowseCache, CachedBrowsePlaylist};
use crate::services::user_emotion;
use crate::services::votes::validate_description;
use moody_common::db::Song;
use moody_common::{Attributes, Axis, Emotion, Error, Result, VoteContext};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_JITTER: f64 = 0.5;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowseRequest {
    pub emotion: Option<Emotion>,
    pub genre: Option<String>,
    pub context: Option<VoteContext>,
    pub artist: Option<String>,
    pub jitter: Option<f64>,
    pub limit: Option<usize>,
    pub description: Option<String>,
}

/// Where the sampling center came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CenterSource {
    ContextUpvotes,
    UserEmotion,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseResult {
    pub emotion: Emotion,
    pub context: VoteContext,
    pub axis: Axis,
    pub center: Attributes,
    pub center_source: CenterSource,
    pub jitter: f64,
    pub songs: Vec<Song>,
}

/// Validated browse parameters
struct BrowsePlan<'a> {
    emotion: Emotion,
    context: Option<VoteContext>,
    genre: Option<&'a str>,
    artist: Option<&'a str>,
    jitter: f64,
    limit: usize,
    description: &'a str,
}

#[derive(Clone)]
pub struct BrowseService {
    db: SqlitePool,
    cache: BrowseCache,
    settings: Arc<RuntimeSettings>,
}

impl BrowseService {
    pub fn new(db: SqlitePool, cache: BrowseCache, settings: Arc<RuntimeSettings>) -> Self {
        Self { db, cache, settings }
    }

    pub async fn browse(&self, user_id: Uuid, request: &BrowseRequest) -> Result<BrowseResult> {
        let plan = self.plan(request)?;

        let (center, center_source) = self.resolve_center(user_id, plan.emotion, plan.context).await?;
        let axis = {
            let mut rng = rand::thread_rng();
            Axis::ALL[rng.gen_range(0..Axis::ALL.len())]
        };

        let top_artists = provider_auth::top_artists_for_user(&self.db, user_id).await?;
        let mut picked = Vec::new();

        if !top_artists.is_empty() {
            let filter = self.filter(
                user_id,
                &plan,
                axis,
                center,
                Some(top_artists.as_slice()),
                &[],
                plan.limit,
            );
            picked = songs::find_candidates(&self.db, &filter).await?;
            debug!(
                user_id = %user_id,
                matched = picked.len(),
                top_artists = top_artists.len(),
                "Top-artist pass"
            );
        }

        if picked.len() < plan.limit {
            let exclude: Vec<String> = picked.iter().map(|s| s.code.clone()).collect();
            let remaining = plan.limit - picked.len();
            let filter = self.filter(user_id, &plan, axis, center, None, &exclude, remaining);
            picked.extend(songs::find_candidates(&self.db, &filter).await?);
        }

        {
            let mut rng = rand::thread_rng();
            picked.shuffle(&mut rng);
        }
        picked.truncate(plan.limit);

        let context = plan.context.unwrap_or_default();
        let cached = CachedBrowsePlaylist {
            emotion: plan.emotion,
            context,
            description: plan.description.to_string(),
            playlist: picked.iter().map(|s| s.code.clone()).collect(),
        };
        self.cache.store(user_id, &cached).await?;

        info!(
            user_id = %user_id,
            emotion = %plan.emotion,
            context = %context,
            axis = axis.column(),
            jitter = plan.jitter,
            returned = picked.len(),
            "Browse playlist generated"
        );

        Ok(BrowseResult {
            emotion: plan.emotion,
            context,
            axis,
            center,
            center_source,
            jitter: plan.jitter,
            songs: picked,
        })
    }

    fn plan<'a>(&self, request: &'a BrowseRequest) -> Result<BrowsePlan<'a>> {
        let emotion = request
            .emotion
            .ok_or_else(|| Error::InvalidInput("emotion is required".to_string()))?;

        let jitter = request.jitter.unwrap_or(self.settings.browse_default_jitter);
        if !(0.0..=MAX_JITTER).contains(&jitter) {
            return Err(Error::InvalidInput(format!(
                "jitter must be between 0 and {}",
                MAX_JITTER
            )));
        }

        let limit = request.limit.unwrap_or(self.settings.browse_default_limit);
        if limit == 0 || limit > self.settings.browse_max_limit {
            return Err(Error::InvalidInput(format!(
                "limit must be between 1 and {}",
                self.settings.browse_max_limit
            )));
        }

        let description = request.description.as_deref().unwrap_or("");
        validate_description(description)?;

        Ok(BrowsePlan {
            emotion,
            context: request.context.filter(|c| *c != VoteContext::Unspecified),
            genre: non_empty(request.genre.as_deref()),
            artist: non_empty(request.artist.as_deref()),
            jitter,
            limit,
            description,
        })
    }

    async fn resolve_center(
        &self,
        user_id: Uuid,
        emotion: Emotion,
        context: Option<VoteContext>,
    ) -> Result<(Attributes, CenterSource)> {
        if let Some(context) = context {
            let upvoted =
                votes::context_upvoted_attributes(&self.db, user_id, emotion, context).await?;
            if let Some(center) = Attributes::mean(&upvoted) {
                return Ok((center, CenterSource::ContextUpvotes));
            }
        }

        let mut conn = self.db.acquire().await?;
        let row = user_emotion::ensure(&mut conn, user_id, emotion).await?;
        Ok((row.attributes(), CenterSource::UserEmotion))
    }

    #[allow(clippy::too_many_arguments)]
    fn filter<'a>(
        &self,
        user_id: Uuid,
        plan: &BrowsePlan<'a>,
        axis: Axis,
        center: Attributes,
        artists_in: Option<&'a [String]>,
        exclude_codes: &'a [String],
        limit: usize,
    ) -> songs::CandidateFilter<'a> {
        songs::CandidateFilter {
            user_id,
            emotion: plan.emotion,
            context: plan.context,
            axis,
            center_value: center.axis(axis),
            jitter: plan.jitter,
            genre: plan.genre,
            artist: plan.artist,
            artists_in,
            exclude_codes,
            limit,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use moody_common::db::init_memory_database;
    use std::time::Duration;

    async fn service() -> BrowseService {
        let pool = init_memory_database().await.unwrap();
        BrowseService::new(
            pool,
            BrowseCache::new(Duration::from_secs(600)),
            Arc::new(RuntimeSettings::default()),
        )
    }

    #[tokio::test]
    async fn test_plan_rejects_out_of_range_parameters() {
        let service = service().await;
        let base = BrowseRequest {
            emotion: Some(Emotion::Happy),
            ..Default::default()
        };

        assert!(service.plan(&base).is_ok());
        assert!(service.plan(&BrowseRequest { emotion: None, ..base.clone() }).is_err());
        assert!(service.plan(&BrowseRequest { jitter: Some(0.51), ..base.clone() }).is_err());
        assert!(service.plan(&BrowseRequest { jitter: Some(-0.1), ..base.clone() }).is_err());
        assert!(service.plan(&BrowseRequest { jitter: Some(0.0), ..base.clone() }).is_ok());
        assert!(service.plan(&BrowseRequest { limit: Some(26), ..base.clone() }).is_err());
        assert!(service.plan(&BrowseRequest { limit: Some(0), ..base.clone() }).is_err());
        assert!(service.plan(&BrowseRequest { limit: Some(25), ..base.clone() }).is_ok());
    }

    #[tokio::test]
    async fn test_plan_defaults_and_blank_filters() {
        let service = service().await;
        let request = BrowseRequest {
            emotion: Some(Emotion::Calm),
            genre: Some("  ".to_string()),
            context: Some(VoteContext::Unspecified),
            ..Default::default()
        };
        let plan = service.plan(&request).unwrap();
        assert_eq!(plan.jitter, 0.15);
        assert_eq!(plan.limit, 9);
        assert!(plan.genre.is_none());
        assert!(plan.context.is_none());
    }
}
