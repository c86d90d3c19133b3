//! Browse, playlist and voting endpoints

use crate::api::auth::CurrentUser;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::db::songs;
use crate::error::{ApiError, ApiResult};
use crate::services::browse::{BrowseRequest, BrowseResult};
use crate::services::browse_cache::LastPlaylist;
use crate::services::playlist::{self, PlaylistPage, PlaylistQuery};
use crate::services::votes::{CastVote, VoteOutcome};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use moody_common::{Attributes, Emotion, VoteContext};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// GET /tunes/browse
pub async fn browse(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(request): ApiQuery<BrowseRequest>,
) -> ApiResult<Json<BrowseResult>> {
    let result = state.browse.browse(user.id, &request).await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
pub struct PlaylistResponse {
    #[serde(flatten)]
    pub page: PlaylistPage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<String>,
}

/// GET /tunes/playlist
pub async fn playlist(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<PlaylistQuery>,
) -> ApiResult<Json<PlaylistResponse>> {
    let page =
        playlist::playlist_page(&state.db, user.id, &query, state.settings.playlist_page_size).await?;

    let (first_page, last_page) = if page.pagination.spans_multiple_pages() {
        (
            Some(page_link(&query, 1)?),
            Some(page_link(&query, page.pagination.total_pages)?),
        )
    } else {
        (None, None)
    };

    Ok(Json(PlaylistResponse {
        page,
        first_page,
        last_page,
    }))
}

fn page_link(query: &PlaylistQuery, page: i64) -> ApiResult<String> {
    let mut url = Url::parse("http://localhost/tunes/playlist")
        .map_err(|e| ApiError::Internal(format!("Invalid link base: {}", e)))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("emotion", query.emotion.code());
        if let Some(genre) = &query.genre {
            pairs.append_pair("genre", genre);
        }
        if let Some(context) = query.context {
            pairs.append_pair("context", context.code());
        }
        if let Some(artist) = &query.artist {
            pairs.append_pair("artist", artist);
        }
        pairs.append_pair("page", &page.to_string());
    }
    Ok(match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    })
}

/// GET /tunes/last
pub async fn last_playlist(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<LastPlaylist>> {
    state
        .browse_cache
        .last_playlist(&state.db, user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No recent browse playlist".to_string()))
}

/// POST /tunes/vote
pub async fn cast_vote(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(request): ApiJson<CastVote>,
) -> ApiResult<(StatusCode, Json<VoteOutcome>)> {
    let outcome = state.votes.cast_vote(user.id, &request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct RetractVote {
    pub song_code: String,
    pub emotion: Emotion,
    pub context: Option<VoteContext>,
}

#[derive(Debug, Serialize)]
pub struct RetractResponse {
    pub song_code: String,
    pub emotion: Emotion,
    pub center: Option<Attributes>,
}

/// DELETE /tunes/vote
pub async fn retract_vote(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(request): ApiJson<RetractVote>,
) -> ApiResult<Json<RetractResponse>> {
    let center = state
        .votes
        .retract_vote(user.id, &request.song_code, request.emotion, request.context)
        .await?;
    Ok(Json(RetractResponse {
        song_code: request.song_code,
        emotion: request.emotion,
        center,
    }))
}

#[derive(Debug, Serialize)]
pub struct NamedOption {
    pub code: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub emotions: Vec<NamedOption>,
    pub genres: Vec<String>,
    pub contexts: Vec<NamedOption>,
}

/// GET /tunes/options
pub async fn options(State(state): State<AppState>) -> ApiResult<Json<OptionsResponse>> {
    let genres = songs::distinct_genres(&state.db).await?;
    Ok(Json(OptionsResponse {
        emotions: Emotion::ALL
            .iter()
            .map(|e| NamedOption {
                code: e.code(),
                name: e.full_name(),
            })
            .collect(),
        genres,
        contexts: VoteContext::ALL
            .iter()
            .map(|c| NamedOption {
                code: c.code(),
                name: c.display_name(),
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VoteInfoQuery {
    pub emotion: Emotion,
    pub song_code: String,
}

#[derive(Debug, Serialize)]
pub struct VoteInfoResponse {
    pub song_code: String,
    pub emotion: Emotion,
    pub contexts: Vec<VoteContext>,
}

/// GET /tunes/vote/info
pub async fn vote_info(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<VoteInfoQuery>,
) -> ApiResult<Json<VoteInfoResponse>> {
    let contexts = state
        .votes
        .vote_info(user.id, &query.song_code, query.emotion)
        .await?;
    Ok(Json(VoteInfoResponse {
        song_code: query.song_code,
        emotion: query.emotion,
        contexts,
    }))
}

/// Build tunes routes
pub fn tunes_routes() -> Router<AppState> {
    Router::new()
        .route("/tunes/browse", get(browse))
        .route("/tunes/playlist", get(playlist))
        .route("/tunes/last", get(last_playlist))
        .route("/tunes/vote", axum::routing::post(cast_vote).delete(retract_vote))
        .route("/tunes/vote/info", get(vote_info))
        .route("/tunes/options", get(options))
}
