//! Spotify integration endpoints

use crate::api::auth::CurrentUser;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::error::ApiResult;
use crate::services::export::{ExportAccepted, ExportRequest};
use crate::services::oauth::{CallbackOutcome, CallbackParams};
use crate::services::suggest;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub authorize_url: String,
}

/// GET /spotify/authorize
pub async fn authorize(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let authorize_url = state.oauth.authorize(user.id).await?;
    Ok(Json(AuthorizeResponse { authorize_url }))
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_user_id: Option<String>,
}

/// GET /spotify/callback
pub async fn callback(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(params): ApiQuery<CallbackParams>,
) -> ApiResult<Json<CallbackResponse>> {
    let response = match state.oauth.callback(user.id, &params).await? {
        CallbackOutcome::Linked(auth) => CallbackResponse {
            status: "linked",
            message: "Spotify account connected".to_string(),
            provider_user_id: Some(auth.provider_user_id),
        },
        CallbackOutcome::AlreadyAuthenticated => CallbackResponse {
            status: "already_authenticated",
            message: "Spotify account already connected".to_string(),
            provider_user_id: None,
        },
    };
    Ok(Json(response))
}

/// POST /spotify/revoke
pub async fn revoke(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    state.oauth.revoke(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /spotify/export
pub async fn export(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(request): ApiJson<ExportRequest>,
) -> ApiResult<(StatusCode, Json<ExportAccepted>)> {
    let accepted = state.exports.request_export(user.id, &request).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub task_id: Uuid,
    pub message: String,
}

/// POST /spotify/suggest
pub async fn suggest_song(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(request): ApiJson<SuggestRequest>,
) -> ApiResult<(StatusCode, Json<SuggestResponse>)> {
    let task_id = suggest::suggest_song(
        &state.db,
        &state.queue,
        &state.suggest_limiter,
        &user,
        &request.code,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SuggestResponse {
            task_id,
            message: "Thanks! The song will be added shortly".to_string(),
        }),
    ))
}

/// Build Spotify routes
pub fn spotify_routes() -> Router<AppState> {
    Router::new()
        .route("/spotify/authorize", get(authorize))
        .route("/spotify/callback", get(callback))
        .route("/spotify/revoke", post(revoke))
        .route("/spotify/export", post(export))
        .route("/spotify/suggest", post(suggest_song))
}
