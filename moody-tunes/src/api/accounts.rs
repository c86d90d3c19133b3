//! Account endpoints

use crate::api::auth::CurrentUser;
use crate::api::extract::ApiQuery;
use crate::error::ApiResult;
use crate::services::analytics::{self, AnalyticsQuery, EmotionAnalytics};
use crate::AppState;
use axum::{
    extract::State,
    routing::get,
    Extension, Json, Router,
};

/// GET /accounts/analytics
pub async fn analytics(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<EmotionAnalytics>> {
    let summary = analytics::emotion_analytics(&state.db, user.id, &query).await?;
    Ok(Json(summary))
}

pub fn account_routes() -> Router<AppState> {
    Router::new().route("/accounts/analytics", get(analytics))
}
