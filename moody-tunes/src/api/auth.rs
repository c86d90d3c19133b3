//! Caller identification
//!
//! The session layer in front of the service authenticates users and
//! forwards the username in `X-Moody-User`. Requests without it are
//! refused.

use crate::error::ApiError;
use crate::services::users;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use moody_common::db::User;

pub const USER_HEADER: &str = "x-moody-user";

/// The identified caller, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub async fn identify_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let username = request
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Forbidden("Sign in to continue".to_string()))?
        .to_string();

    let user = users::observe_user(&state.db, &username).await?;
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
