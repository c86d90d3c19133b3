//! Request extractors that reject with the API error envelope
//!
//! axum's own `Json` and `Query` answer malformed input with plain-text
//! 400/415/422 responses. These wrappers delegate to them and turn any
//! rejection into `ApiError::BadRequest`.

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

/// JSON request body
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

/// URL query string
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        count: u32,
    }

    async fn error_code(err: ApiError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, body["error"]["code"].as_str().unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn test_bad_json_becomes_bad_request() {
        let request = HttpRequest::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"count": "many"}"#))
            .unwrap();
        let err = ApiJson::<Payload>::from_request(request, &()).await.unwrap_err();
        assert_eq!(error_code(err).await, (StatusCode::BAD_REQUEST, "BAD_REQUEST".to_string()));

        let request = HttpRequest::builder().body(Body::from(r#"{"count": 1}"#)).unwrap();
        let err = ApiJson::<Payload>::from_request(request, &()).await.unwrap_err();
        assert_eq!(error_code(err).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_query_becomes_bad_request() {
        let request = HttpRequest::builder().uri("/x?count=-3").body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let err = ApiQuery::<Payload>::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(error_code(err).await, (StatusCode::BAD_REQUEST, "BAD_REQUEST".to_string()));

        let request = HttpRequest::builder().uri("/x?count=3").body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let ApiQuery(payload) = ApiQuery::<Payload>::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(payload.count, 3);
    }
}
