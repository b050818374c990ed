use crate::core::error::ChatError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use log::error;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

pub mod events;
pub mod participants;
pub mod rooms;

const X_USER_ID: &str = "X-User-ID";

/// Every chat endpoint, without the service provider attached.
pub fn router() -> Router {
    Router::new()
        .nest("/participants", participants::router())
        .nest("/rooms", rooms::router())
        .merge(events::router())
}

#[derive(Debug)]
pub struct ExtractUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, (StatusCode, &'static str)> {
        if let Some(user_id) = parts.headers.get(X_USER_ID) {
            let user_id = user_id
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?;
            let user_id = Uuid::from_str(user_id)
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?;
            Ok(ExtractUser(user_id))
        } else {
            Err((StatusCode::BAD_REQUEST, "`X-User-ID` header is missing"))
        }
    }
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::Conflict(_) => StatusCode::CONFLICT,
            ChatError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ChatError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Attachments(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ChatError::Store(e) => {
                error!("store failure: {e}");
                "storage is unavailable, try again".to_owned()
            }
            ChatError::Attachments(e) => {
                error!("attachment failure: {e:#}");
                "attachment storage failed".to_owned()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
