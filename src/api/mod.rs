use crate::core::error::{DispatchError, LlmServiceError};
use async_trait::async_trait;
use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use log::warn;
use serde_json::json;
use std::str::FromStr;

pub mod llm;

const X_USER_ID: &str = "X-User-ID";

/// Discord id of the user a request is made for.
#[derive(Debug)]
pub struct ExtractUser(pub u64);

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
            let user_id = u64::from_str(user_id.trim())
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?;
            Ok(ExtractUser(user_id))
        } else {
            Err((StatusCode::BAD_REQUEST, "`X-User-ID` header is missing"))
        }
    }
}

impl IntoResponse for LlmServiceError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            LlmServiceError::Dispatch(DispatchError::QueueFull { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "queue_full")
            }
            LlmServiceError::Dispatch(DispatchError::Closed | DispatchError::Dropped) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            LlmServiceError::Dispatch(DispatchError::InvalidTask(_))
            | LlmServiceError::InvalidRequest(_)
            | LlmServiceError::Encode(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            LlmServiceError::Dispatch(DispatchError::Transport(_))
            | LlmServiceError::Decode(_) => (StatusCode::BAD_GATEWAY, "backend_error"),
            LlmServiceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };

        if status.is_server_error() {
            warn!("LLM request failed: {self}");
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
            }
        }));

        (status, body).into_response()
    }
}
