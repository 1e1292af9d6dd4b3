//! HTTP surface, a thin wrapper over the feedback facade.
//!
//! One route: `POST /api/feedback`. The handler validates the body, ensures
//! the first-party session cookie, and always answers 200 once sentence
//! splitting has succeeded; per-sentence failures are already absorbed by
//! the facade.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::feedback::FeedbackFacade;
use crate::types::{FeedbackRequest, FeedbackResponse};

/// First-party session cookie name.
const SESSION_COOKIE_NAME: &str = "user_session_id";

/// Session cookie lifetime: one year.
const SESSION_MAX_AGE_SECS: i64 = 31_536_000;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// The request orchestrator.
    pub facade: FeedbackFacade,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/feedback", post(create_feedback))
        .with_state(state)
}

/// Handler errors surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The body deserialized but fails validation.
    #[error("{0}")]
    InvalidRequest(String),

    /// Sentence splitting failed; no partial payload is possible.
    #[error("failed to process the composition")]
    Processing,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Processing => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

async fn create_feedback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<FeedbackRequest>,
) -> Result<(CookieJar, Json<FeedbackResponse>), ApiError> {
    if request.title.trim().is_empty() || request.contents.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "title and contents must be non-empty".to_owned(),
        ));
    }

    let (jar, user_id) = ensure_session(jar);

    let response = state
        .facade
        .create_feedback(request, &user_id)
        .await
        .map_err(|e| {
            error!(error = %e, "sentence splitting failed");
            ApiError::Processing
        })?;

    Ok((jar, Json(response)))
}

/// Read the session cookie, issuing a fresh one when absent.
fn ensure_session(jar: CookieJar) -> (CookieJar, String) {
    match jar
        .get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
    {
        Some(session_id) => (jar, session_id),
        None => {
            let session_id = Uuid::new_v4().to_string();
            let cookie = Cookie::build((SESSION_COOKIE_NAME, session_id.clone()))
                .path("/")
                .max_age(cookie::time::Duration::seconds(SESSION_MAX_AGE_SECS))
                .build();
            (jar.add(cookie), session_id)
        }
    }
}
