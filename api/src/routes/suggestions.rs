use axum::{Json, Router, routing::get};

use crate::auth::AuthenticatedUser;
use crate::state::AppState;

/// Starter questions surfaced on an empty home screen. Static, editorial,
/// and identical for all users.
const SUGGESTED_QUESTIONS: &[&str] = &[
    "What free health services are available near me?",
    "How can I access mental health support?",
    "What is the Medicare Safety Net?",
    "How do I get a health care plan from my GP?",
    "What telehealth options are available?",
    "How can I reduce out-of-pocket medical costs?",
    "What support is available for chronic conditions?",
    "How do I access bulk billing?",
];

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/suggestions", get(get_suggestions))
}

/// Suggested starter questions
#[utoipa::path(
    get,
    path = "/v1/suggestions",
    responses(
        (status = 200, description = "Suggested questions", body = Vec<String>)
    ),
    security(("bearer_auth" = [])),
    tag = "suggestions"
)]
pub async fn get_suggestions(_auth: AuthenticatedUser) -> Json<Vec<String>> {
    Json(SUGGESTED_QUESTIONS.iter().map(|s| s.to_string()).collect())
}
