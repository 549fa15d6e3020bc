use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use compass_core::error::ApiError;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/feedback", post(create_feedback))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateFeedbackRequest {
    /// The entry whose response this feedback is about
    pub entry_id: Uuid,
    pub helpful: bool,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub helpful: bool,
}

/// Record feedback on a generated response
///
/// Feedback is insert-only and never shown back in responses; it feeds the
/// quality review process.
#[utoipa::path(
    post,
    path = "/v1/feedback",
    request_body = CreateFeedbackRequest,
    responses(
        (status = 201, description = "Feedback recorded", body = FeedbackResponse),
        (status = 404, description = "Entry not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "feedback"
)]
pub async fn create_feedback(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = state.db.begin().await?;
    store::set_rls_user(&mut tx, auth.user_id).await?;

    let entry_exists: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM entries WHERE id = $1 AND user_id = $2",
    )
    .bind(req.entry_id)
    .bind(auth.user_id)
    .fetch_optional(&mut *tx)
    .await?;
    if entry_exists.is_none() {
        return Err(AppError::NotFound {
            message: format!("No entry '{}' for this user", req.entry_id),
        });
    }

    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO feedback (id, user_id, entry_id, helpful, note, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW())",
    )
    .bind(id)
    .bind(auth.user_id)
    .bind(req.entry_id)
    .bind(req.helpful)
    .bind(&req.note)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            id,
            entry_id: req.entry_id,
            helpful: req.helpful,
        }),
    ))
}
