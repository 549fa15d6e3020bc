use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use compass_core::error::ApiError;
use compass_core::insights::PatternInsight;
use compass_engine::patterns::ComputedInsight;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store;

/// How far back the recompute scan reads entries.
const SCAN_WINDOW_DAYS: i64 = 90;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/insights", get(list_insights))
        .route("/v1/insights/recompute", post(recompute_insights))
        .route("/v1/insights/{id}/dismiss", post(dismiss_insight))
        .route("/v1/insights/{id}/bookmark", post(bookmark_insight))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListInsightsParams {
    /// Include insights that are stale, insignificant, or dismissed
    #[serde(default)]
    pub all: bool,
}

#[derive(sqlx::FromRow)]
struct InsightRow {
    data: serde_json::Value,
    dismissed: bool,
    bookmarked: bool,
}

impl InsightRow {
    fn into_insight(self) -> Option<PatternInsight> {
        let mut insight: PatternInsight = serde_json::from_value(self.data).ok()?;
        // Interaction state lives in its own columns; the blob never wins.
        insight.dismissed = self.dismissed;
        insight.bookmarked = self.bookmarked;
        Some(insight)
    }
}

/// List pattern insights
///
/// By default only insights that pass the visibility rule (significant,
/// recent, not dismissed). Pass `all=true` for the full audit view.
#[utoipa::path(
    get,
    path = "/v1/insights",
    params(ListInsightsParams),
    responses(
        (status = 200, description = "Pattern insights", body = Vec<PatternInsight>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "insights"
)]
pub async fn list_insights(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<ListInsightsParams>,
) -> Result<Json<Vec<PatternInsight>>, AppError> {
    let rows = sqlx::query_as::<_, InsightRow>(
        "SELECT data, dismissed, bookmarked FROM insights \
         WHERE user_id = $1 ORDER BY window_end DESC",
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    let now = Utc::now();
    let insights: Vec<PatternInsight> = rows
        .into_iter()
        .filter_map(InsightRow::into_insight)
        .filter(|i| params.all || i.should_show(now))
        .collect();

    Ok(Json(insights))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecomputeResponse {
    pub insights: Vec<PatternInsight>,
    pub entries_scanned: usize,
}

/// Recompute pattern insights from recent entries
///
/// Idempotent: the same entry set produces the same insights. Dismissed and
/// bookmarked flags survive recomputes. Runs under a per-user advisory lock
/// so two recomputes for the same user never interleave.
#[utoipa::path(
    post,
    path = "/v1/insights/recompute",
    responses(
        (status = 200, description = "Recomputed insights", body = RecomputeResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "insights"
)]
pub async fn recompute_insights(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<RecomputeResponse>, AppError> {
    let user_id = auth.user_id;
    let now = Utc::now();

    let facts = store::load_entry_facts(
        &state.db,
        user_id,
        now - Duration::days(SCAN_WINDOW_DAYS),
        None,
    )
    .await?;
    let entries_scanned = facts.len();

    let computed = match state.engine.detect_patterns(&facts, now) {
        Ok(computed) => computed,
        Err(err) => {
            // Degrade to no insights; never a partial or fabricated result.
            tracing::warn!(user_id = %user_id, error = %err, "pattern recompute failed");
            return Ok(Json(RecomputeResponse {
                insights: Vec::new(),
                entries_scanned,
            }));
        }
    };

    let mut tx = state.db.begin().await?;
    store::set_rls_user(&mut tx, user_id).await?;

    // Per-user lock: recompute must not run concurrently with itself for one
    // user. Cross-user recomputes proceed in parallel.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

    let mut insights = Vec::with_capacity(computed.len());
    for item in computed {
        insights.push(upsert_insight(&mut tx, user_id, item, now).await?);
    }

    tx.commit().await?;

    tracing::info!(user_id = %user_id, insights = insights.len(), "insights recomputed");

    Ok(Json(RecomputeResponse {
        insights,
        entries_scanned,
    }))
}

/// Install a computed insight, preserving identity and interaction state for
/// the symptom it describes.
async fn upsert_insight(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    computed: ComputedInsight,
    now: chrono::DateTime<Utc>,
) -> Result<PatternInsight, AppError> {
    #[derive(sqlx::FromRow)]
    struct ExistingRow {
        id: Uuid,
        dismissed: bool,
        bookmarked: bool,
    }

    let existing = sqlx::query_as::<_, ExistingRow>(
        "SELECT id, dismissed, bookmarked FROM insights \
         WHERE user_id = $1 AND symptom_key = $2",
    )
    .bind(user_id)
    .bind(computed.symptom_key.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    let (id, dismissed, bookmarked) = match &existing {
        Some(row) => (row.id, row.dismissed, row.bookmarked),
        None => (Uuid::now_v7(), false, false),
    };

    let insight = PatternInsight {
        id,
        user_id,
        window_start: computed.window_start,
        window_end: computed.window_end,
        symptom_key: computed.symptom_key,
        occurrence_count: computed.occurrence_count,
        day_span: computed.day_span,
        co_occurrences: computed.co_occurrences,
        insight: computed.insight,
        connection: computed.connection,
        suggestions: computed.suggestions,
        dismissed,
        bookmarked,
        source_entry_ids: computed.source_entry_ids,
        computed_at: now,
    };

    let data = serde_json::to_value(&insight)
        .map_err(|e| AppError::Internal(format!("Failed to serialize insight: {e}")))?;

    sqlx::query(
        "INSERT INTO insights \
         (id, user_id, symptom_key, window_start, window_end, data, dismissed, bookmarked, \
          computed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (user_id, symptom_key) DO UPDATE \
         SET window_start = EXCLUDED.window_start, \
             window_end = EXCLUDED.window_end, \
             data = EXCLUDED.data, \
             computed_at = EXCLUDED.computed_at",
    )
    .bind(id)
    .bind(user_id)
    .bind(insight.symptom_key.as_str())
    .bind(insight.window_start)
    .bind(insight.window_end)
    .bind(&data)
    .bind(dismissed)
    .bind(bookmarked)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(insight)
}

/// Dismiss an insight
///
/// Dismissal is the only way an insight disappears; rows are never deleted.
#[utoipa::path(
    post,
    path = "/v1/insights/{id}/dismiss",
    params(("id" = Uuid, Path, description = "Insight ID")),
    responses(
        (status = 200, description = "Insight dismissed"),
        (status = 404, description = "Insight not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "insights"
)]
pub async fn dismiss_insight(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    set_interaction_flag(&state, auth.user_id, id, "dismissed").await
}

/// Bookmark an insight
#[utoipa::path(
    post,
    path = "/v1/insights/{id}/bookmark",
    params(("id" = Uuid, Path, description = "Insight ID")),
    responses(
        (status = 200, description = "Insight bookmarked"),
        (status = 404, description = "Insight not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "insights"
)]
pub async fn bookmark_insight(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    set_interaction_flag(&state, auth.user_id, id, "bookmarked").await
}

/// The interaction flags are the only user-writable insight state.
async fn set_interaction_flag(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    flag: &str,
) -> Result<Json<serde_json::Value>, AppError> {
    // flag is one of two compile-time strings, never user input
    let query = format!("UPDATE insights SET {flag} = TRUE WHERE id = $1 AND user_id = $2");
    let result = sqlx::query(&query)
        .bind(id)
        .bind(user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound {
            message: format!("No insight '{id}' for this user"),
        });
    }

    Ok(Json(serde_json::json!({ "id": id, flag: true })))
}
