use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use compass_core::error::ApiError;
use compass_core::profile::ComplexityProfile;
use compass_engine::aggregator;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/profile", get(get_profile))
        .route("/v1/profile/rebuild", post(rebuild_profile))
}

/// Get the current complexity profile
///
/// The profile is a derived read model over the factor log: latest factor per
/// code, ranked top constraints, and per-domain coverage counters.
#[utoipa::path(
    get,
    path = "/v1/profile",
    responses(
        (status = 200, description = "Current complexity profile", body = ComplexityProfile),
        (status = 404, description = "No profile yet for this user", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<ComplexityProfile>, AppError> {
    let (profile, version) = store::load_profile(&state.db, auth.user_id, Utc::now()).await?;
    if version == 0 {
        return Err(AppError::NotFound {
            message: "No profile for this user yet. Submit an entry first.".to_string(),
        });
    }
    Ok(Json(profile))
}

/// Response for POST /v1/profile/rebuild
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RebuildResponse {
    pub profile: ComplexityProfile,
    /// Whether the replayed profile matched the incrementally maintained one.
    /// A mismatch is repaired by the rebuild and logged for investigation.
    pub matched_incremental: bool,
    pub factors_replayed: usize,
}

/// Rebuild the profile by replaying the factor log
///
/// The factor log is the source of truth; the profile is a cache. Replaying
/// must reproduce the incrementally maintained profile exactly — this
/// endpoint verifies that and installs the replayed state.
#[utoipa::path(
    post,
    path = "/v1/profile/rebuild",
    responses(
        (status = 200, description = "Rebuilt profile", body = RebuildResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn rebuild_profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<RebuildResponse>, AppError> {
    let user_id = auth.user_id;
    let now = Utc::now();

    let (stored, stored_version) = store::load_profile(&state.db, user_id, now).await?;
    let log = store::load_factor_log(&state.db, user_id).await?;

    let replayed = aggregator::rebuild(
        user_id,
        &log,
        stored.latest_accepted_entry_id,
        now,
        state.engine.config(),
    );

    let matched = aggregator::same_derived_state(&stored, &replayed);
    if !matched {
        tracing::warn!(
            user_id = %user_id,
            "incremental profile diverged from replay; installing replayed state"
        );
    }

    let mut tx = state.db.begin().await?;
    store::set_rls_user(&mut tx, user_id).await?;
    if !store::save_profile(&mut tx, &replayed, stored_version).await? {
        tx.rollback().await?;
        return Err(AppError::ProfileConflict);
    }
    tx.commit().await?;

    Ok(Json(RebuildResponse {
        profile: replayed,
        matched_incremental: matched,
        factors_replayed: log.len(),
    }))
}
