use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use compass_core::error::ApiError;

use crate::auth::AuthenticatedUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/system/config", get(get_system_config))
}

/// Response for GET /v1/system/config
#[derive(Serialize, utoipa::ToSchema)]
pub struct SystemConfigResponse {
    /// Engine tunables in effect for this deployment
    pub engine: EngineConfigView,
    /// The closed vocabularies clients bind to
    pub vocabularies: VocabulariesView,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct EngineConfigView {
    pub daily_follow_up_cap: u8,
    pub top_constraints_k: usize,
    pub chip_budget: usize,
    pub what_matters_cap: usize,
    pub factor_commit_floor: f64,
    pub secondary_floor: f64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct VocabulariesView {
    pub domains: Vec<&'static str>,
    pub factor_codes: Vec<&'static str>,
    pub symptom_keys: Vec<&'static str>,
    pub missing_info_keys: Vec<&'static str>,
}

/// Deployment-static configuration and closed vocabularies
///
/// Identical for all users; changes only on deployment. Clients should cache
/// this per session.
#[utoipa::path(
    get,
    path = "/v1/system/config",
    responses(
        (status = 200, description = "System configuration", body = SystemConfigResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "system"
)]
pub async fn get_system_config(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
) -> Json<SystemConfigResponse> {
    let config = state.engine.config();
    Json(SystemConfigResponse {
        engine: EngineConfigView {
            daily_follow_up_cap: config.daily_follow_up_cap,
            top_constraints_k: config.top_constraints_k,
            chip_budget: config.chip_budget,
            what_matters_cap: config.what_matters_cap,
            factor_commit_floor: config.factor_commit_floor,
            secondary_floor: config.secondary_floor,
        },
        vocabularies: VocabulariesView {
            domains: compass_core::domains::Domain::ALL
                .iter()
                .map(|d| d.as_str())
                .collect(),
            factor_codes: compass_core::factors::FactorCode::ALL
                .iter()
                .map(|c| c.as_str())
                .collect(),
            symptom_keys: compass_core::factors::SymptomKey::ALL
                .iter()
                .map(|s| s.as_str())
                .collect(),
            missing_info_keys: compass_core::factors::MissingInfoKey::ALL
                .iter()
                .map(|k| k.as_str())
                .collect(),
        },
    })
}
