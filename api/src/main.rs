use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use compass_engine::{Engine, EngineConfig};

mod auth;
mod error;
mod middleware;
mod oracle;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Compass Wellbeing API",
        version = "0.1.0",
        description = "Turns free-text wellbeing submissions into an auditable complexity \
                       profile and one bounded, explainable response, with safety-first \
                       escalation handling."
    ),
    paths(
        routes::health::health_check,
        routes::entries::create_entry,
        routes::entries::simulate_entry,
        routes::entries::list_entries,
        routes::profile::get_profile,
        routes::profile::rebuild_profile,
        routes::insights::list_insights,
        routes::insights::recompute_insights,
        routes::insights::dismiss_insight,
        routes::insights::bookmark_insight,
        routes::suggestions::get_suggestions,
        routes::feedback::create_feedback,
        routes::system::get_system_config,
        routes::auth::register,
        routes::auth::token,
    ),
    components(schemas(
        HealthResponse,
        compass_core::error::ApiError,
        compass_core::entries::Entry,
        compass_core::entries::EntryIntent,
        compass_core::entries::SaveMode,
        compass_core::entries::EntryMetadata,
        compass_core::entries::CreateEntryRequest,
        compass_core::entries::PaginatedResponse<compass_core::entries::Entry>,
        compass_core::domains::Domain,
        compass_core::domains::DomainTag,
        compass_core::domains::DomainClassification,
        compass_core::factors::Factor,
        compass_core::factors::FactorKind,
        compass_core::factors::FactorCode,
        compass_core::factors::FactorValue,
        compass_core::factors::TimeHorizon,
        compass_core::factors::Modifiability,
        compass_core::factors::SymptomKey,
        compass_core::factors::MissingInfo,
        compass_core::factors::MissingInfoKey,
        compass_core::profile::ComplexityProfile,
        compass_core::profile::RankedConstraint,
        compass_core::profile::DomainCoverage,
        compass_core::snapshot::StateSnapshot,
        compass_core::snapshot::RiskBand,
        compass_core::snapshot::FrictionBand,
        compass_core::snapshot::UncertaintyBand,
        compass_core::snapshot::NextActionKind,
        compass_core::snapshot::PendingFollowUp,
        compass_core::response::ResponseModel,
        compass_core::response::ResponseShape,
        compass_core::response::EscalationTier,
        compass_core::response::Chip,
        compass_core::response::ChipKind,
        compass_core::response::StatusLine,
        compass_core::response::StatusLineKind,
        compass_core::response::AddOn,
        compass_core::response::FactorChip,
        compass_core::response::ResponseControls,
        compass_core::response::SituationalSignals,
        compass_core::response::SignalIntent,
        compass_core::response::SignalLevel,
        compass_core::response::ComplexityLevel,
        compass_core::response::Agency,
        compass_core::response::RiskFlag,
        compass_core::response::Recurrence,
        compass_core::insights::PatternInsight,
        compass_core::insights::CoOccurrence,
        compass_core::insights::CoOccurrenceKey,
        compass_core::insights::CorrelationBand,
        compass_engine::vocabulary::QuarantinedCandidate,
        compass_engine::vocabulary::QuarantineReason,
        routes::entries::EntryPipelineResponse,
        routes::profile::RebuildResponse,
        routes::insights::RecomputeResponse,
        routes::feedback::CreateFeedbackRequest,
        routes::feedback::FeedbackResponse,
        routes::system::SystemConfigResponse,
        routes::system::EngineConfigView,
        routes::system::VocabulariesView,
        routes::auth::RegisterRequest,
        routes::auth::RegisterResponse,
        routes::auth::TokenRequest,
        routes::auth::TokenResponse,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compass_api=debug,compass_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState {
        db: pool,
        engine: Arc::new(Engine::new(EngineConfig::default())),
        oracle: oracle::OracleClient::from_env(),
    };

    // HTTPS enforcement (only when COMPASS_REQUIRE_HTTPS=true)
    let require_https = std::env::var("COMPASS_REQUIRE_HTTPS")
        .map(|v| v == "true")
        .unwrap_or(false);

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-endpoint rate limiting
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::entries::write_router().layer(middleware::rate_limit::entries_write_layer()))
        .merge(routes::entries::read_router().layer(middleware::rate_limit::reads_layer()))
        .merge(routes::profile::router().layer(middleware::rate_limit::reads_layer()))
        .merge(routes::insights::router().layer(middleware::rate_limit::recompute_layer()))
        .merge(routes::suggestions::router().layer(middleware::rate_limit::reads_layer()))
        .merge(routes::feedback::router().layer(middleware::rate_limit::reads_layer()))
        .merge(routes::system::router().layer(middleware::rate_limit::reads_layer()))
        .merge(routes::auth::register_router().layer(middleware::rate_limit::register_layer()))
        .merge(routes::auth::token_router().layer(middleware::rate_limit::token_layer()))
        .layer(auth::InjectAuthLayer::new(app_state.db.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Compass API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
