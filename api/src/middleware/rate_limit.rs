use axum::http::Response;
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// Rate limit for POST /v1/auth/register: 5 requests per hour per IP.
pub fn register_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(720)
            .burst_size(5)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for register"),
    )
    .error_handler(json_error_handler)
}

/// Rate limit for POST /v1/auth/token: 30 requests per minute per IP.
pub fn token_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(30)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for token"),
    )
    .error_handler(json_error_handler)
}

/// Rate limit for entry submission: 60 requests/minute per IP. Submissions
/// run the full pipeline plus an oracle call, so the ceiling is lower than
/// for reads.
pub fn entries_write_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for entries_write"),
    )
    .error_handler(json_error_handler)
}

/// Rate limit for read endpoints: 120 requests/minute per IP.
pub fn reads_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_millisecond(500)
            .burst_size(30)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for reads"),
    )
    .error_handler(json_error_handler)
}

/// Rate limit for insight recompute: 12 requests/minute per IP.
pub fn recompute_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(5)
            .burst_size(4)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for recompute"),
    )
    .error_handler(json_error_handler)
}

/// Governor errors rendered in the structured ApiError shape.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let (status, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            format!("Rate limited. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Unable to determine client address for rate limiting".to_string(),
        ),
        GovernorError::Other { msg, .. } => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            msg.unwrap_or_else(|| "Rate limiter error".to_string()),
        ),
    };

    let body = serde_json::json!({
        "error": compass_core::error::codes::RATE_LIMITED,
        "message": message,
        "request_id": uuid::Uuid::now_v7().to_string(),
    });

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
}
