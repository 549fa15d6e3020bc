use std::sync::Arc;

use compass_engine::Engine;
use sqlx::PgPool;

use crate::oracle::OracleClient;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub engine: Arc<Engine>,
    pub oracle: OracleClient,
}
