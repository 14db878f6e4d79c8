use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{config::Config, utils::jwt::JwtKeys};

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt = Arc::new(JwtKeys::new(&config.jwt_secret, config.jwt_expiration));
        Self { pool, config, jwt }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}
