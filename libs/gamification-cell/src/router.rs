use std::sync::Arc;
use axum::{middleware, routing::get, Router};
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn gamification_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/me", get(get_my_progress))
        .route("/leaderboard", get(get_leaderboard))
        .route("/achievements", get(get_achievements))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}
