use std::sync::Arc;

use axum::{
    Json,
    Router,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use auth_cell::router::auth_routes;
use catalog_cell::router::catalog_routes;
use gamification_cell::router::gamification_routes;
use inventory_cell::router::inventory_routes;
use logs_cell::router::logs_routes;
use shared_config::AppConfig;
use user_cell::router::user_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    let health_state = state.clone();

    Router::new()
        .route("/", get(|| async { "Reagent Tracker API is running!" }))
        .route("/health", get(move || health(health_state.clone())))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/catalog", catalog_routes(state.clone()))
        .nest("/inventory", inventory_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/users", user_routes(state.clone()))
        .nest("/gamification", gamification_routes(state.clone()))
        .nest("/logs", logs_routes(state))
}

async fn health(config: Arc<AppConfig>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "supabase_configured": config.is_configured(),
        "reservation_sweeper": config.is_sweeper_configured(),
    }))
}
