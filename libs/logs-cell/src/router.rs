use std::sync::Arc;
use axum::{middleware, routing::get, Router};
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn logs_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(list_logs))
        .route("/summary", get(log_summary))
        .route("/export.csv", get(export_csv))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}
