use std::sync::Arc;
use axum::{middleware, routing::{get, post}, Router};
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn inventory_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/lots", get(list_lots).post(register_lot))
        .route("/lots/expiring", get(expiring_lots))
        .route("/lots/mark-expired", post(mark_expired))
        .route("/lots/{id}", get(get_lot))
        .route("/lots/{id}/consume", post(consume_lot))
        .route("/lots/{id}/transfer", post(transfer_lot))
        .route("/lots/{id}/discard", post(discard_lot))
        .route("/lots/{id}/adjust", post(adjust_lot))
        .route("/lots/{id}/qr", get(get_label))
        .route("/lots/{id}/qr/print", post(print_label))
        .route("/lots/{id}/audit-chain", get(audit_chain))
        .route("/lots/{id}/quality-controls", get(list_quality_controls).post(create_quality_control))
        .route("/scan", post(scan_label))
        .route("/dashboard", get(dashboard))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}
