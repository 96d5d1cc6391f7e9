use std::sync::Arc;
use axum::{middleware, routing::get, Router};
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn catalog_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/reagents", get(list_reagents).post(create_reagent))
        .route("/reagents/{id}", get(get_reagent).put(update_reagent).delete(delete_reagent))
        .route("/units", get(list_units).post(create_unit))
        .route("/manufacturers", get(list_manufacturers).post(create_manufacturer))
        .route("/exam-types", get(list_exam_types).post(create_exam_type))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}
