use std::sync::Arc;
use axum::{
    extract::{Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{GamificationError, LeaderboardQuery};
use crate::services::{level_for, GamificationService};

fn to_app_error(e: GamificationError) -> AppError {
    match e {
        GamificationError::NotFound => AppError::NotFound(e.to_string()),
        GamificationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn get_my_progress(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = GamificationService::new(&config);

    let record = service.get_or_create(&user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "user_id": record.user_id,
        "total_points": record.total_points,
        "level": level_for(record.total_points),
        "streaks": record.streaks,
        "achievements": GamificationService::achievement_statuses(&record),
    })))
}

#[axum::debug_handler]
pub async fn get_leaderboard(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Value>, AppError> {
    let service = GamificationService::new(&config);

    let entries = service.leaderboard(query.limit, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "leaderboard": entries })))
}

#[axum::debug_handler]
pub async fn get_achievements(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = GamificationService::new(&config);

    let record = service.get_or_create(&user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "achievements": GamificationService::achievement_statuses(&record)
    })))
}
