use std::sync::Arc;
use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{UpdateUserRequest, UserError, UserQuery};
use crate::services::UserService;

fn to_app_error(e: UserError) -> AppError {
    match e {
        UserError::NotFound => AppError::NotFound(e.to_string()),
        UserError::SelfLockout(msg) => AppError::BadRequest(msg),
        UserError::ValidationError(msg) => AppError::ValidationError(msg),
        UserError::Forbidden(msg) => AppError::Forbidden(msg),
        UserError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn list_users(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, AppError> {
    let service = UserService::new(&config);

    let users = service.list_users(&query, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "users": users,
        "total": users.len()
    })))
}

#[axum::debug_handler]
pub async fn get_me(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = UserService::new(&config);

    let profile = service.get_user(&user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn get_user(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = UserService::new(&config);

    let profile = service.get_user(&user_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn update_user(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<Value>, AppError> {
    let service = UserService::new(&config);

    let profile = service.update_user(&user_id, request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn get_stats(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = UserService::new(&config);

    let stats = service.stats(auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(stats)))
}
