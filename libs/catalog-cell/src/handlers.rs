use std::sync::Arc;
use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CatalogError, CreateExamTypeRequest, CreateManufacturerRequest, CreateReagentRequest,
    CreateUnitRequest, ReagentQuery, UpdateReagentRequest,
};
use crate::services::CatalogService;

fn to_app_error(e: CatalogError) -> AppError {
    match e {
        CatalogError::ReagentNotFound | CatalogError::ExamTypeNotFound => AppError::NotFound(e.to_string()),
        CatalogError::DuplicateReagent(_) | CatalogError::Duplicate(_) => AppError::Conflict(e.to_string()),
        CatalogError::ValidationError(msg) => AppError::ValidationError(msg),
        CatalogError::Forbidden(msg) => AppError::Forbidden(msg),
        CatalogError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn list_reagents(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ReagentQuery>,
) -> Result<Json<Value>, AppError> {
    let service = CatalogService::new(&config);

    let reagents = service.list_reagents(&query, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "reagents": reagents,
        "total": reagents.len()
    })))
}

#[axum::debug_handler]
pub async fn get_reagent(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(reagent_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = CatalogService::new(&config);

    let reagent = service.get_reagent(&reagent_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(reagent)))
}

#[axum::debug_handler]
pub async fn create_reagent(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateReagentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = CatalogService::new(&config);

    let reagent = service.create_reagent(request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(json!(reagent))))
}

#[axum::debug_handler]
pub async fn update_reagent(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(reagent_id): Path<String>,
    Json(request): Json<UpdateReagentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = CatalogService::new(&config);

    let reagent = service.update_reagent(&reagent_id, request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(reagent)))
}

#[axum::debug_handler]
pub async fn delete_reagent(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(reagent_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = CatalogService::new(&config);

    service.deactivate_reagent(&reagent_id, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Reagent deactivated"
    })))
}

#[axum::debug_handler]
pub async fn list_units(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = CatalogService::new(&config);

    let units = service.list_units(auth.token()).await.map_err(to_app_error)?;

    Ok(Json(json!({ "units": units })))
}

#[axum::debug_handler]
pub async fn create_unit(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateUnitRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = CatalogService::new(&config);

    let unit = service.create_unit(request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(json!(unit))))
}

#[axum::debug_handler]
pub async fn list_manufacturers(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = CatalogService::new(&config);

    let manufacturers = service.list_manufacturers(auth.token()).await.map_err(to_app_error)?;

    Ok(Json(json!({ "manufacturers": manufacturers })))
}

#[axum::debug_handler]
pub async fn create_manufacturer(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateManufacturerRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = CatalogService::new(&config);

    let manufacturer = service.create_manufacturer(request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(json!(manufacturer))))
}

#[axum::debug_handler]
pub async fn list_exam_types(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = CatalogService::new(&config);

    let exam_types = service.list_exam_types(auth.token()).await.map_err(to_app_error)?;

    Ok(Json(json!({ "exam_types": exam_types })))
}

#[axum::debug_handler]
pub async fn create_exam_type(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateExamTypeRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = CatalogService::new(&config);

    let exam_type = service.create_exam_type(request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(json!(exam_type))))
}
