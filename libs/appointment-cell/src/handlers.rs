// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AppointmentError, AppointmentQuery, CreateAppointmentRequest, UpdateStatusRequest};
use crate::services::AppointmentService;

pub fn to_app_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound | AppointmentError::ExamTypeNotFound => AppError::NotFound(e.to_string()),
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
        AppointmentError::ConcurrentModification => AppError::Conflict(e.to_string()),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = AppointmentService::new(&config);

    let outcome = service.create_appointment(request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(json!(outcome))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&config);

    let appointments = service.list_appointments(&query, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&config);

    let details = service.get_appointment(appointment_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(details)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&config);

    let outcome = service.update_status(appointment_id, request.status, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn expire_reservations(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&config);

    let expired = service.expire_reservations(&user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "expired": expired })))
}
