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
    AdjustRequest, ConsumeRequest, CreateQualityControlRequest, DiscardRequest, ExpiringQuery,
    LedgerError, LotQuery, PrintQrRequest, RegisterLotRequest, ScanRequest, TransferRequest,
};
use crate::services::{AuditChainService, LedgerService, LotQueryService, QualityControlService};

pub fn to_app_error(e: LedgerError) -> AppError {
    match e {
        LedgerError::LotNotFound | LedgerError::ReagentNotFound => AppError::NotFound(e.to_string()),
        LedgerError::DuplicateLot(_)
        | LedgerError::ConcurrentModification
        | LedgerError::ReservationsOutstanding(_) => AppError::Conflict(e.to_string()),
        LedgerError::LotNotActive(_)
        | LedgerError::LotExpired(_)
        | LedgerError::InsufficientStock { .. }
        | LedgerError::InvalidQrPayload(_) => AppError::BadRequest(e.to_string()),
        LedgerError::ValidationError(msg) => AppError::ValidationError(msg),
        LedgerError::Forbidden(msg) => AppError::Forbidden(msg),
        LedgerError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// LEDGER
// ==============================================================================

#[axum::debug_handler]
pub async fn register_lot(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterLotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = LedgerService::new(&config);

    let outcome = service.register(request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(json!(outcome))))
}

#[axum::debug_handler]
pub async fn consume_lot(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(lot_id): Path<String>,
    Json(request): Json<ConsumeRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LedgerService::new(&config);

    let outcome = service.consume(&lot_id, request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn transfer_lot(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(lot_id): Path<String>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LedgerService::new(&config);

    let outcome = service.transfer(&lot_id, request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn discard_lot(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(lot_id): Path<String>,
    Json(request): Json<DiscardRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LedgerService::new(&config);

    let (outcome, certificate) = service.discard(&lot_id, request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "lot": outcome.lot,
        "log": outcome.log,
        "audit_hash": outcome.audit_hash,
        "points_awarded": outcome.points_awarded,
        "certificate": certificate
    })))
}

#[axum::debug_handler]
pub async fn adjust_lot(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(lot_id): Path<String>,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LedgerService::new(&config);

    let outcome = service.adjust(&lot_id, request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(outcome)))
}

// ==============================================================================
// QUERIES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_lots(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<LotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let lots = service.list_lots(&query, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "lots": lots,
        "total": lots.len()
    })))
}

#[axum::debug_handler]
pub async fn get_lot(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(lot_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let lot = service.get_lot(&lot_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(lot)))
}

#[axum::debug_handler]
pub async fn expiring_lots(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let lots = service.expiring(query.days, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "lots": lots,
        "total": lots.len()
    })))
}

#[axum::debug_handler]
pub async fn dashboard(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let summary = service.dashboard(auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn mark_expired(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let count = service.mark_expired(&user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "expired_count": count })))
}

#[axum::debug_handler]
pub async fn audit_chain(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(lot_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = AuditChainService::new(&config);

    let entries = service.list(&lot_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "entries": entries })))
}

// ==============================================================================
// LABELS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_label(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(lot_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let payload = service.label(&lot_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(payload)))
}

#[axum::debug_handler]
pub async fn print_label(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(lot_id): Path<String>,
    Json(request): Json<PrintQrRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let payload = service.print_label(&lot_id, request.print_reason, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(payload)))
}

#[axum::debug_handler]
pub async fn scan_label(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LotQueryService::new(&config);

    let (label, lot) = service.scan(&request.data, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "label": label,
        "lot": lot
    })))
}

// ==============================================================================
// QUALITY CONTROL
// ==============================================================================

#[axum::debug_handler]
pub async fn create_quality_control(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(lot_id): Path<String>,
    Json(request): Json<CreateQualityControlRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = QualityControlService::new(&config);

    let control = service.record(&lot_id, request, &user.id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(json!(control))))
}

#[axum::debug_handler]
pub async fn list_quality_controls(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(lot_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = QualityControlService::new(&config);

    let controls = service.list(&lot_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "quality_controls": controls })))
}
