use std::sync::Arc;
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{LogQuery, LogsError};
use crate::services::csv::{export_filename, render_csv};
use crate::services::LogService;

fn to_app_error(e: LogsError) -> AppError {
    match e {
        LogsError::ValidationError(msg) => AppError::ValidationError(msg),
        LogsError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn list_logs(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, AppError> {
    let service = LogService::new(&config);

    let logs = service.list_logs(&query, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "logs": logs,
        "total": logs.len()
    })))
}

#[axum::debug_handler]
pub async fn log_summary(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, AppError> {
    let service = LogService::new(&config);

    let summary = service.summary(&query, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn export_csv(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<LogQuery>,
) -> Result<Response, AppError> {
    let service = LogService::new(&config);

    let entries = service.export(&query, auth.token())
        .await
        .map_err(to_app_error)?;

    let disposition = format!("attachment; filename=\"{}\"", export_filename(Utc::now().date_naive()));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        render_csv(&entries),
    ).into_response())
}
