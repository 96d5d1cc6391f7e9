use std::sync::Arc;

use axum::{
    extract::{Extension, State, Json},
    http::HeaderMap,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::{current_user_role, SupabaseClient};
use shared_models::auth::{StaffRole, TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::extractor::bearer_header;
use shared_utils::jwt;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub staff_role: Option<StaffRole>,
    pub profile: Option<Value>,
}

pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = bearer_header(&headers)?;

    let user = jwt::validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    Ok(Json(TokenResponse {
        valid: true,
        user_id: user.id,
        email: user.email,
        role: user.role,
    }))
}

pub async fn verify_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    debug!("Verifying token");

    let token = bearer_header(&headers)?;
    let valid = jwt::validate_token(token, &config.supabase_jwt_secret).is_ok();

    Ok(Json(json!({ "valid": valid })))
}

/// Identity from the token plus the staff role and profile row behind it.
#[axum::debug_handler]
pub async fn get_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<SessionResponse>, AppError> {
    debug!("Getting session for user: {}", user.id);

    let client = SupabaseClient::new(&config);

    let staff_role = match current_user_role(&client, &user.id, auth.token()).await {
        Ok(role) => Some(role),
        Err(e) => {
            warn!("No staff role for {}: {}", user.id, e);
            None
        }
    };

    let path = format!("/rest/v1/profiles?id=eq.{}", user.id);
    let profiles: Vec<Value> = client
        .request(Method::GET, &path, Some(auth.token()), None)
        .await
        .map_err(|e| AppError::ExternalService(e.to_string()))?;

    Ok(Json(SessionResponse {
        user_id: user.id,
        email: user.email,
        staff_role,
        profile: profiles.into_iter().next(),
    }))
}
