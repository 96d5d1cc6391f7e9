use std::sync::Arc;
use axum::{
    body::Body,
    extract::{Extension, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
};
use assert_matches::assert_matches;
use serde_json::json;
use tower::ServiceExt;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use auth_cell::auth_routes;
use auth_cell::handlers::{get_session, validate_token, verify_token};
use shared_config::AppConfig;
use shared_models::auth::StaffRole;
use shared_models::error::AppError;
use shared_utils::test_utils::{auth_header, TestConfig, TestUser, JwtTestUtils, MockSupabaseResponses};

fn create_test_config() -> AppConfig {
    TestConfig::default().to_app_config()
}

fn create_auth_header(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

#[tokio::test]
async fn test_validate_token_success() {
    let config = Arc::new(create_test_config());
    let user = TestUser::default();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let result = validate_token(State(config), create_auth_header(&token)).await;

    let response = result.unwrap().0;
    assert!(response.valid);
    assert_eq!(response.user_id, user.id);
    assert_eq!(response.email, Some(user.email));
    assert_eq!(response.role, Some("authenticated".to_string()));
}

#[tokio::test]
async fn test_validate_token_missing_header() {
    let config = Arc::new(create_test_config());

    let result = validate_token(State(config), HeaderMap::new()).await;

    assert_matches!(result, Err(AppError::Auth(msg)) if msg == "Missing authorization header");
}

#[tokio::test]
async fn test_validate_token_no_bearer_prefix() {
    let config = Arc::new(create_test_config());
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("sometoken"));

    let result = validate_token(State(config), headers).await;

    assert_matches!(result, Err(AppError::Auth(msg)) if msg == "Invalid authorization header format");
}

#[tokio::test]
async fn test_validate_token_expired() {
    let config = Arc::new(create_test_config());
    let user = TestUser::default();
    let token = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);

    let result = validate_token(State(config), create_auth_header(&token)).await;

    assert_matches!(result, Err(AppError::Auth(msg)) if msg == "Token expired");
}

#[tokio::test]
async fn test_validate_token_invalid_signature() {
    let config = Arc::new(create_test_config());
    let token = JwtTestUtils::create_invalid_signature_token(&TestUser::default());

    let result = validate_token(State(config), create_auth_header(&token)).await;

    assert_matches!(result, Err(AppError::Auth(msg)) if msg == "Invalid token signature");
}

#[tokio::test]
async fn test_validate_token_malformed() {
    let config = Arc::new(create_test_config());
    let token = JwtTestUtils::create_malformed_token();

    let result = validate_token(State(config), create_auth_header(&token)).await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_verify_token_reports_validity() {
    let config = Arc::new(create_test_config());
    let user = TestUser::manager("manager@lab.example");

    let good = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let response = verify_token(State(config.clone()), create_auth_header(&good)).await.unwrap().0;
    assert_eq!(response["valid"], true);

    let expired = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);
    let response = verify_token(State(config), create_auth_header(&expired)).await.unwrap().0;
    assert_eq!(response["valid"], false);
}

#[tokio::test]
async fn test_session_includes_staff_role_and_profile() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::manager("manager@lab.example");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "Maria Manager", "manager")
        ])))
        .mount(&mock_server)
        .await;

    let result = get_session(State(config), auth_header(&token), Extension(user.to_user())).await;

    let session = result.unwrap().0;
    assert_eq!(session.user_id, user.id);
    assert_eq!(session.staff_role, Some(StaffRole::Manager));
    assert_eq!(session.profile.unwrap()["full_name"], "Maria Manager");
}

#[tokio::test]
async fn test_session_without_profile_has_no_role() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::default();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let session = get_session(State(config), auth_header(&token), Extension(user.to_user()))
        .await
        .unwrap()
        .0;

    assert_eq!(session.staff_role, None);
    assert!(session.profile.is_none());
}

#[tokio::test]
async fn test_session_supabase_error() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::default();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("Internal server error", "INTERNAL_ERROR")
        ))
        .mount(&mock_server)
        .await;

    let result = get_session(State(config), auth_header(&token), Extension(user.to_user())).await;

    assert_matches!(result, Err(AppError::ExternalService(_)));
}

#[tokio::test]
async fn test_session_route_requires_token() {
    let app = auth_routes(TestConfig::default().to_arc());

    let response = app
        .oneshot(Request::builder().uri("/session").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_validate_route_is_public() {
    let config = TestConfig::default().to_arc();
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.supabase_jwt_secret, Some(1));
    let app = auth_routes(config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/validate")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
