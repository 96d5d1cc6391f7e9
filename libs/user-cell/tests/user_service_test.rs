use assert_matches::assert_matches;
use axum::{body::Body, http::{Request, StatusCode}};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use shared_models::auth::StaffRole;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};
use user_cell::models::{UpdateUserRequest, UserError, UserQuery};
use user_cell::{user_routes, UserService};

const TOKEN: &str = "user-token";

async fn server_for(user: &TestUser) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "Lab User", &user.role)
        ])))
        .mount(&server)
        .await;
    server
}

fn service(server: &MockServer) -> UserService {
    UserService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config())
}

fn profile(id: &str, role: &str, active: bool) -> Value {
    let mut row = MockSupabaseResponses::profile_response(id, "Carlos Dias", role);
    row["is_active"] = json!(active);
    row
}

#[tokio::test]
async fn list_applies_role_and_active_filters() {
    let user = TestUser::manager("manager@lab.example");
    let server = server_for(&user).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("role", "eq.technician"))
        .and(query_param("is_active", "not.is.false"))
        .and(query_param("full_name", "ilike.*carlos*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            profile(&Uuid::new_v4().to_string(), "technician", true)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let query = UserQuery {
        role: Some(StaffRole::Technician),
        active: Some(true),
        search: Some("carlos".to_string()),
        ..Default::default()
    };
    let users = service(&server).list_users(&query, TOKEN).await.unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].role, StaffRole::Technician);
}

#[tokio::test]
async fn admin_updates_another_profile() {
    let admin = TestUser::admin("admin@lab.example");
    let server = server_for(&admin).await;
    let target = Uuid::new_v4().to_string();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", target)))
        .and(body_partial_json(json!({ "role": "manager", "is_active": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile(&target, "manager", false)])))
        .expect(1)
        .mount(&server)
        .await;

    let request = UpdateUserRequest {
        role: Some(StaffRole::Manager),
        is_active: Some(false),
        ..Default::default()
    };
    let updated = service(&server).update_user(&target, request, &admin.id, TOKEN).await.unwrap();

    assert_eq!(updated.role, StaffRole::Manager);
    assert!(!updated.active());
}

#[tokio::test]
async fn manager_cannot_update_profiles() {
    let manager = TestUser::manager("manager@lab.example");
    let server = server_for(&manager).await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = UpdateUserRequest { full_name: Some("Renamed".to_string()), ..Default::default() };
    let result = service(&server).update_user(&Uuid::new_v4().to_string(), request, &manager.id, TOKEN).await;

    assert_matches!(result, Err(UserError::Forbidden(_)));
}

#[tokio::test]
async fn admin_cannot_deactivate_themselves() {
    let admin = TestUser::admin("admin@lab.example");
    let server = server_for(&admin).await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = UpdateUserRequest { is_active: Some(false), ..Default::default() };
    let result = service(&server).update_user(&admin.id, request, &admin.id, TOKEN).await;

    assert_matches!(result, Err(UserError::SelfLockout(_)));
}

#[tokio::test]
async fn updating_unknown_profile_is_not_found() {
    let admin = TestUser::admin("admin@lab.example");
    let server = server_for(&admin).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let request = UpdateUserRequest { full_name: Some("Nobody".to_string()), ..Default::default() };
    let result = service(&server).update_user(&Uuid::new_v4().to_string(), request, &admin.id, TOKEN).await;

    assert_matches!(result, Err(UserError::NotFound));
}

#[tokio::test]
async fn me_returns_callers_profile() {
    let user = TestUser::technician("tech@lab.example");
    let server = server_for(&user).await;
    let config = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(1));

    let response = user_routes(config)
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let profile: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(profile["id"], json!(user.id));
    assert_eq!(profile["role"], json!("technician"));
}
