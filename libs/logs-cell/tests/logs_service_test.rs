use assert_matches::assert_matches;
use axum::{body::Body, http::{header, Request, StatusCode}};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use inventory_cell::models::ActionType;
use logs_cell::models::{LogQuery, LogsError};
use logs_cell::{logs_routes, LogService};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

const TOKEN: &str = "user-token";

fn log_row(action: &str, user_id: &str, unit_id: Uuid, notes: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "reagent_lot_id": Uuid::new_v4(),
        "action_type": action,
        "quantity_before": 80.0,
        "quantity_after": 75.0,
        "quantity_changed": 5.0,
        "user_id": user_id,
        "appointment_id": null,
        "notes": notes,
        "points_awarded": 5,
        "created_at": "2024-01-20T14:30:00Z",
        "reagent_lots": {
            "lot_number": "LOT2024001",
            "unit_id": unit_id,
            "reagents": { "name": "Glucose Oxidase" },
            "units": { "name": "Central Lab" }
        }
    })
}

async fn mount_names(server: &MockServer, user_id: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("in.({})", user_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": user_id, "full_name": name }])))
        .mount(server)
        .await;
}

fn service(server: &MockServer) -> LogService {
    LogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config())
}

#[tokio::test]
async fn list_filters_by_unit_and_action_and_names_actors() {
    let server = MockServer::start().await;
    let unit_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/consumption_logs"))
        .and(query_param("reagent_lots.unit_id", format!("eq.{}", unit_id)))
        .and(query_param("action_type", "eq.consume"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            log_row("consume", "u1", unit_id, "Glycemia exam")
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_names(&server, "u1", "Joao Silva").await;

    let query = LogQuery {
        unit_id: Some(unit_id),
        action_type: Some(ActionType::Consume),
        limit: Some(50),
        ..Default::default()
    };
    let logs = service(&server).list_logs(&query, TOKEN).await.unwrap();

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_name.as_deref(), Some("Joao Silva"));
    assert_eq!(logs[0].reagent_name.as_deref(), Some("Glucose Oxidase"));
    assert_eq!(logs[0].unit_name.as_deref(), Some("Central Lab"));
}

#[tokio::test]
async fn search_matches_actor_name_case_insensitively() {
    let server = MockServer::start().await;
    let unit_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/consumption_logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            log_row("consume", "u1", unit_id, "Glycemia exam"),
            log_row("register", "u2", unit_id, "New delivery")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "u1", "full_name": "Joao Silva" },
            { "id": "u2", "full_name": "Ana Costa" }
        ])))
        .mount(&server)
        .await;

    let query = LogQuery { search: Some("ANA".to_string()), ..Default::default() };
    let logs = service(&server).list_logs(&query, TOKEN).await.unwrap();

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action_type, "register");
}

#[tokio::test]
async fn inverted_date_range_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let now = Utc::now();
    let query = LogQuery { from: Some(now), to: Some(now - Duration::days(1)), ..Default::default() };
    let result = service(&server).list_logs(&query, TOKEN).await;

    assert_matches!(result, Err(LogsError::ValidationError(_)));
}

#[tokio::test]
async fn summary_counts_per_action() {
    let server = MockServer::start().await;
    let unit_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/consumption_logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            log_row("consume", "u1", unit_id, "a"),
            log_row("consume", "u1", unit_id, "b"),
            log_row("dispose", "u1", unit_id, "c")
        ])))
        .mount(&server)
        .await;
    mount_names(&server, "u1", "Joao Silva").await;

    let summary = service(&server).summary(&LogQuery::default(), TOKEN).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.by_action["consume"], 2);
    assert_eq!(summary.by_action["dispose"], 1);
}

#[tokio::test]
async fn csv_export_is_an_escaped_dated_attachment() {
    let server = MockServer::start().await;
    let user = TestUser::auditor("audit@lab.example");
    let config = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/consumption_logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            log_row("consume", "u1", Uuid::new_v4(), "Patient \"M\", fasting")
        ])))
        .mount(&server)
        .await;
    mount_names(&server, "u1", "Joao Silva").await;

    let response = logs_routes(config)
        .oneshot(
            Request::builder()
                .uri("/export.csv")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert_eq!(
        disposition,
        format!("attachment; filename=\"consumption-logs-{}.csv\"", Utc::now().date_naive().format("%Y-%m-%d"))
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    assert!(csv.starts_with("timestamp,reagent,lot,action,user,unit,"));
    assert!(csv.contains("Joao Silva,Central Lab,80,75,5,\"Patient \"\"M\"\", fasting\""));
}
