use assert_matches::assert_matches;
use axum::{body::Body, http::{Request, StatusCode}};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use catalog_cell::models::{CatalogError, CreateExamTypeRequest, CreateReagentRequest, RequiredReagent, ReagentQuery};
use catalog_cell::{catalog_routes, CatalogService};
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

const TOKEN: &str = "user-token";

async fn mount_role(server: &MockServer, user: &TestUser) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "Test User", &user.role)
        ])))
        .mount(server)
        .await;
}

fn new_reagent(name: &str) -> CreateReagentRequest {
    CreateReagentRequest {
        name: name.to_string(),
        description: Some("Enzymatic glucose assay".to_string()),
        reagent_type: Some("enzyme".to_string()),
        unit_measure: "ml".to_string(),
        minimum_stock: 20.0,
        storage_conditions: Some("2-8C".to_string()),
    }
}

#[tokio::test]
async fn list_reagents_filters_active_and_search() {
    let server = MockServer::start().await;
    let reagent_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/reagents"))
        .and(query_param("is_active", "eq.true"))
        .and(query_param("name", "ilike.*gluc*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::reagent_response(&reagent_id, "Glucose Oxidase")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let service = CatalogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let query = ReagentQuery { include_inactive: false, search: Some("gluc".to_string()) };

    let reagents = service.list_reagents(&query, TOKEN).await.unwrap();

    assert_eq!(reagents.len(), 1);
    assert_eq!(reagents[0].name, "Glucose Oxidase");
    assert_eq!(reagents[0].reagent_type.as_deref(), Some("enzyme"));
}

#[tokio::test]
async fn create_reagent_rejects_duplicate_active_name() {
    let server = MockServer::start().await;
    let manager = TestUser::manager("manager@lab.example");
    mount_role(&server, &manager).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/reagents"))
        .and(query_param("name", "ilike.Glucose Oxidase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/reagents"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let service = CatalogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let result = service.create_reagent(new_reagent("Glucose Oxidase"), &manager.id, TOKEN).await;

    assert_matches!(result, Err(CatalogError::DuplicateReagent(name)) if name == "Glucose Oxidase");
}

#[tokio::test]
async fn create_reagent_inserts_for_manager() {
    let server = MockServer::start().await;
    let manager = TestUser::manager("manager@lab.example");
    let reagent_id = Uuid::new_v4().to_string();
    mount_role(&server, &manager).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/reagents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/reagents"))
        .and(body_partial_json(json!({ "name": "Glucose Oxidase", "is_active": true })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::reagent_response(&reagent_id, "Glucose Oxidase")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let service = CatalogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let reagent = service.create_reagent(new_reagent("Glucose Oxidase"), &manager.id, TOKEN).await.unwrap();

    assert_eq!(reagent.id.to_string(), reagent_id);
}

#[tokio::test]
async fn technician_cannot_create_reagent() {
    let server = MockServer::start().await;
    let technician = TestUser::technician("tech@lab.example");
    mount_role(&server, &technician).await;

    let service = CatalogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let result = service.create_reagent(new_reagent("Buffer"), &technician.id, TOKEN).await;

    assert_matches!(result, Err(CatalogError::Forbidden(_)));
}

#[tokio::test]
async fn delete_reagent_is_a_soft_delete() {
    let server = MockServer::start().await;
    let admin = TestUser::admin("admin@lab.example");
    let reagent_id = Uuid::new_v4().to_string();
    mount_role(&server, &admin).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/reagents"))
        .and(query_param("id", format!("eq.{}", reagent_id)))
        .and(body_partial_json(json!({ "is_active": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::reagent_response(&reagent_id, "Glucose Oxidase")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let service = CatalogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    service.deactivate_reagent(&reagent_id, &admin.id, TOKEN).await.unwrap();
}

#[tokio::test]
async fn create_exam_type_validates_before_any_request() {
    let server = MockServer::start().await;
    let reagent_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let service = CatalogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let request = CreateExamTypeRequest {
        name: "Lipid panel".to_string(),
        description: None,
        required_reagents: vec![
            RequiredReagent { reagent_id, quantity: 1.0 },
            RequiredReagent { reagent_id, quantity: 2.0 },
        ],
    };

    let result = service.create_exam_type(request, "any-user", TOKEN).await;

    assert_matches!(result, Err(CatalogError::ValidationError(_)));
}

#[tokio::test]
async fn create_unit_maps_backend_conflict() {
    let server = MockServer::start().await;
    let admin = TestUser::admin("admin@lab.example");
    mount_role(&server, &admin).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/units"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value", "23505")
        ))
        .mount(&server)
        .await;

    let service = CatalogService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let request = catalog_cell::models::CreateUnitRequest {
        name: "Central Lab".to_string(),
        description: None,
        address: None,
    };

    let result = service.create_unit(request, &admin.id, TOKEN).await;

    assert_matches!(result, Err(CatalogError::Duplicate(name)) if name == "Central Lab");
}

#[tokio::test]
async fn unknown_reagent_is_404_through_router() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.supabase_jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/reagents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let response = catalog_routes(config)
        .oneshot(
            Request::builder()
                .uri(format!("/reagents/{}", Uuid::new_v4()))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
