use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use gamification_cell::models::{AwardContext, ScoredAction};
use gamification_cell::GamificationService;
use shared_utils::test_utils::TestConfig;

const TOKEN: &str = "user-token";

fn record(user_id: &str, total_points: i64) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "user_id": user_id,
        "total_points": total_points,
        "level_name": "Beginner",
        "achievements": null,
        "streaks": null,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn get_or_create_inserts_missing_record() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/user_gamification"))
        .and(query_param("user_id", format!("eq.{}", user_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/user_gamification"))
        .and(body_partial_json(json!({ "user_id": user_id, "total_points": 0 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([record(&user_id, 0)])))
        .expect(1)
        .mount(&server)
        .await;

    let service = GamificationService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let created = service.get_or_create(&user_id, TOKEN).await.unwrap();

    assert_eq!(created.total_points, 0);
    assert!(created.achievements.is_empty());
}

#[tokio::test]
async fn first_registration_awards_points_and_achievement() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/user_gamification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record(&user_id, 90)])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/user_gamification"))
        .and(body_partial_json(json!({ "total_points": 90 + 19 + 50, "level_name": "Apprentice" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record(&user_id, 159)])))
        .expect(1)
        .mount(&server)
        .await;

    let service = GamificationService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let context = AwardContext { critical: true, near_expiry: false };
    let outcome = service.award(&user_id, ScoredAction::Register, context, TOKEN).await.unwrap();

    assert_eq!(outcome.total_points, 159);
    assert_eq!(outcome.unlocked, vec!["first_registration"]);
    assert_eq!(outcome.level_name, "Apprentice");
}

#[tokio::test]
async fn best_effort_award_swallows_backend_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/user_gamification"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = GamificationService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let outcome = service
        .award_best_effort("someone", ScoredAction::Consume, AwardContext::default(), TOKEN)
        .await;

    assert!(outcome.is_none());
}

#[tokio::test]
async fn leaderboard_ranks_in_backend_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/user_gamification"))
        .and(query_param("order", "total_points.desc"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "user_id": "u1",
                "total_points": 1200,
                "level_name": "Specialist",
                "achievements": [{ "id": "first_registration", "unlocked_at": "2024-01-01T00:00:00Z" }],
                "profiles": { "full_name": "Ana Lima" }
            },
            {
                "user_id": "u2",
                "total_points": 40,
                "level_name": null,
                "achievements": [],
                "profiles": null
            }
        ])))
        .mount(&server)
        .await;

    let service = GamificationService::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
    let board = service.leaderboard(Some(2), TOKEN).await.unwrap();

    assert_eq!(board.len(), 2);
    assert_eq!(board[0].position, 1);
    assert_eq!(board[0].user_name.as_deref(), Some("Ana Lima"));
    assert_eq!(board[0].achievements_count, 1);
    assert_eq!(board[1].level_name, "Beginner");
    assert!(board[1].user_name.is_none());
}
