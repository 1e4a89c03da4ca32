use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::router::availability_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn create_test_app(config: AppConfig) -> Router {
    availability_routes(Arc::new(config))
}

fn mock_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

// Monday. The weekly-template tests hang their rules on day_of_week 1.
const MONDAY: &str = "2026-03-02";

#[tokio::test]
async fn test_replace_availability_success() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::dentist("drsmith@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/replace_dentist_availability"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"weekly_rules": 2, "overrides": 1})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = json!({
        "weekly": [
            {"day_of_the_week": 1, "start_time": "09:00:00", "end_time": "12:00:00"},
            {"day_of_the_week": 1, "start_time": "13:00:00", "end_time": "17:00:00"}
        ],
        "overrides": [
            {"override_date": MONDAY, "is_unavailable": true}
        ]
    });

    let request = Request::builder()
        .method("PUT")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let summary = read_json(response).await;
    assert_eq!(summary["weekly_rules"], 2);
    assert_eq!(summary["overrides"], 1);
}

#[tokio::test]
async fn test_replace_availability_rejects_same_day_overlap() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::dentist("drsmith@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    let body = json!({
        "weekly": [
            {"day_of_the_week": 1, "start_time": "09:00:00", "end_time": "12:00:00"},
            {"day_of_the_week": 1, "start_time": "11:00:00", "end_time": "14:00:00"}
        ],
        "overrides": []
    });

    let request = Request::builder()
        .method("PUT")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_replace_availability_requires_dentist_role() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    let body = json!({
        "weekly": [{"day_of_the_week": 1, "start_time": "09:00:00", "end_time": "12:00:00"}],
        "overrides": []
    });

    let request = Request::builder()
        .method("PUT")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_availability_requires_auth() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let app = create_test_app(config).await;

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_schedule_round_trip() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::dentist("drsmith@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .and(query_param("dentist_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_rule_row(&user.id, 1, "09:00:00", "12:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .and(query_param("dentist_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_override_row(&user.id, MONDAY, None, None, true)
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let schedule = read_json(response).await;
    assert_eq!(schedule["dentist_id"], user.id);
    assert_eq!(schedule["weekly"].as_array().unwrap().len(), 1);
    assert_eq!(schedule["overrides"].as_array().unwrap().len(), 1);
    assert_eq!(schedule["overrides"][0]["is_unavailable"], true);
}

#[tokio::test]
async fn test_slots_subtract_booked_holds() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    let dentist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .and(query_param("day_of_week", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_rule_row(
                &dentist_id.to_string(),
                1,
                "09:00:00",
                "12:00:00"
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &dentist_id.to_string(),
                &Uuid::new_v4().to_string(),
                "2026-03-02T09:30:00+00:00",
                "2026-03-02T10:00:00+00:00",
                "confirmed"
            )
        ])))
        .mount(&mock_server)
        .await;

    let uri = format!(
        "/slots?clinician_id={}&date={}&service_duration=30",
        dentist_id, MONDAY
    );
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let slots = read_json(response).await;
    assert_eq!(
        slots,
        json!(["09:00", "10:00", "10:15", "10:30", "10:45", "11:00", "11:15", "11:30"])
    );
}

#[tokio::test]
async fn test_slots_empty_on_blackout_override() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    let dentist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_override_row(
                &dentist_id.to_string(),
                MONDAY,
                None,
                None,
                true
            )
        ])))
        .mount(&mock_server)
        .await;

    let uri = format!(
        "/slots?clinician_id={}&date={}&service_duration=30",
        dentist_id, MONDAY
    );
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!([]));
}

#[tokio::test]
async fn test_slots_exclude_appointment_frees_its_interval() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    let dentist_id = Uuid::new_v4();
    let excluded_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_rule_row(
                &dentist_id.to_string(),
                1,
                "09:00:00",
                "12:00:00"
            )
        ])))
        .mount(&mock_server)
        .await;

    // The excluded appointment is filtered out by the query itself, so the
    // store returns no holds when the filter is present.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("neq.{}", excluded_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let uri = format!(
        "/slots?clinician_id={}&date={}&service_duration=30&exclude_appointment_id={}",
        dentist_id, MONDAY, excluded_id
    );
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let slots = read_json(response).await;
    let slots = slots.as_array().unwrap();
    assert!(slots.contains(&json!("09:30")));
    assert_eq!(slots.first(), Some(&json!("09:00")));
    assert_eq!(slots.last(), Some(&json!("11:30")));
}

#[tokio::test]
async fn test_slots_query_is_idempotent() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    let dentist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_rule_row(
                &dentist_id.to_string(),
                1,
                "09:00:00",
                "12:00:00"
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let uri = format!(
        "/slots?clinician_id={}&date={}&service_duration=60",
        dentist_id, MONDAY
    );

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let request = Request::builder()
            .method("GET")
            .uri(&uri)
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(read_json(response).await);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0].as_array().unwrap().first(), Some(&json!("09:00")));
}

#[tokio::test]
async fn test_slots_accept_camel_case_params() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = create_test_app(config).await;

    let dentist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let uri = format!(
        "/slots?clinicianId={}&date={}&serviceDuration=30",
        dentist_id, MONDAY
    );
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!([]));
}
