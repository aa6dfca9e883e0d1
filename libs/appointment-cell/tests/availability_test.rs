use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use appointment_cell::services::availability::TherapistAvailabilityService;
use shared_config::AppConfig;
use shared_utils::test_utils::MockSupabaseResponses;

fn test_config(mock_uri: &str) -> AppConfig {
    AppConfig {
        supabase_url: mock_uri.to_string(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
    }
}

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// Mount the therapist directory: one therapist role row plus the profile.
async fn mock_therapist_directory(mock_server: &MockServer, therapist_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_roles"))
        .and(query_param("role", "eq.Therapist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_role_row(therapist_id, "Therapist"),
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("in.({})", therapist_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(therapist_id, "masha@example.com", "Masha Petrova"),
        ])))
        .mount(mock_server)
        .await;
}

/// Mount the busy-set query. The status and assignment filters are part of
/// the matcher, so the service only gets an answer when it sends them.
async fn mock_busy_query(mock_server: &MockServer, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("therapist_id", "not.is.null"))
        .and(query_param("status", "neq.Cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn therapist_with_an_overlapping_booking_is_excluded() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4().to_string();
    let customer_id = Uuid::new_v4().to_string();

    mock_therapist_directory(&mock_server, &therapist_id).await;
    mock_busy_query(&mock_server, json!([
        MockSupabaseResponses::appointment_row(
            1, &customer_id, Some(&therapist_id), "Swedish Massage",
            "2025-03-01T10:00:00Z", Some("2025-03-01T11:00:00Z"), "Booked"),
    ])).await;

    let service = TherapistAvailabilityService::new(&test_config(&mock_server.uri()));
    let available = service.available_therapists(
        ts("2025-03-01T10:30:00Z"), ts("2025-03-01T10:45:00Z"), "test-token").await.unwrap();

    assert!(available.is_empty());
}

#[tokio::test]
async fn booking_that_only_touches_the_window_does_not_block() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4().to_string();
    let customer_id = Uuid::new_v4().to_string();

    mock_therapist_directory(&mock_server, &therapist_id).await;
    // [10:00, 11:00) against the window [11:00, 12:00): no overlap.
    mock_busy_query(&mock_server, json!([
        MockSupabaseResponses::appointment_row(
            1, &customer_id, Some(&therapist_id), "Swedish Massage",
            "2025-03-01T10:00:00Z", Some("2025-03-01T11:00:00Z"), "Booked"),
    ])).await;

    let service = TherapistAvailabilityService::new(&test_config(&mock_server.uri()));
    let available = service.available_therapists(
        ts("2025-03-01T11:00:00Z"), ts("2025-03-01T12:00:00Z"), "test-token").await.unwrap();

    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id.to_string(), therapist_id);
}

#[tokio::test]
async fn cancelled_bookings_are_filtered_by_the_store_query() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4().to_string();

    mock_therapist_directory(&mock_server, &therapist_id).await;
    // The matcher requires status=neq.Cancelled; a store honouring it
    // returns nothing for a therapist whose only booking is cancelled.
    mock_busy_query(&mock_server, json!([])).await;

    let service = TherapistAvailabilityService::new(&test_config(&mock_server.uri()));

    let inside = service.available_therapists(
        ts("2025-03-01T10:30:00Z"), ts("2025-03-01T10:45:00Z"), "test-token").await.unwrap();
    assert_eq!(inside.len(), 1);

    let outside = service.available_therapists(
        ts("2025-03-01T11:00:00Z"), ts("2025-03-01T12:00:00Z"), "test-token").await.unwrap();
    assert_eq!(outside.len(), 1);
}

#[tokio::test]
async fn open_ended_booking_occupies_one_hour() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4().to_string();
    let customer_id = Uuid::new_v4().to_string();

    mock_therapist_directory(&mock_server, &therapist_id).await;
    mock_busy_query(&mock_server, json!([
        MockSupabaseResponses::appointment_row(
            1, &customer_id, Some(&therapist_id), "Facial",
            "2025-03-01T09:00:00Z", None, "Booked"),
    ])).await;

    let service = TherapistAvailabilityService::new(&test_config(&mock_server.uri()));

    // Inside the implied [09:00, 10:00) hour.
    let during = service.available_therapists(
        ts("2025-03-01T09:30:00Z"), ts("2025-03-01T09:45:00Z"), "test-token").await.unwrap();
    assert!(during.is_empty());

    // Starting exactly at the implied end.
    let after = service.available_therapists(
        ts("2025-03-01T10:00:00Z"), ts("2025-03-01T10:30:00Z"), "test-token").await.unwrap();
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn multiple_therapists_are_partitioned_by_busyness() {
    let mock_server = MockServer::start().await;
    let busy_therapist = Uuid::new_v4().to_string();
    let free_therapist = Uuid::new_v4().to_string();
    let customer_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/user_roles"))
        .and(query_param("role", "eq.Therapist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_role_row(&busy_therapist, "Therapist"),
            MockSupabaseResponses::user_role_row(&free_therapist, "Therapist"),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("in.({},{})", busy_therapist, free_therapist)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&busy_therapist, "masha@example.com", "Masha Petrova"),
            MockSupabaseResponses::profile_response(&free_therapist, "irene@example.com", "Irene Kim"),
        ])))
        .mount(&mock_server)
        .await;

    mock_busy_query(&mock_server, json!([
        MockSupabaseResponses::appointment_row(
            1, &customer_id, Some(&busy_therapist), "Deep Tissue Massage",
            "2025-03-01T10:00:00Z", Some("2025-03-01T11:30:00Z"), "Booked"),
    ])).await;

    let service = TherapistAvailabilityService::new(&test_config(&mock_server.uri()));
    let available = service.available_therapists(
        ts("2025-03-01T11:00:00Z"), ts("2025-03-01T12:00:00Z"), "test-token").await.unwrap();

    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id.to_string(), free_therapist);
}
