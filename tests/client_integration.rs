//! End-to-end tests of the client against a mock HTTP backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_resilience::platform::Platform;
use api_resilience::resilience::CircuitState;
use api_resilience::{ApiError, Method, WriteRecovery};

mod common;

#[tokio::test]
async fn test_server_error_retried_until_success() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let backend = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (500, r#"{"error":"boom"}"#.into())
            } else {
                (200, r#"{"meals":[]}"#.into())
            }
        }
    })
    .await;

    let client = common::client_for(&backend, Platform::Android, common::fast_profile());
    let value = client.get("/meals").await.unwrap();

    assert_eq!(value, serde_json::json!({"meals": []}));
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    // Same request id on every attempt, attempt counter advancing
    let requests = backend.requests();
    let ids: Vec<_> = requests.iter().map(|r| r.header("x-request-id").unwrap().to_string()).collect();
    assert!(ids.iter().all(|id| id == &ids[0]));
    let attempts: Vec<_> = requests.iter().map(|r| r.header("x-retry-attempt").unwrap().to_string()).collect();
    assert_eq!(attempts, vec!["0", "1", "2"]);
    assert_eq!(client.breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_service_unavailable_not_retried() {
    let backend = common::start_mock_backend(503, r#"{"error":"overloaded"}"#).await;
    let client = common::client_for(&backend, Platform::Android, common::fast_profile());

    let err = client.get("/meals").await.unwrap_err();

    assert!(matches!(err, ApiError::ServiceUnavailable { .. }));
    assert_eq!(backend.hits(), 1);
    assert_eq!(client.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn test_abandoned_connection_rewritten_per_platform() {
    let backend = common::start_mock_backend(499, "").await;

    let ios = common::client_for(&backend, Platform::Ios, common::fast_profile());
    let err = ios.get("/profile").await.unwrap_err();
    match &err {
        ApiError::ConnectionInterrupted { message } => {
            assert_eq!(message, Platform::Ios.interrupted_message());
        }
        other => panic!("expected interruption, got {other:?}"),
    }
    assert_eq!(err.status(), Some(499));

    let android = common::client_for(&backend, Platform::Android, common::fast_profile());
    let err = android.get("/profile").await.unwrap_err();
    assert_eq!(err.to_string(), Platform::Android.interrupted_message());

    // Never retried, never counted
    assert_eq!(backend.hits(), 2);
    assert_eq!(ios.breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_client_error_passed_through() {
    let backend = common::start_mock_backend(404, r#"{"error":"no such meal"}"#).await;
    let client = common::client_for(&backend, Platform::Android, common::fast_profile());

    let err = client.get("/meals/42").await.unwrap_err();

    match err {
        ApiError::Status { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, Some(serde_json::json!({"error": "no such meal"})));
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert_eq!(backend.hits(), 1);
    assert_eq!(client.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_identical_reads_hit_network_once() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        (200, r#"{"day":"today"}"#.into())
    })
    .await;
    let client = common::client_for(&backend, Platform::Android, common::fast_profile());

    let (a, b) = tokio::join!(client.get("/meals/today"), client.get("/meals/today"));

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(backend.hits(), 1);
    assert_eq!(client.in_flight_reads(), 0);

    // A later read is a fresh call
    client.get("/meals/today").await.unwrap();
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_identical_writes_hit_network_each_time() {
    let backend = common::start_mock_backend(201, r#"{"saved":true}"#).await;
    let client = common::client_for(&backend, Platform::Android, common::fast_profile());
    let body = serde_json::json!({"kcal": 300});

    let (a, b) = tokio::join!(client.post("/meals", &body), client.post("/meals", &body));

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_correlation_headers_and_body_sent() {
    let backend = common::start_mock_backend(200, r#"{"ok":true}"#).await;
    let client = common::client_for(&backend, Platform::Ios, common::fast_profile());

    client
        .patch("/goals/1", &serde_json::json!({"target": 2000}))
        .await
        .unwrap();

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "PATCH");
    assert_eq!(request.path, "/goals/1");
    assert_eq!(request.header("x-platform"), Some("ios"));
    assert!(uuid::Uuid::parse_str(request.header("x-request-id").unwrap()).is_ok());
    assert_eq!(request.header("x-retry-attempt"), Some("0"));
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body, serde_json::json!({"target": 2000}));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "{}".into())
    })
    .await;
    let mut profile = common::fast_profile();
    profile.request_timeout = Duration::from_millis(100);
    profile.max_retries = 0;
    let client = common::client_for(&backend, Platform::Android, profile);

    let err = client.get("/slow").await.unwrap_err();

    assert!(matches!(err, ApiError::Timeout { .. }), "got {err:?}");
    assert_eq!(client.active_requests(), 0);
    assert_eq!(client.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn test_write_recovery_uses_fallback_with_same_key() {
    let backend = common::start_programmable_backend(|request| async move {
        if request.path == "/workouts" {
            (502, r#"{"error":"bad gateway"}"#.into())
        } else {
            (200, r#"{"queued":true}"#.into())
        }
    })
    .await;
    let mut profile = common::fast_profile();
    profile.max_retries = 0;
    profile.failure_threshold = 10;
    let client = common::client_for(&backend, Platform::Android, profile);
    let recovery = WriteRecovery::new()
        .backoff(Duration::from_millis(5))
        .fallback("/workouts/offline");

    let value = client
        .write_with_recovery(Method::Post, "/workouts", &serde_json::json!({"minutes": 30}), &recovery)
        .await
        .unwrap();

    assert_eq!(value, serde_json::json!({"queued": true}));
    let requests = backend.requests();
    let paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/workouts", "/workouts", "/workouts", "/workouts/offline"]);
    let key = requests[0].header("idempotency-key").unwrap();
    assert!(requests.iter().all(|r| r.header("idempotency-key") == Some(key)));
}
