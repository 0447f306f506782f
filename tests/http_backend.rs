//! Integration tests for the HTTP status client.
//!
//! Each test spins up an Axum mock backend on a random port and checks
//! that every failure class — error status, malformed payload, refused
//! connection, slow response — collapses into `Unreachable`.

use std::time::Duration;

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;

use dashgate::platform::Platform;
use dashgate::status::{
    AggregateStatus, BackendConfig, HttpStatusClient, DenialReason, PlatformStatus, StatusClient,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the mock backend on a random port.
async fn start_backend(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

fn client(port: u16) -> HttpStatusClient {
    HttpStatusClient::new(BackendConfig {
        base_url: format!("http://127.0.0.1:{port}"),
        api_token: None,
        query_timeout: Duration::from_millis(500),
    })
    .unwrap()
}

#[tokio::test]
async fn confirmed_access_parses() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/api/users/{user}/platforms/{platform}/status",
            get(|| async { Json(json!({ "accessAllowed": true })) }),
        );
        let client = client(start_backend(app).await);

        let status = client.status_for("u1", Platform::Twitter).await;

        match status {
            PlatformStatus::Confirmed {
                access_allowed,
                reason,
                redirect_to,
                remaining,
            } => {
                assert!(access_allowed);
                assert_eq!(reason, None);
                assert_eq!(redirect_to, None);
                assert_eq!(remaining, None);
            }
            other => panic!("expected Confirmed, got {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn processing_denial_parses_with_remaining_time() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/api/users/{user}/platforms/{platform}/status",
            get(|| async {
                Json(json!({
                    "accessAllowed": false,
                    "reason": "processing_active",
                    "redirectTo": "/processing/twitter",
                    "processingData": { "remainingMinutes": 5.0 }
                }))
            }),
        );
        let client = client(start_backend(app).await);

        let status = client.status_for("u1", Platform::Twitter).await;

        match status {
            PlatformStatus::Confirmed {
                access_allowed,
                reason,
                redirect_to,
                remaining,
            } => {
                assert!(!access_allowed);
                assert_eq!(reason, Some(DenialReason::ProcessingActive));
                assert_eq!(redirect_to.as_deref(), Some("/processing/twitter"));
                assert_eq!(remaining, Some(Duration::from_secs(300)));
            }
            other => panic!("expected Confirmed, got {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn aggregate_windows_parse_and_unknown_platforms_skip() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/api/users/{user}/status",
            get(|| async {
                Json(json!({
                    "twitter": { "startTime": 1700000000000_i64, "endTime": 1700000300000_i64 },
                    "myspace": { "startTime": 0, "endTime": 0 }
                }))
            }),
        );
        let client = client(start_backend(app).await);

        let status = client.status_all("u1").await;

        match status {
            AggregateStatus::Confirmed(windows) => {
                assert_eq!(windows.len(), 1);
                let window = &windows[&Platform::Twitter];
                assert_eq!(
                    window.start_time,
                    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
                );
                assert_eq!(
                    window.end_time,
                    Utc.timestamp_millis_opt(1_700_000_300_000).unwrap()
                );
            }
            other => panic!("expected Confirmed, got {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_error_is_unreachable() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/api/users/{user}/platforms/{platform}/status",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let client = client(start_backend(app).await);

        let status = client.status_for("u1", Platform::Twitter).await;
        assert!(matches!(status, PlatformStatus::Unreachable));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_payload_is_unreachable() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/api/users/{user}/status",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    "{this is not json",
                )
            }),
        );
        let client = client(start_backend(app).await);

        let status = client.status_all("u1").await;
        assert!(matches!(status, AggregateStatus::Unreachable));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    timeout(TEST_TIMEOUT, async {
        // Grab a free port, then drop the listener so nothing serves it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client(port);

        assert!(matches!(
            client.status_for("u1", Platform::Twitter).await,
            PlatformStatus::Unreachable
        ));
        assert!(matches!(
            client.status_all("u1").await,
            AggregateStatus::Unreachable
        ));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn slow_backend_times_out_as_unreachable() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/api/users/{user}/platforms/{platform}/status",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "accessAllowed": true }))
            }),
        );
        let client = client(start_backend(app).await);

        let started = std::time::Instant::now();
        let status = client.status_for("u1", Platform::Twitter).await;

        assert!(matches!(status, PlatformStatus::Unreachable));
        assert!(started.elapsed() < Duration::from_secs(2));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bearer_token_is_sent_when_configured() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/api/users/{user}/platforms/{platform}/status",
            get(|headers: HeaderMap| async move {
                let authorized = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer sekrit");
                if authorized {
                    Json(json!({ "accessAllowed": true })).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        );
        let port = start_backend(app).await;

        let client = HttpStatusClient::new(BackendConfig {
            base_url: format!("http://127.0.0.1:{port}"),
            api_token: Some(SecretString::from("sekrit")),
            query_timeout: Duration::from_millis(500),
        })
        .unwrap();

        match client.status_for("u1", Platform::Twitter).await {
            PlatformStatus::Confirmed { access_allowed, .. } => assert!(access_allowed),
            other => panic!("expected Confirmed, got {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}
