//! REST dispatcher integration tests
//!
//! Run the client against an axum server that reports rate-limit headers and
//! records what it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cord_rest::{AttachmentFile, Method, RequestOptions, RestError};
use futures_util::future::join_all;
use integration_tests::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Barrier;

/// Rate-limit headers for bucket `bucket`
fn rate_limit(bucket: &str, limit: u32, remaining: u32, reset_after: f64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-bucket", bucket.parse().expect("bucket"));
    headers.insert("x-ratelimit-limit", limit.into());
    headers.insert("x-ratelimit-remaining", remaining.into());
    headers.insert(
        "x-ratelimit-reset-after",
        reset_after.to_string().parse().expect("reset"),
    );
    headers
}

// ============================================================================
// Responses
// ============================================================================

#[tokio::test]
async fn test_json_success_and_empty_response() -> Result<()> {
    let app = Router::new()
        .route(
            "/users/@me",
            get(|| async { Json(json!({ "id": "80351110224678912", "username": "test-bot" })) }),
        )
        .route(
            "/channels/:channel_id/messages/:message_id",
            delete(|| async { StatusCode::NO_CONTENT }),
        );
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let me: Value = client.get("/users/@me").await?;
    assert_eq!(me["username"], "test-bot");

    let () = client
        .delete("/channels/1/messages/2", RequestOptions::new())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_structured_error_is_decoded() -> Result<()> {
    let app = Router::new().route(
        "/channels/:channel_id",
        get(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "code": 10003, "message": "Unknown Channel" })),
            )
        }),
    );
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let error = client.get::<Value>("/channels/404").await.unwrap_err();
    match &error {
        RestError::Structured {
            status, message, ..
        } => {
            assert_eq!(*status, 404);
            assert_eq!(message, "Unknown Channel");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.code(), Some(10003));
    assert!(error.is_client_error());
    Ok(())
}

#[tokio::test]
async fn test_bad_gateway_is_retryable() -> Result<()> {
    let app = Router::new().route("/gateway/bot", get(|| async { StatusCode::BAD_GATEWAY }));
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let error = client.get::<Value>("/gateway/bot").await.unwrap_err();
    assert!(matches!(error, RestError::BadGateway));
    assert!(error.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_response_is_not_retried() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/channels/:channel_id/typing",
            post(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    rate_limit("typing", 5, 0, 0.5),
                    Json(json!({
                        "message": "You are being rate limited.",
                        "retry_after": 0.5,
                        "global": false
                    })),
                )
            }),
        )
        .with_state(Arc::clone(&calls));
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let error = client
        .post::<Value>("/channels/1/typing", RequestOptions::new())
        .await
        .unwrap_err();
    match error {
        RestError::RateLimited {
            bucket,
            retry_after,
            global,
        } => {
            assert_eq!(bucket.as_deref(), Some("typing"));
            assert_eq!(retry_after, Some(0.5));
            assert!(!global);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

// ============================================================================
// Request building
// ============================================================================

#[tokio::test]
async fn test_request_headers_query_and_body() -> Result<()> {
    async fn echo(
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Json(json!({
            "authorization": header("authorization"),
            "user_agent": header("user-agent"),
            "reason": header("x-audit-log-reason"),
            "query": query,
            "body": body,
        }))
    }

    let app = Router::new().route("/channels/:channel_id/messages", post(echo));
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let options = RequestOptions::new()
        .json(&json!({ "content": "hello" }))?
        .query("nonce", 7)
        .reason("cleanup");
    let echoed: Value = client.post("/channels/10/messages", options).await?;

    assert_eq!(echoed["authorization"], format!("Bot {TEST_TOKEN}"));
    assert!(echoed["user_agent"]
        .as_str()
        .is_some_and(|ua| ua.starts_with("DiscordBot")));
    assert_eq!(echoed["reason"], "cleanup");
    assert_eq!(echoed["query"]["nonce"], "7");
    assert_eq!(echoed["body"]["content"], "hello");
    Ok(())
}

#[tokio::test]
async fn test_attachments_are_sent_as_multipart() -> Result<()> {
    async fn capture(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Json(json!({
            "content_type": content_type,
            "body": String::from_utf8_lossy(&body),
        }))
    }

    let app = Router::new().route("/channels/:channel_id/messages", post(capture));
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let options = RequestOptions::new()
        .body(json!({ "content": "see attached" }))
        .file(AttachmentFile::new("notes.txt", b"file contents".to_vec()).with_content_type("text/plain"));
    let captured: Value = client.post("/channels/10/messages", options).await?;

    assert!(captured["content_type"]
        .as_str()
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));
    let body = captured["body"].as_str().unwrap_or_default();
    assert!(body.contains(r#"name="payload_json""#));
    assert!(body.contains("see attached"));
    assert!(body.contains(r#"name="files[0]"; filename="notes.txt""#));
    assert!(body.contains("file contents"));
    Ok(())
}

// ============================================================================
// Pacing
// ============================================================================

#[derive(Clone, Default)]
struct Arrivals(Arc<Mutex<Vec<Instant>>>);

#[tokio::test]
async fn test_exhausted_bucket_waits_for_reset() -> Result<()> {
    let arrivals = Arrivals::default();
    let app = Router::new()
        .route(
            "/channels/:channel_id/messages",
            get(|State(arrivals): State<Arrivals>| async move {
                arrivals.0.lock().push(Instant::now());
                (rate_limit("messages", 1, 0, 0.3), Json(json!([])))
            }),
        )
        .with_state(arrivals.clone());
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let _: Value = client.get("/channels/1/messages").await?;
    let _: Value = client.get("/channels/1/messages").await?;

    let arrivals = arrivals.0.lock().clone();
    assert_eq!(arrivals.len(), 2);
    assert!(arrivals[1] - arrivals[0] >= Duration::from_millis(290));
    Ok(())
}

#[tokio::test]
async fn test_bucket_with_budget_is_not_delayed() -> Result<()> {
    let arrivals = Arrivals::default();
    let app = Router::new()
        .route(
            "/channels/:channel_id/messages",
            get(|State(arrivals): State<Arrivals>| async move {
                arrivals.0.lock().push(Instant::now());
                (rate_limit("messages", 5, 4, 10.0), Json(json!([])))
            }),
        )
        .with_state(arrivals.clone());
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let _: Value = client.get("/channels/1/messages").await?;
    let _: Value = client.get("/channels/1/messages").await?;

    let arrivals = arrivals.0.lock().clone();
    assert!(arrivals[1] - arrivals[0] < Duration::from_millis(250));
    Ok(())
}

#[derive(Clone, Default)]
struct Serial {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    order: Arc<Mutex<Vec<u32>>>,
}

#[tokio::test]
async fn test_same_bucket_runs_in_order_one_at_a_time() -> Result<()> {
    let serial = Serial::default();
    let app = Router::new()
        .route(
            "/channels/:channel_id/messages",
            post(
                |State(serial): State<Serial>, Query(query): Query<HashMap<String, u32>>| async move {
                    let now = serial.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    serial.max_in_flight.fetch_max(now, Ordering::SeqCst);
                    serial.order.lock().push(query["n"]);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    serial.in_flight.fetch_sub(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .with_state(serial.clone());
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let calls = (0..5u32).map(|n| {
        client.send(
            Method::POST,
            "/channels/1/messages",
            RequestOptions::new().query("n", n),
        )
    });
    for result in join_all(calls).await {
        result?;
    }

    assert_eq!(*serial.order.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(serial.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(client.bucket_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_different_buckets_run_concurrently() -> Result<()> {
    // Both calls must be in flight at once to pass the barrier
    let barrier = Arc::new(Barrier::new(2));
    let app = Router::new()
        .route(
            "/channels/:channel_id/messages",
            get(|State(barrier): State<Arc<Barrier>>| async move {
                match tokio::time::timeout(Duration::from_secs(2), barrier.wait()).await {
                    Ok(_) => StatusCode::NO_CONTENT,
                    Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
                }
            }),
        )
        .with_state(barrier);
    let server = MockRestServer::start(app).await?;
    let client = rest_client(&server.base_url())?;

    let (first, second) = tokio::join!(
        client.send(Method::GET, "/channels/1/messages", RequestOptions::new()),
        client.send(Method::GET, "/channels/2/messages", RequestOptions::new()),
    );
    first?;
    second?;
    assert_eq!(client.bucket_count(), 2);
    Ok(())
}
