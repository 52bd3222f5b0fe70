//! 管理API端到端测试（基于 `oneshot`，不监听端口）

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;
use vidgen::config::ServerConfig;
use vidgen::management::ManagementServer;
use vidgen::management::middleware::REQUEST_ID_HEADER;

use common::{TestApp, far_future, long_ago};

fn router(app: &TestApp) -> Router {
    ManagementServer::new(&ServerConfig::default(), app.context.clone()).router()
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn send_text(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn key_lifecycle_over_http() {
    let app = TestApp::new().await;
    let router = router(&app);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/pools/zyphra/keys",
            Some(json!({"secret": "zy-secret-abcdef-123456", "label": "main", "units_limit": 30})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let key_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["units_limit"], 30);
    let masked = body["data"]["masked_secret"].as_str().unwrap();
    assert!(!masked.contains("abcdef-1234"));

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/pools/zyphra/keys",
            Some(json!({"secret": "  zy-secret-abcdef-123456  "})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_KEY");

    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/pools/zyphra/keys/{key_id}/active"),
            Some(json!({"is_active": false})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);
    assert_eq!(body["data"]["state"]["status"], "disabled");

    let (_, body) = send(&router, request(Method::GET, "/api/pools/zyphra/stats", None)).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["disabled"], 1);

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/pools/zyphra/keys/{key_id}/limit"),
            Some(json!({"units_limit": 120})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["units_limit"], 120);

    let (status, _) = send(
        &router,
        request(Method::DELETE, &format!("/api/pools/zyphra/keys/{key_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &router,
        request(Method::POST, &format!("/api/pools/zyphra/keys/{key_id}/reset"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "KEY_NOT_FOUND");
}

#[tokio::test]
async fn bulk_import_and_clear() {
    let app = TestApp::new().await;
    let router = router(&app);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/pools/bearer-token/keys/bulk",
            Some(json!({
                "secrets": ["bearer-token-value-0001", "   "],
                "text": "bearer-token-value-0002\n\nbearer-token-value-0001\n"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["added"], 2);
    assert_eq!(body["data"]["duplicates"], 1);
    assert_eq!(body["data"]["invalid"], 1);

    let (_, body) = send(&router, request(Method::GET, "/api/pools/bearer_token/keys", None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = send(&router, request(Method::DELETE, "/api/pools/bearer_token/keys", None)).await;
    assert_eq!(body["data"]["removed"], 2);
}

#[tokio::test]
async fn unknown_provider_is_bad_request() {
    let app = TestApp::new().await;
    let (status, body) = send(&router(&app), request(Method::GET, "/api/pools/openai/keys", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNKNOWN_PROVIDER");
}

#[tokio::test]
async fn rotation_settings_round_trip_and_validation() {
    let app = TestApp::new().await;
    let router = router(&app);

    let (_, body) = send(&router, request(Method::GET, "/api/rotation-settings", None)).await;
    assert_eq!(body["data"]["videos_per_batch"], 5);

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            "/api/rotation-settings",
            Some(json!({
                "rotation_enabled": false,
                "rotation_interval_minutes": 30,
                "max_requests_per_token": 10,
                "videos_per_batch": 3,
                "batch_delay_seconds": 0
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rotation_enabled"], false);

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            "/api/rotation-settings",
            Some(json!({"rotation_interval_minutes": 0})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, body) = send(&router, request(Method::GET, "/api/rotation-settings", None)).await;
    assert_eq!(body["data"]["videos_per_batch"], 3);
}

#[tokio::test]
async fn entitlement_view_and_plan_actions() {
    let app = TestApp::new().await;
    let router = router(&app);
    let user = app.user("expired-scale", "scale", Some(long_ago()), 10).await;

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/users/{}/entitlement?tool=video", user.id),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_expired"], true);
    assert_eq!(body["data"]["tool_access"]["allowed"], false);
    assert_eq!(body["data"]["remaining_videos"], 990);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/users/{}/plan/renew", user.id),
            Some(json!({"days": 30})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["plan_status"], "active");

    let (_, body) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/users/{}/entitlement?tool=video", user.id),
            None,
        ),
    )
    .await;
    assert_eq!(body["data"]["tool_access"]["allowed"], true);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/users/{}/plan/change", user.id),
            Some(json!({"plan_type": "platinum"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/users/{}/plan/change", user.id),
            Some(json!({"plan_type": "empire", "days": 10})),
        ),
    )
    .await;
    assert_eq!(body["data"]["plan_type"], "empire");

    let (_, body) = send(
        &router,
        request(Method::POST, &format!("/api/users/{}/plan/remove", user.id), None),
    )
    .await;
    assert_eq!(body["data"]["plan_type"], "free");
    assert_eq!(body["data"]["plan_status"], "cancelled");

    let (_, body) = send(&router, request(Method::POST, "/api/users/daily-counts/reset", None)).await;
    assert_eq!(body["data"]["reset"], 1);
    assert_eq!(app.reload(user.id).await.daily_video_count, 0);

    let (status, body) = send(&router, request(Method::GET, "/api/users/9999/entitlement", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn single_generation_uses_pool_and_counts_quota() {
    let app = TestApp::new().await;
    let router = router(&app);
    let user = app.user("scale-user", "scale", Some(far_future()), 0).await;

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/generate",
            Some(json!({"user_id": user.id, "tool": "video", "prompt": "a cat"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["error"]["message"],
        "Video service is temporarily unavailable. Please try again later."
    );

    app.context
        .pools
        .flow_cookie()
        .add("flow-cookie-http-0001", None)
        .await
        .unwrap();
    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/generate",
            Some(json!({"user_id": user.id, "tool": "video", "prompt": "a cat"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert!(body["data"]["asset_url"].as_str().unwrap().starts_with("https://cdn.test/video/"));
    assert_eq!(app.reload(user.id).await.daily_video_count, 1);
}

#[tokio::test]
async fn bulk_generation_streams_progress_results_and_complete() {
    let app = TestApp::new().await;
    let router = router(&app);
    let user = app.user("enterprise-user", "enterprise", Some(far_future()), 0).await;
    for n in 0..2 {
        app.context
            .pools
            .flow_cookie()
            .add(&format!("flow-cookie-bulk-{n:04}"), None)
            .await
            .unwrap();
    }

    let (status, text) = send_text(
        &router,
        request(
            Method::POST,
            "/api/generate/bulk",
            Some(json!({"user_id": user.id, "tool": "video", "prompts": ["one", "two", "three"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text.matches("event: progress").count(), 3);
    assert_eq!(text.matches("event: result").count(), 3);
    assert_eq!(text.matches("event: complete").count(), 1);
    assert!(text.contains(r#""succeeded":3"#));
    assert_eq!(app.reload(user.id).await.daily_video_count, 3);
}

#[tokio::test]
async fn bulk_generation_denial_is_a_single_error_event() {
    let app = TestApp::new().await;
    let user = app.user("free-user", "free", None, 0).await;

    let (status, text) = send_text(
        &router(&app),
        request(
            Method::POST,
            "/api/generate/bulk",
            Some(json!({"user_id": user.id, "tool": "video", "prompts": ["one"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text.matches("event: error").count(), 1);
    assert!(text.contains("TOOL_NOT_ALLOWED"));
    assert!(!text.contains("event: result"));
}

#[tokio::test]
async fn health_ping_and_request_id() {
    let app = TestApp::new().await;
    let router = router(&app);

    let (status, body) = send(&router, request(Method::GET, "/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], true);
    assert_eq!(body["data"]["pools"].as_array().unwrap().len(), 5);

    let (status, text) = send_text(&router, request(Method::GET, "/ping", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "pong");

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/ping")
                .header(REQUEST_ID_HEADER, "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "trace-abc");
}
