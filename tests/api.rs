use std::time::Duration;
use axum::http::StatusCode;
use axum::body::Body;
use http_body_util::BodyExt;
use tower::ServiceExt;
use serde_json::{json, Value};
use marketdesk::simulator::script::ScriptOptions;
use marketdesk::simulator::{build_router, SimulatorState};

/// Frames play back instantly and in order.
fn fast_state() -> SimulatorState {
    SimulatorState::new(2, ScriptOptions::orderly(), Duration::ZERO)
}

/// Frames never arrive within a test's lifetime.
fn slow_state() -> SimulatorState {
    SimulatorState::new(1, ScriptOptions::orderly(), Duration::from_secs(3600))
}

fn app(state: &SimulatorState) -> axum::Router {
    build_router(state.clone())
}

fn make_request(method: &str, uri: &str, body: Option<Value>) -> axum::http::Request<Body> {
    let builder = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");

    match body {
        Some(b) => builder.body(Body::from(serde_json::to_string(&b).unwrap())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn response_json(response: axum::http::Response<Body>) -> Value {
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        panic!("Empty response body. Status: {}, Headers: {:?}", parts.status, parts.headers);
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("JSON parse error: {}. Body: {:?}", e, String::from_utf8_lossy(&bytes)))
}

async fn create_task(state: &SimulatorState, body: Value) -> String {
    let req = make_request("POST", "/api/tasks", Some(body));
    let response = app(state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["id"].as_str().unwrap().to_string()
}

async fn wait_for_status(state: &SimulatorState, id: &str, status: &str) -> Value {
    for _ in 0..200 {
        let req = make_request("GET", &format!("/api/tasks/{}", id), None);
        let body = response_json(app(state).oneshot(req).await.unwrap()).await;
        if body["status"] == status {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never reached {}", id, status);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = fast_state();
    let req = make_request("GET", "/api/health", None);
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "marketdesk-simulator");
    assert_eq!(body["tasks"], 0);
}

#[tokio::test]
async fn test_create_task_runs_to_completion() {
    let state = fast_state();
    let req = make_request("POST", "/api/tasks", Some(json!({
        "symbol": "nvda",
        "agents": ["market_analyst", "trader"]
    })));
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["symbol"], "NVDA");

    let snapshot = wait_for_status(&state, &id, "completed").await;
    assert_eq!(snapshot["progress"], 100.0);
    assert_eq!(snapshot["agents"].as_array().unwrap().len(), 2);

    let req = make_request("GET", &format!("/api/tasks/{}/result", id), None);
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = response_json(response).await;
    assert_eq!(result["symbol"], "NVDA");
    assert!(["BUY", "HOLD", "SELL"].contains(&result["decision"].as_str().unwrap()));
}

#[tokio::test]
async fn test_create_task_rejects_empty_symbol() {
    let state = fast_state();
    let req = make_request("POST", "/api/tasks", Some(json!({ "symbol": "  " })));
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["error"], "symbol is required");
}

#[tokio::test]
async fn test_create_task_rejects_unknown_agent() {
    let state = fast_state();
    let req = make_request("POST", "/api/tasks", Some(json!({
        "symbol": "AAPL",
        "agents": ["trader", "astrologer"]
    })));
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["error"], "Unknown agent: astrologer");
}

#[tokio::test]
async fn test_list_tasks() {
    let state = slow_state();
    for symbol in &["AAPL", "MSFT"] {
        create_task(&state, json!({ "symbol": symbol })).await;
    }

    let req = make_request("GET", "/api/tasks", None);
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["tasks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_task_not_found() {
    let state = fast_state();
    let req = make_request("GET", "/api/tasks/nonexistent-id", None);
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert_eq!(body["error"], "Task not found");
}

#[tokio::test]
async fn test_result_not_ready() {
    let state = slow_state();
    let id = create_task(&state, json!({ "symbol": "AAPL" })).await;

    let req = make_request("GET", &format!("/api/tasks/{}/result", id), None);
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_second_task_queues_behind_first() {
    let state = slow_state();
    let first = create_task(&state, json!({ "symbol": "AAPL" })).await;
    let second = create_task(&state, json!({ "symbol": "MSFT" })).await;

    wait_for_status(&state, &first, "running").await;
    let req = make_request("GET", &format!("/api/tasks/{}", second), None);
    let body = response_json(app(&state).oneshot(req).await.unwrap()).await;
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn test_cancel_task() {
    let state = slow_state();
    let id = create_task(&state, json!({ "symbol": "AAPL" })).await;

    let req = make_request("POST", &format!("/api/tasks/{}/cancel", id), None);
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["cancelled"], true);

    wait_for_status(&state, &id, "cancelled").await;
}

#[tokio::test]
async fn test_cancel_task_not_found() {
    let state = fast_state();
    let req = make_request("POST", "/api/tasks/nonexistent/cancel", None);
    let response = app(&state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
