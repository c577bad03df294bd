//! HTTP API integration tests against a live AgentService with a mock model.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use kestrel_cache::MemoryCache;
use kestrel_core::{CacheService, KestrelError, Result};
use kestrel_llm::{MockProvider, ModelClient};
use kestrel_plugin::{
    ActionSpec, InputSchema, JsonType, Plugin, PluginAction, PluginContext, PluginMetadata,
    executor_fn,
};
use kestrel_runtime::AgentService;

struct EchoPlugin {
    meta: PluginMetadata,
}

impl EchoPlugin {
    fn new() -> Self {
        Self {
            meta: PluginMetadata::new("echo", "Echoes its input", "0.2.0"),
        }
    }
}

#[async_trait]
impl Plugin for EchoPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }

    async fn initialize(&self, _ctx: PluginContext) -> Result<()> {
        Ok(())
    }

    fn actions(&self) -> Vec<PluginAction> {
        vec![PluginAction::api(
            ActionSpec::new("echo", "Return the text unchanged").with_schema(
                InputSchema::object().property("text", JsonType::String, "Text to echo", true),
            ),
            executor_fn(|input, _ctx| async move {
                match input["text"].as_str() {
                    Some("explode") => Err(KestrelError::action_failed("echo", "boom")),
                    Some(text) => Ok(json!({ "echo": text })),
                    None => Ok(Value::Null),
                }
            }),
        )]
    }
}

/// Build a router over a started service whose model replies with `responses`.
async fn setup(responses: Vec<&str>) -> (axum::Router, Arc<AgentService>) {
    let mut mock = MockProvider::new("mock");
    for r in responses {
        mock = mock.with_response(r);
    }
    let cache: Arc<dyn CacheService> = Arc::new(MemoryCache::new());
    let service = Arc::new(AgentService::new(
        cache,
        ModelClient::new(Arc::new(mock), "mock-model"),
    ));
    service
        .register_plugin(Arc::new(EchoPlugin::new()))
        .await
        .unwrap();
    service.start().await.unwrap();
    (kestrel_server::build_router(Arc::clone(&service)), service)
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Health & Metrics ───────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = setup(vec![]).await;
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["uptime"].is_u64());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup(vec![]).await;
    let req = Request::get("/metrics").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains("# TYPE kestrel_uptime_seconds gauge"));
    assert!(body.contains("kestrel_http_requests_total 1"));
    assert!(body.contains("kestrel_actions_registered 1"));
    assert!(body.contains("kestrel_plugins{state=\"started\"} 1"));
}

// ── Plugins & Actions ──────────────────────────────────────────

#[tokio::test]
async fn test_plugins_endpoint() {
    let (app, _) = setup(vec![]).await;
    let req = Request::get("/api/v1/plugins").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(
        json,
        json!([{
            "name": "echo",
            "version": "0.2.0",
            "description": "Echoes its input",
            "state": "started",
            "actions": ["echo"],
        }])
    );
}

#[tokio::test]
async fn test_actions_endpoint_lists_tools() {
    let (app, _) = setup(vec![]).await;
    let req = Request::get("/api/v1/actions").body(Body::empty()).unwrap();
    let json = body_json(app.oneshot(req).await.unwrap()).await;

    let tools = json.as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "echo__echo");
    assert_eq!(tools[0]["parameters"]["required"], json!(["text"]));
}

#[tokio::test]
async fn test_invoke_action() {
    let (app, _) = setup(vec![]).await;
    let resp = app
        .oneshot(post_json("/api/v1/actions/echo/echo", json!({"text": "hi"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"echo": "hi"}));
}

#[tokio::test]
async fn test_invoke_action_errors_map_to_status() {
    let (app, _) = setup(vec![]).await;

    let resp = app
        .clone()
        .oneshot(post_json("/api/v1/actions/echo/missing", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(post_json("/api/v1/actions/echo/echo", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(resp).await["error"].as_str().unwrap().contains("text"));

    let resp = app
        .oneshot(post_json("/api/v1/actions/echo/echo", json!({"text": "explode"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

// ── Messages & Turns ───────────────────────────────────────────

#[tokio::test]
async fn test_publish_message() {
    let (app, service) = setup(vec![]).await;
    let before = service.bus().published_count();

    let resp = app
        .oneshot(post_json("/api/v1/messages", json!({"content": "hello"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let json = body_json(resp).await;
    assert_eq!(json["source"], "system");
    assert_eq!(json["content"], "hello");
    assert!(json["id"].is_string());
    assert_eq!(service.bus().published_count(), before + 1);
}

#[tokio::test]
async fn test_model_turn() {
    let (app, _) = setup(vec!["Nothing to do."]).await;
    let resp = app
        .oneshot(post_json("/api/v1/turn", json!({"prompt": "anything new?"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["text"], "Nothing to do.");
    assert_eq!(json["iterations"], 1);
    assert_eq!(json["exhausted"], false);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = setup(vec![]).await;
    let req = Request::get("/api/v1/nope").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
