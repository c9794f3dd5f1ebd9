use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, Method},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::tree_store::TreeStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TreeStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route(
            "/db/*path",
            get(read_node)
                .put(set_node)
                .post(push_child)
                .patch(update_node)
                .delete(remove_node),
        )
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    auth_required: bool,
    persistent: bool,
}

#[derive(Serialize)]
struct PushResponse {
    name: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        auth_required: state.config.auth_token.is_some(),
        persistent: state.store.snapshot_path().is_some(),
    })
}

fn verify_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.auth_token else {
        return Ok(());
    };

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ServerError::Unauthorized)?;

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Unauthorized);
    }

    Ok(())
}

async fn read_node(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ServerError> {
    verify_token(&headers, &state.config)?;
    let node = state.store.get(&path).await?;
    Ok(Json(node.unwrap_or(Value::Null)))
}

async fn set_node(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    verify_token(&headers, &state.config)?;
    let stored = state.store.set(&path, value).await?;
    Ok(Json(stored.unwrap_or(Value::Null)))
}

async fn push_child(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<PushResponse>, ServerError> {
    verify_token(&headers, &state.config)?;
    let name = state.store.push(&path, value).await?;
    Ok(Json(PushResponse { name }))
}

async fn update_node(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    verify_token(&headers, &state.config)?;
    if !value.is_object() {
        return Err(ServerError::BadRequest(
            "PATCH body must be a JSON object".to_string(),
        ));
    }
    let stored = state.store.update(&path, value).await?;
    Ok(Json(stored.unwrap_or(Value::Null)))
}

async fn remove_node(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ServerError> {
    verify_token(&headers, &state.config)?;
    state.store.remove(&path).await?;
    Ok(Json(Value::Null))
}

/// Serve on an already bound listener until the connection loop fails.
pub async fn serve_on(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    let app = build_router(state);
    info!(addr = %listener.local_addr()?, "Starting HTTP API server");
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(state, listener).await
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn state(auth_token: Option<&str>) -> AppState {
        AppState {
            store: Arc::new(TreeStore::in_memory()),
            config: Arc::new(ServerConfig {
                auth_token: auth_token.map(str::to_string),
                ..ServerConfig::default()
            }),
        }
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

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_router(state(Some("secret")));
        let (status, body) = call(&app, request(Method::GET, "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn crud_round() {
        let app = build_router(state(None));

        let (status, _) = call(
            &app,
            request(Method::PUT, "/db/teachers/T1", Some(json!({ "name": "Alice" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(
            &app,
            request(Method::PATCH, "/db/teachers", Some(json!({ "T2": { "name": "Bob" } }))),
        )
        .await;
        assert_eq!(body["T1"]["name"], "Alice");
        assert_eq!(body["T2"]["name"], "Bob");

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/db/attendance",
                Some(json!({ "student_id": "S1", "updated_at": { ".sv": "timestamp" } })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let key = body["name"].as_str().unwrap().to_string();
        assert_eq!(key.len(), 20);

        let (_, node) = call(&app, request(Method::GET, &format!("/db/attendance/{key}"), None)).await;
        assert!(node["updated_at"].is_i64());

        call(&app, request(Method::DELETE, "/db/teachers/T1", None)).await;
        let (_, gone) = call(&app, request(Method::GET, "/db/teachers/T1", None)).await;
        assert_eq!(gone, Value::Null);
    }

    #[tokio::test]
    async fn bearer_token_is_enforced() {
        let app = build_router(state(Some("secret")));

        let (status, _) = call(&app, request(Method::GET, "/db/teachers", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/db/teachers")
            .header("authorization", "Bearer wrong!")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, req).await.0, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/db/teachers")
            .header("authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, req).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_input_is_bad_request() {
        let app = build_router(state(None));

        let (status, _) = call(&app, request(Method::PATCH, "/db/teachers", Some(json!([1, 2])))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, request(Method::GET, "/db/bad$key", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("bad$key"));
    }
}
