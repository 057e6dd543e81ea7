use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::settings;

use super::models::{ErrorResponse, ProxyResponse};
use super::proxy::proxy_request;
use super::state::ServerState;

pub async fn run_server(settings: settings::Settings, key: Option<String>) -> Result<()> {
    let addr = settings.server_addr.clone();
    let app = build_router(settings, key);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!("proxy listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(settings: settings::Settings, key: Option<String>) -> Router {
    let state = Arc::new(ServerState { settings, key });
    Router::new()
        .route("/health", get(health))
        .route("/api/proxy", any(proxy))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn proxy(
    State(state): State<Arc<ServerState>>,
    method: Method,
    body: Bytes,
) -> Result<Json<ProxyResponse>, (StatusCode, Json<ErrorResponse>)> {
    match proxy_request(state.as_ref(), &method, &body).await {
        Ok(reply) => Ok(Json(ProxyResponse { reply })),
        Err(err) => Err((err.status, Json(ErrorResponse { error: err.message }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    async fn call(method: Method, key: Option<&str>) -> (StatusCode, Value) {
        let state = Arc::new(ServerState {
            settings: settings::Settings::default(),
            key: key.map(|value| value.to_string()),
        });
        let response = proxy(State(state), method, Bytes::new())
            .await
            .into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&body).expect("json"))
    }

    #[tokio::test]
    async fn get_is_method_not_allowed() {
        let (status, body) = call(Method::GET, Some("key")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "error": "Method Not Allowed" }));
    }

    #[tokio::test]
    async fn post_without_key_reports_configuration_error() {
        let (status, body) = call(Method::POST, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().expect("error").contains("API key"));
    }
}
