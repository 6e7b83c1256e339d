//! HTTP surface: the streamable `/mcp` endpoint plus a health probe.
//!
//! This layer is thin by intent. It reads the `mcp-session-id` header,
//! routes to the session manager, and translates manager errors into
//! JSON-RPC error envelopes with the appropriate status. All session state
//! lives in [`SessionManager`].

use crate::session::{SessionError, SessionManager};
use crate::transport::SESSION_ERROR_CODE;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::HeaderName};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

/// Header carrying the session identifier, per the streamable HTTP
/// transport convention.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Build the application router.
pub fn router(sessions: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp", get(handle_get).post(handle_post).delete(handle_delete))
        .layer(CorsLayer::permissive())
        .with_state(sessions)
}

async fn health() -> Response {
    axum::Json(json!({
        "status": "ok",
        "service": "novelai-mcp",
        "mode": "streamable-http"
    }))
    .into_response()
}

fn session_id_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HeaderName::from_static(SESSION_ID_HEADER))
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
}

/// JSON-RPC error envelope for transport-level failures. These carry a
/// null id: the failure happened before any request reached a session.
fn jsonrpc_error_body(message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": SESSION_ERROR_CODE, "message": message},
        "id": null
    })
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, axum::Json(jsonrpc_error_body(message))).into_response()
}

async fn handle_post(
    State(sessions): State<Arc<SessionManager>>,
    headers: HeaderMap,
    axum::Json(message): axum::Json<Value>,
) -> Response {
    match session_id_from(&headers) {
        Some(session_id) => match sessions.handle(session_id, message).await {
            Ok(Some(response)) => axum::Json(response).into_response(),
            // Notifications are accepted with no body.
            Ok(None) => StatusCode::ACCEPTED.into_response(),
            Err(e) => {
                warn!(session_id, error = %e, "Rejected request");
                bad_request(&e.to_string())
            }
        },
        None => match sessions.initialize(message).await {
            Ok((session_id, response)) => {
                debug!(session_id = %session_id, "New session established");
                let body = response.unwrap_or(Value::Null);
                (
                    [(HeaderName::from_static(SESSION_ID_HEADER), session_id)],
                    axum::Json(body),
                )
                    .into_response()
            }
            Err(e) => bad_request(&e.to_string()),
        },
    }
}

/// The server does not push messages, so a GET opens no stream. A known
/// session still counts as activity; an unknown one is rejected.
async fn handle_get(
    State(sessions): State<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Response {
    match session_id_from(&headers) {
        Some(session_id) => match sessions.touch(session_id).await {
            Ok(()) => StatusCode::METHOD_NOT_ALLOWED.into_response(),
            Err(e) => bad_request(&e.to_string()),
        },
        None => bad_request(&SessionError::BadInitialization.to_string()),
    }
}

async fn handle_delete(
    State(sessions): State<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Response {
    match session_id_from(&headers) {
        Some(session_id) => {
            if sessions.close(session_id).await {
                StatusCode::OK.into_response()
            } else {
                bad_request(&SessionError::UnknownSession(session_id.to_string()).to_string())
            }
        }
        None => bad_request(&SessionError::BadInitialization.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SessionTransport, TransportFactory};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct EchoTransport;

    #[async_trait]
    impl SessionTransport for EchoTransport {
        async fn handle_request(&self, message: Value) -> Option<Value> {
            if message.get("id").is_none_or(Value::is_null) {
                return None;
            }
            Some(json!({"jsonrpc": "2.0", "id": message["id"], "result": {"ok": true}}))
        }

        async fn close(&self) {}
    }

    fn echo_factory() -> TransportFactory {
        Box::new(|| Arc::new(EchoTransport))
    }

    fn test_router() -> Router {
        router(Arc::new(SessionManager::new(echo_factory())))
    }

    fn init_body() -> String {
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}).to_string()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mode"], "streamable-http");
    }

    #[tokio::test]
    async fn test_initialize_returns_session_header() {
        let response = test_router()
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(init_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(!session_id.is_empty());
    }

    #[tokio::test]
    async fn test_post_without_session_or_initialize_is_bad_request() {
        let response = test_router()
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], SESSION_ERROR_CODE);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_post_with_unknown_session_is_bad_request() {
        let response = test_router()
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .header(SESSION_ID_HEADER, "never-issued")
                    .body(Body::from(init_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Unknown session"),
        );
    }

    #[tokio::test]
    async fn test_notification_on_live_session_is_accepted() {
        let app = test_router();
        let init = app
            .clone()
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(init_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let session_id = init.headers()[SESSION_ID_HEADER].to_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .header(SESSION_ID_HEADER, &session_id)
                    .body(Body::from(
                        json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_get_on_live_session_is_method_not_allowed() {
        let app = test_router();
        let init = app
            .clone()
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(init_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let session_id = init.headers()[SESSION_ID_HEADER].to_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::get("/mcp")
                    .header(SESSION_ID_HEADER, &session_id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_get_without_session_is_bad_request() {
        let response = test_router()
            .oneshot(Request::get("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_closes_session_and_invalidates_id() {
        let app = test_router();
        let init = app
            .clone()
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(init_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let session_id = init.headers()[SESSION_ID_HEADER].to_str().unwrap().to_string();

        let deleted = app
            .clone()
            .oneshot(
                Request::delete("/mcp")
                    .header(SESSION_ID_HEADER, &session_id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let reused = app
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .header(SESSION_ID_HEADER, &session_id)
                    .body(Body::from(init_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_unknown_session_is_bad_request() {
        let response = test_router()
            .oneshot(
                Request::delete("/mcp")
                    .header(SESSION_ID_HEADER, "never-issued")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
