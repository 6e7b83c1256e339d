//! Per-session protocol transport.
//!
//! The session manager consumes transports only through the
//! [`SessionTransport`] trait: handle a request, close. The one concrete
//! implementation dispatches JSON-RPC messages to an [`ImageServer`].

use crate::server::ImageServer;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// JSON-RPC error code used for session-level client errors, matching the
/// code the reference MCP SDK emits for bad session requests.
pub const SESSION_ERROR_CODE: i64 = -32000;

/// Protocol-level request handling surface of one session.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Handle one inbound protocol message. Returns `None` for
    /// notifications, which produce no response body.
    async fn handle_request(&self, message: Value) -> Option<Value>;

    /// Close the transport. Idempotent; never fails.
    async fn close(&self);
}

/// Factory producing one transport per new session.
pub type TransportFactory = Box<dyn Fn() -> Arc<dyn SessionTransport> + Send + Sync>;

/// Whether a message is a well-formed initialization request: the
/// `initialize` method with a request id.
pub fn is_initialize_request(message: &Value) -> bool {
    message.get("method").and_then(Value::as_str) == Some("initialize")
        && message.get("id").is_some_and(|id| !id.is_null())
}

/// JSON-RPC dispatcher binding one session to one tool server.
pub struct ToolServerTransport {
    server: Arc<ImageServer>,
    closed: AtomicBool,
}

impl ToolServerTransport {
    pub fn new(server: Arc<ImageServer>) -> Self {
        Self {
            server,
            closed: AtomicBool::new(false),
        }
    }

    /// Build a factory handing every new session its own dispatcher over a
    /// shared tool server.
    pub fn factory(server: Arc<ImageServer>) -> TransportFactory {
        Box::new(move || Arc::new(ToolServerTransport::new(Arc::clone(&server))))
    }

    fn result_response(id: Value, result: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "result": result})
    }

    fn error_response(id: Value, code: i64, message: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        })
    }

    async fn dispatch(&self, method: &str, id: Value, params: &Value) -> Value {
        match method {
            "initialize" => match serde_json::to_value(self.server.get_info()) {
                Ok(info) => Self::result_response(id, info),
                Err(e) => Self::error_response(id, -32603, &e.to_string()),
            },
            "ping" => Self::result_response(id, json!({})),
            "tools/list" => match serde_json::to_value(self.server.list_tools()) {
                Ok(tools) => Self::result_response(id, tools),
                Err(e) => Self::error_response(id, -32603, &e.to_string()),
            },
            "tools/call" => {
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return Self::error_response(id, -32602, "Missing tool name");
                };
                let arguments = params.get("arguments").cloned();
                match self.server.call_tool(name, arguments).await {
                    Ok(result) => match serde_json::to_value(result) {
                        Ok(value) => Self::result_response(id, value),
                        Err(e) => Self::error_response(id, -32603, &e.to_string()),
                    },
                    Err(mcp_error) => {
                        let error =
                            serde_json::to_value(&mcp_error).unwrap_or_else(|_| {
                                json!({"code": -32603, "message": "internal error"})
                            });
                        json!({"jsonrpc": "2.0", "id": id, "error": error})
                    }
                }
            }
            other => Self::error_response(id, -32601, &format!("Method not found: {other}")),
        }
    }
}

#[async_trait]
impl SessionTransport for ToolServerTransport {
    async fn handle_request(&self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let method = message.get("method").and_then(Value::as_str);

        if self.closed.load(Ordering::SeqCst) {
            warn!("Request on closed transport");
            return Some(Self::error_response(
                id,
                SESSION_ERROR_CODE,
                "Session closed",
            ));
        }

        let Some(method) = method else {
            return Some(Self::error_response(id, -32600, "Invalid Request"));
        };

        // Notifications carry no id and get no response.
        if id.is_null() || method.starts_with("notifications/") {
            debug!(method, "Notification received");
            return None;
        }

        let params = message.get("params").cloned().unwrap_or(Value::Null);
        Some(self.dispatch(method, id, &params).await)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
