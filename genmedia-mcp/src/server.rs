//! MCP server implementation for genmedia.
//!
//! Implements the JSON-RPC 2.0 protocol for MCP tool calls and resource
//! access. Transport-agnostic: the stdio loop and the HTTP endpoint both feed
//! requests through [`GenMediaMcpServer::handle_json`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ToolContext;
use crate::resources;
use crate::tools::ToolRegistry;
use crate::{ResourceContent, ToolResult};

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Invalid JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Not a JSON-RPC request object.
pub const INVALID_REQUEST: i32 = -32600;
/// Unknown method.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Bad method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// Server-side failure outside any tool.
pub const INTERNAL_ERROR: i32 = -32603;
/// Unknown resource URI.
pub const RESOURCE_NOT_FOUND: i32 = -32002;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Build a request with an id.
    #[must_use]
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Whether the sender expects no reply.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with("notifications/")
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID (matches request).
    pub id: Value,
    /// Result (on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    #[must_use]
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Callback invoked after every tool call with the tool name and result.
pub type OnToolCallCallback = Box<dyn Fn(&str, &ToolResult) + Send + Sync>;

/// MCP server for generative media.
pub struct GenMediaMcpServer {
    ctx: ToolContext,
    tools: ToolRegistry,
    on_tool_call: Option<OnToolCallCallback>,
}

impl GenMediaMcpServer {
    /// Create a server with the standard tool set.
    #[must_use]
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            ctx,
            tools: ToolRegistry::standard(),
            on_tool_call: None,
        }
    }

    /// Set the tool call notification callback.
    pub fn set_on_tool_call<F>(&mut self, callback: F)
    where
        F: Fn(&str, &ToolResult) + Send + Sync + 'static,
    {
        self.on_tool_call = Some(Box::new(callback));
    }

    /// Shared tool context.
    #[must_use]
    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Registered tools.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Handle one raw JSON-RPC message. Returns the serialized reply, or
    /// `None` for notifications.
    pub async fn handle_json(&self, raw: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(raw) {
            Err(e) => Some(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {e}"),
            )),
            Ok(value) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<JsonRpcRequest>(value) {
                    Ok(request) => self.handle_request(request).await,
                    Err(e) => Some(JsonRpcResponse::error(
                        id,
                        INVALID_REQUEST,
                        format!("Invalid request: {e}"),
                    )),
                }
            }
        }?;

        match serde_json::to_string(&response) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::error!("failed to serialize JSON-RPC response: {e}");
                None
            }
        }
    }

    /// Handle a JSON-RPC request. Notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!(method = %request.method, "MCP request");

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }
        let id = request.id.unwrap_or(Value::Null);

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Unsupported JSON-RPC version: {}", request.jsonrpc),
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => Self::handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => self.handle_resources_list(id),
            "resources/read" => self.handle_resources_read(id, &request.params),
            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "genmedia-mcp",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": {},
                    "resources": {}
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            serde_json::json!({ "tools": self.tools.definitions() }),
        )
    }

    async fn handle_tools_call(&self, id: Value, params: Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let Some(result) = self.tools.call(name, arguments, &self.ctx).await else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {name}"));
        };

        if let Some(ref callback) = self.on_tool_call {
            callback(name, &result);
        }

        match serde_json::to_value(&result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {e}")),
        }
    }

    fn handle_resources_list(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            serde_json::json!({ "resources": resources::list_resources(&self.ctx.catalog) }),
        )
    }

    fn handle_resources_read(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match resources::get_resource(uri, &self.ctx.catalog, &self.ctx.costs) {
            Ok(content) => {
                let (mime_type, text) = match content {
                    ResourceContent::Json(v) => (
                        "application/json",
                        serde_json::to_string_pretty(&v).unwrap_or_default(),
                    ),
                    ResourceContent::Text(s) => ("text/plain", s),
                };
                JsonRpcResponse::success(
                    id,
                    serde_json::json!({
                        "contents": [{
                            "uri": uri,
                            "mimeType": mime_type,
                            "text": text
                        }]
                    }),
                )
            }
            Err(e) => JsonRpcResponse::error(id, RESOURCE_NOT_FOUND, e),
        }
    }
}

impl std::fmt::Debug for GenMediaMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenMediaMcpServer")
            .field("ctx", &self.ctx)
            .field("tools", &self.tools)
            .field("on_tool_call", &self.on_tool_call.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use genmedia_core::{Catalog, MediaResult, MediaTransport, RequestOptions, ResponseEnvelope};

    struct NoTransport;

    #[async_trait]
    impl MediaTransport for NoTransport {
        async fn request(
            &self,
            endpoint: &str,
            _options: RequestOptions,
        ) -> MediaResult<ResponseEnvelope> {
            panic!("unexpected call to {endpoint}");
        }
    }

    fn server() -> GenMediaMcpServer {
        let ctx = ToolContext::new(Arc::new(Catalog::builtin().unwrap()), Arc::new(NoTransport));
        GenMediaMcpServer::new(ctx)
    }

    async fn call(server: &GenMediaMcpServer, method: &str, params: Value) -> JsonRpcResponse {
        server
            .handle_request(JsonRpcRequest::new(1, method, params))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = call(&server(), "initialize", serde_json::json!({})).await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "genmedia-mcp");
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let response = call(&server(), "tools/list", serde_json::json!({})).await;
        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 9);
        assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let server = server();
        let initialized = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "notifications/initialized".into(),
            params: Value::Null,
        };
        assert!(server.handle_request(initialized).await.is_none());
        assert!(server
            .handle_json(r#"{"jsonrpc":"2.0","method":"notifications/cancelled"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_tool_failures_are_results_not_rpc_errors() {
        let mut server = server();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        server.set_on_tool_call(move |_, result| {
            assert!(result.is_error);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let response = call(
            &server,
            "tools/call",
            serde_json::json!({"name": "generate_image", "arguments": {"prompt": ""}}),
        )
        .await;
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error (invalid_input)"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let server = server();
        let unknown_tool = call(&server, "tools/call", serde_json::json!({"name": "paint"})).await;
        assert_eq!(unknown_tool.error.unwrap().code, INVALID_PARAMS);

        let missing_name = call(&server, "tools/call", serde_json::json!({})).await;
        assert_eq!(missing_name.error.unwrap().code, INVALID_PARAMS);

        let unknown_method = call(&server, "sampling/createMessage", Value::Null).await;
        assert_eq!(unknown_method.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resources() {
        let server = server();
        let list = call(&server, "resources/list", Value::Null).await;
        let resources = list.result.unwrap()["resources"].as_array().unwrap().clone();
        assert!(resources.iter().any(|r| r["uri"] == "genmedia://models"));

        let read = call(
            &server,
            "resources/read",
            serde_json::json!({"uri": "genmedia://models/video"}),
        )
        .await;
        let contents = &read.result.unwrap()["contents"][0];
        assert_eq!(contents["mimeType"], "application/json");
        assert!(contents["text"].as_str().unwrap().contains("kling-2.1"));

        let missing = call(
            &server,
            "resources/read",
            serde_json::json!({"uri": "genmedia://nope"}),
        )
        .await;
        assert_eq!(missing.error.unwrap().code, RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_errors() {
        let server = server();
        let reply = server.handle_json("{not json").await.unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&reply).unwrap();
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
        assert!(response.id.is_null());

        let reply = server.handle_json(r#"{"id": 7, "params": {}}"#).await.unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&reply).unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
        assert_eq!(response.id, 7);
    }
}
