//! MCP tool server: method dispatch plus stdio and HTTP transports.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::files::{self, FileStore};
use crate::protocol::{
    error_codes, McpRequest, McpResponse, ServerCapabilities, ServerInfo, ToolCapabilities,
    PROTOCOL_VERSION,
};
use crate::tools::ToolRegistry;
use crate::weather::{self, WeatherBackend};

/// One tool server instance exposing a fixed set of operations.
pub struct ToolServer {
    /// Tool registry.
    registry: ToolRegistry,
    /// Server info.
    server_info: ServerInfo,
    /// Whether the client sent `notifications/initialized`.
    initialized: AtomicBool,
}

impl ToolServer {
    /// Create a server over `registry`.
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            registry,
            server_info: ServerInfo::named(name),
            initialized: AtomicBool::new(false),
        }
    }

    /// The weather server.
    pub fn weather(backend: WeatherBackend) -> Self {
        Self::new("weather-mcp", weather::registry(backend))
    }

    /// The file server.
    pub fn files(store: FileStore) -> Self {
        Self::new("files-mcp", files::registry(store))
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.server_info.name
    }

    /// Whether the initialize handshake completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Handle a single raw message. Notifications produce no response.
    pub async fn handle_message(&self, message: &str) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                return Some(McpResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    e.to_string(),
                ));
            }
        };

        self.handle_request(request).await
    }

    /// Handle a parsed request.
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        if request.jsonrpc != "2.0" {
            return Some(McpResponse::error(
                request.id,
                error_codes::INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&request),
            "tools/list" => self.handle_tools_list(&request),
            "tools/call" => self.handle_tools_call(&request).await,
            "ping" => McpResponse::success(request.id.clone(), json!({})),
            _ => McpResponse::error(
                request.id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("unknown method: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_notification(&self, request: &McpRequest) {
        match request.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.initialized.store(true, Ordering::Release);
                info!(server = %self.server_info.name, "MCP server initialized");
            }
            other => debug!("Ignoring notification: {}", other),
        }
    }

    fn handle_initialize(&self, request: &McpRequest) -> McpResponse {
        info!(server = %self.server_info.name, "Initializing MCP server");

        let capabilities = ServerCapabilities {
            tools: Some(ToolCapabilities { list_changed: false }),
        };

        McpResponse::success(
            request.id.clone(),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": capabilities,
                "serverInfo": self.server_info
            }),
        )
    }

    fn handle_tools_list(&self, request: &McpRequest) -> McpResponse {
        McpResponse::success(
            request.id.clone(),
            json!({
                "tools": self.registry.definitions()
            }),
        )
    }

    async fn handle_tools_call(&self, request: &McpRequest) -> McpResponse {
        let name = match request.params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => {
                return McpResponse::error(
                    request.id.clone(),
                    error_codes::INVALID_PARAMS,
                    "missing tool name",
                );
            }
        };
        let arguments = request
            .params
            .get("arguments")
            .cloned()
            .unwrap_or(json!({}));

        info!(server = %self.server_info.name, tool = name, "Calling tool");

        let result = match self.registry.execute(name, arguments).await {
            Ok(result) => serde_json::to_value(result),
            Err(e) => {
                warn!(tool = name, "Tool execution failed: {}", e);
                return McpResponse::tool_error(request.id.clone(), name, &e);
            }
        };

        match result {
            Ok(value) => McpResponse::success(request.id.clone(), value),
            Err(e) => McpResponse::error(
                request.id.clone(),
                error_codes::INTERNAL_ERROR,
                e.to_string(),
            ),
        }
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes.
    #[cfg(feature = "stdio")]
    pub async fn run_stdio(&self) -> crate::Result<()> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        info!(server = %self.server_info.name, "Starting MCP server on stdio");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            let Some(response) = self.handle_message(&line).await else {
                continue;
            };
            let response_json = serde_json::to_string(&response)?;

            debug!("Sending: {}", response_json);

            stdout.write_all(response_json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        Ok(())
    }
}

#[cfg(feature = "http")]
pub mod http {
    //! `POST /mcp` transport.

    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tower_http::trace::TraceLayer;
    use tracing::info;

    use super::ToolServer;

    /// Build the axum router for `server`.
    pub fn router(server: Arc<ToolServer>) -> Router {
        Router::new()
            .route("/mcp", post(mcp_endpoint))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
            .with_state(server)
    }

    /// Bind `addr` and serve until the task is dropped.
    pub async fn serve(server: Arc<ToolServer>, addr: SocketAddr) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(server = %server.name(), addr = %listener.local_addr()?, "Serving MCP over HTTP");
        axum::serve(listener, router(server)).await?;
        Ok(())
    }

    async fn mcp_endpoint(State(server): State<Arc<ToolServer>>, body: String) -> Response {
        match server.handle_message(&body).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        }
    }

    async fn health(State(server): State<Arc<ToolServer>>) -> impl IntoResponse {
        Json(serde_json::json!({ "status": "ok", "server": server.name() }))
    }
}
