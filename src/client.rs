//! Client side of the tool servers.
//!
//! A [`ToolClient`] turns one [`ToolInvocation`] into exactly one request and
//! waits for its response, bounded by a timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{McpRequest, McpResponse, ToolCallResult, ToolDefinition};
use crate::server::ToolServer;
use crate::task::ToolInvocation;

/// Carries one JSON-RPC request to a server and returns its response.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable endpoint, for logs and error messages.
    fn endpoint(&self) -> String;

    /// Send a request and wait for the response.
    async fn send(&self, request: McpRequest) -> Result<McpResponse>;
}

/// Calls a [`ToolServer`] living in the same process.
pub struct InProcessTransport {
    server: Arc<ToolServer>,
}

impl InProcessTransport {
    pub fn new(server: Arc<ToolServer>) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl Transport for InProcessTransport {
    fn endpoint(&self) -> String {
        format!("in-process:{}", self.server.name())
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        // Round-trip through JSON so both transports see the same wire format.
        let raw = serde_json::to_string(&request)?;
        self.server
            .handle_message(&raw)
            .await
            .ok_or_else(|| Error::Protocol("server sent no response to a request".into()))
    }
}

/// Posts requests to a server's `/mcp` endpoint.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8101`.
    /// `timeout` bounds each exchange, notifications included.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        let base = base_url.trim_end_matches('/');
        let url = if base.ends_with("/mcp") {
            base.to_string()
        } else {
            format!("{}/mcp", base)
        };
        Ok(Self { url, http })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ToolUnavailable(format!("{}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(Error::ToolUnavailable(format!(
                "{} returned HTTP {}",
                self.url,
                response.status()
            )));
        }

        response
            .json::<McpResponse>()
            .await
            .map_err(|e| Error::Protocol(format!("invalid response from {}: {}", self.url, e)))
    }
}

/// Output of a successful tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub data: Option<Value>,
}

/// MCP client bound to exactly one tool server.
pub struct ToolClient {
    transport: Box<dyn Transport>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl ToolClient {
    pub fn new(transport: impl Transport + 'static, timeout: Duration) -> Self {
        Self {
            transport: Box::new(transport),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Client for a server in this process.
    pub fn in_process(server: Arc<ToolServer>, timeout: Duration) -> Self {
        Self::new(InProcessTransport::new(server), timeout)
    }

    /// Client for a server reachable over HTTP.
    pub fn http(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(base_url, timeout)?, timeout))
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    async fn request(&self, method: &str, params: Value) -> Result<McpResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = McpRequest::new(id, method, params);

        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not answer {} within {:?}",
                self.transport.endpoint(),
                method,
                self.timeout
            ))),
        }
    }

    /// Perform the initialize handshake.
    pub async fn initialize(&self, client_name: &str) -> Result<Value> {
        let response = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": crate::protocol::PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": client_name, "version": env!("CARGO_PKG_VERSION") }
                }),
            )
            .await?;
        if let Some(err) = response.error {
            return Err(err.into_error("initialize"));
        }
        // Notifications carry no id and expect no reply.
        let note = McpRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "notifications/initialized".into(),
            params: Value::Null,
        };
        match tokio::time::timeout(self.timeout, self.transport.send(note)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("initialized notification not acknowledged: {}", e),
            Err(_) => warn!(
                endpoint = %self.transport.endpoint(),
                "initialized notification not acknowledged within {:?}",
                self.timeout
            ),
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// List the server's tools.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let response = self.request("tools/list", json!({})).await?;
        if let Some(err) = response.error {
            return Err(err.into_error("tools/list"));
        }
        let tools = response
            .result
            .and_then(|mut r| r.get_mut("tools").map(Value::take))
            .ok_or_else(|| Error::Protocol("tools/list result has no tools".into()))?;
        Ok(serde_json::from_value(tools)?)
    }

    /// Issue one tool invocation.
    pub async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        debug!(
            tool = %invocation.tool,
            caller = %invocation.caller,
            endpoint = %self.transport.endpoint(),
            "Invoking tool"
        );

        let params = json!({ "name": invocation.tool, "arguments": invocation.arguments });
        let response = self.request("tools/call", params).await?;

        if let Some(err) = response.error {
            let err = err.into_error(&invocation.tool);
            warn!(tool = %invocation.tool, "Tool invocation failed: {}", err);
            return Err(err);
        }

        let result: ToolCallResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| Error::Protocol("response has neither result nor error".into()))?,
        )?;

        if result.is_error {
            return Err(Error::tool(
                &invocation.tool,
                crate::error::ToolErrorKind::Internal,
                result.joined_text(),
            ));
        }

        Ok(ToolOutput {
            text: result.joined_text(),
            data: result.structured_content,
        })
    }
}
