//! Values exchanged between the coordinator, its agents and tool servers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;

/// Stable agent identity, known at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn user() -> Self {
        Self::new("user")
    }

    pub fn coordinator() -> Self {
        Self::new("coordinator-agent")
    }

    pub fn research() -> Self {
        Self::new("research-agent")
    }

    pub fn executor() -> Self {
        Self::new("executor-agent")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a specialized agent can do. The coordinator routes on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Fetch information (weather lookup).
    Research,
    /// Persist a result (file write).
    Execute,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "research" => Ok(Self::Research),
            "execute" | "executor" => Ok(Self::Execute),
            other => Err(Error::PlanningAmbiguous(format!("unknown capability: {}", other))),
        }
    }
}

/// A delegated sub-task. Agents only ever see it by shared reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: Uuid,
    pub requester: AgentId,
    pub instruction: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl TaskRequest {
    pub fn new(requester: AgentId, instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester,
            instruction: instruction.into(),
            parameters: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Add a structured parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// A string parameter, if present.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// Outcome of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failure,
}

/// What an agent produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Empty,
    Text { text: String },
    Structured { text: String, data: Value },
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Human-readable form.
    pub fn as_text(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Text { text } | Self::Structured { text, .. } => text,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Structured { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Exactly one per [`TaskRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub request_id: Uuid,
    pub agent: AgentId,
    pub status: TaskStatus,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn success(request: &TaskRequest, agent: AgentId, payload: Payload, elapsed: Duration) -> Self {
        Self {
            request_id: request.id,
            agent,
            status: TaskStatus::Success,
            payload,
            error: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failure(request: &TaskRequest, agent: AgentId, error: &Error, elapsed: Duration) -> Self {
        Self {
            request_id: request.id,
            agent,
            status: TaskStatus::Failure,
            payload: Payload::Empty,
            error: Some(error.to_string()),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    /// The error detail, or a placeholder when none was recorded.
    pub fn error_detail(&self) -> &str {
        self.error.as_deref().unwrap_or("no error detail")
    }
}

/// One call to a tool server. Lives for a single request/response exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: Value,
    pub caller: AgentId,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, arguments: Value, caller: AgentId) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            caller,
        }
    }
}
